//! # CoDel — Controlled Delay AQM
//!
//! Drops from the head when sojourn time has exceeded `target` continuously
//! for one `interval`, then keeps dropping on an `interval / sqrt(count)`
//! schedule until the standing queue drains. Follows the reference
//! controller from the CoDel specification.

use tracing::trace;

use super::dropping::DroppingQueue;
use super::PacketQueue;
use crate::args::QueueArgs;
use crate::packet::QueuedPacket;

const DEFAULT_TARGET_MS: u64 = 5;
const DEFAULT_INTERVAL_MS: u64 = 100;

/// Multiple of `interval` since the last drop below which the drop count is
/// carried over instead of reset.
const RECENT_DROP_WINDOW: u64 = 16;

#[derive(Debug)]
pub struct CodelPacketQueue {
    inner: DroppingQueue,
    target_ms: u64,
    interval_ms: u64,
    /// First instant the head's sojourn was seen above target, plus one
    /// interval; 0 when sojourn is currently below target.
    first_above_time: u64,
    /// Next scheduled drop while in the dropping state.
    drop_next: u64,
    /// Drops in the current dropping episode.
    count: u64,
    dropping: bool,
    last_drop_time: u64,
}

impl CodelPacketQueue {
    pub fn new(args: &QueueArgs) -> Self {
        let target = args.get("target");
        let interval = args.get("interval");
        CodelPacketQueue {
            inner: DroppingQueue::from_args(args),
            target_ms: if target == 0 { DEFAULT_TARGET_MS } else { target },
            interval_ms: if interval == 0 {
                DEFAULT_INTERVAL_MS
            } else {
                interval
            },
            first_above_time: 0,
            drop_next: 0,
            count: 0,
            dropping: false,
            last_drop_time: 0,
        }
    }

    /// The drop schedule: one interval after `from`, shrunk by the square
    /// root of the drop count.
    fn control_law(&self, from: u64) -> u64 {
        from + (self.interval_ms as f64 / (self.count.max(1) as f64).sqrt()) as u64
    }

    /// Pop the head and report whether the controller may drop it: true
    /// only once sojourn has stayed above target for a full interval.
    fn do_dequeue(&mut self, now: u64) -> (Option<QueuedPacket>, bool) {
        let Some(pkt) = self.inner.pop_front() else {
            self.first_above_time = 0;
            return (None, false);
        };

        let sojourn = now.saturating_sub(pkt.arrival_time);
        if sojourn < self.target_ms {
            self.first_above_time = 0;
            (Some(pkt), false)
        } else if self.first_above_time == 0 {
            self.first_above_time = now + self.interval_ms;
            (Some(pkt), false)
        } else {
            (Some(pkt), now >= self.first_above_time)
        }
    }

    fn drop_packet(&mut self, pkt: QueuedPacket, now: u64) {
        trace!(
            bytes = pkt.len(),
            sojourn = now.saturating_sub(pkt.arrival_time),
            count = self.count,
            "codel dropping head"
        );
        self.last_drop_time = now;
    }
}

impl PacketQueue for CodelPacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        if self.inner.admits(pkt.len()) {
            self.inner.accept(pkt);
        } else {
            trace!(bytes = pkt.len(), "codel rejecting arrival at cap");
        }
    }

    fn dequeue(&mut self, now: u64) -> Option<QueuedPacket> {
        let (mut head, mut ok_to_drop) = self.do_dequeue(now);

        if self.dropping {
            if !ok_to_drop {
                self.dropping = false;
            }
            while self.dropping && now >= self.drop_next {
                if let Some(victim) = head.take() {
                    self.count += 1;
                    self.drop_packet(victim, now);
                }
                let (next, next_ok) = self.do_dequeue(now);
                head = next;
                ok_to_drop = next_ok;
                if !ok_to_drop {
                    self.dropping = false;
                } else {
                    self.drop_next = self.control_law(self.drop_next);
                }
            }
        } else if ok_to_drop {
            // The head has lingered above target for a full interval: drop
            // it and enter the dropping state. A drop in the recent past
            // resumes the previous schedule at nearly the same rate.
            self.count = if self.last_drop_time != 0
                && now.saturating_sub(self.last_drop_time) < RECENT_DROP_WINDOW * self.interval_ms
            {
                if self.count > 2 {
                    self.count - 2
                } else {
                    1
                }
            } else {
                1
            };
            if let Some(victim) = head.take() {
                self.drop_packet(victim, now);
            }
            self.dropping = true;
            let (next, _) = self.do_dequeue(now);
            head = next;
            self.drop_next = self.control_law(now);
        }

        head
    }

    fn empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn size_bytes(&self) -> u32 {
        self.inner.size_bytes()
    }

    fn size_packets(&self) -> u32 {
        self.inner.size_packets()
    }

    fn set_bdp(&mut self, bdp_bytes: u32) {
        self.inner.set_bdp(bdp_bytes)
    }

    fn describe(&self) -> String {
        self.inner.describe("codel")
    }
}
