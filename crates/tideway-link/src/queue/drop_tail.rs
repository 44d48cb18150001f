//! Drop-tail: the classic FIFO that rejects arrivals over its caps.

use tracing::trace;

use super::dropping::DroppingQueue;
use super::PacketQueue;
use crate::args::QueueArgs;
use crate::packet::QueuedPacket;

/// An arrival that would break a byte or packet cap is discarded; packets
/// already queued are never touched, so there is no reordering.
#[derive(Debug)]
pub struct DropTailPacketQueue {
    inner: DroppingQueue,
}

impl DropTailPacketQueue {
    pub fn new(args: &QueueArgs) -> Self {
        DropTailPacketQueue {
            inner: DroppingQueue::from_args(args),
        }
    }

    /// Arrival time of the head packet, for gated multiplexers peeking at
    /// their inner queues.
    pub(crate) fn head_arrival(&self) -> Option<u64> {
        self.inner.front().map(|p| p.arrival_time)
    }
}

impl PacketQueue for DropTailPacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        if self.inner.admits(pkt.len()) {
            self.inner.accept(pkt);
        } else {
            trace!(bytes = pkt.len(), "droptail rejecting arrival");
        }
    }

    fn dequeue(&mut self, _now: u64) -> Option<QueuedPacket> {
        self.inner.pop_front()
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
        self.inner.describe("droptail")
    }
}
