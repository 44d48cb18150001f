//! # PIE — Proportional Integral controller Enhanced
//!
//! Drop probability tracks the queueing-delay error: delay is estimated
//! from the backlog and a departure-rate EWMA measured over dequeue bursts,
//! and the probability is nudged every update period by a proportional term
//! (distance from the reference delay) plus an integral term (delay trend).
//! New flows ride a burst allowance before probabilistic drops begin.

use rand::rngs::StdRng;
use rand::RngExt as _;
use tracing::trace;

use super::dropping::DroppingQueue;
use super::PacketQueue;
use crate::args::QueueArgs;
use crate::packet::QueuedPacket;
use crate::seeded_rng;

const DEFAULT_QDELAY_REF_MS: u64 = 20;
const DEFAULT_MAX_BURST_MS: u64 = 100;

/// Drop-probability update period.
const T_UPDATE_MS: u64 = 30;

/// Proportional gain, applied to the delay error in seconds.
const ALPHA: f64 = 0.125;

/// Integral gain, applied to the delay trend in seconds.
const BETA: f64 = 1.25;

/// Bytes that must depart before a departure-rate sample is trusted.
const DQ_THRESHOLD_BYTES: u32 = 10_000;

/// Weight of the previous rate estimate in the EWMA.
const DQ_RATE_DECAY: f64 = 0.875;

#[derive(Debug)]
pub struct PiePacketQueue {
    inner: DroppingQueue,
    qdelay_ref_ms: f64,
    max_burst_ms: u64,

    drop_prob: f64,
    qdelay_old_ms: f64,
    burst_allowance_ms: u64,
    last_update_ms: Option<u64>,

    // departure-rate estimator
    measuring: bool,
    dq_start_ms: u64,
    dq_count_bytes: u32,
    /// Smoothed departure rate in bytes per millisecond; 0 until the first
    /// full measurement window completes.
    avg_dq_rate: f64,
    /// Fallback rate before the estimator warms up, e.g. the link's
    /// configured capacity.
    capacity_bytes_per_ms: Option<f64>,

    rng: StdRng,
}

impl PiePacketQueue {
    pub fn new(args: &QueueArgs) -> Self {
        let qdelay_ref = args.get("qdelay_ref");
        let max_burst = args.get("max_burst");
        PiePacketQueue {
            inner: DroppingQueue::from_args(args),
            qdelay_ref_ms: if qdelay_ref == 0 {
                DEFAULT_QDELAY_REF_MS as f64
            } else {
                qdelay_ref as f64
            },
            max_burst_ms: if max_burst == 0 {
                DEFAULT_MAX_BURST_MS
            } else {
                max_burst
            },
            drop_prob: 0.0,
            qdelay_old_ms: 0.0,
            burst_allowance_ms: if max_burst == 0 {
                DEFAULT_MAX_BURST_MS
            } else {
                max_burst
            },
            last_update_ms: None,
            measuring: false,
            dq_start_ms: 0,
            dq_count_bytes: 0,
            avg_dq_rate: 0.0,
            capacity_bytes_per_ms: None,
            rng: seeded_rng(args.get("seed")),
        }
    }

    /// Current drop probability, in `[0, 1]`.
    pub fn drop_prob(&self) -> f64 {
        self.drop_prob
    }

    /// Provide the link's configured capacity as the delay-estimate
    /// fallback until the departure-rate estimator has a full window.
    pub fn set_capacity_bytes_per_ms(&mut self, rate: f64) {
        self.capacity_bytes_per_ms = Some(rate);
    }

    fn maybe_update(&mut self, now: u64) {
        match self.last_update_ms {
            None => self.last_update_ms = Some(now),
            Some(last) if now.saturating_sub(last) >= T_UPDATE_MS => {
                self.update_drop_prob();
                self.last_update_ms = Some(now);
            }
            Some(_) => {}
        }
    }

    fn update_drop_prob(&mut self) {
        let rate = if self.avg_dq_rate > 0.0 {
            self.avg_dq_rate
        } else if let Some(capacity) = self.capacity_bytes_per_ms {
            capacity
        } else {
            // No delay estimate yet: leave the probability alone but keep
            // burning the burst allowance.
            self.burst_allowance_ms = self.burst_allowance_ms.saturating_sub(T_UPDATE_MS);
            return;
        };

        let qdelay_ms = f64::from(self.inner.size_bytes()) / rate;

        // Controller gains act on delays in seconds.
        let error = (qdelay_ms - self.qdelay_ref_ms) / 1000.0;
        let trend = (qdelay_ms - self.qdelay_old_ms) / 1000.0;
        self.drop_prob = (self.drop_prob + ALPHA * error + BETA * trend).clamp(0.0, 1.0);

        if self.drop_prob == 0.0
            && qdelay_ms < self.qdelay_ref_ms / 2.0
            && self.qdelay_old_ms < self.qdelay_ref_ms / 2.0
        {
            self.burst_allowance_ms = self.max_burst_ms;
        } else {
            self.burst_allowance_ms = self.burst_allowance_ms.saturating_sub(T_UPDATE_MS);
        }

        trace!(
            drop_prob = self.drop_prob,
            qdelay_ms,
            burst_allowance = self.burst_allowance_ms,
            "pie updated drop probability"
        );
        self.qdelay_old_ms = qdelay_ms;
    }

    /// Probabilistic early-drop decision for one arrival.
    fn drop_early(&mut self) -> bool {
        if self.burst_allowance_ms > 0 {
            return false;
        }
        // Safeguard: a short queue with a small probability never drops.
        if self.qdelay_old_ms < self.qdelay_ref_ms / 2.0 && self.drop_prob < 0.2 {
            return false;
        }
        if self.drop_prob == 0.0 {
            return false;
        }
        self.rng.random::<f64>() < self.drop_prob
    }

    /// Feed the departure-rate estimator with one departing packet.
    fn sample_departure(&mut self, backlog_before: u32, len: u32, now: u64) {
        if !self.measuring && backlog_before >= DQ_THRESHOLD_BYTES {
            self.measuring = true;
            self.dq_start_ms = now;
            self.dq_count_bytes = 0;
        }
        if !self.measuring {
            return;
        }

        self.dq_count_bytes += len;
        if self.dq_count_bytes < DQ_THRESHOLD_BYTES {
            return;
        }

        let window_ms = now.saturating_sub(self.dq_start_ms).max(1) as f64;
        let rate = f64::from(self.dq_count_bytes) / window_ms;
        self.avg_dq_rate = if self.avg_dq_rate == 0.0 {
            rate
        } else {
            DQ_RATE_DECAY * self.avg_dq_rate + (1.0 - DQ_RATE_DECAY) * rate
        };

        if self.inner.size_bytes() >= DQ_THRESHOLD_BYTES {
            // Enough backlog to measure the next burst immediately.
            self.dq_start_ms = now;
            self.dq_count_bytes = 0;
        } else {
            self.measuring = false;
        }
    }
}

impl PacketQueue for PiePacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        self.maybe_update(pkt.arrival_time);

        if !self.inner.admits(pkt.len()) {
            trace!(bytes = pkt.len(), "pie rejecting arrival at cap");
            return;
        }
        if self.drop_early() {
            trace!(
                bytes = pkt.len(),
                drop_prob = self.drop_prob,
                "pie early-dropping arrival"
            );
            return;
        }
        self.inner.accept(pkt);
    }

    fn dequeue(&mut self, now: u64) -> Option<QueuedPacket> {
        let backlog = self.inner.size_bytes();
        let pkt = self.inner.pop_front()?;
        self.sample_departure(backlog, pkt.len() as u32, now);
        Some(pkt)
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
        self.inner.describe("pie")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pkt(len: usize, at: u64) -> QueuedPacket {
        QueuedPacket::new(Bytes::from(vec![0u8; len]), at)
    }

    fn seeded(args: &str) -> PiePacketQueue {
        PiePacketQueue::new(&QueueArgs::parse(&format!("seed=7, {args}")).unwrap())
    }

    #[test]
    fn burst_allowance_admits_everything_at_startup() {
        let mut q = seeded("");
        for at in 0..50u64 {
            q.enqueue(pkt(1500, at));
        }
        assert_eq!(q.size_packets(), 50, "no early drops inside max_burst");
    }

    #[test]
    fn drop_prob_stays_in_unit_interval_under_heavy_load() {
        let mut q = seeded("");
        q.set_capacity_bytes_per_ms(1.0); // absurdly slow link: huge qdelay
        let mut now = 0u64;
        for _ in 0..200 {
            q.enqueue(pkt(1500, now));
            let p = q.drop_prob();
            assert!((0.0..=1.0).contains(&p), "drop_prob {p} out of range");
            now += 31; // cross an update tick every arrival
        }
        assert!(q.drop_prob() > 0.9, "sustained overload saturates the prob");

        // then let it drain and watch the probability come back down
        while q.dequeue(now).is_some() {}
        for _ in 0..200 {
            q.enqueue(pkt(10, now));
            let _ = q.dequeue(now);
            now += 31;
            let p = q.drop_prob();
            assert!((0.0..=1.0).contains(&p), "drop_prob {p} out of range");
        }
        assert!(q.drop_prob() < 0.1, "an empty queue relaxes the prob");
    }

    #[test]
    fn no_probability_updates_without_rate_estimate_or_capacity() {
        let mut q = seeded("");
        let mut now = 0u64;
        // backlog never reaches the measurement threshold and no capacity
        // fallback is configured, so the controller has no delay estimate
        for _ in 0..100 {
            q.enqueue(pkt(50, now));
            let _ = q.dequeue(now);
            now += 31;
        }
        assert_eq!(q.drop_prob(), 0.0);
    }

    #[test]
    fn small_delay_and_small_prob_force_accept() {
        let mut q = seeded("qdelay_ref=20");
        q.set_capacity_bytes_per_ms(1500.0); // 1 pkt/ms: tiny qdelay
        let mut now = 0u64;
        // run well past the burst allowance
        for _ in 0..50 {
            q.enqueue(pkt(1500, now));
            let _ = q.dequeue(now);
            now += 31;
        }
        let before = q.size_packets();
        q.enqueue(pkt(1500, now));
        assert_eq!(q.size_packets(), before + 1, "safeguard admits the packet");
    }

    #[test]
    fn departure_rate_warms_up_from_dequeues() {
        let mut q = seeded("");
        for at in 0..20u64 {
            q.enqueue(pkt(1500, at)); // 30 kB backlog, above the threshold
        }
        for now in 20..40u64 {
            let _ = q.dequeue(now);
        }
        assert!(q.avg_dq_rate > 0.0, "EWMA seeded after one full burst");
    }

    #[test]
    fn drop_tail_caps_apply_before_the_controller() {
        let mut q = seeded("packets=3");
        for at in 0..10u64 {
            q.enqueue(pkt(100, at));
        }
        assert_eq!(q.size_packets(), 3);
    }
}
