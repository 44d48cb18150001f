//! # Loss queues
//!
//! Immediate-forward queues that decide a packet's fate on arrival: the
//! loss model drops it or it is queued for the next drain toward the sink.
//! Models: IID Bernoulli, uniform deterministic-rate, and an on/off
//! Markov-modulated switching link whose off periods swallow everything.

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::Rng as _;
use rand::RngExt as _;
use rand_distr::{Distribution, Exp};
use tracing::trace;

use crate::clock::WAIT_FOREVER;
use crate::seeded_rng;
use crate::shaper::PacketSink;

/// Decides the fate of arriving packets and, for stateful models, when the
/// surrounding event loop must look again.
pub trait LossModel {
    fn drop_packet(&mut self, contents: &[u8], now: u64) -> bool;

    /// Earliest future instant the model itself changes state.
    fn wait_time(&mut self, now: u64) -> u64 {
        let _ = now;
        WAIT_FOREVER
    }
}

/// FIFO applying a loss model on arrival; survivors are forwarded in bulk.
pub struct LossQueue<M: LossModel> {
    fifo: VecDeque<Bytes>,
    model: M,
}

impl<M: LossModel> LossQueue<M> {
    pub fn new(model: M) -> Self {
        LossQueue {
            fifo: VecDeque::new(),
            model,
        }
    }

    /// Run one arrival through the loss model.
    pub fn read_packet(&mut self, contents: Bytes, now: u64) {
        if self.model.drop_packet(&contents, now) {
            trace!(bytes = contents.len(), "loss model dropped arrival");
        } else {
            self.fifo.push_back(contents);
        }
    }

    /// Drain every queued packet into `sink`.
    pub fn write_packets<S: PacketSink>(&mut self, sink: &mut S) -> io::Result<()> {
        while let Some(pkt) = self.fifo.pop_front() {
            sink.send(&pkt)?;
        }
        Ok(())
    }

    /// Zero while packets are pending, otherwise whatever the model asks
    /// for, saturated at [`WAIT_FOREVER`].
    pub fn wait_time(&mut self, now: u64) -> u64 {
        let base = if self.fifo.is_empty() { WAIT_FOREVER } else { 0 };
        base.min(self.model.wait_time(now))
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

// ─── IID Bernoulli loss ─────────────────────────────────────────────────────

/// Drop each packet independently with fixed probability.
pub struct IidLoss {
    loss_rate: f64,
    rng: StdRng,
}

impl IidLoss {
    pub fn new(loss_rate: f64) -> Self {
        Self::with_seed(loss_rate, 0)
    }

    pub fn with_seed(loss_rate: f64, seed: u64) -> Self {
        IidLoss {
            loss_rate,
            rng: seeded_rng(seed),
        }
    }
}

impl LossModel for IidLoss {
    fn drop_packet(&mut self, _contents: &[u8], _now: u64) -> bool {
        self.rng.random::<f64>() < self.loss_rate
    }
}

// ─── Deterministic-rate loss ────────────────────────────────────────────────

/// Uniform-draw loss at a fixed rate quantised to 1/10000. Aggregate
/// behaviour matches [`IidLoss`]; the quantisation makes configured rates
/// exact at four decimal places.
pub struct DeterministicLoss {
    loss_rate: f64,
    rng: StdRng,
}

impl DeterministicLoss {
    pub fn new(loss_rate: f64) -> Self {
        Self::with_seed(loss_rate, 0)
    }

    pub fn with_seed(loss_rate: f64, seed: u64) -> Self {
        DeterministicLoss {
            loss_rate,
            rng: seeded_rng(seed),
        }
    }
}

impl LossModel for DeterministicLoss {
    fn drop_packet(&mut self, _contents: &[u8], _now: u64) -> bool {
        self.rng.random_range(0..10_000u32) < (self.loss_rate * 10_000.0) as u32
    }
}

// ─── Markov switching link ──────────────────────────────────────────────────

/// Upper bound on one on/off sojourn, against timestamp overflow when the
/// exponential tail produces an enormous draw.
const MAX_SWITCH_INTERVAL_MS: u64 = 1 << 30;

/// Sojourn distribution for a state with the given mean duration; `None`
/// when the mean is zero.
fn sojourn_dist(mean_ms: f64) -> Option<Exp<f64>> {
    if mean_ms > 0.0 {
        Exp::new(1.0 / mean_ms).ok()
    } else {
        None
    }
}

/// Floor a sojourn draw at 1 ms so a zero mean cannot stall the switching
/// process, and cap it at [`MAX_SWITCH_INTERVAL_MS`].
fn bound_sojourn(sample: f64) -> u64 {
    sample.clamp(1.0, MAX_SWITCH_INTERVAL_MS as f64) as u64
}

/// Two-state Markov link: alternates on/off with exponentially distributed
/// sojourns; every packet arriving while the link is off is lost.
pub struct SwitchingLink {
    link_is_on: bool,
    on_sojourn: Option<Exp<f64>>,
    off_sojourn: Option<Exp<f64>>,
    next_switch_time: u64,
    rng: StdRng,
}

impl SwitchingLink {
    /// Mean on/off durations are in seconds. The link starts off and flips
    /// on at the first query.
    pub fn new(mean_on_time_s: f64, mean_off_time_s: f64, now: u64) -> Self {
        Self::with_seed(mean_on_time_s, mean_off_time_s, now, 0)
    }

    pub fn with_seed(mean_on_time_s: f64, mean_off_time_s: f64, now: u64, seed: u64) -> Self {
        SwitchingLink {
            link_is_on: false,
            on_sojourn: sojourn_dist(mean_on_time_s * 1000.0),
            off_sojourn: sojourn_dist(mean_off_time_s * 1000.0),
            next_switch_time: now,
            rng: seeded_rng(seed),
        }
    }

    pub fn link_is_on(&self) -> bool {
        self.link_is_on
    }

    /// Advance the on/off process up to `now`.
    fn catch_up(&mut self, now: u64) {
        while self.next_switch_time <= now {
            self.link_is_on = !self.link_is_on;
            let dist = if self.link_is_on {
                &self.on_sojourn
            } else {
                &self.off_sojourn
            };
            let sample = match dist {
                Some(dist) => dist.sample(&mut self.rng),
                None => 0.0,
            };
            self.next_switch_time += bound_sojourn(sample);
        }
    }
}

impl LossModel for SwitchingLink {
    fn drop_packet(&mut self, _contents: &[u8], now: u64) -> bool {
        self.catch_up(now);
        !self.link_is_on
    }

    fn wait_time(&mut self, now: u64) -> u64 {
        self.catch_up(now);
        self.next_switch_time.saturating_sub(now).min(WAIT_FOREVER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct CountingSink {
        packets: usize,
        bytes: usize,
    }

    impl CountingSink {
        fn new() -> Self {
            CountingSink {
                packets: 0,
                bytes: 0,
            }
        }
    }

    impl PacketSink for CountingSink {
        fn send(&mut self, packet: &[u8]) -> io::Result<()> {
            self.packets += 1;
            self.bytes += packet.len();
            Ok(())
        }
    }

    #[test]
    fn lossless_queue_forwards_everything() {
        let mut q = LossQueue::new(IidLoss::with_seed(0.0, 1));
        for now in 0..100u64 {
            q.read_packet(Bytes::from_static(b"payload"), now);
        }
        assert_eq!(q.len(), 100);
        assert_eq!(q.wait_time(0), 0, "pending packets want immediate drain");

        let mut sink = CountingSink::new();
        q.write_packets(&mut sink).unwrap();
        assert_eq!(sink.packets, 100);
        assert!(q.is_empty());
        assert_eq!(q.wait_time(0), WAIT_FOREVER);
    }

    #[test]
    fn certain_loss_drops_everything() {
        let mut q = LossQueue::new(IidLoss::with_seed(1.0, 1));
        for now in 0..100u64 {
            q.read_packet(Bytes::from_static(b"payload"), now);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn iid_loss_rate_converges() {
        let mut model = IidLoss::with_seed(0.3, 9);
        let n = 20_000;
        let drops = (0..n).filter(|_| model.drop_packet(b"x", 0)).count();
        let rate = drops as f64 / n as f64;
        assert!((rate - 0.3).abs() < 0.02, "observed rate {rate}");
    }

    #[test]
    fn deterministic_loss_rate_converges() {
        let mut model = DeterministicLoss::with_seed(0.1, 9);
        let n = 20_000;
        let drops = (0..n).filter(|_| model.drop_packet(b"x", 0)).count();
        let rate = drops as f64 / n as f64;
        assert!((rate - 0.1).abs() < 0.02, "observed rate {rate}");
    }

    #[test]
    fn switching_link_flips_on_at_first_query() {
        let mut link = SwitchingLink::with_seed(10.0, 10.0, 0, 3);
        assert!(!link.link_is_on());
        let _ = link.wait_time(0);
        assert!(link.link_is_on(), "initial switch time is now: flip to on");
    }

    #[test]
    fn symmetric_switching_link_drops_about_half() {
        // mean on == mean off == 10 s over a 10,000 s packet-per-second
        // stream: the off fraction tends to one half
        let mut q = LossQueue::new(SwitchingLink::with_seed(10.0, 10.0, 0, 5));
        let total = 10_000u64;
        for s in 0..total {
            q.read_packet(Bytes::from_static(b"tick"), s * 1000);
        }
        let delivered = q.len() as u64;
        let dropped = total - delivered;
        assert!(
            (3_000..=7_000).contains(&dropped),
            "dropped {dropped} of {total}"
        );
    }

    #[test]
    fn switching_wait_time_counts_down_to_the_next_flip() {
        let mut link = SwitchingLink::with_seed(5.0, 5.0, 0, 8);
        let wait = link.wait_time(0);
        assert!(wait > 0);
        assert!(wait <= WAIT_FOREVER);

        // moving part-way toward the switch shrinks the wait
        if wait > 2 {
            let later = link.wait_time(wait - 1);
            assert!(later <= wait);
        }
    }

    #[test]
    fn zero_mean_never_stalls_the_switch_loop() {
        let mut link = SwitchingLink::with_seed(0.0, 0.0, 0, 2);
        // would loop forever without the 1 ms floor on sojourns
        let _ = link.wait_time(1_000);
        let _ = link.drop_packet(b"x", 2_000);
    }
}
