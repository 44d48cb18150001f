//! In-memory source/sink pair and the simulated event loop.

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;
use tideway_link::clock::{Clock, ManualClock};
use tideway_link::queue::PacketQueue;
use tideway_link::shaper::{LinkShaper, PacketSink, PacketSource, ShaperError};

/// Scripted arrival feed: packets become visible to the shaper at their
/// scheduled millisecond. Arrivals must be pushed in nondecreasing time
/// order.
#[derive(Default)]
pub struct MemorySource {
    pending: VecDeque<(u64, Bytes)>,
    now: u64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `contents` to arrive at `at_ms`.
    pub fn push_at(&mut self, at_ms: u64, contents: Bytes) {
        debug_assert!(
            self.pending.back().is_none_or(|(t, _)| *t <= at_ms),
            "arrivals must be scheduled in time order"
        );
        self.pending.push_back((at_ms, contents));
    }

    /// The instant the next scheduled arrival becomes visible.
    pub fn next_arrival(&self) -> Option<u64> {
        self.pending.front().map(|(t, _)| *t)
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }
}

impl PacketSource for MemorySource {
    fn recv(&mut self) -> io::Result<Option<Bytes>> {
        match self.pending.front() {
            Some((at, _)) if *at <= self.now => Ok(self.pending.pop_front().map(|(_, b)| b)),
            _ => Ok(None),
        }
    }
}

/// Collects released packets with their release timestamps.
#[derive(Default)]
pub struct MemorySink {
    /// `(release_ms, bytes)` per delivered packet.
    pub deliveries: Vec<(u64, usize)>,
    now: u64,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    pub fn count(&self) -> usize {
        self.deliveries.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.deliveries.iter().map(|(_, len)| len).sum()
    }
}

impl PacketSink for MemorySink {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.deliveries.push((self.now, packet.len()));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Drives one shaper over simulated milliseconds, waking for scheduled
/// arrivals and for the shaper's own wait oracle, exactly like the host's
/// select loop.
pub struct SimHarness<Q: PacketQueue> {
    pub shaper: LinkShaper<Q>,
    pub source: MemorySource,
    pub sink: MemorySink,
    clock: ManualClock,
}

impl<Q: PacketQueue> SimHarness<Q> {
    pub fn new(shaper: LinkShaper<Q>) -> Self {
        SimHarness {
            shaper,
            source: MemorySource::new(),
            sink: MemorySink::new(),
            clock: ManualClock::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Run until `end_ms` (inclusive) or until the direction closes.
    pub fn run_until(&mut self, end_ms: u64) -> Result<(), ShaperError> {
        loop {
            let now = self.clock.now_ms();
            if now > end_ms || self.shaper.is_done() {
                return Ok(());
            }

            self.source.set_now(now);
            self.sink.set_now(now);
            self.shaper.tick(&mut self.source, &mut self.sink, now)?;
            if self.shaper.is_done() {
                return Ok(());
            }

            // Sleep like the host would: until the shaper's next deadline
            // or the next scheduled arrival, whichever is sooner.
            let mut sleep = self.shaper.wait_time(now).max(1);
            if let Some(arrival) = self.source.next_arrival() {
                sleep = sleep.min(arrival.saturating_sub(now).max(1));
            }
            self.clock.advance(sleep.min(end_ms + 1 - now));
        }
    }
}
