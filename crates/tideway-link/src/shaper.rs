//! # Link shaper
//!
//! One direction of the emulated link: arrivals from a [`PacketSource`]
//! pass through an AQM queue and leave toward a [`PacketSink`] only when
//! the delivery schedule grants an opportunity.
//!
//! The shaper is driven by an external event loop: call
//! [`LinkShaper::tick`] whenever the source became readable or the previous
//! wait expired, then sleep for at most [`LinkShaper::wait_time`].

use std::io;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::WAIT_FOREVER;
use crate::logfmt::EventLog;
use crate::packet::QueuedPacket;
use crate::queue::PacketQueue;
use crate::trace::DeliverySchedule;

/// Produces packets arriving from the workload side.
pub trait PacketSource {
    /// Next packet already available, or `None` when the source is drained
    /// for this tick.
    fn recv(&mut self) -> io::Result<Option<Bytes>>;
}

/// Accepts packets released by the shaper.
pub trait PacketSink {
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;

    /// Whether the peer has gone away. A closed sink ends the direction.
    fn is_closed(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
pub enum ShaperError {
    #[error("packet source failed: {0}")]
    Source(#[source] io::Error),
    #[error("packet sink closed")]
    SinkClosed,
    #[error("packet sink failed: {0}")]
    Sink(#[source] io::Error),
    #[error("event log write failed: {0}")]
    Log(#[source] io::Error),
}

/// Per-direction counters, snapshottable for meters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ShaperMeter {
    /// Packets read from the source.
    pub arrivals: u64,
    /// Bytes read from the source.
    pub arrival_bytes: u64,
    /// Arrivals the queue discarded on admission.
    pub drops: u64,
    /// Packets written to the sink.
    pub deliveries: u64,
    /// Bytes written to the sink.
    pub delivered_bytes: u64,
    /// Delivery opportunities that lapsed with nothing to send.
    pub unused_slots: u64,
}

/// Trace-driven packet releaser for one link direction.
pub struct LinkShaper<Q: PacketQueue> {
    name: String,
    schedule: DeliverySchedule,
    queue: Q,
    log: Option<EventLog>,
    meter: ShaperMeter,
    last_tick: u64,
    done: bool,
}

impl<Q: PacketQueue> LinkShaper<Q> {
    pub fn new(name: impl Into<String>, schedule: DeliverySchedule, queue: Q) -> Self {
        LinkShaper {
            name: name.into(),
            schedule,
            queue,
            log: None,
            meter: ShaperMeter::default(),
            last_tick: 0,
            done: false,
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn meter(&self) -> ShaperMeter {
        self.meter
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    /// The direction has closed: its once-only schedule ran out or its sink
    /// went away.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// A clock reading that ran backwards is logged and recovered as a
    /// zero delta.
    fn rationalize_now(&mut self, now: u64) -> u64 {
        if now < self.last_tick {
            warn!(
                name = %self.name,
                now,
                last = self.last_tick,
                "clock went backwards; treating as zero delta"
            );
            self.last_tick
        } else {
            self.last_tick = now;
            now
        }
    }

    /// One event-loop turn: ingest every available arrival, then release a
    /// packet for each due delivery opportunity.
    pub fn tick<S, K>(&mut self, source: &mut S, sink: &mut K, now: u64) -> Result<(), ShaperError>
    where
        S: PacketSource,
        K: PacketSink,
    {
        let now = self.rationalize_now(now);
        if self.done {
            return Ok(());
        }
        if sink.is_closed() {
            debug!(name = %self.name, "sink closed; ending direction");
            self.done = true;
            return Err(ShaperError::SinkClosed);
        }

        // Opportunities that lapsed while the queue sat empty are gone; a
        // packet arriving now must not ride a stale deadline.
        if self.queue.empty() {
            self.meter.unused_slots += self.schedule.discard_past(now);
        }

        while let Some(contents) = source.recv().map_err(ShaperError::Source)? {
            let len = contents.len();
            self.meter.arrivals += 1;
            self.meter.arrival_bytes += len as u64;
            if let Some(log) = &mut self.log {
                log.record_arrival(now, len).map_err(ShaperError::Log)?;
            }

            let before = self.queue.size_packets();
            self.queue.enqueue(QueuedPacket::new(contents, now));
            if self.queue.size_packets() <= before {
                // Admission shrank or held the count: the arrival (or an
                // evicted head) was discarded.
                self.meter.drops += 1;
                if let Some(log) = &mut self.log {
                    log.record_drop(now, len).map_err(ShaperError::Log)?;
                }
            }
        }

        while let Some(deadline) = self.schedule.next_deadline() {
            if deadline > now {
                break;
            }
            if self.queue.empty() {
                self.schedule.advance();
                self.meter.unused_slots += 1;
                continue;
            }
            match self.queue.dequeue(now) {
                Some(pkt) => {
                    if let Err(e) = sink.send(&pkt.contents) {
                        self.done = true;
                        return Err(if e.kind() == io::ErrorKind::BrokenPipe {
                            ShaperError::SinkClosed
                        } else {
                            ShaperError::Sink(e)
                        });
                    }
                    self.meter.deliveries += 1;
                    self.meter.delivered_bytes += pkt.len() as u64;
                    if let Some(log) = &mut self.log {
                        log.record_delivery(now, pkt.len()).map_err(ShaperError::Log)?;
                    }
                    self.schedule.advance();
                }
                // Non-empty queue with nothing eligible (jitter gate or a
                // non-work-conserving slot): the opportunity stays pending
                // and is retried next tick.
                None => break,
            }
        }

        if self.schedule.is_finished() {
            debug!(name = %self.name, "delivery schedule exhausted; closing direction");
            self.done = true;
        }
        Ok(())
    }

    /// How long the event loop may sleep before calling [`LinkShaper::tick`]
    /// again; arrivals should wake it earlier.
    pub fn wait_time(&self, now: u64) -> u64 {
        if self.done {
            return WAIT_FOREVER;
        }
        if self.queue.empty() {
            return self.queue.wait_time(now);
        }
        match self.schedule.next_deadline() {
            Some(deadline) if deadline > now => deadline - now,
            // a due opportunity blocked by a gated head: retry shortly
            Some(_) => 1,
            None => WAIT_FOREVER,
        }
    }
}
