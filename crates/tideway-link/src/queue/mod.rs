//! # Packet queues
//!
//! The AQM state machines behind the link shaper. Every discipline
//! implements the same capability set ([`PacketQueue`]); a link direction
//! owns one behind the [`AnyPacketQueue`] tag.
//!
//! - [`InfinitePacketQueue`] — unbounded FIFO, no shaping at the queue stage
//! - [`DropTailPacketQueue`] — reject arrivals that would break a cap
//! - [`DropHeadPacketQueue`] — evict from the front to admit arrivals
//! - [`CodelPacketQueue`] — Controlled Delay sojourn-time controller
//! - [`PiePacketQueue`] — Proportional Integral controller Enhanced
//! - [`EcmpPacketQueue`] — flow-hashed drop-tails with optional delay
//!   jitter and a non-work-conserving mode
//! - [`FairPacketQueue`] — flow-hashed drop-tails drained round-robin

mod codel;
mod drop_head;
mod drop_tail;
mod dropping;
mod ecmp;
mod fair;
mod infinite;
mod pie;

pub use codel::CodelPacketQueue;
pub use drop_head::DropHeadPacketQueue;
pub use drop_tail::DropTailPacketQueue;
pub use ecmp::EcmpPacketQueue;
pub use fair::FairPacketQueue;
pub use infinite::InfinitePacketQueue;
pub use pie::PiePacketQueue;

use crate::args::{ArgsError, QueueArgs};
use crate::clock::WAIT_FOREVER;
use crate::packet::QueuedPacket;
use thiserror::Error;

/// Polymorphic capability set shared by every queue discipline.
pub trait PacketQueue {
    /// Take ownership of an arriving packet. The discipline may discard it
    /// or already-queued packets; enqueueing itself never fails.
    fn enqueue(&mut self, pkt: QueuedPacket);

    /// Remove and return the next packet the discipline chooses to release.
    ///
    /// `None` means nothing is eligible right now: either the queue is
    /// empty, or a gated discipline (jitter, non-work-conserving slot) is
    /// holding its head back.
    fn dequeue(&mut self, now: u64) -> Option<QueuedPacket>;

    fn empty(&self) -> bool;

    fn size_bytes(&self) -> u32;

    fn size_packets(&self) -> u32;

    /// Install a bandwidth-delay-product byte cap. Idempotent.
    fn set_bdp(&mut self, bdp_bytes: u32);

    /// How long the event loop may sleep before this queue needs attention.
    /// A non-empty queue is ready whenever the schedule is; an empty one
    /// needs nothing until the next arrival.
    fn wait_time(&self, now: u64) -> u64 {
        let _ = now;
        if self.empty() {
            WAIT_FOREVER
        } else {
            0
        }
    }

    /// Human description for logs, e.g. `droptail [bytes=3000]`.
    fn describe(&self) -> String;
}

#[derive(Debug, Error)]
pub enum QueueSpecError {
    #[error("unknown queue type: {0}")]
    UnknownQueueType(String),
    #[error(transparent)]
    BadArgs(#[from] ArgsError),
}

/// Every discipline behind one tag, so a link direction can own its queue
/// by value.
#[derive(Debug)]
pub enum AnyPacketQueue {
    Infinite(InfinitePacketQueue),
    DropTail(DropTailPacketQueue),
    DropHead(DropHeadPacketQueue),
    Codel(CodelPacketQueue),
    Pie(PiePacketQueue),
    Ecmp(EcmpPacketQueue),
    Fair(FairPacketQueue),
}

impl AnyPacketQueue {
    fn inner(&self) -> &dyn PacketQueue {
        match self {
            AnyPacketQueue::Infinite(q) => q,
            AnyPacketQueue::DropTail(q) => q,
            AnyPacketQueue::DropHead(q) => q,
            AnyPacketQueue::Codel(q) => q,
            AnyPacketQueue::Pie(q) => q,
            AnyPacketQueue::Ecmp(q) => q,
            AnyPacketQueue::Fair(q) => q,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PacketQueue {
        match self {
            AnyPacketQueue::Infinite(q) => q,
            AnyPacketQueue::DropTail(q) => q,
            AnyPacketQueue::DropHead(q) => q,
            AnyPacketQueue::Codel(q) => q,
            AnyPacketQueue::Pie(q) => q,
            AnyPacketQueue::Ecmp(q) => q,
            AnyPacketQueue::Fair(q) => q,
        }
    }
}

impl PacketQueue for AnyPacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        self.inner_mut().enqueue(pkt)
    }

    fn dequeue(&mut self, now: u64) -> Option<QueuedPacket> {
        self.inner_mut().dequeue(now)
    }

    fn empty(&self) -> bool {
        self.inner().empty()
    }

    fn size_bytes(&self) -> u32 {
        self.inner().size_bytes()
    }

    fn size_packets(&self) -> u32 {
        self.inner().size_packets()
    }

    fn set_bdp(&mut self, bdp_bytes: u32) {
        self.inner_mut().set_bdp(bdp_bytes)
    }

    fn wait_time(&self, now: u64) -> u64 {
        self.inner().wait_time(now)
    }

    fn describe(&self) -> String {
        self.inner().describe()
    }
}

/// Build a queue from a `(type, args)` pair, e.g. `("droptail",
/// "bytes=90000")`.
pub fn from_spec(kind: &str, args: &str) -> Result<AnyPacketQueue, QueueSpecError> {
    let args = QueueArgs::parse(args)?;
    Ok(match kind {
        "infinite" => AnyPacketQueue::Infinite(InfinitePacketQueue::new()),
        "droptail" => AnyPacketQueue::DropTail(DropTailPacketQueue::new(&args)),
        "drophead" => AnyPacketQueue::DropHead(DropHeadPacketQueue::new(&args)),
        "codel" => AnyPacketQueue::Codel(CodelPacketQueue::new(&args)),
        "pie" => AnyPacketQueue::Pie(PiePacketQueue::new(&args)),
        "ecmp" => AnyPacketQueue::Ecmp(EcmpPacketQueue::new(&args)?),
        "fair" => AnyPacketQueue::Fair(FairPacketQueue::new(&args)?),
        other => return Err(QueueSpecError::UnknownQueueType(other.to_string())),
    })
}

/// Build a queue from a combined `"TYPE,ARGS"` spec; the args part may be
/// absent.
pub fn from_spec_str(spec: &str) -> Result<AnyPacketQueue, QueueSpecError> {
    match spec.split_once(',') {
        Some((kind, args)) => from_spec(kind.trim(), args),
        None => from_spec(spec.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_every_known_type() {
        for kind in ["infinite", "droptail", "drophead", "codel", "pie"] {
            let queue = from_spec(kind, "bytes=3000").unwrap();
            assert!(queue.empty(), "{kind} should start empty");
        }
        assert!(from_spec("ecmp", "queues=4").is_ok());
        assert!(from_spec("fair", "queues=4").is_ok());
    }

    #[test]
    fn unknown_type_is_rejected() {
        match from_spec("red", "") {
            Err(QueueSpecError::UnknownQueueType(t)) => assert_eq!(t, "red"),
            other => panic!("expected UnknownQueueType, got {other:?}"),
        }
    }

    #[test]
    fn bad_args_surface_through_the_factory() {
        assert!(matches!(
            from_spec("droptail", "bytes="),
            Err(QueueSpecError::BadArgs(_))
        ));
    }

    #[test]
    fn combined_spec_splits_on_first_comma() {
        let queue = from_spec_str("droptail,bytes=3000, packets=2").unwrap();
        assert_eq!(queue.describe(), "droptail [bytes=3000, packets=2]");

        let queue = from_spec_str("infinite").unwrap();
        assert_eq!(queue.describe(), "infinite");
    }

    #[test]
    fn hashed_types_require_queue_count() {
        assert!(from_spec("ecmp", "").is_err());
        assert!(from_spec("fair", "queues=0").is_err());
    }
}
