//! Drop-head: evict the oldest packets to make room for arrivals.

use tracing::trace;

use super::dropping::DroppingQueue;
use super::PacketQueue;
use crate::args::QueueArgs;
use crate::packet::QueuedPacket;

/// Always admits the arrival, then discards from the front until every cap
/// holds again. Favors fresh packets over stale ones.
#[derive(Debug)]
pub struct DropHeadPacketQueue {
    inner: DroppingQueue,
}

impl DropHeadPacketQueue {
    pub fn new(args: &QueueArgs) -> Self {
        DropHeadPacketQueue {
            inner: DroppingQueue::from_args(args),
        }
    }
}

impl PacketQueue for DropHeadPacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        self.inner.accept(pkt);
        while !self.inner.good() {
            // An arrival larger than a hard cap ends up evicting itself,
            // leaving the queue empty.
            if let Some(evicted) = self.inner.pop_front() {
                trace!(bytes = evicted.len(), "drophead evicting head");
            } else {
                break;
            }
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
        self.inner.describe("drophead")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pkt(len: usize, at: u64) -> QueuedPacket {
        QueuedPacket::new(Bytes::from(vec![0xcd; len]), at)
    }

    #[test]
    fn evicts_the_oldest_to_admit_the_newest() {
        let args = QueueArgs::parse("bytes=3000").unwrap();
        let mut q = DropHeadPacketQueue::new(&args);

        q.enqueue(pkt(1500, 1)); // A
        q.enqueue(pkt(1500, 2)); // B
        q.enqueue(pkt(1500, 3)); // C — A is evicted

        assert_eq!(q.size_bytes(), 3000);
        assert_eq!(q.dequeue(10).unwrap().arrival_time, 2);
        assert_eq!(q.dequeue(10).unwrap().arrival_time, 3);
        assert!(q.dequeue(10).is_none());
    }

    #[test]
    fn queue_is_a_suffix_of_history_plus_arrival() {
        let args = QueueArgs::parse("packets=3").unwrap();
        let mut q = DropHeadPacketQueue::new(&args);
        for at in 0..10 {
            q.enqueue(pkt(10, at));
        }
        // only the last three arrivals survive, in order
        assert_eq!(q.size_packets(), 3);
        for at in 7..10 {
            assert_eq!(q.dequeue(100).unwrap().arrival_time, at);
        }
    }

    #[test]
    fn oversized_arrival_empties_the_queue_and_is_itself_lost() {
        let args = QueueArgs::parse("bytes=1000").unwrap();
        let mut q = DropHeadPacketQueue::new(&args);
        q.enqueue(pkt(400, 1));
        q.enqueue(pkt(400, 2));
        q.enqueue(pkt(5000, 3));
        assert!(q.empty());
        assert_eq!(q.size_bytes(), 0);
    }
}
