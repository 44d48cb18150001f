//! Fair queueing: flow-hashed drop-tails drained round-robin.

use tracing::trace;

use super::drop_tail::DropTailPacketQueue;
use super::PacketQueue;
use crate::args::{ArgsError, QueueArgs};
use crate::packet::{QueuedPacket, FLOW_ID_LEN, FLOW_ID_OFFSET};

#[derive(Debug)]
pub struct FairPacketQueue {
    num_queues: usize,
    /// Advanced by one before every dequeue, so service rotates even when a
    /// single flow dominates.
    curr_queue: usize,
    queues: Vec<DropTailPacketQueue>,
}

impl FairPacketQueue {
    /// Inner queues share the arg string, so byte/packet caps are per
    /// inner queue.
    pub fn new(args: &QueueArgs) -> Result<Self, ArgsError> {
        let num_queues = args.get("queues") as usize;
        if num_queues == 0 {
            return Err(ArgsError::BadQueueArgs(
                "fair requires queues=N with N > 0".to_string(),
            ));
        }
        Ok(FairPacketQueue {
            num_queues,
            curr_queue: 0,
            queues: (0..num_queues)
                .map(|_| DropTailPacketQueue::new(args))
                .collect(),
        })
    }

    /// Bucket by the flow id interpreted as a native-endian u32; runts
    /// without one share bucket `1 mod num_queues`.
    fn bucket(&self, contents: &[u8]) -> usize {
        let flow = match contents.get(FLOW_ID_OFFSET..FLOW_ID_OFFSET + FLOW_ID_LEN) {
            Some(id) => {
                let mut raw = [0u8; FLOW_ID_LEN];
                raw.copy_from_slice(id);
                u32::from_ne_bytes(raw)
            }
            None => 1,
        };
        flow as usize % self.num_queues
    }
}

impl PacketQueue for FairPacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        let qid = self.bucket(&pkt.contents);
        trace!(bytes = pkt.len(), qid, "fair hashed arrival");
        self.queues[qid].enqueue(pkt);
    }

    fn dequeue(&mut self, now: u64) -> Option<QueuedPacket> {
        // Explicit absence instead of scanning an all-empty ring forever.
        if self.empty() {
            return None;
        }
        for _ in 0..self.num_queues {
            self.curr_queue = (self.curr_queue + 1) % self.num_queues;
            if !self.queues[self.curr_queue].empty() {
                return self.queues[self.curr_queue].dequeue(now);
            }
        }
        None
    }

    fn empty(&self) -> bool {
        self.queues.iter().all(|q| q.empty())
    }

    fn size_bytes(&self) -> u32 {
        self.queues.iter().map(|q| q.size_bytes()).sum()
    }

    fn size_packets(&self) -> u32 {
        self.queues.iter().map(|q| q.size_packets()).sum()
    }

    fn set_bdp(&mut self, bdp_bytes: u32) {
        for q in &mut self.queues {
            q.set_bdp(bdp_bytes);
        }
    }

    fn describe(&self) -> String {
        let inners: Vec<String> = self.queues.iter().map(|q| q.describe()).collect();
        format!("fair {{{}}}", inners.join(", "))
    }
}
