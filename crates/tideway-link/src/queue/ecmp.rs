//! # ECMP packet queue
//!
//! Flow-hashed multiplexing over per-flow drop-tail queues, the way an
//! equal-cost multi-path switch pins flows to ports. Two extras model
//! scheduler coarseness: a Poisson delay-jitter gate on each head packet,
//! and a non-work-conserving mode that inspects only one slot per
//! opportunity and may let it idle.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use tracing::trace;

use super::drop_tail::DropTailPacketQueue;
use super::PacketQueue;
use crate::args::{ArgsError, QueueArgs};
use crate::packet::{QueuedPacket, FLOW_ID_LEN, FLOW_ID_OFFSET};
use crate::seeded_rng;

const FNV1_64_INIT: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash assigned to packets too short to carry a flow identifier, so every
/// runt shares one bucket.
const RUNT_HASH: u64 = 1;

/// 64-bit FNV-1 over `buf`.
fn fnv1_64(buf: &[u8]) -> u64 {
    let mut hval = FNV1_64_INIT;
    for &b in buf {
        hval ^= u64::from(b);
        hval = hval.wrapping_mul(FNV_64_PRIME);
    }
    hval
}

#[derive(Debug)]
pub struct EcmpPacketQueue {
    num_queues: usize,
    /// Round-robin cursor: the slot the next dequeue inspects first.
    curr_queue: usize,
    work_conserving: bool,
    /// Delay-jitter gate; `None` when `mean_jitter` is unset.
    jitter: Option<Poisson<f64>>,
    rng: StdRng,
    queues: Vec<DropTailPacketQueue>,
}

impl EcmpPacketQueue {
    /// Inner queues share the arg string, so byte/packet caps are per
    /// inner queue.
    pub fn new(args: &QueueArgs) -> Result<Self, ArgsError> {
        let num_queues = args.get("queues") as usize;
        if num_queues == 0 {
            return Err(ArgsError::BadQueueArgs(
                "ecmp requires queues=N with N > 0".to_string(),
            ));
        }
        let mean_jitter_ms = args.get("mean_jitter");
        Ok(EcmpPacketQueue {
            num_queues,
            curr_queue: 0,
            work_conserving: args.get("nonworkconserving") == 0,
            jitter: (mean_jitter_ms > 0).then(|| {
                Poisson::new(mean_jitter_ms as f64).expect("mean_jitter is positive and finite")
            }),
            rng: seeded_rng(args.get("seed")),
            queues: (0..num_queues)
                .map(|_| DropTailPacketQueue::new(args))
                .collect(),
        })
    }

    /// Flow bucket for a packet: FNV-1 over the 4-byte flow id.
    fn bucket(&self, contents: &[u8]) -> usize {
        let hash = match contents.get(FLOW_ID_OFFSET..FLOW_ID_OFFSET + FLOW_ID_LEN) {
            Some(id) => fnv1_64(id),
            None => RUNT_HASH,
        };
        (hash % self.num_queues as u64) as usize
    }

    /// Is the head of `qid` released this opportunity? Without jitter every
    /// head is; with jitter it must have aged past a fresh Poisson draw.
    fn head_eligible(&mut self, qid: usize, now: u64) -> bool {
        let Some(arrival) = self.queues[qid].head_arrival() else {
            return false;
        };
        match &self.jitter {
            None => true,
            Some(jitter) => now.saturating_sub(arrival) >= jitter.sample(&mut self.rng) as u64,
        }
    }
}

impl PacketQueue for EcmpPacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        let qid = self.bucket(&pkt.contents);
        trace!(bytes = pkt.len(), qid, "ecmp hashed arrival");
        self.queues[qid].enqueue(pkt);
    }

    fn dequeue(&mut self, now: u64) -> Option<QueuedPacket> {
        let mut released = None;
        let mut scanned = 0;

        while scanned < self.num_queues {
            let qid = (self.curr_queue + scanned) % self.num_queues;
            if self.head_eligible(qid, now) {
                released = self.queues[qid].dequeue(now);
                scanned += 1;
                break;
            }
            scanned += 1;
            if !self.work_conserving {
                // one slot per opportunity, used or not
                break;
            }
        }

        self.curr_queue = (self.curr_queue + scanned) % self.num_queues;
        released
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
        format!("ecmp {{{}}}", inners.join(", "))
    }
}
