//! Unbounded FIFO — no shaping at the queue stage.

use std::collections::VecDeque;

use super::PacketQueue;
use crate::packet::QueuedPacket;

#[derive(Debug, Default)]
pub struct InfinitePacketQueue {
    fifo: VecDeque<QueuedPacket>,
    size_bytes: u32,
}

impl InfinitePacketQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketQueue for InfinitePacketQueue {
    fn enqueue(&mut self, pkt: QueuedPacket) {
        self.size_bytes += pkt.len() as u32;
        self.fifo.push_back(pkt);
    }

    fn dequeue(&mut self, _now: u64) -> Option<QueuedPacket> {
        let pkt = self.fifo.pop_front()?;
        self.size_bytes -= pkt.len() as u32;
        Some(pkt)
    }

    fn empty(&self) -> bool {
        self.fifo.is_empty()
    }

    fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    fn size_packets(&self) -> u32 {
        self.fifo.len() as u32
    }

    fn set_bdp(&mut self, _bdp_bytes: u32) {}

    fn describe(&self) -> String {
        "infinite".to_string()
    }
}
