//! Packet builders shared by the simulation tests.

use bytes::Bytes;
use tideway_link::packet::{FLOW_ID_LEN, FLOW_ID_OFFSET, MTU_BYTES};

/// A `len`-byte packet carrying `flow` little-endian in the flow-id bytes
/// (when it is long enough to have them).
pub fn flow_packet(flow: u32, len: usize) -> Bytes {
    let mut raw = vec![0u8; len];
    if len >= FLOW_ID_OFFSET + FLOW_ID_LEN {
        raw[FLOW_ID_OFFSET..FLOW_ID_OFFSET + FLOW_ID_LEN].copy_from_slice(&flow.to_le_bytes());
    }
    Bytes::from(raw)
}

/// An MTU-sized packet for `flow`.
pub fn mtu_packet(flow: u32) -> Bytes {
    flow_packet(flow, MTU_BYTES)
}
