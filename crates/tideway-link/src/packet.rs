//! The packet record shared by every queue discipline.

use bytes::Bytes;

/// Wire MTU assumed by delivery schedules: one trace slot drains one
/// MTU-sized packet.
pub const MTU_BYTES: usize = 1500;

/// Offset of the 4-byte flow identifier used by the hashed multi-queue
/// disciplines (the transport tuple inside a raw tunneled IPv4 frame).
pub const FLOW_ID_OFFSET: usize = 24;

/// Width of the flow identifier.
pub const FLOW_ID_LEN: usize = 4;

/// A packet captured from the source, stamped with its arrival time.
///
/// Immutable once enqueued and owned by exactly one queue at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    /// Raw packet bytes.
    pub contents: Bytes,
    /// Arrival timestamp in clock milliseconds.
    pub arrival_time: u64,
}

impl QueuedPacket {
    pub fn new(contents: Bytes, arrival_time: u64) -> Self {
        QueuedPacket {
            contents,
            arrival_time,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// The flow identifier bytes, when the packet is long enough to carry
    /// one.
    pub fn flow_id(&self) -> Option<&[u8]> {
        self.contents.get(FLOW_ID_OFFSET..FLOW_ID_OFFSET + FLOW_ID_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_id_requires_28_bytes() {
        let short = QueuedPacket::new(Bytes::from(vec![0u8; 27]), 0);
        assert!(short.flow_id().is_none());

        let mut raw = vec![0u8; 28];
        raw[24..28].copy_from_slice(&[1, 2, 3, 4]);
        let long = QueuedPacket::new(Bytes::from(raw), 0);
        assert_eq!(long.flow_id(), Some(&[1u8, 2, 3, 4][..]));
    }
}
