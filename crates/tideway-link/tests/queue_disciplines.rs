//! # Integration tests: queue disciplines through the public factory
//!
//! Every queue is built the way a host would build it — from a
//! `(type, args)` spec pair — and exercised through the [`PacketQueue`]
//! capability set alone.

use bytes::Bytes;
use tideway_link::packet::{QueuedPacket, FLOW_ID_LEN, FLOW_ID_OFFSET};
use tideway_link::queue::{from_spec, from_spec_str, PacketQueue, QueueSpecError};

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Surface queue trace events when the suite runs with `RUST_LOG` set.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mtu_pkt(at: u64) -> QueuedPacket {
    QueuedPacket::new(Bytes::from(vec![0x5a; 1500]), at)
}

/// MTU-sized packet carrying `flow` little-endian in the flow-id bytes.
fn flow_pkt(flow: u32, at: u64) -> QueuedPacket {
    let mut raw = vec![0u8; 1500];
    raw[FLOW_ID_OFFSET..FLOW_ID_OFFSET + FLOW_ID_LEN].copy_from_slice(&flow.to_le_bytes());
    QueuedPacket::new(Bytes::from(raw), at)
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[test]
fn droptail_discards_the_third_mtu_packet_at_3000_bytes() {
    init_tracing();
    let mut q = from_spec("droptail", "bytes=3000").unwrap();
    q.enqueue(mtu_pkt(1)); // A
    q.enqueue(mtu_pkt(2)); // B
    q.enqueue(mtu_pkt(3)); // C

    assert_eq!(q.size_bytes(), 3000);
    assert_eq!(q.size_packets(), 2);
    assert_eq!(q.dequeue(10).unwrap().arrival_time, 1, "A survives");
    assert_eq!(q.dequeue(10).unwrap().arrival_time, 2, "B survives");
    assert!(q.dequeue(10).is_none(), "C was discarded");
}

#[test]
fn drophead_discards_the_first_mtu_packet_at_3000_bytes() {
    let mut q = from_spec("drophead", "bytes=3000").unwrap();
    q.enqueue(mtu_pkt(1)); // A
    q.enqueue(mtu_pkt(2)); // B
    q.enqueue(mtu_pkt(3)); // C — evicts A

    assert_eq!(q.size_bytes(), 3000);
    assert_eq!(q.dequeue(10).unwrap().arrival_time, 2, "B survives");
    assert_eq!(q.dequeue(10).unwrap().arrival_time, 3, "C survives");
    assert!(q.dequeue(10).is_none(), "A was evicted");
}

#[test]
fn infinite_queue_holds_a_million_packets() {
    let mut q = from_spec("infinite", "").unwrap();
    for at in 0..1_000_000u64 {
        q.enqueue(QueuedPacket::new(Bytes::from_static(b"x"), at));
    }
    assert_eq!(q.size_packets(), 1_000_000);
    assert_eq!(q.size_bytes(), 1_000_000);
}

#[test]
fn ecmp_four_queues_pin_four_flows_two_deep() {
    let mut q = from_spec("ecmp", "queues=4").unwrap();
    for flow in [0u32, 1, 2, 3, 0, 1, 2, 3] {
        q.enqueue(flow_pkt(flow, 0));
    }
    assert_eq!(q.size_packets(), 8);

    // drain round-robin: the first four releases are one per flow
    let mut first_round = Vec::new();
    for _ in 0..4 {
        let pkt = q.dequeue(100).unwrap();
        first_round.push(pkt.contents[FLOW_ID_OFFSET]);
    }
    first_round.sort_unstable();
    assert_eq!(
        first_round,
        vec![0, 1, 2, 3],
        "each inner queue holds exactly two packets of one flow"
    );
}

#[test]
fn fair_queue_same_flow_bytes_share_an_inner() {
    let mut q = from_spec("fair", "queues=4").unwrap();
    q.enqueue(flow_pkt(6, 1));
    q.enqueue(flow_pkt(6, 2));

    // both packets drain from one inner, in arrival order, before rotation
    // finds anything else
    assert_eq!(q.dequeue(10).unwrap().arrival_time, 1);
    assert_eq!(q.dequeue(10).unwrap().arrival_time, 2);
    assert!(q.empty());
}

// ─── Contract edges ─────────────────────────────────────────────────────────

#[test]
fn dequeued_contents_are_bit_identical() {
    let payload: Vec<u8> = (0..255).collect();
    let mut q = from_spec("droptail", "").unwrap();
    q.enqueue(QueuedPacket::new(Bytes::from(payload.clone()), 4));
    let out = q.dequeue(9).unwrap();
    assert_eq!(&out.contents[..], &payload[..]);
    assert_eq!(out.arrival_time, 4);
}

#[test]
fn set_bdp_applies_to_every_inner_queue() {
    let mut q = from_spec("ecmp", "queues=2").unwrap();
    q.set_bdp(1500);
    q.enqueue(flow_pkt(0, 0));
    q.enqueue(flow_pkt(0, 1)); // same flow, same inner: over its BDP cap
    assert_eq!(q.size_packets(), 1);
}

#[test]
fn describe_names_the_discipline() {
    let q = from_spec_str("droptail,bytes=3000").unwrap();
    assert_eq!(q.describe(), "droptail [bytes=3000]");

    let q = from_spec_str("codel").unwrap();
    assert!(q.describe().starts_with("codel"));
}

#[test]
fn spec_errors_name_the_offender() {
    match from_spec_str("wred,bytes=10") {
        Err(QueueSpecError::UnknownQueueType(t)) => assert_eq!(t, "wred"),
        other => panic!("expected UnknownQueueType, got {other:?}"),
    }
    assert!(matches!(
        from_spec("droptail", "bytes=abc"),
        Err(QueueSpecError::BadArgs(_))
    ));
}
