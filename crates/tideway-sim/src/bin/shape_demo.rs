//! Shape a synthetic arrival stream through a drop-tail queue on a 12 Mbps
//! constant-bit-rate schedule and print the direction's meter as JSON.
//!
//! Usage: `shape-demo [BANDWIDTH] [QUEUE_SPEC]`, e.g.
//! `shape-demo 24M droptail,bytes=90000`.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::Rng as _;
use rand::RngExt as _;
use rand::SeedableRng;
use tideway_link::queue::{from_spec_str, PacketQueue};
use tideway_link::shaper::LinkShaper;
use tideway_link::trace::{cached_cbr_trace, DeliverySchedule};
use tideway_sim::test_util::mtu_packet;
use tideway_sim::SimHarness;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let mut args = std::env::args().skip(1);
    let bandwidth = args.next().unwrap_or_else(|| "12M".to_string());
    let queue_spec = args.next().unwrap_or_else(|| "droptail,bytes=90000".to_string());

    let cache_dir = std::env::temp_dir().join("tideway-cbr");
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("creating trace cache at {}", cache_dir.display()))?;
    let trace = cached_cbr_trace(&bandwidth, &cache_dir)?;
    info!(trace = %trace.display(), "using cbr trace");

    let schedule = DeliverySchedule::from_file(&trace, true)?;
    let queue = from_spec_str(&queue_spec)?;
    info!(queue = %queue.describe(), "shaping through");

    let mut harness = SimHarness::new(LinkShaper::new("demo", schedule, queue));

    // Bursty offered load around 1.2 packets per ms for five simulated
    // seconds, eight flows.
    let mut rng = StdRng::seed_from_u64(17);
    for ms in 0..5_000u64 {
        for _ in 0..2 {
            if rng.random::<f64>() < 0.6 {
                harness
                    .source
                    .push_at(ms, mtu_packet(rng.random_range(0..8u32)));
            }
        }
    }

    harness.run_until(6_000)?;

    println!("{}", serde_json::to_string_pretty(&harness.shaper.meter())?);
    Ok(())
}
