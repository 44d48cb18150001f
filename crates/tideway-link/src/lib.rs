//! # tideway-link
//!
//! Core of a user-space network link emulator. Packets arriving from a
//! contained workload pass through an Active Queue Management discipline and
//! are released toward the host network only when a millisecond delivery
//! schedule grants an opportunity — either replayed from a recorded trace or
//! synthesised from a constant bit rate.
//!
//! ## Crate structure
//!
//! - [`clock`] — monotonic millisecond time, wait-oracle saturation
//! - [`packet`] — the queued-packet record and MTU constants
//! - [`args`] — `name=value` queue argument parsing
//! - [`queue`] — AQM disciplines: drop-tail, drop-head, CoDel, PIE,
//!   flow-hashed ECMP, fair round-robin, unbounded FIFO
//! - [`loss`] — IID, deterministic-rate, and Markov-switching loss queues
//! - [`trace`] — trace files, delivery schedules, CBR synthesis
//! - [`shaper`] — the per-direction trace-driven releaser
//! - [`logfmt`] — arrival/drop/delivery event log format

pub mod args;
pub mod clock;
pub mod logfmt;
pub mod loss;
pub mod packet;
pub mod queue;
pub mod shaper;
pub mod trace;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Per-queue PRNG state. An explicit seed makes shaped runs reproducible;
/// a zero (unset) seed draws fresh entropy so concurrent directions differ.
pub(crate) fn seeded_rng(seed: u64) -> StdRng {
    if seed == 0 {
        StdRng::seed_from_u64(rand::random())
    } else {
        StdRng::seed_from_u64(seed)
    }
}
