//! Deterministic simulation toolkit for the link emulator core.
//!
//! Stands in for the host event loop in tests: a scripted in-memory packet
//! source, a collecting sink, and a manual-clock tick loop that sleeps
//! exactly as long as the shaper's wait oracle allows.

pub mod harness;
pub mod test_util;

pub use harness::{MemorySink, MemorySource, SimHarness};
