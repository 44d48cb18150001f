//! # Traces and delivery schedules
//!
//! A trace is a UTF-8 text file with one integer per line: a delivery
//! opportunity timestamp in milliseconds from trace start, each worth one
//! MTU-sized packet. [`DeliverySchedule`] replays a trace, optionally
//! rewinding forever with the trace period added to every later deadline.
//! Constant-bit-rate schedules are synthesised deterministically from a
//! bandwidth spec like `"12M"` and cached on disk.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid trace line {line} in {}: {text:?}", .path.display())]
    BadLine {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("trace contains no delivery opportunities")]
    Empty,
    #[error("repeating trace must end after 0 ms")]
    ZeroPeriod,
    #[error("invalid bandwidth {0:?}: use K (Kbps) or M (Mbps) units")]
    BadBandwidth(String),
}

/// Load a trace file into a list of opportunity timestamps. Blank lines are
/// ignored; anything unparsable is an error.
pub fn load_trace(path: &Path) -> Result<Vec<u64>, TraceError> {
    let text = fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut slots = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ms = line.parse::<u64>().map_err(|_| TraceError::BadLine {
            path: path.to_path_buf(),
            line: idx + 1,
            text: line.to_string(),
        })?;
        slots.push(ms);
    }

    if slots.is_empty() {
        return Err(TraceError::Empty);
    }
    Ok(slots)
}

/// Replayable sequence of delivery deadlines for one link direction.
#[derive(Debug)]
pub struct DeliverySchedule {
    slots: Vec<u64>,
    /// Offset added to every later deadline after each rewind.
    period: u64,
    repeat: bool,
    base: u64,
    next: usize,
    finished: bool,
}

impl DeliverySchedule {
    pub fn new(slots: Vec<u64>, repeat: bool) -> Result<Self, TraceError> {
        let Some(&last) = slots.last() else {
            return Err(TraceError::Empty);
        };
        if repeat && last == 0 {
            return Err(TraceError::ZeroPeriod);
        }
        Ok(DeliverySchedule {
            slots,
            period: last,
            repeat,
            base: 0,
            next: 0,
            finished: false,
        })
    }

    pub fn from_file(path: &Path, repeat: bool) -> Result<Self, TraceError> {
        Self::new(load_trace(path)?, repeat)
    }

    /// Deadline of the next opportunity, if the schedule has not closed.
    pub fn next_deadline(&self) -> Option<u64> {
        if self.finished {
            None
        } else {
            Some(self.base + self.slots[self.next])
        }
    }

    /// Consume the current opportunity, rewinding or closing at the end.
    pub fn advance(&mut self) {
        if self.finished {
            return;
        }
        self.next += 1;
        if self.next == self.slots.len() {
            if self.repeat {
                self.base += self.period;
                self.next = 0;
                debug!(base = self.base, "delivery schedule rewound");
            } else {
                self.finished = true;
            }
        }
    }

    /// Burn opportunities whose deadline already passed (strictly before
    /// `now`). An empty queue forfeits them. Returns the number burned.
    pub fn discard_past(&mut self, now: u64) -> u64 {
        let mut burned = 0;
        while let Some(deadline) = self.next_deadline() {
            if deadline >= now {
                break;
            }
            self.advance();
            burned += 1;
        }
        burned
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

// ─── Constant-bit-rate synthesis ────────────────────────────────────────────

/// Parse `"12M"` / `"500K"` into Mbps.
pub fn parse_bandwidth(bw: &str) -> Result<f64, TraceError> {
    let bad = || TraceError::BadBandwidth(bw.to_string());
    if !bw.is_ascii() || bw.len() < 2 {
        return Err(bad());
    }
    let (value, unit) = bw.split_at(bw.len() - 1);
    let value: f64 = value.parse().map_err(|_| bad())?;
    if !value.is_finite() || value < 0.0 {
        return Err(bad());
    }
    match unit {
        "M" => Ok(value),
        "K" => Ok(value / 1000.0),
        _ => Err(bad()),
    }
}

/// Bandwidth-delay product in bytes, the sizing hint for queue caps.
pub fn bdp_bytes(bw_mbps: f64, delay_ms: f64) -> f64 {
    (bw_mbps * 1_000_000.0 / 8.0) * (delay_ms / 1000.0)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Tokens per millisecond slot over one second of schedule. One token is
/// one MTU-sized opportunity, so 12 Mbps is exactly one packet per ms.
fn cbr_slots(mbps: f64) -> Vec<u32> {
    let ppms = mbps / 12.0;
    let pps = (ppms * 1000.0).round() as u32;
    let divisor = gcd(pps, 1000);
    let packets = pps / divisor;
    let num_slots = (1000 / divisor) as usize;

    let mut slots = vec![0u32; num_slots];
    if packets == 0 {
        // below ~6 Kbps there is no whole packet per second
        return slots;
    }

    if packets as usize >= num_slots {
        let mut i = 0usize;
        for _ in 0..packets {
            slots[i % num_slots] += 1;
            i += 1;
        }
    } else {
        let spacing = num_slots / packets as usize;
        let mut i = num_slots - 1;
        for k in 0..packets {
            slots[i] += 1;
            if k + 1 < packets {
                i -= spacing;
            }
        }
    }
    slots
}

/// Write the trace for `bw` to `path`: one line `ms + 1` per token in slot
/// `ms`. Identical input produces a byte-identical file.
pub fn write_cbr_trace(bw: &str, path: &Path) -> Result<(), TraceError> {
    let mbps = parse_bandwidth(bw)?;
    let slots = cbr_slots(mbps);

    let mut out = String::new();
    for (ms, &count) in slots.iter().enumerate() {
        for _ in 0..count {
            let _ = writeln!(out, "{}", ms + 1);
        }
    }

    fs::write(path, out).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Cached CBR trace under `cache_dir`: `<bw>.cbr`, synthesised on first
/// use.
pub fn cached_cbr_trace(bw: &str, cache_dir: &Path) -> Result<PathBuf, TraceError> {
    let path = cache_dir.join(format!("{bw}.cbr"));
    if !path.exists() {
        debug!(bw, path = %path.display(), "synthesising cbr trace");
        write_cbr_trace(bw, &path)?;
    }
    Ok(path)
}
