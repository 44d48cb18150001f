//! Link event log: whitespace-delimited `timestamp code bytes` lines
//! consumed by the plotting tools.
//!
//! ```text
//! # init timestamp: 17
//! # command line: 'emulate' '12M' '12M'
//! 25 # 1500
//! 31 - 1500
//! 44 + 1500
//! ```
//!
//! Event codes: `#` arrival, `-` drop, `+` delivery.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Quote one argv word for the log header the way a POSIX shell expects.
pub fn shell_quote(arg: &str) -> String {
    let mut ret = String::from("'");
    for ch in arg.chars() {
        if ch == '\'' {
            ret.push_str("'\\''");
        } else {
            ret.push(ch);
        }
    }
    ret.push('\'');
    ret
}

/// Writer for one direction's event log.
pub struct EventLog {
    out: BufWriter<File>,
}

impl EventLog {
    /// Create the log file and write the header: init timestamp first, then
    /// the quoted command line.
    pub fn create(path: &Path, command_line: &[String], init_ms: u64) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "# init timestamp: {init_ms}")?;
        let quoted: Vec<String> = command_line.iter().map(|a| shell_quote(a)).collect();
        writeln!(out, "# command line: {}", quoted.join(" "))?;
        Ok(EventLog { out })
    }

    pub fn record_arrival(&mut self, now: u64, bytes: usize) -> io::Result<()> {
        writeln!(self.out, "{now} # {bytes}")
    }

    pub fn record_drop(&mut self, now: u64, bytes: usize) -> io::Result<()> {
        writeln!(self.out, "{now} - {bytes}")
    }

    pub fn record_delivery(&mut self, now: u64, bytes: usize) -> io::Result<()> {
        writeln!(self.out, "{now} + {bytes}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}
