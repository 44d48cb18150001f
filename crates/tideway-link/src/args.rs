//! Queue argument strings: `"bytes=3000, packets=10"`.
//!
//! Arguments arrive as free-form text from the command line. The parser
//! tokenises `name=digits` pairs separated by any non-identifier characters
//! and exposes the recognised ones as a mapping; a name no discipline ever
//! asks for is ignored outright, and a name nobody supplied reads as zero
//! ("unset").

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("could not parse queue arguments: {0}")]
    BadQueueArgs(String),
}

/// The names a queue discipline may ask for. Only these are validated and
/// stored; tokens under any other name pass through unexamined.
const RECOGNISED_NAMES: [&str; 10] = [
    "bytes",
    "packets",
    "target",
    "interval",
    "qdelay_ref",
    "max_burst",
    "queues",
    "nonworkconserving",
    "seed",
    "mean_jitter",
];

/// Parsed queue arguments: every recognised `name=digits` pair found in
/// the input.
#[derive(Debug, Clone, Default)]
pub struct QueueArgs {
    values: HashMap<String, u64>,
}

impl QueueArgs {
    /// Tokenise `name=digits` pairs. A recognised name with no `=` or an
    /// empty digit run is malformed; trailing non-digit characters after
    /// the digit run are ignored, as are tokens under unrecognised names.
    pub fn parse(input: &str) -> Result<Self, ArgsError> {
        let mut values = HashMap::new();

        for token in input
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '='))
            .filter(|t| !t.is_empty())
        {
            let (name, value) = match token.split_once('=') {
                Some(pair) => pair,
                None => (token, ""),
            };
            if !RECOGNISED_NAMES.contains(&name) {
                continue;
            }

            let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(ArgsError::BadQueueArgs(input.to_string()));
            }

            let parsed = digits
                .parse::<u64>()
                .map_err(|_| ArgsError::BadQueueArgs(input.to_string()))?;
            values.insert(name.to_string(), parsed);
        }

        Ok(QueueArgs { values })
    }

    /// Value for `name`, or 0 when the name never appeared.
    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    /// Like [`QueueArgs::get`], clamped into `u32` for byte and packet caps.
    pub fn get_u32(&self, name: &str) -> u32 {
        self.get(name).min(u64::from(u32::MAX)) as u32
    }
}
