//! Hybrid logical clock timestamps.
//!
//! An [`Hlc`] combines wall-clock milliseconds, a counter that disambiguates
//! events within the same millisecond, and the id of the node that produced
//! it. The triple is totally ordered, which gives every replica the same
//! deterministic order for operations regardless of clock skew.
//!
//! ## Wire Form
//!
//! ```text
//! 2023-10-27T10:00:00.123Z-0000-deviceA
//! ^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^ ^^^^^^^
//! RFC 3339 time (UTC)      hex  node id
//! ```
//!
//! The counter block is the last `-XXXX-` run of exactly four hex digits, so
//! both the time and the node id may contain hyphens.

use crate::error::{HlcError, HlcResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Length of `-XXXX-`.
const SEPARATOR_LEN: usize = 6;

/// Wire form of [`Hlc::zero`]. Its node id is empty, which `parse` rejects.
const ZERO_TEXT: &str = "1970-01-01T00:00:00.000Z-0000-";

/// Offset of the date/time separator in an RFC 3339 string.
const TIME_SEPARATOR_AT: usize = 10;

/// A Hybrid Logical Clock timestamp.
///
/// Ordering compares `millis`, then `counter`, then `node_id` bytewise. The
/// node id tie-break is arbitrary but stable; it is not a causality claim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hlc {
    millis: u64,
    counter: u16,
    node_id: String,
}

impl Hlc {
    /// Largest representable instant: `9999-12-31T23:59:59.999Z`.
    ///
    /// Later instants would need a five digit year, which the wire form
    /// cannot carry.
    pub const MAX_MILLIS: u64 = 253_402_300_799_999;

    /// Creates a timestamp from its components.
    pub fn new(millis: u64, counter: u16, node_id: impl Into<String>) -> HlcResult<Self> {
        if millis > Self::MAX_MILLIS {
            return Err(HlcError::invalid_time(format!(
                "{millis} ms is beyond year 9999"
            )));
        }
        Ok(Self {
            millis,
            counter,
            node_id: node_id.into(),
        })
    }

    /// The epoch value `{0, 0, ""}`, used to stamp non-causal responses.
    pub fn zero() -> Self {
        Self {
            millis: 0,
            counter: 0,
            node_id: String::new(),
        }
    }

    /// Parses the wire form.
    pub fn parse(text: &str) -> HlcResult<Self> {
        // Components never span lines.
        if text.contains('\n') {
            return Err(HlcError::invalid_format(text));
        }
        let (time, counter, node_id) =
            split_components(text).ok_or_else(|| HlcError::invalid_format(text))?;

        let millis = parse_time(time)?;
        let counter = u16::from_str_radix(counter, 16)
            .map_err(|e| HlcError::invalid_counter(format!("{counter}: {e}")))?;

        Ok(Self {
            millis,
            counter,
            node_id: node_id.to_string(),
        })
    }

    /// Milliseconds since the Unix epoch.
    pub fn millis(&self) -> u64 {
        self.millis
    }

    /// Same-millisecond disambiguation counter.
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Originating node.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns true for [`Hlc::zero`].
    pub fn is_zero(&self) -> bool {
        self.millis == 0 && self.counter == 0 && self.node_id.is_empty()
    }

    /// Total order over timestamps.
    pub fn compare(&self, other: &Hlc) -> Ordering {
        self.cmp(other)
    }
}

impl Default for Hlc {
    fn default() -> Self {
        Self::zero()
    }
}

/// Finds the last `-XXXX-` block that has something on both sides.
fn split_components(text: &str) -> Option<(&str, &str, &str)> {
    let bytes = text.as_bytes();
    if bytes.len() < SEPARATOR_LEN + 2 {
        return None;
    }

    (1..=bytes.len() - SEPARATOR_LEN - 1).rev().find_map(|i| {
        let block = &bytes[i..i + SEPARATOR_LEN];
        let is_separator = block[0] == b'-'
            && block[SEPARATOR_LEN - 1] == b'-'
            && block[1..SEPARATOR_LEN - 1].iter().all(u8::is_ascii_hexdigit);
        // All indices sit on ASCII bytes, so they are char boundaries.
        is_separator.then(|| (&text[..i], &text[i + 1..i + 5], &text[i + SEPARATOR_LEN..]))
    })
}

fn parse_time(time: &str) -> HlcResult<u64> {
    // chrono also takes ' ', 't' and 'z'; the wire form only uses 'T' and 'Z'.
    if time.as_bytes().get(TIME_SEPARATOR_AT) != Some(&b'T') || time.ends_with('z') {
        return Err(HlcError::invalid_time(format!(
            "{time}: expected 'T' separator and 'Z' designator"
        )));
    }
    let parsed = DateTime::parse_from_rfc3339(time).or_else(|err| {
        if time.ends_with('Z') {
            Err(err)
        } else {
            DateTime::parse_from_rfc3339(&format!("{time}Z"))
        }
    });
    let parsed = parsed.map_err(|e| HlcError::invalid_time(format!("{time}: {e}")))?;

    let millis = u64::try_from(parsed.timestamp_millis())
        .map_err(|_| HlcError::invalid_time(format!("{time} is before the Unix epoch")))?;
    if millis > Hlc::MAX_MILLIS {
        return Err(HlcError::invalid_time(format!("{time} is beyond year 9999")));
    }
    Ok(millis)
}

impl fmt::Display for Hlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `new` and `parse` keep millis inside chrono's range.
        let time = i64::try_from(self.millis)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or(fmt::Error)?;
        write!(
            f,
            "{}-{:04X}-{}",
            time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.counter,
            self.node_id
        )
    }
}

impl FromStr for Hlc {
    type Err = HlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Hlc {
    type Error = HlcError;

    /// Like [`Hlc::parse`], but also accepts the wire form of [`Hlc::zero`]
    /// so every value survives a serde round trip.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == ZERO_TEXT {
            return Ok(Self::zero());
        }
        Self::parse(&value)
    }
}

impl From<Hlc> for String {
    fn from(hlc: Hlc) -> Self {
        hlc.to_string()
    }
}
