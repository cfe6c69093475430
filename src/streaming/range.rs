//! Byte range parsing and byte ⇄ media time conversion.
//!
//! Transcoded output has no known size until the encoder finishes, so ranges
//! are resolved against an estimate and mapped to media time proportionally:
//! `time = duration * byte / size`. This is exact for constant bitrate output
//! and an approximation otherwise; seeks into VBR media land near, not on,
//! the requested position.

use std::time::Duration;
use tcstream_common::{Error, Result};

/// Encoded media needed before the measured bitrate replaces the nominal one.
pub const MIN_ESTIMATE_SAMPLE: Duration = Duration::from_secs(2);

/// A single byte range from a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=from-` or `bytes=from-to` (inclusive).
    From { from: u64, to: Option<u64> },
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

/// Parse a `Range` header value.
///
/// Only the `bytes` unit is understood. When several ranges are listed the
/// last one that parses wins. Returns `None` when nothing usable is present,
/// in which case the whole resource is served.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    spec.split(',').filter_map(parse_one).last()
}

fn parse_one(part: &str) -> Option<ByteRange> {
    let (start, end) = part.trim().split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, false) => end.parse().ok().map(ByteRange::Suffix),
        (false, true) => start
            .parse()
            .ok()
            .map(|from| ByteRange::From { from, to: None }),
        (false, false) => {
            let from: u64 = start.parse().ok()?;
            let to: u64 = end.parse().ok()?;
            if to < from {
                return None;
            }
            Some(ByteRange::From { from, to: Some(to) })
        }
        (true, true) => None,
    }
}

/// A byte range resolved against a (possibly estimated) resource size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRange {
    /// First byte.
    pub from: u64,
    /// Last byte, inclusive.
    pub to: u64,
    /// Resource size used for the resolution.
    pub total: u64,
    /// Media time of `from`.
    pub start_time: Duration,
    /// Media time just past `to`.
    pub end_time: Duration,
    /// Whether `total` is the real size rather than an estimate.
    pub exact: bool,
}

impl ResolvedRange {
    /// The whole resource.
    pub fn whole(total: u64, exact: bool, duration: Duration) -> Self {
        Self {
            from: 0,
            to: total.saturating_sub(1),
            total,
            start_time: Duration::ZERO,
            end_time: duration,
            exact,
        }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the `Content-Range` header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.from, self.to, self.total)
    }
}

/// Resolve `range` against a resource of `total` bytes and `duration`.
///
/// Fails with [`Error::RangeNotSatisfiable`] when the range starts at or past
/// the end of the resource. An end past the resource is clamped.
pub fn resolve(range: ByteRange, total: u64, exact: bool, duration: Duration) -> Result<ResolvedRange> {
    let unsatisfiable = || Error::RangeNotSatisfiable { size: total };

    let (from, to) = match range {
        ByteRange::From { from, to } => {
            if from >= total {
                return Err(unsatisfiable());
            }
            let last = total - 1;
            (from, to.map_or(last, |to| to.min(last)))
        }
        ByteRange::Suffix(len) => {
            if len == 0 || total == 0 {
                return Err(unsatisfiable());
            }
            (total.saturating_sub(len), total - 1)
        }
    };

    Ok(ResolvedRange {
        from,
        to,
        total,
        start_time: byte_to_time(from, total, duration),
        end_time: byte_to_time(to + 1, total, duration),
        exact,
    })
}

/// Media time at byte offset `byte`.
pub fn byte_to_time(byte: u64, total: u64, duration: Duration) -> Duration {
    if total == 0 {
        return Duration::ZERO;
    }
    duration.mul_f64(byte.min(total) as f64 / total as f64)
}

/// Byte offset at media time `time`, rounded down.
pub fn time_to_byte(time: Duration, total: u64, duration: Duration) -> u64 {
    if duration.is_zero() {
        return 0;
    }
    let fraction = (time.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
    (fraction * total as f64) as u64
}

/// Re-estimate the full output size from observed encoder throughput.
///
/// Returns `current` until at least [`MIN_ESTIMATE_SAMPLE`] of media has been
/// encoded.
pub fn corrected_estimate(current: u64, bytes_written: u64, encoded: Duration, duration: Duration) -> u64 {
    if encoded < MIN_ESTIMATE_SAMPLE || bytes_written == 0 {
        return current;
    }
    let rate = bytes_written as f64 / encoded.as_secs_f64();
    (rate * duration.as_secs_f64()) as u64
}
