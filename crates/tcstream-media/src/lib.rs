//! tcstream-media: HLS playlist generation.
//!
//! Segmented delivery splits a media item into fixed-duration segments that
//! the encoder produces on demand. This crate only describes the playlist the
//! client sees; producing the segment bytes is the converter's job.
//!
//! - `hls` - media playlist model and M3U8 rendering

pub mod hls;

pub use hls::{MediaPlaylist, PlaylistType, SegmentEntry};

use std::time::Duration;

/// Number of segments needed to cover `duration` with segments of
/// `segment_secs` seconds. The last segment may be shorter.
pub fn segment_count(duration: Duration, segment_secs: u32) -> u32 {
    if segment_secs == 0 {
        return 0;
    }
    let secs = duration.as_secs_f64();
    (secs / f64::from(segment_secs)).ceil() as u32
}
