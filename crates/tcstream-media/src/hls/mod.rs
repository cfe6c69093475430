//! HLS playlist generation.
//!
//! This module generates M3U8 media playlists for segmented streams.

mod playlist;

pub use playlist::{MediaPlaylist, PlaylistType, SegmentEntry};
