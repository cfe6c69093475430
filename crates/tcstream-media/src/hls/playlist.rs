//! HLS media playlist structures.

use std::fmt;
use std::time::Duration;

/// Media playlist for a single rendition.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    /// Target duration in seconds.
    pub target_duration: u32,
    /// Media sequence number of the first entry.
    pub media_sequence: u32,
    /// Playlist type (VOD or EVENT).
    pub playlist_type: PlaylistType,
    /// Segment entries.
    pub segments: Vec<SegmentEntry>,
    /// Whether this is an ended playlist.
    pub ended: bool,
}

impl MediaPlaylist {
    /// Create an empty VOD playlist.
    pub fn vod(target_duration: u32) -> Self {
        Self {
            target_duration,
            media_sequence: 0,
            playlist_type: PlaylistType::Vod,
            segments: Vec::new(),
            ended: true,
        }
    }

    /// Build a VOD playlist of equally sized segments covering `duration`.
    ///
    /// Every segment lasts `segment_secs` except the last, which holds the
    /// remainder. `uri` maps a segment index to its URI.
    pub fn uniform<F>(duration: Duration, segment_secs: u32, mut uri: F) -> Self
    where
        F: FnMut(u32) -> String,
    {
        let mut playlist = Self::vod(segment_secs);
        let count = crate::segment_count(duration, segment_secs);
        let total = duration.as_secs_f64();
        let step = f64::from(segment_secs);

        for index in 0..count {
            let start = f64::from(index) * step;
            let length = (total - start).min(step);
            playlist.segments.push(SegmentEntry {
                duration: length,
                uri: uri(index),
                title: None,
                discontinuity: false,
            });
        }

        playlist
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(out, "#EXTM3U")?;
        writeln!(out, "#EXT-X-VERSION:3")?;
        writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence)?;

        match self.playlist_type {
            PlaylistType::Vod => writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD")?,
            PlaylistType::Event => writeln!(out, "#EXT-X-PLAYLIST-TYPE:EVENT")?,
            PlaylistType::Live => {}
        }

        for segment in &self.segments {
            if segment.discontinuity {
                writeln!(out, "#EXT-X-DISCONTINUITY")?;
            }
            match segment.title {
                Some(ref title) => writeln!(out, "#EXTINF:{:.6},{}", segment.duration, title)?,
                None => writeln!(out, "#EXTINF:{:.6},", segment.duration)?,
            }
            writeln!(out, "{}", segment.uri)?;
        }

        if self.ended {
            writeln!(out, "#EXT-X-ENDLIST")?;
        }

        Ok(())
    }
}

/// Playlist type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
    Live,
}

/// A segment entry in the playlist.
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    /// Duration in seconds.
    pub duration: f64,
    /// Segment URI.
    pub uri: String,
    /// Optional title.
    pub title: Option<String>,
    /// Discontinuity before this segment.
    pub discontinuity: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_playlist_render() {
        let mut playlist = MediaPlaylist::vod(6);
        playlist.segments.push(SegmentEntry {
            duration: 5.5,
            uri: "/seg0.ts".to_string(),
            title: None,
            discontinuity: false,
        });
        playlist.segments.push(SegmentEntry {
            duration: 6.0,
            uri: "/seg1.ts".to_string(),
            title: Some("second".to_string()),
            discontinuity: true,
        });

        let m3u8 = playlist.render();

        assert!(m3u8.starts_with("#EXTM3U\n"));
        assert!(m3u8.contains("#EXT-X-TARGETDURATION:6"));
        assert!(m3u8.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(m3u8.contains("#EXTINF:5.500000,\n/seg0.ts"));
        assert!(m3u8.contains("#EXT-X-DISCONTINUITY\n#EXTINF:6.000000,second"));
        assert!(m3u8.trim_end().ends_with("#EXT-X-ENDLIST"));
    }

    #[test]
    fn test_uniform_playlist_last_segment_is_remainder() {
        let playlist = MediaPlaylist::uniform(Duration::from_secs(20), 6, |i| format!("s{i}.ts"));

        assert_eq!(playlist.segments.len(), 4);
        assert_eq!(playlist.segments[0].duration, 6.0);
        assert!((playlist.segments[3].duration - 2.0).abs() < 1e-9);
        assert_eq!(playlist.segments[3].uri, "s3.ts");
    }

    #[test]
    fn test_event_playlist_without_endlist() {
        let mut playlist = MediaPlaylist::vod(4);
        playlist.playlist_type = PlaylistType::Event;
        playlist.ended = false;

        let m3u8 = playlist.render();
        assert!(m3u8.contains("#EXT-X-PLAYLIST-TYPE:EVENT"));
        assert!(!m3u8.contains("#EXT-X-ENDLIST"));
    }
}
