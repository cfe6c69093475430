//! Core type definitions for delivery containers and encoder payloads.
//!
//! All enums serialize in lowercase so they can be written directly in the
//! TOML configuration and the JSON management API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container format a delivery profile produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// MPEG transport stream, the usual HLS segment container.
    Mpegts,
    /// ISO base media (MP4).
    Mp4,
    /// Matroska.
    Matroska,
    /// WebM.
    Webm,
}

impl Container {
    /// Default MIME type sent for this container.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Mpegts => "video/MP2T",
            Self::Mp4 => "video/mp4",
            Self::Matroska => "video/x-matroska",
            Self::Webm => "video/webm",
        }
    }

    /// File extension used for encoder output.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mpegts => "ts",
            Self::Mp4 => "mp4",
            Self::Matroska => "mkv",
            Self::Webm => "webm",
        }
    }

    /// Whether a player can start decoding before the file is complete.
    ///
    /// Plain MP4 keeps its index at the end of the file, so a growing MP4 is
    /// only playable when the encoder fragments it.
    pub fn is_progressive(self) -> bool {
        !matches!(self, Self::Mp4)
    }

    /// Guess a container from a file extension or container name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ts" | "m2ts" | "mpegts" => Some(Self::Mpegts),
            "mp4" | "m4v" | "mov" => Some(Self::Mp4),
            "mkv" | "matroska" => Some(Self::Matroska),
            "webm" => Some(Self::Webm),
            _ => None,
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mpegts => write!(f, "mpegts"),
            Self::Mp4 => write!(f, "mp4"),
            Self::Matroska => write!(f, "matroska"),
            Self::Webm => write!(f, "webm"),
        }
    }
}

/// What kind of payload a piece of encoder output carries.
///
/// Resolved once by the converter when the output is produced, so request
/// handlers never need to inspect the bytes to pick a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPayloadKind {
    /// Video (with or without muxed audio).
    Video,
    /// Audio-only rendition.
    Audio,
    /// Subtitle track (WebVTT).
    Subtitle,
}

impl EncoderPayloadKind {
    /// Classify a segment file by extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ts" | "m4s" | "mp4" => Some(Self::Video),
            "aac" | "m4a" | "mp3" => Some(Self::Audio),
            "vtt" | "webvtt" => Some(Self::Subtitle),
            _ => None,
        }
    }

    /// MIME type for this payload, given the container of the video rendition.
    pub fn mime(self, video_container: Container) -> &'static str {
        match self {
            Self::Video => video_container.mime(),
            Self::Audio => "audio/aac",
            Self::Subtitle => "text/vtt",
        }
    }
}

impl fmt::Display for EncoderPayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// How a non-segmented request wants the resource delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Whole resource, `200 OK`.
    Normal,
    /// A byte sub-range, `206 Partial Content`.
    ByteRange,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::ByteRange => write!(f, "byterange"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_serialization() {
        let json = serde_json::to_string(&Container::Mpegts).unwrap();
        assert_eq!(json, r#""mpegts""#);

        let c: Container = serde_json::from_str(r#""matroska""#).unwrap();
        assert_eq!(c, Container::Matroska);
    }

    #[test]
    fn test_container_mime() {
        assert_eq!(Container::Mpegts.mime(), "video/MP2T");
        assert_eq!(Container::Mp4.mime(), "video/mp4");
        assert_eq!(Container::Matroska.mime(), "video/x-matroska");
        assert_eq!(Container::Webm.mime(), "video/webm");
    }

    #[test]
    fn test_container_from_name() {
        assert_eq!(Container::from_name("MKV"), Some(Container::Matroska));
        assert_eq!(Container::from_name("m4v"), Some(Container::Mp4));
        assert_eq!(Container::from_name("ts"), Some(Container::Mpegts));
        assert_eq!(Container::from_name("avi"), None);
    }

    #[test]
    fn test_container_progressive() {
        assert!(Container::Mpegts.is_progressive());
        assert!(Container::Matroska.is_progressive());
        assert!(!Container::Mp4.is_progressive());
    }

    #[test]
    fn test_payload_kind_from_extension() {
        assert_eq!(EncoderPayloadKind::from_extension("ts"), Some(EncoderPayloadKind::Video));
        assert_eq!(EncoderPayloadKind::from_extension("VTT"), Some(EncoderPayloadKind::Subtitle));
        assert_eq!(EncoderPayloadKind::from_extension("aac"), Some(EncoderPayloadKind::Audio));
        assert_eq!(EncoderPayloadKind::from_extension("m3u8"), None);
    }

    #[test]
    fn test_payload_kind_mime() {
        assert_eq!(EncoderPayloadKind::Video.mime(Container::Mpegts), "video/MP2T");
        assert_eq!(EncoderPayloadKind::Subtitle.mime(Container::Mpegts), "text/vtt");
        assert_eq!(EncoderPayloadKind::Audio.mime(Container::Mp4), "audio/aac");
    }

    #[test]
    fn test_stream_mode_display() {
        assert_eq!(StreamMode::Normal.to_string(), "normal");
        assert_eq!(StreamMode::ByteRange.to_string(), "byterange");
    }
}
