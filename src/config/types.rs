use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::streaming::{DeliveryProfile, MediaItem};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub profiles: Vec<DeliveryProfile>,

    #[serde(default)]
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Stream session and delivery tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Length of one HLS segment.
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u32,

    /// Idle time after which a session is stopped.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// How often the expiry sweep runs.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// How long a request may wait for the encoder to produce data.
    #[serde(default = "default_encoder_wait_timeout")]
    pub encoder_wait_timeout_secs: u64,

    /// Re-check interval while waiting on a growing output.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Segments the encoder may lag behind a request before it is restarted.
    #[serde(default = "default_segment_jump_threshold")]
    pub segment_jump_threshold: u32,

    /// Bytes past the produced output a request may start at and still
    /// reuse the running encoder.
    #[serde(default = "default_seek_window")]
    pub seek_window_bytes: u64,

    /// Root directory for encoder output.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Profile used when a stream request names none.
    #[serde(default)]
    pub default_profile: Option<String>,
}

fn default_segment_duration() -> u32 {
    6
}
fn default_session_timeout() -> u64 {
    300
}
fn default_cleanup_interval() -> u64 {
    30
}
fn default_encoder_wait_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    100
}
fn default_segment_jump_threshold() -> u32 {
    2
}
fn default_seek_window() -> u64 {
    4 * 1024 * 1024
}
fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("tcstream")
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: default_segment_duration(),
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            encoder_wait_timeout_secs: default_encoder_wait_timeout(),
            poll_interval_ms: default_poll_interval(),
            segment_jump_threshold: default_segment_jump_threshold(),
            seek_window_bytes: default_seek_window(),
            work_dir: default_work_dir(),
            default_profile: None,
        }
    }
}

impl StreamingConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn encoder_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    /// Explicit ffmpeg binary; looked up on PATH when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_preset() -> String {
    "veryfast".to_string()
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            preset: default_preset(),
        }
    }
}
