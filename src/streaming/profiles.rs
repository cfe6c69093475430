//! Delivery profiles and profile resolution.

use serde::{Deserialize, Serialize};
use tcstream_common::Container;

use super::catalog::MediaItem;

/// How a media item is delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryProfile {
    pub id: String,

    /// Output container (for direct play, the container reported to clients).
    pub container: Container,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_video_bitrate")]
    pub video_bitrate_kbps: u32,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,

    /// Deliver as HLS segments.
    #[serde(default)]
    pub segmented: bool,

    /// Run the encoder; `false` serves the source file as is.
    #[serde(default = "default_transcode")]
    pub transcode: bool,

    /// MIME type override.
    #[serde(default)]
    pub mime: Option<String>,
}

fn default_video_codec() -> String {
    "h264".to_string()
}
fn default_audio_codec() -> String {
    "aac".to_string()
}
fn default_video_bitrate() -> u32 {
    4000
}
fn default_audio_bitrate() -> u32 {
    192
}
fn default_transcode() -> bool {
    true
}

impl DeliveryProfile {
    /// Direct play of a source in its own container.
    pub fn direct(container: Container) -> Self {
        Self {
            id: "direct".to_string(),
            container,
            video_codec: "copy".to_string(),
            audio_codec: "copy".to_string(),
            video_bitrate_kbps: 0,
            audio_bitrate_kbps: 0,
            segmented: false,
            transcode: false,
            mime: None,
        }
    }

    /// MIME type of transcoded output.
    pub fn mime(&self) -> &str {
        self.mime.as_deref().unwrap_or(self.container.mime())
    }
}

/// Profile resolution collaborator.
pub trait ProfileManager: Send + Sync {
    /// Look up a profile by id.
    fn profile(&self, id: &str) -> Option<DeliveryProfile>;

    /// Profile used when the client does not ask for one.
    fn default_profile(&self, media: &MediaItem) -> Option<DeliveryProfile>;

    fn list(&self) -> Vec<DeliveryProfile>;
}

/// Profiles defined in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticProfiles {
    profiles: Vec<DeliveryProfile>,
    default: Option<String>,
}

impl StaticProfiles {
    pub fn new(profiles: Vec<DeliveryProfile>, default: Option<String>) -> Self {
        Self { profiles, default }
    }
}

impl ProfileManager for StaticProfiles {
    fn profile(&self, id: &str) -> Option<DeliveryProfile> {
        self.profiles.iter().find(|p| p.id == id).cloned()
    }

    /// The configured default, else the first profile, else direct play.
    fn default_profile(&self, media: &MediaItem) -> Option<DeliveryProfile> {
        if let Some(id) = &self.default {
            return self.profile(id);
        }
        if let Some(first) = self.profiles.first() {
            return Some(first.clone());
        }
        media.container().map(DeliveryProfile::direct)
    }

    fn list(&self) -> Vec<DeliveryProfile> {
        self.profiles.clone()
    }
}
