mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./tcstream.toml",
        "~/.config/tcstream/config.toml",
        "/etc/tcstream/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let streaming = &config.streaming;
    if streaming.segment_duration_secs == 0 {
        anyhow::bail!("Segment duration must be at least one second");
    }
    if streaming.encoder_wait_timeout_secs == 0 {
        anyhow::bail!("Encoder wait timeout cannot be 0");
    }
    if streaming.poll_interval_ms == 0 {
        anyhow::bail!("Poll interval cannot be 0");
    }

    let mut profile_ids = HashSet::new();
    for profile in &config.profiles {
        if profile.id.trim().is_empty() {
            anyhow::bail!("Profile id cannot be empty");
        }
        if !profile_ids.insert(profile.id.as_str()) {
            anyhow::bail!("Duplicate profile id '{}'", profile.id);
        }
        if profile.transcode && profile.video_bitrate_kbps == 0 {
            anyhow::bail!("Profile '{}' transcodes but has no video bitrate", profile.id);
        }
        if profile.segmented && !profile.transcode {
            anyhow::bail!("Profile '{}' is segmented but does not transcode", profile.id);
        }
    }

    if let Some(default) = &streaming.default_profile {
        if !profile_ids.contains(default.as_str()) {
            anyhow::bail!("Default profile '{}' is not defined", default);
        }
    }

    let mut media_ids = HashSet::new();
    for item in &config.media {
        if !media_ids.insert(item.id) {
            anyhow::bail!("Duplicate media id '{}'", item.id);
        }
        match item.duration_secs {
            Some(secs) if secs > 0.0 && secs.is_finite() => {}
            _ => anyhow::bail!("Media '{}' needs a positive duration_secs", item.id),
        }
        if !item.path.exists() {
            tracing::warn!("Media file does not exist: {:?}", item.path);
        }
    }

    Ok(())
}
