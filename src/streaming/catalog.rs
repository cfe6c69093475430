//! Media library accessor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tcstream_common::{Container, Error, MediaItemId, Result};

/// A playable source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaItemId,
    pub path: PathBuf,

    /// Source container; guessed from the file extension when unset.
    #[serde(default)]
    pub container: Option<Container>,

    #[serde(default)]
    pub mime: Option<String>,

    #[serde(default)]
    pub duration_secs: Option<f64>,

    #[serde(default)]
    pub title: Option<String>,
}

impl MediaItem {
    pub fn container(&self) -> Option<Container> {
        self.container.or_else(|| {
            self.path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(Container::from_name)
        })
    }

    /// MIME type of the source file itself.
    pub fn mime(&self) -> Result<String> {
        self.mime
            .clone()
            .or_else(|| self.container().map(|c| c.mime().to_string()))
            .ok_or_else(|| Error::MissingMime(self.id.to_string()))
    }

    pub fn duration(&self) -> Duration {
        self.duration_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default()
    }
}

/// Media library collaborator.
pub trait MediaCatalog: Send + Sync {
    fn get(&self, id: &MediaItemId) -> Option<MediaItem>;

    fn list(&self) -> Vec<MediaItem>;
}

/// Media entries from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: HashMap<MediaItemId, MediaItem>,
}

impl StaticCatalog {
    pub fn new(items: impl IntoIterator<Item = MediaItem>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
        }
    }
}

impl MediaCatalog for StaticCatalog {
    fn get(&self, id: &MediaItemId) -> Option<MediaItem> {
        self.items.get(id).cloned()
    }

    fn list(&self) -> Vec<MediaItem> {
        self.items.values().cloned().collect()
    }
}
