//! Typed ID wrappers for the streaming engine.
//!
//! Stream identifiers travel through URLs, so they are rendered in the compact
//! 32-character hex form. Parsing also accepts the hyphenated UUID form.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Opaque token naming one client playback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Mint a new random stream ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a stream ID from its textual form.
    ///
    /// Only the 32-character hex form and the 36-character hyphenated form are
    /// accepted; braced and URN forms are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.len() {
            32 | 36 => Uuid::try_parse(value).ok().map(Self),
            _ => None,
        }
    }

    /// Purely syntactic check of a stream identifier.
    pub fn validate(value: &str) -> bool {
        Self::parse(value).is_some()
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for StreamId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<StreamId> for Uuid {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl FromStr for StreamId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::bad_request(format!("invalid stream id: {s}")))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Unique identifier for a media library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaItemId(Uuid);

impl MediaItemId {
    /// Generate a new random media item ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MediaItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<MediaItemId> for Uuid {
    fn from(id: MediaItemId) -> Self {
        id.0
    }
}

impl FromStr for MediaItemId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|_| crate::Error::bad_request(format!("invalid media id: {s}")))
    }
}

impl std::fmt::Display for MediaItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
