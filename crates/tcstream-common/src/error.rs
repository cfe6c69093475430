//! Unified error type for the streaming engine.
//!
//! Every decision point of a stream request returns one of these variants, and
//! the HTTP layer derives the response status from [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes of a stream request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was malformed (e.g. an invalid stream identifier).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media", "profile").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// No part of the requested byte range exists.
    #[error("Range not satisfiable (resource size {size})")]
    RangeNotSatisfiable {
        /// Current known (or estimated) size of the resource.
        size: u64,
    },

    /// The stream was stopped or expired.
    #[error("Stream no longer active: {0}")]
    Inactive(String),

    /// The encoder could not produce the requested HLS segment.
    #[error("Segment {index} unavailable: {reason}")]
    SegmentUnavailable {
        /// Requested segment index.
        index: u32,
        /// Human-readable reason.
        reason: String,
    },

    /// The encoder did not produce data within the configured bound.
    #[error("Timed out after {waited_secs}s waiting for encoder output")]
    EncoderTimeout {
        /// Seconds spent waiting.
        waited_secs: u64,
    },

    /// An external tool (ffmpeg) failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The catalog entry for the source has no MIME type.
    #[error("Media item {0} has no mime type")]
    MissingMime(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::NotFound { .. } => 404,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::Inactive(_) => 500,
            Error::SegmentUnavailable { .. } => 500,
            Error::EncoderTimeout { .. } => 500,
            Error::Tool { .. } => 500,
            Error::MissingMime(_) => 500,
            Error::Io { .. } => 500,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }

    /// Convenience constructor for [`Error::BadRequest`].
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Inactive`].
    pub fn inactive(id: impl fmt::Display) -> Self {
        Error::Inactive(id.to_string())
    }

    /// Convenience constructor for [`Error::SegmentUnavailable`].
    pub fn segment_unavailable(index: u32, reason: impl Into<String>) -> Self {
        Error::SegmentUnavailable {
            index,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
