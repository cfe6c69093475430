//! Error types for tcstream-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving an encoder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool failed to execute.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}

impl From<Error> for tcstream_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::ToolNotFound { tool } => {
                tcstream_common::Error::tool(tool, "not found on PATH")
            }
            Error::ToolFailed { tool, message } => tcstream_common::Error::tool(tool, message),
            Error::FileNotFound { path } => {
                tcstream_common::Error::not_found("file", path.display())
            }
            Error::Io(source) => tcstream_common::Error::Io { source },
            Error::InvalidInput(msg) => tcstream_common::Error::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_common_error() {
        let err: tcstream_common::Error = Error::tool_failed("ffmpeg", "exit 1").into();
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit 1");
        assert_eq!(err.http_status(), 500);

        let err: tcstream_common::Error = Error::file_not_found("/nope.mkv").into();
        assert_eq!(err.http_status(), 404);
    }
}
