//! tcstream-av: encoder abstraction and ffmpeg integration.
//!
//! The streaming engine talks to encoders only through [`MediaConverter`].
//! [`FfmpegConverter`] is the production backend; tests substitute their own.
//!
//! - `converter` - the collaborator trait, encoder handles and progress
//! - `ffmpeg` - ffmpeg process management and progress parsing
//! - `tools` - external tool discovery

mod error;

pub mod converter;
pub mod ffmpeg;
pub mod tools;

pub use converter::{
    parse_segment_file_name, segment_file_name, EncoderHandle, EncoderProgress, MediaConverter,
    OutputInfo, ProgressReporter, SegmentFile, TranscodeJob, SEGMENT_EXTENSION,
};
pub use error::{Error, Result};
pub use ffmpeg::{FfmpegConverter, FfmpegSettings};
pub use tools::{check_tool_with_arg, check_tools, get_tool_path, require_tool, ToolInfo};
