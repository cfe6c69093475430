//! tcstream-common: shared types used across the streaming engine.
//!
//! - **Typed IDs**: [`StreamId`] for client streams and [`MediaItemId`] for
//!   library entries, both backed by UUIDs.
//! - **Media types**: delivery containers and the payload kind carried by
//!   encoder output.
//! - **Error handling**: the unified [`Error`] with its HTTP status mapping.
//!
//! # Examples
//!
//! ```
//! use tcstream_common::{Container, StreamId};
//!
//! let id = StreamId::new();
//! assert!(StreamId::validate(&id.to_string()));
//! assert!(!StreamId::validate("abc"));
//!
//! assert_eq!(Container::Mpegts.mime(), "video/MP2T");
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
