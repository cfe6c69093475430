//! tcstream - on-demand transcoding stream delivery
//!
//! This library crate exposes the engine for integration testing.

pub mod config;
pub mod server;
pub mod streaming;
