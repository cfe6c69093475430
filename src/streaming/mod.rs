//! Stream delivery engine.
//!
//! Serves byte-range and HLS requests for media that may still be in the
//! middle of being transcoded.
//!
//! # Routes
//!
//! - `POST /api/stream` - Mint a stream for a media item
//! - `GET /api/stream/{stream_id}` - Progressive delivery with range support
//! - `GET /api/stream/{stream_id}?file=index.m3u8` - HLS playlist
//! - `GET /api/stream/{stream_id}?file=segment00005.ts` - HLS segment
//! - `DELETE /api/stream/{stream_id}` - Stop a stream
//! - `GET /api/streams` - List sessions

mod api;
pub mod catalog;
pub mod profiles;
pub mod range;
pub mod registry;
pub mod response;
pub mod retrieve;
pub mod segments;
pub mod session;
pub mod source;

pub use api::{InitStreamRequest, InitStreamResponse};
pub use catalog::{MediaCatalog, MediaItem, StaticCatalog};
pub use profiles::{DeliveryProfile, ProfileManager, StaticProfiles};
pub use registry::{start_cleanup_task, StreamRegistry};
pub use retrieve::{retrieve_stream, StreamRequest};
pub use session::{EncoderSlot, SessionSummary, StreamSession, TranscoderState};
pub use source::{LocalFsAccessor, ResourceAccessor};

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppContext;

/// Create the stream router.
pub fn stream_router() -> Router<AppContext> {
    Router::new()
        .route("/stream", post(api::init_stream))
        .route(
            "/stream/:stream_id",
            get(api::get_stream).delete(api::stop_stream),
        )
        .route("/streams", get(api::list_streams))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_router_creation() {
        let _router: Router<AppContext> = stream_router();
    }
}
