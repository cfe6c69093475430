//! `RetrieveStream`: the request orchestrator.
//!
//! Validates the identifier, resolves the session, then either dispatches an
//! HLS file or serves a byte range, reusing the running encoder output when
//! it can and restarting it at the requested position when it cannot.

use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;
use tcstream_common::{Error, Result, StreamId, StreamMode};

use super::range::{parse_range_header, resolve, ResolvedRange};
use super::registry::StreamRegistry;
use super::response::{
    file_body, growing_body, is_not_modified, not_modified, playlist_response, segment_response,
    Delivery, GrowthPolicy,
};
use super::segments::{is_playlist, resolve_segment_index};
use super::session::{BusyGuard, StreamSession};

/// The parts of an HTTP request the orchestrator looks at.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    /// HLS file name (`?file=`).
    pub file: Option<String>,
    /// Raw `Range` header.
    pub range: Option<String>,
    /// Raw `If-Modified-Since` header.
    pub if_modified_since: Option<String>,
}

/// Serve one stream request.
pub async fn retrieve_stream(
    registry: &StreamRegistry,
    id: &str,
    request: StreamRequest,
) -> Result<Response> {
    let Some(stream_id) = StreamId::parse(id) else {
        tracing::debug!(stream_id = %id, "Rejected malformed stream id");
        return Err(Error::bad_request(format!("invalid stream id: {id}")));
    };

    let session = registry
        .lookup(&stream_id)
        .await?
        .filter(|session| session.is_active())
        .ok_or_else(|| Error::inactive(stream_id))?;
    session.touch();

    match request.file.as_deref() {
        Some(file) => retrieve_segmented(registry, &session, file).await,
        None => retrieve_progressive(registry, session, &request).await,
    }
}

async fn retrieve_segmented(
    registry: &StreamRegistry,
    session: &StreamSession,
    file: &str,
) -> Result<Response> {
    if !session.state().is_segmented {
        return Err(Error::bad_request(format!(
            "stream {} is not segmented",
            session.id()
        )));
    }

    let dispatcher = registry.dispatcher();
    if is_playlist(file) {
        return Ok(playlist_response(dispatcher.playlist(session).render()));
    }

    let index = resolve_segment_index(file)?;
    let mut slot = lock_active(session).await?;
    let segment = dispatcher.request_segment(session, &mut slot, index).await?;
    let data = tokio::fs::read(&segment.path).await?;
    drop(slot);

    let mime = segment.kind.mime(session.profile().container);
    segment_response(mime, data)
}

async fn retrieve_progressive(
    registry: &StreamRegistry,
    session: Arc<StreamSession>,
    request: &StreamRequest,
) -> Result<Response> {
    let mime = session.mime()?;
    let byte_range = request.range.as_deref().and_then(parse_range_header);
    let mode = if byte_range.is_some() {
        StreamMode::ByteRange
    } else {
        StreamMode::Normal
    };

    let mut slot = lock_active(&session).await?;
    session.observe(&slot);
    let state = session.state();
    let duration = state.actual_duration;

    // Direct play or a finished transcode: plain file with exact ranges.
    if !state.is_transcoding || state.is_transcoded {
        let path = match session.transcoded_path(&slot) {
            Some(path) => path,
            None => session.media().path.clone(),
        };
        let total = registry.accessor().size(&path).await?;
        let range = match byte_range {
            Some(r) => resolve(r, total, true, duration)?,
            None => ResolvedRange::whole(total, true, duration),
        };
        if is_not_modified(request.if_modified_since.as_deref(), state.last_updated) {
            return Ok(not_modified(state.last_updated));
        }

        let reader = registry.accessor().open_at(&path, range.from).await?;
        let delivery = Delivery {
            mode,
            mime,
            range,
            last_modified: state.last_updated,
            partial: false,
        };
        // A produced file stays locked so it is not discarded mid-transfer.
        let guard = if state.is_transcoded {
            Some(slot)
        } else {
            drop(slot);
            None
        };
        let body = file_body(Arc::clone(&session), guard, reader, range.len());
        return delivery.respond(body);
    }

    let total = state.estimated_total_size;
    let range = match byte_range {
        Some(r) => resolve(r, total, false, duration)?,
        None => ResolvedRange::whole(total, false, duration),
    };
    if is_not_modified(request.if_modified_since.as_deref(), state.last_updated) {
        return Ok(not_modified(state.last_updated));
    }

    let settings = registry.settings();
    if !slot.covers(range.from, settings.seek_window_bytes) {
        let target = match mode {
            StreamMode::Normal => Duration::ZERO,
            StreamMode::ByteRange => range.start_time,
        };
        tracing::info!(
            stream_id = %session.id(),
            from = range.from,
            target_secs = target.as_secs_f64(),
            previous_offset = slot.base_offset,
            "Restarting encoder at requested position"
        );
        session
            .start_output(&mut slot, registry.converter(), target, 0)
            .await?;
        slot.base_offset = slot.base_offset.min(range.from);
    } else {
        tracing::debug!(stream_id = %session.id(), from = range.from, "Reusing encoder output");
    }

    let (path, progress, streamable) = {
        let handle = slot
            .output
            .as_ref()
            .ok_or_else(|| Error::Internal("encoder output missing after start".into()))?;
        let ready = handle
            .wait_until(settings.encoder_wait_timeout(), |p| p.bytes_written > 0)
            .await?;
        if let Some(reason) = ready.failed.filter(|_| ready.bytes_written == 0) {
            return Err(Error::tool("encoder", reason));
        }
        (handle.path().to_path_buf(), handle.subscribe(), handle.info().streamable)
    };
    if !streamable {
        tracing::warn!(stream_id = %session.id(), "Serving output that is not streamable");
    }

    let offset = range.from - slot.base_offset;
    let reader = registry.accessor().open_at(&path, offset).await?;
    let len = match mode {
        StreamMode::ByteRange => Some(range.len()),
        StreamMode::Normal => None,
    };

    let delivery = Delivery {
        mode,
        mime,
        range,
        last_modified: session.state().last_updated,
        partial: true,
    };
    let policy = GrowthPolicy {
        poll_interval: settings.poll_interval(),
        stall_timeout: settings.encoder_wait_timeout(),
    };
    let body = growing_body(slot, Arc::clone(&session), reader, progress, len, policy);
    delivery.respond(body)
}

/// Take the busy lock, failing if the session was stopped while waiting.
async fn lock_active(session: &StreamSession) -> Result<BusyGuard> {
    let slot = session.busy().await;
    if !session.is_active() {
        return Err(Error::inactive(session.id()));
    }
    Ok(slot)
}
