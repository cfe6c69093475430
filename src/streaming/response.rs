//! Response writer.
//!
//! Complete files are streamed with a known length. Encoder output that is
//! still growing is streamed until the requested length (or the end of the
//! output) is reached, waiting for the encoder whenever the reader catches up
//! with it.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcstream_av::EncoderProgress;
use tcstream_common::{Error, Result, StreamMode};
use tokio::io::{AsyncReadExt, AsyncRead};
use tokio::sync::watch;
use tokio_util::io::ReaderStream;

use super::range::ResolvedRange;
use super::session::{BusyGuard, StreamSession};
use super::source::SourceReader;

/// Read size for streamed bodies.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Format a timestamp as an HTTP date.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date (RFC 7231 IMF-fixdate).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Whether an `If-Modified-Since` value means the client copy is current.
///
/// HTTP dates have one-second resolution, so `last_modified` is truncated
/// before comparing.
pub fn is_not_modified(if_modified_since: Option<&str>, last_modified: DateTime<Utc>) -> bool {
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    since.timestamp() >= last_modified.timestamp()
}

pub fn not_modified(last_modified: DateTime<Utc>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    if let Ok(value) = HeaderValue::from_str(&http_date(last_modified)) {
        response.headers_mut().insert(header::LAST_MODIFIED, value);
    }
    response
}

/// Headers and status for a progressive delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub mode: StreamMode,
    pub mime: String,
    pub range: ResolvedRange,
    pub last_modified: DateTime<Utc>,
    /// Output is still being produced.
    pub partial: bool,
}

impl Delivery {
    pub fn status(&self) -> StatusCode {
        match self.mode {
            StreamMode::Normal => StatusCode::OK,
            StreamMode::ByteRange => StatusCode::PARTIAL_CONTENT,
        }
    }

    /// Assemble the response around `body`.
    ///
    /// `Content-Length` is only sent when the byte count is exact.
    pub fn respond(&self, body: Body) -> Result<Response> {
        let mut builder = Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, self.mime.as_str())
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::LAST_MODIFIED, http_date(self.last_modified));

        if self.range.exact {
            builder = builder.header(header::CONTENT_LENGTH, self.range.len());
        }
        if self.mode == StreamMode::ByteRange {
            builder = builder.header(header::CONTENT_RANGE, self.range.content_range());
        }
        if self.partial {
            builder = builder.header(header::CACHE_CONTROL, "no-cache");
        }

        builder
            .body(body)
            .map_err(|e| Error::Internal(format!("failed to build response: {e}")))
    }
}

/// Body for `len` bytes of a complete file.
///
/// Every chunk sent counts as session activity. The transfer ends when the
/// session is stopped; `guard`, if given, is held until then.
pub fn file_body(
    session: Arc<StreamSession>,
    guard: Option<BusyGuard>,
    reader: SourceReader,
    len: u64,
) -> Body {
    let stopped = session.stopped_token();
    let mut chunks = ReaderStream::with_capacity(reader.take(len), CHUNK_SIZE);
    let stream = async_stream::stream! {
        let _busy = guard;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = stopped.cancelled() => break,
                chunk = chunks.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            if chunk.is_ok() {
                session.touch();
            }
            yield chunk;
        }
    };
    Body::from_stream(stream)
}

/// How long a growing-output transfer waits for the encoder.
#[derive(Debug, Clone, Copy)]
pub struct GrowthPolicy {
    /// Re-check interval when no progress notification arrives.
    pub poll_interval: Duration,
    /// Give up when no new bytes appear for this long.
    pub stall_timeout: Duration,
}

/// Body streaming from an output the encoder is still writing.
///
/// The session's busy lock is held until the body is finished, dropped or
/// the session is stopped, so the output cannot be replaced underneath the
/// transfer. `len` of `None` streams until the encoder ends. Every chunk sent
/// counts as session activity.
pub fn growing_body(
    guard: BusyGuard,
    session: Arc<StreamSession>,
    reader: SourceReader,
    progress: watch::Receiver<EncoderProgress>,
    len: Option<u64>,
    policy: GrowthPolicy,
) -> Body {
    Body::from_stream(growing_stream(guard, session, reader, progress, len, policy))
}

fn growing_stream(
    guard: BusyGuard,
    session: Arc<StreamSession>,
    mut reader: impl AsyncRead + Send + Unpin + 'static,
    mut progress: watch::Receiver<EncoderProgress>,
    len: Option<u64>,
    policy: GrowthPolicy,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    let stopped = session.stopped_token();
    async_stream::try_stream! {
        let _busy = guard;
        let mut remaining = len;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut last_data = Instant::now();
        let mut drained = false;

        loop {
            if remaining == Some(0) || stopped.is_cancelled() {
                break;
            }

            let want = remaining.map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE as u64) as usize);
            let n = reader.read(&mut buf[..want]).await?;
            if n > 0 {
                last_data = Instant::now();
                remaining = remaining.map(|r| r - n as u64);
                session.touch();
                yield Bytes::copy_from_slice(&buf[..n]);
                continue;
            }

            // Caught up with the encoder.
            if drained {
                break;
            }
            if !progress.borrow().is_running() {
                // One more read picks up anything written before the end.
                drained = true;
                continue;
            }
            if last_data.elapsed() >= policy.stall_timeout {
                tracing::warn!(stream_id = %session.id(), "Encoder stalled, ending transfer");
                Err(Error::EncoderTimeout { waited_secs: policy.stall_timeout.as_secs() })?;
            }

            let reporter_gone = tokio::select! {
                biased;
                _ = stopped.cancelled() => break,
                changed = progress.changed() => changed.is_err(),
                _ = tokio::time::sleep(policy.poll_interval) => false,
            };
            if reporter_gone {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    _ = tokio::time::sleep(policy.poll_interval) => {}
                }
            }
        }

        tracing::debug!(stream_id = %session.id(), "Transfer finished");
    }
}

/// Response carrying one HLS segment.
pub fn segment_response(mime: &str, data: Vec<u8>) -> Result<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(data))
        .map_err(|e| Error::Internal(format!("failed to build response: {e}")))
}

/// Response carrying an M3U8 playlist.
pub fn playlist_response(playlist: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        playlist,
    )
        .into_response()
}
