//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`MockConverter`] and a temporary
//! media library into a full [`AppContext`]. The mock "encodes" instantly by
//! writing a deterministic byte pattern, so tests can check exactly which
//! bytes a response carries.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use tcstream::config::{Config, StreamingConfig};
use tcstream::server::{create_router, AppContext};
use tcstream::streaming::range::time_to_byte;
use tcstream::streaming::{DeliveryProfile, MediaItem, StreamSession};
use tcstream_av::{
    segment_file_name, EncoderHandle, MediaConverter, OutputInfo, ProgressReporter, TranscodeJob,
};
use tcstream_common::{Container, EncoderPayloadKind, Error, MediaItemId, StreamId};

/// Media duration used by every test library entry.
pub const DURATION_SECS: f64 = 100.0;
/// Nominal output size of the `ts` profile: 80 kbps for 100 s.
pub const TOTAL: u64 = 1_000_000;
/// Size of the direct play source file.
pub const SOURCE_SIZE: u64 = 10_000;
pub const SEGMENT_SECS: u32 = 6;

/// Byte expected at client offset `pos`.
pub fn pattern_byte(pos: u64) -> u8 {
    (pos % 251) as u8
}

pub fn pattern(from: u64, len: u64) -> Vec<u8> {
    (from..from + len).map(pattern_byte).collect()
}

/// How the mock encoder behaves when started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMode {
    /// Write the whole output and finish.
    Complete,
    /// Write this many bytes and keep "running".
    Partial(u64),
    /// Write this many segments from the start segment and keep running.
    Segments(u32),
}

pub struct MockConverter {
    dir: PathBuf,
    mode: Mutex<MockMode>,
    pub fail_start: AtomicBool,
    pub crash: AtomicBool,
    starts: Mutex<Vec<(Duration, u32)>>,
    stops: AtomicUsize,
    reporters: Mutex<Vec<ProgressReporter>>,
}

impl MockConverter {
    pub fn new(dir: PathBuf, mode: MockMode) -> Self {
        Self {
            dir,
            mode: Mutex::new(mode),
            fail_start: AtomicBool::new(false),
            crash: AtomicBool::new(false),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            reporters: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Number of encoder starts so far.
    pub fn starts(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    /// `(start time, start segment)` of the most recent start.
    pub fn last_start(&self) -> Option<(Duration, u32)> {
        self.starts.lock().unwrap().last().copied()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Reporter of the most recent output, for driving progress by hand.
    pub fn with_last_reporter(&self, f: impl FnOnce(&ProgressReporter)) {
        if let Some(reporter) = self.reporters.lock().unwrap().last() {
            f(reporter);
        }
    }
}

#[async_trait]
impl MediaConverter for MockConverter {
    async fn get_file_stream(
        &self,
        job: &TranscodeJob,
        start: Duration,
        start_segment: u32,
    ) -> tcstream_common::Result<EncoderHandle> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::tool("mock", "refused to start"));
        }

        let index = {
            let mut starts = self.starts.lock().unwrap();
            starts.push((start, start_segment));
            starts.len()
        };
        let out_dir = self.dir.join(format!("out{index}"));
        std::fs::create_dir_all(&out_dir)?;
        let mode = *self.mode.lock().unwrap();
        let crash = self.crash.load(Ordering::SeqCst);

        let (handle, reporter) = match mode {
            MockMode::Segments(produce) => {
                let (handle, reporter) = EncoderHandle::new(OutputInfo {
                    kind: EncoderPayloadKind::Video,
                    path: out_dir.clone(),
                    start,
                    start_segment,
                    segmented: true,
                    streamable: true,
                });
                if crash {
                    reporter.fail("mock encoder crashed");
                } else {
                    let count = tcstream_media::segment_count(job.duration, SEGMENT_SECS);
                    let end = (start_segment + produce).min(count);
                    for n in start_segment..end {
                        std::fs::write(out_dir.join(segment_file_name(n)), format!("segment {n}"))?;
                    }
                    reporter.update(|p| {
                        p.last_segment = end.checked_sub(1).filter(|last| *last >= start_segment);
                        p.finished = end == count;
                    });
                }
                (handle, reporter)
            }
            MockMode::Complete | MockMode::Partial(_) => {
                let total = job.nominal_size();
                let base = time_to_byte(start, total, job.duration);
                let len = match mode {
                    MockMode::Partial(n) => n.min(total - base),
                    _ => total - base,
                };
                let path = out_dir.join(format!("stream.{}", job.container.extension()));
                std::fs::write(&path, pattern(base, len))?;

                let (handle, reporter) = EncoderHandle::new(OutputInfo {
                    kind: EncoderPayloadKind::Video,
                    path,
                    start,
                    start_segment: 0,
                    segmented: false,
                    streamable: job.container.is_progressive(),
                });
                if crash {
                    reporter.fail("mock encoder crashed");
                } else {
                    reporter.update(|p| {
                        p.bytes_written = len;
                        p.finished = mode == MockMode::Complete;
                    });
                }
                (handle, reporter)
            }
        };

        self.reporters.lock().unwrap().push(reporter);
        Ok(handle)
    }

    fn hls_segment_time_secs(&self) -> u32 {
        SEGMENT_SECS
    }

    async fn stop(&self, handle: EncoderHandle) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        handle.cancel();
    }
}

pub fn profile_ts() -> DeliveryProfile {
    DeliveryProfile {
        id: "ts".into(),
        container: Container::Mpegts,
        video_codec: "h264".into(),
        audio_codec: "aac".into(),
        video_bitrate_kbps: 72,
        audio_bitrate_kbps: 8,
        segmented: false,
        transcode: true,
        mime: None,
    }
}

pub fn profile_hls() -> DeliveryProfile {
    DeliveryProfile {
        id: "hls".into(),
        segmented: true,
        ..profile_ts()
    }
}

pub fn profile_direct() -> DeliveryProfile {
    DeliveryProfile::direct(Container::Matroska)
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub converter: Arc<MockConverter>,
    pub media: MediaItem,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new(mode: MockMode) -> Self {
        Self::with_streaming(mode, test_streaming_config())
    }

    pub fn with_streaming(mode: MockMode, streaming: StreamingConfig) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let source = dir.path().join("movie.mkv");
        std::fs::write(&source, pattern(0, SOURCE_SIZE)).expect("failed to write source");

        let media = MediaItem {
            id: MediaItemId::new(),
            path: source,
            container: None,
            mime: None,
            duration_secs: Some(DURATION_SECS),
            title: Some("Test Movie".into()),
        };

        let config = Config {
            streaming: StreamingConfig {
                work_dir: dir.path().join("work"),
                ..streaming
            },
            profiles: vec![profile_ts(), profile_hls(), profile_direct()],
            media: vec![media.clone()],
            ..Config::default()
        };

        let converter = Arc::new(MockConverter::new(dir.path().join("work"), mode));
        let ctx = AppContext::with_converter(config, converter.clone());

        Self {
            ctx,
            converter,
            media,
            dir,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// Mint a stream for the test media with the named profile.
    pub fn mint(&self, profile: &str) -> StreamId {
        let profile = match profile {
            "ts" => profile_ts(),
            "hls" => profile_hls(),
            "direct" => profile_direct(),
            other => panic!("unknown test profile {other}"),
        };
        self.ctx
            .registry
            .mint(self.media.clone(), profile, Duration::ZERO)
    }

    pub async fn session(&self, id: &StreamId) -> Arc<StreamSession> {
        self.ctx
            .registry
            .lookup(id)
            .await
            .expect("lookup failed")
            .expect("session missing")
    }

    /// Start an Axum server on a random port.
    pub async fn with_server(mode: MockMode) -> (Self, SocketAddr) {
        let harness = Self::new(mode);
        let app = harness.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

/// Streaming settings with short timeouts for tests.
pub fn test_streaming_config() -> StreamingConfig {
    StreamingConfig {
        segment_duration_secs: SEGMENT_SECS,
        encoder_wait_timeout_secs: 1,
        poll_interval_ms: 10,
        seek_window_bytes: 0,
        ..StreamingConfig::default()
    }
}

/// `GET /api/stream/{id}` with optional extra headers.
pub fn stream_request(id: &str, query: Option<&str>, headers: &[(&str, &str)]) -> Request<Body> {
    let uri = match query {
        Some(q) => format!("/api/stream/{id}?{q}"),
        None => format!("/api/stream/{id}"),
    };
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Poll `condition` every 10 ms for up to 2 s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
