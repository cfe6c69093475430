//! Encoder abstraction shared by the streaming engine and converter backends.
//!
//! A [`MediaConverter`] turns a [`TranscodeJob`] into an [`EncoderHandle`]: a
//! growing output (one file for progressive delivery, a directory of segments
//! for HLS) plus a progress channel. The backend keeps the matching
//! [`ProgressReporter`] and publishes what it has produced so far.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tcstream_common::{Container, EncoderPayloadKind, Error, Result, StreamId};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Extension of media segments produced for HLS delivery.
pub const SEGMENT_EXTENSION: &str = "ts";

/// File name of segment `index` in a segmented output.
pub fn segment_file_name(index: u32) -> String {
    format!("segment{index:05}.{SEGMENT_EXTENSION}")
}

/// Parse a segment file name back into its index and payload kind.
///
/// Accepts `segment<digits>.<ext>` where the extension maps to a payload kind,
/// e.g. `segment00005.ts` or `segment00012.vtt`. Anything else (including the
/// playlist) yields `None`.
pub fn parse_segment_file_name(name: &str) -> Option<(u32, EncoderPayloadKind)> {
    let name = name.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    let digits = stem.strip_prefix("segment")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let kind = EncoderPayloadKind::from_extension(ext)?;
    let index = digits.parse().ok()?;
    Some((index, kind))
}

/// Everything a converter needs to produce one stream.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Stream the output belongs to (used to name working directories).
    pub stream_id: StreamId,
    /// Source media file.
    pub source: PathBuf,
    /// Duration of the source.
    pub duration: Duration,
    /// Output container.
    pub container: Container,
    /// Target video codec name (`h264`, `hevc`, `vp9`, `copy`).
    pub video_codec: String,
    /// Target audio codec name (`aac`, `opus`, `copy`).
    pub audio_codec: String,
    /// Target video bitrate.
    pub video_bitrate_kbps: u32,
    /// Target audio bitrate.
    pub audio_bitrate_kbps: u32,
    /// Produce HLS segments instead of a single file.
    pub segmented: bool,
}

impl TranscodeJob {
    /// Expected output size at the nominal bitrate, in bytes.
    pub fn nominal_size(&self) -> u64 {
        let bits_per_sec =
            u64::from(self.video_bitrate_kbps + self.audio_bitrate_kbps) * 1000;
        (bits_per_sec as f64 / 8.0 * self.duration.as_secs_f64()) as u64
    }
}

/// Snapshot of what an encoder has produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderProgress {
    /// Bytes written to the output so far.
    pub bytes_written: u64,
    /// Media time encoded since the output's start position.
    pub encoded: Duration,
    /// Newest complete segment (segmented outputs only).
    pub last_segment: Option<u32>,
    /// The encoder reached the end of the source.
    pub finished: bool,
    /// The encoder died; carries the reason.
    pub failed: Option<String>,
}

impl EncoderProgress {
    /// Whether the encoder may still produce more data.
    pub fn is_running(&self) -> bool {
        !self.finished && self.failed.is_none()
    }
}

/// Immutable description of an encoder output.
#[derive(Debug, Clone)]
pub struct OutputInfo {
    /// Payload carried by the output.
    pub kind: EncoderPayloadKind,
    /// Output file (progressive) or segment directory (segmented).
    pub path: PathBuf,
    /// Media time that byte 0 (or the first segment) corresponds to.
    pub start: Duration,
    /// Index of the first segment produced (segmented outputs only).
    pub start_segment: u32,
    /// Whether the output is a directory of HLS segments.
    pub segmented: bool,
    /// Whether a player can consume the output while it grows.
    pub streamable: bool,
}

/// A running (or finished) encoder output owned by one stream session.
#[derive(Debug)]
pub struct EncoderHandle {
    info: OutputInfo,
    progress: watch::Receiver<EncoderProgress>,
    cancel: CancellationToken,
}

impl EncoderHandle {
    /// Create a handle and the reporter the backend uses to feed it.
    pub fn new(info: OutputInfo) -> (Self, ProgressReporter) {
        let (tx, rx) = watch::channel(EncoderProgress::default());
        let cancel = CancellationToken::new();
        let handle = Self {
            info,
            progress: rx,
            cancel: cancel.clone(),
        };
        (handle, ProgressReporter { tx, cancel })
    }

    pub fn info(&self) -> &OutputInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn start(&self) -> Duration {
        self.info.start
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> EncoderProgress {
        self.progress.borrow().clone()
    }

    /// A receiver that is notified on every progress update.
    pub fn subscribe(&self) -> watch::Receiver<EncoderProgress> {
        self.progress.clone()
    }

    /// Whether the output is still growing.
    pub fn is_partial(&self) -> bool {
        self.progress.borrow().is_running()
    }

    /// Ask the backend to stop producing and discard the output.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this output; usable after the handle is moved.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until `ready` holds or the encoder stops, bounded by `timeout`.
    ///
    /// Returns the progress snapshot that ended the wait; callers inspect it
    /// to tell "ready" from "encoder ended".
    pub async fn wait_until<F>(&self, timeout: Duration, mut ready: F) -> Result<EncoderProgress>
    where
        F: FnMut(&EncoderProgress) -> bool,
    {
        let mut rx = self.progress.clone();
        let waited = tokio::time::timeout(timeout, async {
            let seen = rx
                .wait_for(|p| ready(p) || !p.is_running())
                .await
                .map(|progress| progress.clone());
            match seen {
                Ok(progress) => progress,
                // Backend dropped its reporter; report whatever it left behind.
                Err(_) => rx.borrow().clone(),
            }
        })
        .await;

        waited.map_err(|_| Error::EncoderTimeout {
            waited_secs: timeout.as_secs(),
        })
    }
}

/// Backend side of an [`EncoderHandle`].
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<EncoderProgress>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    /// Apply an update and notify waiters.
    pub fn update(&self, f: impl FnOnce(&mut EncoderProgress)) {
        self.tx.send_modify(f);
    }

    /// Mark the output as complete.
    pub fn finish(&self) {
        self.tx.send_modify(|p| p.finished = true);
    }

    /// Mark the encoder as failed.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|p| p.failed = Some(reason));
    }

    pub fn current(&self) -> EncoderProgress {
        self.tx.borrow().clone()
    }

    /// Token cancelled when the owning session stops the output.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A produced HLS segment ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFile {
    pub index: u32,
    pub path: PathBuf,
    pub kind: EncoderPayloadKind,
}

/// Transcoder collaborator.
///
/// Implementations start, locate and stop encoder outputs. They never decide
/// *whether* to restart; that belongs to the session owning the handle.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    /// Start producing `job` from media time `start`.
    ///
    /// For segmented jobs `start` is a segment boundary and segment numbering
    /// begins at `start_segment`.
    async fn get_file_stream(
        &self,
        job: &TranscodeJob,
        start: Duration,
        start_segment: u32,
    ) -> Result<EncoderHandle>;

    /// Duration of one HLS segment.
    fn hls_segment_time_secs(&self) -> u32;

    /// Newest complete segment of a segmented output.
    fn get_segment_sequence(&self, handle: &EncoderHandle) -> Option<u32> {
        handle.progress().last_segment
    }

    /// Locate a produced segment, or `None` if the encoder has not finished it.
    async fn get_segment_file(
        &self,
        handle: &EncoderHandle,
        file_name: &str,
    ) -> Result<Option<SegmentFile>> {
        let Some((index, kind)) = parse_segment_file_name(file_name) else {
            return Ok(None);
        };
        if index < handle.info().start_segment {
            return Ok(None);
        }

        let progress = handle.progress();
        let complete = match progress.last_segment {
            Some(last) => index <= last,
            None => false,
        };
        let path = handle.path().join(file_name);
        if complete || (progress.finished && tokio::fs::try_exists(&path).await?) {
            return Ok(Some(SegmentFile { index, path, kind }));
        }
        Ok(None)
    }

    /// Stop an output and release its resources.
    async fn stop(&self, handle: EncoderHandle) {
        handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> OutputInfo {
        OutputInfo {
            kind: EncoderPayloadKind::Video,
            path: PathBuf::from("/tmp/out"),
            start: Duration::ZERO,
            start_segment: 0,
            segmented: true,
            streamable: true,
        }
    }

    #[test]
    fn segment_names_roundtrip() {
        assert_eq!(segment_file_name(5), "segment00005.ts");
        assert_eq!(
            parse_segment_file_name("segment00005.ts"),
            Some((5, EncoderPayloadKind::Video))
        );
        assert_eq!(
            parse_segment_file_name("segment00012.vtt"),
            Some((12, EncoderPayloadKind::Subtitle))
        );
    }

    #[test]
    fn non_segment_names_are_rejected() {
        assert_eq!(parse_segment_file_name("index.m3u8"), None);
        assert_eq!(parse_segment_file_name("segment.ts"), None);
        assert_eq!(parse_segment_file_name("segmentabc.ts"), None);
        assert_eq!(parse_segment_file_name("segment00001.m3u8"), None);
        assert_eq!(parse_segment_file_name("foo00001.ts"), None);
    }

    #[test]
    fn nominal_size_uses_total_bitrate() {
        let job = TranscodeJob {
            stream_id: StreamId::new(),
            source: PathBuf::from("/media/a.mkv"),
            duration: Duration::from_secs(10),
            container: Container::Mpegts,
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            video_bitrate_kbps: 3872,
            audio_bitrate_kbps: 128,
            segmented: false,
        };
        assert_eq!(job.nominal_size(), 5_000_000);
    }

    #[tokio::test]
    async fn wait_until_sees_progress() {
        let (handle, reporter) = EncoderHandle::new(info());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reporter.update(|p| p.last_segment = Some(3));
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let progress = handle
            .wait_until(Duration::from_secs(2), |p| p.last_segment >= Some(3))
            .await
            .unwrap();
        assert_eq!(progress.last_segment, Some(3));
    }

    #[tokio::test]
    async fn wait_until_times_out() {
        let (handle, _reporter) = EncoderHandle::new(info());
        let err = handle
            .wait_until(Duration::from_millis(30), |p| p.bytes_written > 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EncoderTimeout { .. }));
    }

    #[tokio::test]
    async fn wait_until_returns_when_encoder_fails() {
        let (handle, reporter) = EncoderHandle::new(info());
        reporter.fail("crashed");
        let progress = handle
            .wait_until(Duration::from_secs(1), |p| p.last_segment.is_some())
            .await
            .unwrap();
        assert_eq!(progress.failed.as_deref(), Some("crashed"));
        assert!(!handle.is_partial());
    }

    #[test]
    fn cancel_reaches_reporter() {
        let (handle, reporter) = EncoderHandle::new(info());
        assert!(!reporter.cancel_token().is_cancelled());
        handle.cancel();
        assert!(reporter.cancel_token().is_cancelled());
    }

    #[test]
    fn cancel_token_outlives_handle() {
        let (handle, reporter) = EncoderHandle::new(info());
        let token = handle.cancel_token();
        drop(handle);
        token.cancel();
        assert!(reporter.cancel_token().is_cancelled());
    }
}
