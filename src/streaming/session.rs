//! Per-stream session state.
//!
//! A session owns at most one encoder output. The output, its start position
//! and its byte offset live in an [`EncoderSlot`] behind the session's busy
//! lock; everything that reads or replaces the output holds the lock.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcstream_av::{EncoderHandle, MediaConverter, TranscodeJob};
use tcstream_common::{MediaItemId, Result, StreamId};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use super::catalog::MediaItem;
use super::profiles::DeliveryProfile;
use super::range::{corrected_estimate, time_to_byte};

/// What the session knows about its output.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscoderState {
    /// Output comes from the encoder rather than the source file.
    pub is_transcoding: bool,
    /// The encoder produced the whole media from position 0; its size is exact.
    pub is_transcoded: bool,
    /// Output is HLS segments.
    pub is_segmented: bool,
    /// The current output can be played while it grows.
    pub is_streamable: bool,
    pub mime: Option<String>,
    /// Last time the output changed; drives `Last-Modified`.
    pub last_updated: DateTime<Utc>,
    /// Size of the whole output, estimated while transcoding.
    pub estimated_total_size: u64,
    pub actual_duration: Duration,
}

/// Encoder output guarded by the busy lock.
#[derive(Debug, Default)]
pub struct EncoderSlot {
    pub output: Option<EncoderHandle>,
    /// Media time byte 0 of `output` corresponds to.
    pub start_position: Duration,
    /// Client-visible byte offset of byte 0 of `output`.
    pub base_offset: u64,
}

impl EncoderSlot {
    /// Bytes the current output has produced.
    pub fn produced(&self) -> u64 {
        self.output
            .as_ref()
            .map_or(0, |handle| handle.progress().bytes_written)
    }

    /// Whether there is an output that has not failed.
    pub fn is_usable(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|handle| handle.progress().failed.is_none())
    }

    /// Whether client byte `from` can be served from the current output.
    ///
    /// The request must not start before the output, and may start at most
    /// `seek_window` bytes past what has been produced.
    pub fn covers(&self, from: u64, seek_window: u64) -> bool {
        if !self.is_usable() || from < self.base_offset {
            return false;
        }
        from - self.base_offset <= self.produced().saturating_add(seek_window)
    }
}

/// Guard of a session's busy lock.
pub type BusyGuard = OwnedMutexGuard<EncoderSlot>;

/// One client playback attempt.
#[derive(Debug)]
pub struct StreamSession {
    id: StreamId,
    media: MediaItem,
    profile: DeliveryProfile,
    state: RwLock<TranscoderState>,
    busy: Arc<tokio::sync::Mutex<EncoderSlot>>,
    active: AtomicBool,
    /// Cancelled when the session is stopped; open transfers watch it.
    stopped: CancellationToken,
    /// Cancels the current output without taking the busy lock.
    output_cancel: Mutex<Option<CancellationToken>>,
    last_access: Mutex<Instant>,
    started_at: DateTime<Utc>,
}

impl StreamSession {
    /// Create a session.
    ///
    /// `source_size` and `source_modified` describe the source file and are
    /// only used for direct play.
    pub fn new(
        id: StreamId,
        media: MediaItem,
        profile: DeliveryProfile,
        source_size: u64,
        source_modified: DateTime<Utc>,
    ) -> Self {
        let duration = media.duration();
        let state = if profile.transcode {
            let mut state = TranscoderState {
                is_transcoding: true,
                is_transcoded: false,
                is_segmented: profile.segmented,
                is_streamable: true,
                mime: Some(profile.mime().to_string()),
                last_updated: Utc::now(),
                estimated_total_size: 0,
                actual_duration: duration,
            };
            state.estimated_total_size = job_for(id, &media, &profile).nominal_size();
            state
        } else {
            TranscoderState {
                is_transcoding: false,
                is_transcoded: false,
                is_segmented: false,
                is_streamable: true,
                mime: media.mime().ok(),
                last_updated: source_modified,
                estimated_total_size: source_size,
                actual_duration: duration,
            }
        };

        Self {
            id,
            media,
            profile,
            state: RwLock::new(state),
            busy: Arc::new(tokio::sync::Mutex::new(EncoderSlot::default())),
            active: AtomicBool::new(true),
            stopped: CancellationToken::new(),
            output_cancel: Mutex::new(None),
            last_access: Mutex::new(Instant::now()),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn media(&self) -> &MediaItem {
        &self.media
    }

    pub fn profile(&self) -> &DeliveryProfile {
        &self.profile
    }

    pub fn duration(&self) -> Duration {
        self.state.read().actual_duration
    }

    /// Snapshot of the transcoder state.
    pub fn state(&self) -> TranscoderState {
        self.state.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark the session inactive. Returns `false` if it already was.
    ///
    /// Open transfers end on their next poll and release the busy lock.
    pub fn deactivate(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        self.stopped.cancel();
        was_active
    }

    /// Token cancelled once the session is stopped.
    pub fn stopped_token(&self) -> CancellationToken {
        self.stopped.clone()
    }

    /// Cancel the current output's encoder without the busy lock.
    ///
    /// The output stays in the slot until [`StreamSession::stop_output`].
    pub fn cancel_output(&self) {
        if let Some(token) = self.output_cancel.lock().as_ref() {
            token.cancel();
        }
    }

    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// Acquire the busy lock.
    pub async fn busy(&self) -> BusyGuard {
        self.busy.clone().lock_owned().await
    }

    /// Encoder job for this session.
    pub fn job(&self) -> TranscodeJob {
        job_for(self.id, &self.media, &self.profile)
    }

    /// MIME type of the delivered bytes.
    pub fn mime(&self) -> Result<String> {
        match self.state.read().mime.clone() {
            Some(mime) => Ok(mime),
            None => self.media.mime(),
        }
    }

    /// Replace the current output with one starting at `at`.
    ///
    /// The previous output is stopped first. On failure the slot is left
    /// empty and the session stays active.
    pub async fn start_output(
        &self,
        slot: &mut EncoderSlot,
        converter: &dyn MediaConverter,
        at: Duration,
        start_segment: u32,
    ) -> Result<()> {
        if let Some(previous) = slot.output.take() {
            tracing::debug!(
                stream_id = %self.id,
                start_secs = slot.start_position.as_secs_f64(),
                "Stopping previous encoder output"
            );
            converter.stop(previous).await;
        }

        let job = self.job();
        let handle = match converter.get_file_stream(&job, at, start_segment).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    stream_id = %self.id,
                    start_secs = at.as_secs_f64(),
                    error = %e,
                    "Failed to start encoder"
                );
                return Err(e);
            }
        };

        *self.output_cancel.lock() = Some(handle.cancel_token());
        let streamable = handle.info().streamable;
        if !streamable {
            tracing::warn!(
                stream_id = %self.id,
                container = %self.profile.container,
                "Encoder output is not streamable, delivering anyway"
            );
        }

        let mut state = self.state.write();
        slot.start_position = at;
        slot.base_offset = time_to_byte(at, state.estimated_total_size, state.actual_duration);
        slot.output = Some(handle);
        state.is_streamable = streamable;
        state.is_transcoded = false;
        state.last_updated = Utc::now();

        tracing::info!(
            stream_id = %self.id,
            start_secs = at.as_secs_f64(),
            start_segment,
            base_offset = slot.base_offset,
            "Encoder output started"
        );
        Ok(())
    }

    /// Stop and discard the current output.
    pub async fn stop_output(&self, slot: &mut EncoderSlot, converter: &dyn MediaConverter) {
        self.output_cancel.lock().take();
        if let Some(handle) = slot.output.take() {
            converter.stop(handle).await;
        }
        slot.start_position = Duration::ZERO;
        slot.base_offset = 0;
    }

    /// Fold the encoder's progress into the size estimate.
    ///
    /// A non-segmented output that started at 0 and finished has an exact
    /// size, and the session switches to serving it as a complete file.
    pub fn observe(&self, slot: &EncoderSlot) {
        let Some(handle) = slot.output.as_ref() else {
            return;
        };
        let progress = handle.progress();
        let mut state = self.state.write();
        if !state.is_transcoding || state.is_transcoded {
            return;
        }

        if progress.finished && slot.start_position.is_zero() && !state.is_segmented {
            state.is_transcoded = true;
            state.estimated_total_size = progress.bytes_written;
            tracing::info!(
                stream_id = %self.id,
                size = progress.bytes_written,
                "Transcode complete"
            );
            return;
        }

        if progress.failed.is_none() {
            let estimate = corrected_estimate(
                state.estimated_total_size,
                progress.bytes_written,
                progress.encoded,
                state.actual_duration,
            );
            let floor = slot.base_offset.saturating_add(progress.bytes_written);
            state.estimated_total_size = estimate.max(floor);
        }
    }

    /// File holding the complete output, once transcoded.
    pub fn transcoded_path(&self, slot: &EncoderSlot) -> Option<PathBuf> {
        if !self.state.read().is_transcoded {
            return None;
        }
        slot.output.as_ref().map(|handle| handle.path().to_path_buf())
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.state.read();
        SessionSummary {
            stream_id: self.id.to_string(),
            media_id: self.media.id,
            title: self.media.title.clone(),
            profile: self.profile.id.clone(),
            active: self.is_active(),
            transcoding: state.is_transcoding,
            transcoded: state.is_transcoded,
            segmented: state.is_segmented,
            estimated_total_size: state.estimated_total_size,
            duration_secs: state.actual_duration.as_secs_f64(),
            idle_secs: self.idle_for().as_secs(),
            started_at: self.started_at,
        }
    }
}

fn job_for(id: StreamId, media: &MediaItem, profile: &DeliveryProfile) -> TranscodeJob {
    TranscodeJob {
        stream_id: id,
        source: media.path.clone(),
        duration: media.duration(),
        container: profile.container,
        video_codec: profile.video_codec.clone(),
        audio_codec: profile.audio_codec.clone(),
        video_bitrate_kbps: profile.video_bitrate_kbps,
        audio_bitrate_kbps: profile.audio_bitrate_kbps,
        segmented: profile.segmented,
    }
}

/// Session as reported by the management API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub stream_id: String,
    pub media_id: MediaItemId,
    pub title: Option<String>,
    pub profile: String,
    pub active: bool,
    pub transcoding: bool,
    pub transcoded: bool,
    pub segmented: bool,
    pub estimated_total_size: u64,
    pub duration_secs: f64,
    pub idle_secs: u64,
    pub started_at: DateTime<Utc>,
}
