//! HLS segment dispatch.
//!
//! Segment `n` covers media time `[n * seg, (n + 1) * seg)`. The encoder is
//! started at a segment boundary with its numbering offset to match, so a
//! restart for segment `n` produces `segmentNNNNN.ts` files with the same
//! names a full encode would have.

use std::time::Duration;
use tcstream_av::{parse_segment_file_name, segment_file_name, MediaConverter, SegmentFile};
use tcstream_common::{EncoderPayloadKind, Error, Result};
use tcstream_media::{segment_count, MediaPlaylist};

use super::session::{EncoderSlot, StreamSession};
use crate::config::StreamingConfig;

/// Segment index named by a request's `file` parameter.
///
/// `segment00005.ts` → 5. The encoder muxes every track into the video
/// segments, so subtitle and audio names are rejected along with playlists
/// and anything else.
pub fn resolve_segment_index(file_name: &str) -> Result<u32> {
    match parse_segment_file_name(file_name) {
        Some((index, EncoderPayloadKind::Video)) => Ok(index),
        Some((_, kind)) => Err(Error::bad_request(format!(
            "no separate {kind} segments: {file_name}"
        ))),
        None => Err(Error::bad_request(format!("unknown segment file: {file_name}"))),
    }
}

/// Whether `file_name` asks for the playlist.
pub fn is_playlist(file_name: &str) -> bool {
    file_name.ends_with(".m3u8")
}

/// Decide whether the encoder must be restarted to serve segment `n`.
///
/// `current` is `(first segment, newest complete segment)` of a usable
/// output, or `None` when no encoder output is usable.
pub fn needs_restart(current: Option<(u32, Option<u32>)>, n: u32, jump_threshold: u32) -> bool {
    let Some((first, newest)) = current else {
        return true;
    };
    if n < first {
        return true;
    }
    // Until the first segment lands the encoder is working on `first`.
    let position = newest.unwrap_or(first);
    n > position.saturating_add(jump_threshold)
}

/// Maps segment requests onto a session's encoder output.
pub struct SegmentDispatcher<'a> {
    converter: &'a dyn MediaConverter,
    jump_threshold: u32,
    wait_timeout: Duration,
}

impl<'a> SegmentDispatcher<'a> {
    pub fn new(converter: &'a dyn MediaConverter, settings: &StreamingConfig) -> Self {
        Self {
            converter,
            jump_threshold: settings.segment_jump_threshold,
            wait_timeout: settings.encoder_wait_timeout(),
        }
    }

    pub fn segment_secs(&self) -> u32 {
        self.converter.hls_segment_time_secs().max(1)
    }

    /// Media time at which segment `n` begins.
    pub fn segment_start_time(&self, n: u32) -> Duration {
        Duration::from_secs(u64::from(n) * u64::from(self.segment_secs()))
    }

    /// Segment containing media time `t`.
    pub fn segment_index_at(&self, t: Duration) -> u32 {
        (t.as_secs() / u64::from(self.segment_secs())) as u32
    }

    pub fn segment_count(&self, session: &StreamSession) -> u32 {
        segment_count(session.duration(), self.segment_secs())
    }

    /// Ensure segment `n` exists and return it.
    ///
    /// Must be called with the session's busy lock held; `slot` is the
    /// guarded encoder slot.
    pub async fn request_segment(
        &self,
        session: &StreamSession,
        slot: &mut EncoderSlot,
        n: u32,
    ) -> Result<SegmentFile> {
        let count = self.segment_count(session);
        if n >= count {
            return Err(Error::segment_unavailable(
                n,
                format!("media has {count} segments"),
            ));
        }

        let current = slot
            .output
            .as_ref()
            .filter(|_| slot.is_usable())
            .map(|handle| (handle.info().start_segment, self.converter.get_segment_sequence(handle)));

        if needs_restart(current, n, self.jump_threshold) {
            tracing::info!(
                stream_id = %session.id(),
                segment = n,
                current = ?current,
                "Restarting encoder for segment"
            );
            session
                .start_output(slot, self.converter, self.segment_start_time(n), n)
                .await?;
        }

        let handle = slot
            .output
            .as_ref()
            .ok_or_else(|| Error::Internal("encoder output missing after start".into()))?;

        let progress = handle
            .wait_until(self.wait_timeout, |p| p.last_segment.is_some_and(|last| last >= n))
            .await?;
        if let Some(reason) = progress.failed {
            tracing::error!(stream_id = %session.id(), segment = n, reason = %reason, "Encoder failed");
            return Err(Error::segment_unavailable(n, reason));
        }

        match self.converter.get_segment_file(handle, &segment_file_name(n)).await? {
            Some(file) => {
                tracing::debug!(stream_id = %session.id(), segment = n, "Segment ready");
                Ok(file)
            }
            None => Err(Error::segment_unavailable(
                n,
                "encoder stopped before producing it",
            )),
        }
    }

    /// VOD playlist covering the whole media.
    pub fn playlist(&self, session: &StreamSession) -> MediaPlaylist {
        let id = session.id();
        MediaPlaylist::uniform(session.duration(), self.segment_secs(), |n| {
            format!("/api/stream/{id}?file={}", segment_file_name(n))
        })
    }
}
