//! Stream registry: identifier → session map.
//!
//! Identifiers are minted by the stream initiation endpoint, which records a
//! pending ticket. The session itself is created on the first request that
//! resolves the identifier. Stopped and expired sessions stay in the map as
//! inactive tombstones until the cleanup sweep purges them, so late requests
//! see "no longer active" instead of "unknown".

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcstream_av::MediaConverter;
use tcstream_common::{Result, StreamId};

use super::catalog::MediaItem;
use super::profiles::DeliveryProfile;
use super::segments::SegmentDispatcher;
use super::session::{SessionSummary, StreamSession};
use super::source::ResourceAccessor;
use crate::config::StreamingConfig;

/// How long a stop waits for the busy lock before finishing in the background.
const STOP_LOCK_WAIT: Duration = Duration::from_millis(250);

/// A minted identifier whose session has not been created yet.
#[derive(Debug, Clone)]
pub struct StreamTicket {
    pub media: MediaItem,
    pub profile: DeliveryProfile,
    /// Position the encoder is warmed up at.
    pub start: Duration,
    issued: Instant,
}

/// Thread-safe registry of stream sessions.
#[derive(Clone)]
pub struct StreamRegistry {
    sessions: Arc<DashMap<StreamId, Arc<StreamSession>>>,
    tickets: Arc<DashMap<StreamId, StreamTicket>>,
    converter: Arc<dyn MediaConverter>,
    accessor: Arc<dyn ResourceAccessor>,
    settings: Arc<StreamingConfig>,
}

impl StreamRegistry {
    pub fn new(
        converter: Arc<dyn MediaConverter>,
        accessor: Arc<dyn ResourceAccessor>,
        settings: StreamingConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            tickets: Arc::new(DashMap::new()),
            converter,
            accessor,
            settings: Arc::new(settings),
        }
    }

    pub fn converter(&self) -> &dyn MediaConverter {
        self.converter.as_ref()
    }

    pub fn accessor(&self) -> &dyn ResourceAccessor {
        self.accessor.as_ref()
    }

    pub fn settings(&self) -> &StreamingConfig {
        &self.settings
    }

    pub fn dispatcher(&self) -> SegmentDispatcher<'_> {
        SegmentDispatcher::new(self.converter(), &self.settings)
    }

    /// Syntactic identifier check; never consults the map.
    pub fn validate(id: &str) -> bool {
        StreamId::validate(id)
    }

    /// Mint an identifier for a new stream.
    pub fn mint(&self, media: MediaItem, profile: DeliveryProfile, start: Duration) -> StreamId {
        let id = StreamId::new();
        tracing::info!(
            stream_id = %id,
            media_id = %media.id,
            profile = %profile.id,
            start_secs = start.as_secs_f64(),
            "Minted stream"
        );
        self.tickets.insert(
            id,
            StreamTicket {
                media,
                profile,
                start,
                issued: Instant::now(),
            },
        );
        id
    }

    /// Find a session, creating it from a pending ticket on first use.
    ///
    /// Returns inactive sessions too; callers decide what that means.
    pub async fn lookup(&self, id: &StreamId) -> Result<Option<Arc<StreamSession>>> {
        if let Some(session) = self.sessions.get(id) {
            return Ok(Some(Arc::clone(session.value())));
        }

        let Some(ticket) = self.tickets.get(id).map(|t| t.value().clone()) else {
            // A concurrent first lookup may have claimed the ticket meanwhile.
            return Ok(self.sessions.get(id).map(|s| Arc::clone(s.value())));
        };

        let (size, modified) = if ticket.profile.transcode {
            (0, Utc::now())
        } else {
            let size = self.accessor.size(&ticket.media.path).await?;
            let modified = self.accessor.modified(&ticket.media.path).await?;
            (size, modified)
        };

        let built = Arc::new(StreamSession::new(
            *id,
            ticket.media.clone(),
            ticket.profile.clone(),
            size,
            modified,
        ));
        let session = Arc::clone(self.sessions.entry(*id).or_insert_with(|| Arc::clone(&built)).value());
        self.tickets.remove(id);

        if Arc::ptr_eq(&session, &built) {
            tracing::debug!(stream_id = %id, "Session created");
            if ticket.profile.transcode && !ticket.start.is_zero() {
                if let Err(e) = self.start_session(&session, ticket.start).await {
                    tracing::warn!(stream_id = %id, error = %e, "Warm start failed");
                }
            }
        }

        Ok(Some(session))
    }

    /// (Re)start the session's encoder output at `from`.
    ///
    /// Segmented sessions start at the segment boundary preceding `from`.
    pub async fn start(&self, id: &StreamId, from: Duration) -> Result<()> {
        let session = self
            .lookup(id)
            .await?
            .filter(|s| s.is_active())
            .ok_or_else(|| tcstream_common::Error::inactive(id))?;
        self.start_session(&session, from).await
    }

    async fn start_session(&self, session: &StreamSession, from: Duration) -> Result<()> {
        let mut slot = session.busy().await;
        if !session.is_active() {
            return Err(tcstream_common::Error::inactive(session.id()));
        }
        let (at, start_segment) = if session.profile().segmented {
            let dispatcher = self.dispatcher();
            let index = dispatcher.segment_index_at(from);
            (dispatcher.segment_start_time(index), index)
        } else {
            (from, 0)
        };
        session
            .start_output(&mut slot, self.converter(), at, start_segment)
            .await
    }

    /// Stop a session: tear down its output and mark it inactive.
    ///
    /// Returns `false` for an unknown identifier.
    pub async fn stop(&self, id: &StreamId) -> bool {
        if self.tickets.remove(id).is_some() {
            tracing::info!(stream_id = %id, "Discarded pending stream");
            return true;
        }

        let Some(session) = self.sessions.get(id).map(|s| Arc::clone(s.value())) else {
            return false;
        };
        self.stop_session(&session).await;
        true
    }

    /// Mark the session inactive and tear down its output.
    ///
    /// The encoder is cancelled right away. If a transfer still holds the busy
    /// lock after [`STOP_LOCK_WAIT`], the output is released in the background
    /// once that transfer lets go.
    async fn stop_session(&self, session: &Arc<StreamSession>) {
        let was_active = session.deactivate();
        session.cancel_output();

        match tokio::time::timeout(STOP_LOCK_WAIT, session.busy()).await {
            Ok(mut slot) => session.stop_output(&mut slot, self.converter()).await,
            Err(_) => {
                tracing::debug!(
                    stream_id = %session.id(),
                    "Session busy, releasing output in background"
                );
                let session = Arc::clone(session);
                let converter = Arc::clone(&self.converter);
                tokio::spawn(async move {
                    let mut slot = session.busy().await;
                    session.stop_output(&mut slot, converter.as_ref()).await;
                });
            }
        }

        if was_active {
            tracing::info!(
                stream_id = %session.id(),
                media_id = %session.media().id,
                "Stopped stream session"
            );
        }
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().summary())
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Stop idle sessions and purge old tombstones and tickets.
    ///
    /// Returns the number of sessions stopped.
    pub async fn cleanup_expired(&self) -> usize {
        let timeout = self.settings.session_timeout();

        let expired: Vec<Arc<StreamSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_active() && entry.value().idle_for() > timeout)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for session in &expired {
            tracing::info!(
                stream_id = %session.id(),
                inactive_secs = session.idle_for().as_secs(),
                "Expired session stopped"
            );
        }
        join_all(expired.iter().map(|session| self.stop_session(session))).await;

        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session.is_active() || session.idle_for() <= timeout.saturating_mul(2)
        });
        let purged = before - self.sessions.len();
        self.tickets.retain(|_, ticket| ticket.issued.elapsed() <= timeout);

        if !expired.is_empty() || purged > 0 {
            tracing::debug!(stopped = expired.len(), purged, "Cleaned up sessions");
        }

        expired.len()
    }

    /// Stop every session; used at shutdown.
    pub async fn stop_all(&self) {
        let sessions: Vec<Arc<StreamSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        join_all(sessions.iter().map(|session| self.stop_session(session))).await;
        self.tickets.clear();
        tracing::info!(count = sessions.len(), "Stopped all stream sessions");
    }

    /// Number of known sessions, including inactive ones.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.tickets.len()
    }
}

/// Start a background task that periodically stops idle sessions.
pub fn start_cleanup_task(registry: StreamRegistry, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            registry.cleanup_expired().await;
        }
    })
}
