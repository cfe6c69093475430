use crate::config::Config;
use crate::streaming::{
    self, start_cleanup_task, LocalFsAccessor, MediaCatalog, ProfileManager, StaticCatalog,
    StaticProfiles, StreamRegistry,
};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tcstream_av::{FfmpegConverter, MediaConverter};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

mod error;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Stream sessions
    pub registry: StreamRegistry,
    /// Media library
    pub catalog: Arc<dyn MediaCatalog>,
    /// Delivery profiles
    pub profiles: Arc<dyn ProfileManager>,
}

impl AppContext {
    /// Build a context around an explicit converter.
    pub fn with_converter(config: Config, converter: Arc<dyn MediaConverter>) -> Self {
        let registry = StreamRegistry::new(
            converter,
            Arc::new(LocalFsAccessor),
            config.streaming.clone(),
        );
        let catalog = Arc::new(StaticCatalog::new(config.media.clone()));
        let profiles = Arc::new(StaticProfiles::new(
            config.profiles.clone(),
            config.streaming.default_profile.clone(),
        ));

        Self {
            config: Arc::new(config),
            registry,
            catalog,
            profiles,
        }
    }

    /// Build a context backed by ffmpeg.
    pub fn from_config(config: Config) -> Result<Self> {
        let converter = FfmpegConverter::discover(
            config.transcoder.ffmpeg_path.as_deref(),
            config.streaming.work_dir.clone(),
            config.streaming.segment_duration_secs,
            config.transcoder.preset.clone(),
        )
        .context("ffmpeg is required for transcoding")?;

        Ok(Self::with_converter(config, Arc::new(converter)))
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::RANGE, header::IF_MODIFIED_SINCE])
        .expose_headers([header::CONTENT_RANGE, header::ACCEPT_RANGES, header::CONTENT_LENGTH]);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", streaming::stream_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let cleanup_interval = Duration::from_secs(config.streaming.cleanup_interval_secs.max(1));
    let ctx = AppContext::from_config(config)?;
    let registry = ctx.registry.clone();
    let cleanup = start_cleanup_task(registry.clone(), cleanup_interval);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    // Open transfers only end once their sessions are stopped.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            cleanup.abort();
            registry.stop_all().await;
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
