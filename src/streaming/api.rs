//! HTTP handlers for stream delivery and stream management.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tcstream_common::{Error, MediaItemId, StreamId};

use super::retrieve::{retrieve_stream, StreamRequest};
use super::session::SessionSummary;
use crate::server::{AppContext, AppError};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// HLS playlist or segment file name.
    pub file: Option<String>,
}

/// `GET /api/stream/:stream_id`
pub async fn get_stream(
    State(ctx): State<AppContext>,
    Path(stream_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let request = StreamRequest {
        file: query.file,
        range: header_str(header::RANGE),
        if_modified_since: header_str(header::IF_MODIFIED_SINCE),
    };

    Ok(retrieve_stream(&ctx.registry, &stream_id, request).await?)
}

#[derive(Debug, Deserialize)]
pub struct InitStreamRequest {
    pub media_id: MediaItemId,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub start_secs: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitStreamResponse {
    pub stream_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub playlist_url: Option<String>,
}

/// `POST /api/stream`: mint a stream for a media item.
pub async fn init_stream(
    State(ctx): State<AppContext>,
    Json(request): Json<InitStreamRequest>,
) -> Result<(StatusCode, Json<InitStreamResponse>), AppError> {
    let media = ctx
        .catalog
        .get(&request.media_id)
        .ok_or_else(|| Error::not_found("media", request.media_id))?;

    let profile = match request.profile {
        Some(id) => ctx
            .profiles
            .profile(&id)
            .ok_or_else(|| Error::not_found("profile", id))?,
        None => ctx
            .profiles
            .default_profile(&media)
            .ok_or_else(|| Error::not_found("profile", "default"))?,
    };

    let start = match request.start_secs {
        None => Duration::ZERO,
        Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => return Err(Error::bad_request(format!("invalid start position: {secs}")).into()),
    };

    let segmented = profile.segmented;
    let id = ctx.registry.mint(media, profile, start);
    let url = format!("/api/stream/{id}");
    let playlist_url = segmented.then(|| format!("{url}?file=index.m3u8"));

    Ok((
        StatusCode::CREATED,
        Json(InitStreamResponse {
            stream_id: id.to_string(),
            url,
            playlist_url,
        }),
    ))
}

/// `DELETE /api/stream/:stream_id`
pub async fn stop_stream(
    State(ctx): State<AppContext>,
    Path(stream_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: StreamId = stream_id.parse()?;
    if ctx.registry.stop(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("stream", id).into())
    }
}

/// `GET /api/streams`
pub async fn list_streams(State(ctx): State<AppContext>) -> Json<Vec<SessionSummary>> {
    Json(ctx.registry.list())
}
