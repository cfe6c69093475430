//! Direct play and the stream management endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{json, Value};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let response = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_direct_play_whole_file() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let id = harness.mint("direct");

    let response = send(&app, stream_request(&id.to_string(), None, &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("video/x-matroska"));
    assert_eq!(
        header(&response, "content-length"),
        Some(SOURCE_SIZE.to_string().as_str())
    );
    assert!(header(&response, "last-modified").is_some());
    assert_eq!(body_bytes(response).await, pattern(0, SOURCE_SIZE));
    assert_eq!(harness.converter.starts(), 0);
}

#[tokio::test]
async fn test_direct_play_byte_range() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let id = harness.mint("direct");

    let response = send(
        &app,
        stream_request(&id.to_string(), None, &[("range", "bytes=100-199")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-length"), Some("100"));
    assert_eq!(
        header(&response, "content-range"),
        Some(format!("bytes 100-199/{SOURCE_SIZE}").as_str())
    );
    assert_eq!(body_bytes(response).await, pattern(100, 100));

    let response = send(
        &app,
        stream_request(&id.to_string(), None, &[("range", "bytes=-50")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(response).await, pattern(SOURCE_SIZE - 50, 50));
}

#[tokio::test]
async fn test_direct_play_range_not_satisfiable() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let id = harness.mint("direct");

    let response = send(
        &app,
        stream_request(&id.to_string(), None, &[("range", "bytes=20000-")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header(&response, "content-range"),
        Some(format!("bytes */{SOURCE_SIZE}").as_str())
    );
}

#[tokio::test]
async fn test_unparseable_range_serves_whole_resource() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let id = harness.mint("direct");

    let response = send(
        &app,
        stream_request(&id.to_string(), None, &[("range", "bytes=abc")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-range").is_none());
    assert_eq!(body_bytes(response).await.len() as u64, SOURCE_SIZE);
}

#[tokio::test]
async fn test_if_modified_since() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let id = harness.mint("direct");

    let response = send(&app, stream_request(&id.to_string(), None, &[])).await;
    let last_modified = header(&response, "last-modified").unwrap().to_string();
    drop(response);

    let response = send(
        &app,
        stream_request(
            &id.to_string(),
            None,
            &[("if-modified-since", &last_modified)],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());

    let response = send(
        &app,
        stream_request(
            &id.to_string(),
            None,
            &[("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Garbage dates are ignored.
    let response = send(
        &app,
        stream_request(&id.to_string(), None, &[("if-modified-since", "yesterday")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_init_stream() {
    let harness = TestHarness::new(MockMode::Segments(3));
    let app = harness.router();

    let response = send(
        &app,
        post_json("/api/stream", json!({ "media_id": harness.media.id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let stream_id = body["stream_id"].as_str().unwrap();
    assert_eq!(body["url"], format!("/api/stream/{stream_id}"));
    // First configured profile is progressive.
    assert!(body.get("playlist_url").is_none());
    assert_eq!(harness.ctx.registry.pending(), 1);

    let response = send(
        &app,
        post_json(
            "/api/stream",
            json!({ "media_id": harness.media.id, "profile": "hls" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let stream_id = body["stream_id"].as_str().unwrap();
    assert_eq!(
        body["playlist_url"],
        format!("/api/stream/{stream_id}?file=index.m3u8")
    );
}

#[tokio::test]
async fn test_init_stream_rejects_unknown_inputs() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();

    let response = send(
        &app,
        post_json(
            "/api/stream",
            json!({ "media_id": tcstream_common::MediaItemId::new() }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        post_json(
            "/api/stream",
            json!({ "media_id": harness.media.id, "profile": "nope" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        post_json(
            "/api/stream",
            json!({ "media_id": harness.media.id, "start_secs": -1.0 }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.ctx.registry.pending(), 0);
}

#[tokio::test]
async fn test_init_stream_warm_start() {
    let harness = TestHarness::new(MockMode::Partial(200_000));
    let app = harness.router();

    let response = send(
        &app,
        post_json(
            "/api/stream",
            json!({ "media_id": harness.media.id, "profile": "ts", "start_secs": 25.0 }),
        ),
    )
    .await;
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let stream_id = body["stream_id"].as_str().unwrap().to_string();

    // First request for the warm start position reuses the running output.
    let response = send(
        &app,
        stream_request(&stream_id, None, &[("range", "bytes=250000-250009")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(response).await, pattern(250_000, 10));
    assert_eq!(harness.converter.starts(), 1);
    assert_eq!(
        harness.converter.last_start(),
        Some((std::time::Duration::from_secs(25), 0))
    );
}

#[tokio::test]
async fn test_stop_stream() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let id = harness.mint("ts");
    harness.session(&id).await;

    let response = send(&app, delete(&format!("/api/stream/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!harness.session(&id).await.is_active());

    let response = send(
        &app,
        delete(&format!("/api/stream/{}", tcstream_common::StreamId::new())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, delete("/api/stream/abc")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_streams() {
    let harness = TestHarness::new(MockMode::Complete);
    let app = harness.router();
    let first = harness.mint("ts");
    let second = harness.mint("direct");
    harness.session(&first).await;
    harness.session(&second).await;
    harness.ctx.registry.stop(&second).await;

    let response = send(
        &app,
        Request::builder()
            .uri("/api/streams")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let streams = body.as_array().unwrap();
    assert_eq!(streams.len(), 2);

    let find = |id: String| {
        streams
            .iter()
            .find(|s| s["stream_id"] == id)
            .cloned()
            .unwrap()
    };
    let first = find(first.to_string());
    assert_eq!(first["active"], true);
    assert_eq!(first["transcoding"], true);
    assert_eq!(first["profile"], "ts");
    assert_eq!(first["estimated_total_size"], TOTAL);
    let second = find(second.to_string());
    assert_eq!(second["active"], false);
    assert_eq!(second["transcoding"], false);
}

#[tokio::test]
async fn test_end_to_end_over_http() {
    let (harness, addr) = TestHarness::with_server(MockMode::Partial(200_000)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let response = client
        .post(format!("{base}/api/stream"))
        .json(&json!({ "media_id": harness.media.id, "profile": "ts" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let url = body["url"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{base}{url}"))
        .header("Range", "bytes=1000-1999")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()["content-range"],
        format!("bytes 1000-1999/{TOTAL}").as_str()
    );
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.to_vec(), pattern(1000, 1000));

    let response = client
        .delete(format!("{base}{url}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let response = client.get(format!("{base}{url}")).send().await.unwrap();
    assert_eq!(
        response.status(),
        reqwest::StatusCode::INTERNAL_SERVER_ERROR
    );
}
