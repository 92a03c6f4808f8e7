mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde_json::json;

use common::{props, spawn_server, start_task_with, MockClock};
use http_source_worker::{BreakerState, MemoryOffsetStore, MemoryRecordSink};

fn counting_route(hits: Arc<AtomicUsize>, failures_before_success: usize) -> Router {
    Router::new().route(
        "/v1/flaky",
        get(move || {
            let hits = hits.clone();
            async move {
                let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures_before_success {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({"error": "down"})),
                    )
                } else {
                    (StatusCode::OK, Json(json!({"data": [{"id": n}]})))
                }
            }
        }),
    )
}

fn flaky_settings() -> [(&'static str, &'static str); 9] {
    [
        ("apis.num", "1"),
        ("behavior.on.error", "IGNORE"),
        ("api1.http.api.path", "/flaky"),
        ("api1.topics", "flaky"),
        ("api1.request.interval.ms", "100"),
        ("api1.max.retries", "0"),
        ("api1.http.response.data.json.pointer", "/data"),
        ("api1.circuit.breaker.failure.threshold", "2"),
        ("api1.circuit.breaker.recovery.time.ms", "500"),
    ]
}

#[tokio::test]
async fn breaker_opens_skips_and_recovers_through_half_open() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_route(hits.clone(), 2);
    let base = spawn_server(app).await;

    let clock = MockClock::new(0);
    let sink = Arc::new(MemoryRecordSink::new());
    let store = Arc::new(MemoryOffsetStore::new());
    let map = props(&format!("{}/v1", base), &flaky_settings());
    let mut task = start_task_with(map, sink.clone(), store, Some(clock.clone())).await;

    // Two consecutive 503s open the breaker
    task.poll_once().await.unwrap();
    clock.advance(100);
    task.poll_once().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(
        task.endpoint_runner("api1").unwrap().breaker().state(),
        BreakerState::Open
    );

    // During the open window ticks are no-ops
    clock.advance(100);
    task.poll_once().await.unwrap();
    clock.advance(100);
    task.poll_once().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // Recovery elapsed: exactly one half-open probe, success closes it
    clock.advance(400);
    task.poll_once().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    let breaker = task.endpoint_runner("api1").unwrap().breaker();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn half_open_failure_reopens_the_breaker() {
    let hits = Arc::new(AtomicUsize::new(0));
    // Third call (the probe) still fails
    let app = counting_route(hits.clone(), 3);
    let base = spawn_server(app).await;

    let clock = MockClock::new(0);
    let sink = Arc::new(MemoryRecordSink::new());
    let store = Arc::new(MemoryOffsetStore::new());
    let map = props(&format!("{}/v1", base), &flaky_settings());
    let mut task = start_task_with(map, sink, store, Some(clock.clone())).await;

    task.poll_once().await.unwrap();
    clock.advance(100);
    task.poll_once().await.unwrap();
    assert_eq!(
        task.endpoint_runner("api1").unwrap().breaker().state(),
        BreakerState::Open
    );

    clock.advance(500);
    task.poll_once().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(
        task.endpoint_runner("api1").unwrap().breaker().state(),
        BreakerState::Open
    );

    // And it recovers again after another window
    clock.advance(600);
    task.poll_once().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(
        task.endpoint_runner("api1").unwrap().breaker().state(),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn auth_failures_do_not_trip_the_breaker() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/v1/secret",
        get(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauth"})))
            }
        }),
    );
    let base = spawn_server(app).await;

    let clock = MockClock::new(0);
    let sink = Arc::new(MemoryRecordSink::new());
    let store = Arc::new(MemoryOffsetStore::new());
    let map = props(
        &format!("{}/v1", base),
        &[
            ("apis.num", "1"),
            ("behavior.on.error", "IGNORE"),
            ("api1.http.api.path", "/secret"),
            ("api1.topics", "secret"),
            ("api1.request.interval.ms", "100"),
            ("api1.max.retries", "0"),
            ("api1.circuit.breaker.failure.threshold", "2"),
            ("api1.circuit.breaker.recovery.time.ms", "500"),
        ],
    );
    let mut task = start_task_with(map, sink, store, Some(clock.clone())).await;

    for _ in 0..4 {
        task.poll_once().await.unwrap();
        clock.advance(100);
    }
    // The endpoint stays callable: every tick reached the server
    assert_eq!(
        task.endpoint_runner("api1").unwrap().breaker().state(),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn data_format_errors_do_not_trip_the_breaker() {
    let app = Router::new().route("/v1/garbled", get(|| async { "not json {" }));
    let base = spawn_server(app).await;

    let clock = MockClock::new(0);
    let sink = Arc::new(MemoryRecordSink::new());
    let store = Arc::new(MemoryOffsetStore::new());
    let map = props(
        &format!("{}/v1", base),
        &[
            ("apis.num", "1"),
            ("behavior.on.error", "IGNORE"),
            ("api1.http.api.path", "/garbled"),
            ("api1.topics", "garbled"),
            ("api1.request.interval.ms", "100"),
            ("api1.circuit.breaker.failure.threshold", "1"),
        ],
    );
    let mut task = start_task_with(map, sink, store, Some(clock.clone())).await;

    task.poll_once().await.unwrap();
    clock.advance(100);
    task.poll_once().await.unwrap();
    assert_eq!(
        task.endpoint_runner("api1").unwrap().breaker().state(),
        BreakerState::Closed
    );
}
