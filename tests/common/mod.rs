#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio_util::sync::CancellationToken;

use http_source_worker::runtime::Clock;
use http_source_worker::{ConnectorConfig, MemoryOffsetStore, MemoryRecordSink, SourceTask};

/// Bind an axum router on an ephemeral port and serve it in the background.
/// Returns the base URL.
pub async fn spawn_server(app: Router) -> String {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

/// Connector property map: the static pairs plus the base URL of the mock
/// server.
pub fn props(base_url: &str, pairs: &[(&str, &str)]) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.insert("http.api.base.url".to_string(), base_url.to_string());
    map
}

/// Manually advanced clock. `sleep` blocks until the clock has been advanced
/// past the target (or cancellation), so background loops only progress when
/// a test moves time forward.
pub struct MockClock {
    now: AtomicI64,
}

impl MockClock {
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_ms),
        })
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, cancel: &CancellationToken, duration: Duration) {
        let target = self.now_ms() + duration.as_millis() as i64;
        while !cancel.is_cancelled() && self.now_ms() < target {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

pub struct Harness {
    pub task: SourceTask,
    pub sink: Arc<MemoryRecordSink>,
    pub store: Arc<MemoryOffsetStore>,
}

/// Start a task over a fresh in-memory sink/store pair with the system clock.
pub async fn start_task(map: HashMap<String, String>) -> Harness {
    let sink = Arc::new(MemoryRecordSink::new());
    let store = Arc::new(MemoryOffsetStore::new());
    let task = start_task_with(map, sink.clone(), store.clone(), None).await;
    Harness { task, sink, store }
}

pub async fn start_task_with(
    map: HashMap<String, String>,
    sink: Arc<MemoryRecordSink>,
    store: Arc<MemoryOffsetStore>,
    clock: Option<Arc<dyn Clock>>,
) -> SourceTask {
    let config = ConnectorConfig::parse(&map).unwrap();
    let clock = clock.unwrap_or_else(|| Arc::new(http_source_worker::SystemClock));
    SourceTask::start(config, sink, store, clock, None)
        .await
        .unwrap()
}
