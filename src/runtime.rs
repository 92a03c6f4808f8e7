use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::models::{SourceOffset, SourcePartition};

/// Downstream record sink. Blocks until the record is accepted; no further
/// back-pressure contract.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(
        &self,
        partition: &SourcePartition,
        offset: &SourceOffset,
        topic: &str,
        record: &Value,
        timestamp_ms: i64,
    ) -> crate::models::Result<()>;
}

/// Durable cursor storage, keyed by the endpoint's partition map.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn load(&self, partition: &SourcePartition) -> crate::models::Result<Option<SourceOffset>>;
    async fn save(
        &self,
        partition: &SourcePartition,
        offset: &SourceOffset,
    ) -> crate::models::Result<()>;
}

/// Time source for pacing and breaker decisions. `sleep` returns early when
/// the cancellation token fires.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
    async fn sleep(&self, cancel: &CancellationToken, duration: Duration);
}

/// Per-record hook applied before emitting. Identity by default.
pub trait RecordTransform: Send + Sync {
    fn transform(&self, record: Value) -> Value;
}

pub struct IdentityTransform;

impl RecordTransform for IdentityTransform {
    fn transform(&self, record: Value) -> Value {
        record
    }
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, cancel: &CancellationToken, duration: Duration) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmittedRecord {
    pub partition: SourcePartition,
    pub offset: SourceOffset,
    pub topic: String,
    pub record: Value,
    pub timestamp_ms: i64,
}

/// In-memory sink collecting emitted records in order.
#[derive(Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<EmittedRecord>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EmittedRecord> {
        self.records.lock().expect("Sink mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("Sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn emit(
        &self,
        partition: &SourcePartition,
        offset: &SourceOffset,
        topic: &str,
        record: &Value,
        timestamp_ms: i64,
    ) -> crate::models::Result<()> {
        self.records
            .lock()
            .expect("Sink mutex poisoned")
            .push(EmittedRecord {
                partition: partition.clone(),
                offset: offset.clone(),
                topic: topic.to_string(),
                record: record.clone(),
                timestamp_ms,
            });
        Ok(())
    }
}

fn partition_key(partition: &SourcePartition) -> String {
    // Stable rendering regardless of map iteration order
    let sorted: BTreeMap<&str, &str> = partition
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

/// In-memory offset store; survives task restarts within one process, which
/// is all the at-least-once tests need.
#[derive(Default)]
pub struct MemoryOffsetStore {
    entries: Mutex<HashMap<String, SourceOffset>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn load(&self, partition: &SourcePartition) -> crate::models::Result<Option<SourceOffset>> {
        Ok(self
            .entries
            .lock()
            .expect("Store mutex poisoned")
            .get(&partition_key(partition))
            .cloned())
    }

    async fn save(
        &self,
        partition: &SourcePartition,
        offset: &SourceOffset,
    ) -> crate::models::Result<()> {
        self.entries
            .lock()
            .expect("Store mutex poisoned")
            .insert(partition_key(partition), offset.clone());
        Ok(())
    }
}
