use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::breaker::CircuitBreaker;
use crate::chaining::ChainingCoordinator;
use crate::engine::request::build_request;
use crate::http::{execute_with_retry, HttpClient, ProxySettings};
use crate::models::{
    offset_map, partition_for_url, EndpointSettings, SourceError, SourcePartition,
};
use crate::offsets::{build_strategy, partition_url, OffsetStrategy};
use crate::runtime::{Clock, OffsetStore, RecordSink, RecordTransform};
use crate::template;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Breaker open or otherwise gated; nothing was attempted.
    Skipped,
    Polled {
        records: usize,
    },
}

/// Borrowed collaborators for one poll. The runner owns everything
/// endpoint-scoped; shared state comes in through here.
pub struct PollDeps<'a> {
    pub base_url: &'a str,
    pub auth: &'a AuthProvider,
    pub coordinator: &'a ChainingCoordinator,
    pub sink: &'a dyn RecordSink,
    pub store: &'a dyn OffsetStore,
    pub clock: &'a dyn Clock,
    pub transform: &'a dyn RecordTransform,
    pub cancel: &'a CancellationToken,
}

/// One endpoint's polling state machine: pacing, cursor, breaker and HTTP
/// client. Mutated only by the owning task loop.
pub struct EndpointRunner {
    settings: EndpointSettings,
    partition: SourcePartition,
    strategy: Box<dyn OffsetStrategy>,
    client: HttpClient,
    breaker: CircuitBreaker,
    chaining_pointer: Option<String>,
    last_poll_ms: Option<i64>,
}

impl EndpointRunner {
    /// Build the runner: load the stored cursor for this endpoint's
    /// partition, seed the strategy with it, and construct the HTTP client.
    pub async fn prepare(
        settings: EndpointSettings,
        base_url: &str,
        proxy: Option<&ProxySettings>,
        user_agent: &str,
        chaining_pointer: Option<String>,
        store: &dyn OffsetStore,
    ) -> crate::models::Result<Self> {
        let partition = partition_for_url(&partition_url(&settings, base_url));
        let stored = store
            .load(&partition)
            .await?
            .and_then(|offset| crate::models::offset_value(&offset).map(str::to_string));
        let strategy = build_strategy(&settings, stored)?;
        let client = HttpClient::build(&settings, proxy, user_agent)?;
        let breaker = CircuitBreaker::new(settings.breaker.clone());
        Ok(Self {
            settings,
            partition,
            strategy,
            client,
            breaker,
            chaining_pointer,
            last_poll_ms: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    pub fn partition(&self) -> &SourcePartition {
        &self.partition
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn current_cursor(&self) -> Option<String> {
        self.strategy.current_cursor()
    }

    /// Interval currently in effect: the strategy's override (OData dual
    /// pacing) or the configured one.
    pub fn effective_interval_ms(&self) -> u64 {
        self.strategy
            .interval_override()
            .unwrap_or(self.settings.interval_ms)
    }

    pub fn millis_until_due(&self, now_ms: i64) -> i64 {
        match self.last_poll_ms {
            None => 0,
            Some(last) => last + self.effective_interval_ms() as i64 - now_ms,
        }
    }

    pub fn should_poll(&self, now_ms: i64, coordinator: &ChainingCoordinator) -> bool {
        self.millis_until_due(now_ms) <= 0 && coordinator.ready_for(&self.settings.id)
    }

    /// One full poll: gate on the breaker, build and execute the request,
    /// extract records, publish to the coordinator when this endpoint is a
    /// parent, emit, persist the cursor, advance.
    pub async fn poll(&mut self, deps: &PollDeps<'_>) -> crate::models::Result<PollOutcome> {
        let now = deps.clock.now_ms();
        if !self.breaker.allow(now) {
            tracing::debug!(endpoint = %self.settings.id, "Circuit open; skipping poll");
            return Ok(PollOutcome::Skipped);
        }
        self.last_poll_ms = Some(now);

        let disposition = self.strategy.request_cursor();
        let vars = deps
            .coordinator
            .variables_for(&self.settings.id, self.chaining_pointer.as_deref());
        let plan = build_request(&self.settings, deps.base_url, &disposition, &vars, deps.auth)?;

        let response = match execute_with_retry(
            &self.client,
            deps.auth,
            &plan,
            &self.settings.retry,
            deps.clock,
            deps.cancel,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.counts_for_breaker() {
                    self.breaker.record_failure(deps.clock.now_ms());
                }
                return Err(e);
            }
        };

        if response.body.trim().is_empty() {
            // Zero records; the cursor stays where it was
            self.breaker.record_success();
            return Ok(PollOutcome::Polled { records: 0 });
        }
        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| SourceError::DataFormat(format!("Response is not valid JSON: {}", e)))?;
        if body.is_null() {
            self.breaker.record_success();
            return Ok(PollOutcome::Polled { records: 0 });
        }

        let records = extract_records(&body, self.settings.data_pointer.as_deref());
        let record_count = records.len();

        if deps.coordinator.is_parent(&self.settings.id) {
            deps.coordinator
                .publish_parent(&self.settings.id, body.clone(), records.clone());
        }

        let derived = self.strategy.derive_next(&body, &records)?;

        let emit_ts = deps.clock.now_ms();
        for (i, record) in records.into_iter().enumerate() {
            let record = deps.transform.transform(record);
            let offset_value = derived
                .per_record
                .as_ref()
                .and_then(|v| v.get(i).cloned())
                .or_else(|| derived.cursor.clone())
                .unwrap_or_default();
            deps.sink
                .emit(
                    &self.partition,
                    &offset_map(&offset_value),
                    &self.settings.topic,
                    &record,
                    emit_ts,
                )
                .await?;
        }

        // Emit before persisting: a crash in between replays, never drops
        deps.store
            .save(
                &self.partition,
                &offset_map(derived.cursor.as_deref().unwrap_or_default()),
            )
            .await?;
        self.strategy.advance(derived.cursor.clone());
        self.breaker.record_success();

        tracing::debug!(
            endpoint = %self.settings.id,
            records = record_count,
            cursor = ?derived.cursor,
            elapsed_ms = response.elapsed.as_millis() as u64,
            "Poll complete"
        );
        Ok(PollOutcome::Polled {
            records: record_count,
        })
    }
}

/// Apply the data pointer (when configured) and normalize to a record list:
/// arrays flatten to their elements, a lone object is a single record, and
/// null or a missing path is an empty batch.
fn extract_records(body: &Value, data_pointer: Option<&str>) -> Vec<Value> {
    let target = match data_pointer {
        Some(ptr) => match template::pointer(body, ptr) {
            Some(v) => v,
            None => return Vec::new(),
        },
        None => body,
    };
    match target {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}
