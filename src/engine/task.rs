use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::chaining::ChainingCoordinator;
use crate::config::{BehaviorOnError, ConnectorConfig};
use crate::engine::runner::{EndpointRunner, PollDeps, PollOutcome};
use crate::models::SourceError;
use crate::runtime::{Clock, IdentityTransform, OffsetStore, RecordSink, RecordTransform};

/// A running source task: an ordered set of endpoint runners driven either by
/// `run` (push style, self-paced) or `poll_once` (pull style, external
/// scheduler).
pub struct SourceTask {
    config: ConnectorConfig,
    endpoints: Vec<EndpointRunner>,
    coordinator: Arc<ChainingCoordinator>,
    auth: Arc<AuthProvider>,
    sink: Arc<dyn RecordSink>,
    store: Arc<dyn OffsetStore>,
    clock: Arc<dyn Clock>,
    transform: Arc<dyn RecordTransform>,
    cancel: CancellationToken,
    refresher: Option<tokio::task::JoinHandle<()>>,
    run_id: Uuid,
}

impl SourceTask {
    /// Build runners (loading stored cursors), fetch the initial OAuth2 token
    /// when configured, and start the token refresher.
    pub async fn start(
        config: ConnectorConfig,
        sink: Arc<dyn RecordSink>,
        store: Arc<dyn OffsetStore>,
        clock: Arc<dyn Clock>,
        transform: Option<Arc<dyn RecordTransform>>,
    ) -> crate::models::Result<Self> {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let coordinator = Arc::new(ChainingCoordinator::new(config.chaining.clone()));
        let auth = Arc::new(AuthProvider::from_settings(&config.auth));
        let transform = transform.unwrap_or_else(|| Arc::new(IdentityTransform));

        let mut refresher = None;
        if let Some(provider) = auth.oauth2() {
            let refresh_client = build_refresh_client(&config)?;
            if let Err(e) = provider.refresh(&refresh_client).await {
                tracing::warn!(error = %e, "Initial OAuth2 token fetch failed");
            }
            refresher = Some(Arc::clone(provider).spawn_refresher(
                refresh_client,
                Arc::clone(&clock),
                cancel.child_token(),
            ));
        }

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for settings in &config.endpoints {
            let chaining_pointer = settings.chaining_pointer.clone().or_else(|| {
                config
                    .parent_of(&settings.id)
                    .and_then(|pid| config.endpoint(pid))
                    .and_then(|parent| parent.chaining_pointer.clone())
            });
            let runner = EndpointRunner::prepare(
                settings.clone(),
                &config.base_url,
                config.proxy.as_ref(),
                &config.user_agent,
                chaining_pointer,
                store.as_ref(),
            )
            .await?;
            endpoints.push(runner);
        }

        tracing::info!(
            run_id = %run_id,
            endpoints = endpoints.len(),
            auth = auth.scheme_name(),
            "Source task started"
        );

        Ok(Self {
            config,
            endpoints,
            coordinator,
            auth,
            sink,
            store,
            clock,
            transform,
            cancel,
            refresher,
            run_id,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn coordinator(&self) -> &ChainingCoordinator {
        &self.coordinator
    }

    pub fn endpoint_runner(&self, id: &str) -> Option<&EndpointRunner> {
        self.endpoints.iter().find(|e| e.id() == id)
    }

    /// One dispatcher tick: iterate endpoints in order and poll every one
    /// that is due and unblocked. Returns the number of records emitted.
    pub async fn poll_once(&mut self) -> crate::models::Result<usize> {
        let mut emitted = 0;
        let deps = PollDeps {
            base_url: &self.config.base_url,
            auth: &self.auth,
            coordinator: &self.coordinator,
            sink: self.sink.as_ref(),
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            transform: self.transform.as_ref(),
            cancel: &self.cancel,
        };
        for runner in &mut self.endpoints {
            if self.cancel.is_cancelled() {
                break;
            }
            let now = deps.clock.now_ms();
            if !runner.should_poll(now, &self.coordinator) {
                continue;
            }
            match runner.poll(&deps).await {
                Ok(PollOutcome::Polled { records }) => emitted += records,
                Ok(PollOutcome::Skipped) => {}
                Err(e) => {
                    let category = e.category();
                    match self.config.behavior_on_error {
                        BehaviorOnError::Fail => {
                            tracing::error!(
                                endpoint = %runner.id(),
                                category = ?category,
                                error = %e,
                                "Poll failed; failing task"
                            );
                            return Err(e);
                        }
                        BehaviorOnError::Ignore => {
                            tracing::warn!(
                                endpoint = %runner.id(),
                                category = ?category,
                                error = %e,
                                "Poll failed; continuing"
                            );
                        }
                    }
                }
            }
        }
        Ok(emitted)
    }

    /// Self-paced loop: poll, sleep until the next endpoint is due, repeat
    /// until cancelled. With `behavior.on.error = FAIL` the first
    /// non-retriable failure surfaces here.
    pub async fn run(&mut self) -> crate::models::Result<()> {
        while !self.cancel.is_cancelled() {
            self.poll_once().await?;
            let delay = self.next_due_delay();
            self.clock.sleep(&self.cancel, delay).await;
        }
        self.drain().await
    }

    fn next_due_delay(&self) -> Duration {
        let now = self.clock.now_ms();
        let millis = self
            .endpoints
            .iter()
            .map(|e| e.millis_until_due(now))
            .min()
            .unwrap_or(1_000)
            .clamp(10, 1_000);
        Duration::from_millis(millis as u64)
    }

    /// Cancel and wait for background work within the stop deadline; after
    /// the deadline, in-flight work is dropped.
    pub async fn stop(mut self) -> crate::models::Result<()> {
        self.cancel.cancel();
        self.drain().await
    }

    async fn drain(&mut self) -> crate::models::Result<()> {
        if let Some(handle) = self.refresher.take() {
            let deadline = Duration::from_millis(self.config.stop_timeout_ms);
            if tokio::time::timeout(deadline, handle).await.is_err() {
                tracing::warn!(
                    run_id = %self.run_id,
                    "Refresher did not stop within the deadline; dropping it"
                );
            }
        }
        tracing::info!(run_id = %self.run_id, "Source task stopped");
        Ok(())
    }
}

fn build_refresh_client(config: &ConnectorConfig) -> crate::models::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(config.user_agent.clone());
    if let Some(p) = &config.proxy {
        let mut proxy = reqwest::Proxy::all(format!("http://{}:{}", p.host, p.port))
            .map_err(SourceError::Http)?;
        if let Some(user) = &p.user {
            proxy = proxy.basic_auth(user, p.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(SourceError::Http)
}
