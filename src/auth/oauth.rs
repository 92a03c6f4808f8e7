use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::{ClientAuthMode, OAuth2Settings};
use crate::models::SourceError;
use crate::runtime::Clock;

#[derive(Debug, Clone)]
struct TokenState {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Client-credentials token holder. Readers observe the token atomically;
/// refresh happens on a fixed schedule in a background task, never on the
/// request path.
pub struct OAuth2Provider {
    settings: OAuth2Settings,
    token: RwLock<Option<TokenState>>,
}

impl OAuth2Provider {
    pub fn new(settings: OAuth2Settings) -> Self {
        Self {
            settings,
            token: RwLock::new(None),
        }
    }

    pub fn current_token(&self) -> Option<String> {
        self.token
            .read()
            .expect("Token lock poisoned")
            .as_ref()
            .map(|t| t.token.clone())
    }

    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.token
            .read()
            .expect("Token lock poisoned")
            .as_ref()
            .and_then(|t| t.expires_at)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.settings.refresh_interval_minutes * 60)
    }

    /// POST to the token URL and swap in the new token. A failure leaves the
    /// previous token in place.
    pub async fn refresh(&self, client: &reqwest::Client) -> crate::models::Result<()> {
        let mut form: Vec<(&str, String)> = vec![("grant_type", "client_credentials".to_string())];
        if let Some(scope) = &self.settings.scope {
            form.push(("scope", scope.clone()));
        }

        let mut request_builder = client.post(&self.settings.token_url);
        match self.settings.client_auth_mode {
            ClientAuthMode::Header => {
                request_builder = request_builder
                    .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret));
            }
            ClientAuthMode::Url => {
                form.push(("client_id", self.settings.client_id.clone()));
                form.push(("client_secret", self.settings.client_secret.clone()));
            }
        }

        let response = request_builder.form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Authentication(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        let token = body
            .get(&self.settings.token_property)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SourceError::Authentication(format!(
                    "Token response missing property {}",
                    self.settings.token_property
                ))
            })?
            .to_string();
        let expires_at = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        *self.token.write().expect("Token lock poisoned") = Some(TokenState { token, expires_at });
        tracing::debug!(expires_at = ?expires_at, "OAuth2 token refreshed");
        Ok(())
    }

    /// Long-lived renewal loop: sleep one refresh interval, refresh, repeat.
    /// The initial token fetch is done by the task before polling starts.
    /// Wakes on cancellation within one interval.
    pub fn spawn_refresher(
        self: Arc<Self>,
        client: reqwest::Client,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let provider = self;
        tokio::spawn(async move {
            let interval = provider.refresh_interval();
            loop {
                clock.sleep(&cancel, interval).await;
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = provider.refresh(&client).await {
                    tracing::warn!(error = %e, "OAuth2 refresh failed; keeping previous token");
                }
            }
        })
    }
}
