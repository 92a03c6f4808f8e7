use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::http::{HttpClient, HttpResponse, RequestPlan};
use crate::models::{BackoffPolicy, RetrySettings, SourceError};
use crate::runtime::Clock;

/// Statuses retried regardless of the configured ranges.
pub const ALWAYS_RETRY_STATUSES: [u16; 6] = [401, 408, 429, 502, 503, 504];

pub fn is_retryable_status(settings: &RetrySettings, status: u16) -> bool {
    ALWAYS_RETRY_STATUSES.contains(&status) || settings.retry_on_status.contains(status)
}

/// Delay before retry attempt `attempt` (1-based). Exponential backoff is
/// jittered by a uniform factor in [0.5, 1.5].
pub fn backoff_delay(settings: &RetrySettings, attempt: u32) -> Duration {
    match settings.backoff_policy {
        BackoffPolicy::ConstantValue => Duration::from_millis(settings.backoff_ms),
        BackoffPolicy::ExponentialWithJitter => {
            let exp = settings.backoff_ms.saturating_mul(1u64 << (attempt - 1).min(32)) as f64;
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
            Duration::from_millis((exp * factor) as u64)
        }
    }
}

/// Bounded retry loop around a single request plan: up to `max_retries`
/// additional attempts on retryable statuses and transport errors.
pub async fn execute_with_retry(
    client: &HttpClient,
    auth: &AuthProvider,
    plan: &RequestPlan,
    settings: &RetrySettings,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> crate::models::Result<HttpResponse> {
    let mut attempt: u32 = 0;
    loop {
        match client.execute(plan, auth).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                let retryable = match &e {
                    SourceError::Status { status, .. } => is_retryable_status(settings, *status),
                    // Transport I/O is retried like transient
                    SourceError::Http(_) => true,
                    _ => false,
                };
                if !retryable || attempt >= settings.max_retries || cancel.is_cancelled() {
                    return Err(e);
                }
                attempt += 1;
                let delay = backoff_delay(settings, attempt);
                tracing::warn!(
                    url = %plan.url,
                    attempt = attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Request failed; retrying"
                );
                clock.sleep(cancel, delay).await;
                if cancel.is_cancelled() {
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatusRanges;

    fn settings(policy: BackoffPolicy) -> RetrySettings {
        RetrySettings {
            max_retries: 3,
            backoff_policy: policy,
            backoff_ms: 100,
            retry_on_status: StatusRanges::default(),
        }
    }

    #[test]
    fn always_retry_set_is_honoured() {
        let s = RetrySettings {
            retry_on_status: StatusRanges::parse("").unwrap(),
            ..settings(BackoffPolicy::ConstantValue)
        };
        for code in ALWAYS_RETRY_STATUSES {
            assert!(is_retryable_status(&s, code), "status {}", code);
        }
        assert!(!is_retryable_status(&s, 404));
    }

    #[test]
    fn configured_ranges_are_additive() {
        let s = settings(BackoffPolicy::ConstantValue);
        // default range 400- makes any client or server error retryable
        assert!(is_retryable_status(&s, 404));
        assert!(is_retryable_status(&s, 500));
        assert!(!is_retryable_status(&s, 302));
    }

    #[test]
    fn constant_backoff_is_flat() {
        let s = settings(BackoffPolicy::ConstantValue);
        assert_eq!(backoff_delay(&s, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&s, 5), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_stays_within_jitter_bounds() {
        let s = settings(BackoffPolicy::ExponentialWithJitter);
        for attempt in 1..=5u32 {
            let base = 100u64 * (1 << (attempt - 1));
            for _ in 0..50 {
                let d = backoff_delay(&s, attempt).as_millis() as u64;
                assert!(
                    d >= base / 2 && d <= base * 3 / 2,
                    "attempt {} delay {} outside [{}, {}]",
                    attempt,
                    d,
                    base / 2,
                    base * 3 / 2
                );
            }
        }
    }
}
