use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use crate::models::BreakerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Per-endpoint three-state gate. Only failures the classifier counts
/// (transient, rate-limit) are reported here; transitions are idempotent
/// under concurrent reports.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: AtomicU8,
    failures: AtomicU32,
    last_failure_ms: AtomicI64,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            state: AtomicU8::new(CLOSED),
            failures: AtomicU32::new(0),
            last_failure_ms: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            OPEN => BreakerState::Open,
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    /// Whether a call may proceed now. An Open breaker flips to HalfOpen once
    /// the recovery window has elapsed, admitting exactly one probe.
    pub fn allow(&self, now_ms: i64) -> bool {
        match self.state.load(Ordering::Acquire) {
            CLOSED | HALF_OPEN => true,
            _ => {
                let last = self.last_failure_ms.load(Ordering::Acquire);
                if now_ms.saturating_sub(last) >= self.settings.recovery_time_ms as i64 {
                    // Single winner transitions; losers stay rejected this tick
                    self.state
                        .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.state.store(CLOSED, Ordering::Release);
    }

    pub fn record_failure(&self, now_ms: i64) {
        self.last_failure_ms.store(now_ms, Ordering::Release);
        match self.state.load(Ordering::Acquire) {
            HALF_OPEN => {
                // Probe failed, back to Open with a saturated counter
                self.failures
                    .store(self.settings.failure_threshold, Ordering::Release);
                self.state.store(OPEN, Ordering::Release);
            }
            CLOSED => {
                let count = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if count >= self.settings.failure_threshold {
                    self.state.store(OPEN, Ordering::Release);
                }
            }
            _ => {}
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings {
            failure_threshold: threshold,
            recovery_time_ms: recovery_ms,
        })
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker(2, 500);
        assert!(b.allow(0));
        b.record_failure(10);
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure(20);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow(100));
    }

    #[test]
    fn half_open_after_recovery_then_closed_on_success() {
        let b = breaker(2, 500);
        b.record_failure(0);
        b.record_failure(10);
        assert!(!b.allow(400));
        // Recovery window elapsed: exactly one probe allowed
        assert!(b.allow(510));
        assert_eq!(b.state(), BreakerState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = breaker(2, 500);
        b.record_failure(0);
        b.record_failure(10);
        assert!(b.allow(600));
        b.record_failure(610);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow(700));
        // And recovers again relative to the new failure
        assert!(b.allow(1200));
    }

    #[test]
    fn success_resets_the_counter() {
        let b = breaker(3, 500);
        b.record_failure(0);
        b.record_failure(10);
        b.record_success();
        b.record_failure(20);
        b.record_failure(30);
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
