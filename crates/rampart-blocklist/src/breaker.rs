//! Circuit breaker guarding the durable-write path.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::BreakerConfig;

const CLOSED: u32 = 0;
const OPEN: u32 = 1;
const HALF_OPEN: u32 = 2;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Writes attempted normally.
    Closed,
    /// Writes skipped entirely.
    Open,
    /// One trial batch allowed through.
    HalfOpen,
}

/// Consecutive-failure circuit breaker, atomics only.
///
/// Written by the single persistence-writer task, queried by many callers.
/// There is no timer task: the Open→HalfOpen transition happens lazily
/// inside [`CircuitBreaker::is_open`].
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    /// Instant of the last failure, as nanos since `started`.
    last_failure_nanos: AtomicU64,
    started: Instant,
    failure_threshold: u32,
    timeout: Duration,
    recovery_count: u32,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: AtomicU32::new(CLOSED),
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            last_failure_nanos: AtomicU64::new(0),
            started: Instant::now(),
            failure_threshold: config.failure_threshold.max(1),
            timeout: config.timeout,
            recovery_count: config.recovery_count.max(1),
        }
    }

    fn now_nanos(&self) -> u64 {
        self.started.elapsed().as_nanos() as u64
    }

    /// Whether writes should be skipped.
    ///
    /// Querying an Open breaker past its timeout flips it to HalfOpen and
    /// returns `false`, letting exactly one trial batch through.
    pub fn is_open(&self) -> bool {
        match self.state.load(Ordering::SeqCst) {
            OPEN => {
                let last = self.last_failure_nanos.load(Ordering::SeqCst);
                let elapsed = self.now_nanos().saturating_sub(last);
                if elapsed > self.timeout.as_nanos() as u64 {
                    if self
                        .state
                        .compare_exchange(OPEN, HALF_OPEN, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        self.successes.store(0, Ordering::SeqCst);
                        info!("circuit breaker half-open, allowing trial write");
                    }
                    false
                } else {
                    true
                }
            }
            // Closed, or half-open trial in progress.
            _ => false,
        }
    }

    /// Record a successful write attempt.
    pub fn record_success(&self) {
        match self.state.load(Ordering::SeqCst) {
            HALF_OPEN => {
                let successes = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.recovery_count {
                    self.state.store(CLOSED, Ordering::SeqCst);
                    self.failures.store(0, Ordering::SeqCst);
                    info!(successes, "circuit breaker closed after recovery");
                }
            }
            CLOSED => {
                self.failures.store(0, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    /// Record a failed write attempt.
    pub fn record_failure(&self) {
        self.last_failure_nanos.store(self.now_nanos(), Ordering::SeqCst);

        if self.state.load(Ordering::SeqCst) == HALF_OPEN {
            // Trial failed: straight back to open on a fresh timeout clock.
            self.state.store(OPEN, Ordering::SeqCst);
            warn!("circuit breaker re-opened after failed trial write");
            return;
        }

        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            self.state.store(OPEN, Ordering::SeqCst);
            warn!(failures, "circuit breaker opened");
        }
    }

    /// Current state, without the lazy transition side effect.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => BreakerState::Open,
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}
