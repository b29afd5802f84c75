//! Three-state circuit breaker.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls allowed, failures counted.
    Closed,
    /// Calls rejected until the recovery timeout elapses.
    Open,
    /// One trial call allowed.
    HalfOpen,
}

/// Rejects calls to a failing service until it has had time to recover.
///
/// `closed` opens after `failure_threshold` consecutive failures. `open`
/// becomes `half_open` once `recovery_timeout` has elapsed and lets exactly
/// one trial call through; its success closes the breaker, its failure
/// re-opens it and restarts the timeout.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    /// New closed breaker. A threshold of zero is treated as one.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    /// Current state, without applying the recovery timeout.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures counted while closed.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a call may proceed now.
    pub fn allow_request(&mut self) -> bool {
        self.allow_request_at(Instant::now())
    }

    /// Whether a call may proceed at `now`. Grants the single half-open
    /// trial when the recovery timeout has elapsed.
    pub fn allow_request_at(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map_or(self.recovery_timeout, |at| now.saturating_duration_since(at));
                if elapsed >= self.recovery_timeout {
                    info!("circuit half-open, allowing trial call");
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!("circuit closed after successful trial");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    /// Record a failed call observed at `now`.
    pub fn record_failure_at(&mut self, now: Instant) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    warn!(failures = self.consecutive_failures, "circuit opened");
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!("trial call failed, circuit re-opened");
                self.open(now);
            }
            CircuitState::Open => self.opened_at = Some(now),
        }
    }

    /// Give back a granted half-open trial that was never attempted.
    pub fn cancel_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }
}
