//! Resiliency primitives used by every external-facing call.
//!
//! [`ServiceGuard`] composes the three for one service: the circuit breaker
//! is consulted first, then the rate limiter, then the call runs under the
//! retry policy.

pub mod breaker;
pub mod rate_limit;
pub mod retry;

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::ResilienceConfig;
use crate::{AppError, Result};

pub use breaker::{CircuitBreaker, CircuitState};
pub use rate_limit::RateLimiter;
pub use retry::{retry, RetryPolicy};

/// Breaker, limiter and retry policy for one external service.
#[derive(Debug, Clone)]
pub struct ServiceGuard {
    service: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
}

impl ServiceGuard {
    /// Guard configured from the `[resilience]` section.
    #[must_use]
    pub fn from_config(service: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self::new(
            service,
            RetryPolicy::from_config(config),
            CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.recovery_timeout_seconds),
            ),
            RateLimiter::new(
                config.max_calls_per_interval,
                Duration::from_secs(config.rate_interval_seconds),
            ),
        )
    }

    /// Guard from explicit parts.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            service: service.into(),
            retry,
            breaker,
            limiter,
        }
    }

    /// Current breaker state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `op` behind the breaker, the limiter and the retry policy.
    ///
    /// A data error means the service answered and rejected the payload,
    /// so it counts as a success for the breaker and settles a half-open
    /// trial. Every other failure counts against it once, after retries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CircuitOpen` or `AppError::RateLimited` when the
    /// call is refused locally, otherwise the error of the call itself.
    pub async fn call<T, F, Fut>(&mut self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.breaker.allow_request() {
            return Err(AppError::CircuitOpen(self.service.clone()));
        }
        if !self.limiter.try_acquire() {
            self.breaker.cancel_trial();
            return Err(AppError::RateLimited(self.service.clone()));
        }

        match retry(&self.retry, &self.service, op).await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(err @ AppError::Data(_)) => {
                self.breaker.record_success();
                Err(err)
            }
            Err(err) => {
                self.breaker.record_failure();
                debug!(
                    service = self.service,
                    state = ?self.breaker.state(),
                    "service call failed"
                );
                Err(err)
            }
        }
    }
}
