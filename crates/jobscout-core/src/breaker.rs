//! Circuit breaker guarding the inference backend.
//!
//! Consecutive resource/transient failures open the circuit; while open,
//! inference calls fail fast with [`AppError::NoBackend`], which the retry
//! policy treats as a RESOURCE failure and backs off. Rate limits extend the
//! recovery window.
//!
//! # States
//!
//! ```text
//! CLOSED --[N failures]--> OPEN --[timeout]--> HALF_OPEN --[success]--> CLOSED
//!                            ^---------------[failure]-------|
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{AppError, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Successful probes in half-open before closing.
    pub success_threshold: u32,
    /// Base wait before probing again.
    pub recovery_timeout: Duration,
    /// Recovery multiplier applied on rate-limit failures.
    pub rate_limit_backoff_multiplier: f32,
    pub max_recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            rate_limit_backoff_multiplier: 2.0,
            max_recovery_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    current_recovery: Duration,
}

/// Thread-safe breaker shared across worker loops.
#[derive(Clone)]
pub struct ResourceBreaker {
    name: String,
    config: BreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl ResourceBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let inner = BreakerInner {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            current_recovery: config.recovery_timeout,
        };
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(breaker = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock_inner();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Run `operation` through the breaker. While open, returns
    /// [`AppError::NoBackend`] without invoking the operation.
    pub async fn call<F, T, Fut>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        {
            let mut inner = self.lock_inner();
            self.maybe_half_open(&mut inner);
            if inner.state == BreakerState::Open {
                let retry_after = inner
                    .last_failure_time
                    .map(|t| inner.current_recovery.saturating_sub(t.elapsed()))
                    .unwrap_or(inner.current_recovery);
                return Err(AppError::NoBackend(format!(
                    "{} circuit open, retry in {}s",
                    self.name,
                    retry_after.as_secs()
                )));
            }
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) => {
                if matches!(
                    e.category(),
                    ErrorCategory::Resource | ErrorCategory::Transient
                ) {
                    self.record_failure(e);
                }
            }
        }
        result
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!(breaker = %self.name, "Circuit closing after successful probes");
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.current_recovery = self.config.recovery_timeout;
                }
            }
            BreakerState::Closed => inner.failure_count = 0,
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, error: &AppError) {
        let is_rate_limit = matches!(error, AppError::RateLimited)
            || matches!(error, AppError::Inference { status_code: 429, .. });

        let mut inner = self.lock_inner();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        error = %error,
                        "Circuit opening"
                    );
                    inner.state = BreakerState::Open;
                    if is_rate_limit {
                        inner.current_recovery = self.extended_recovery(inner.current_recovery);
                    }
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!(breaker = %self.name, error = %error, "Probe failed, reopening");
                inner.state = BreakerState::Open;
                inner.last_failure_time = Some(Instant::now());
                inner.success_count = 0;
                if is_rate_limit {
                    inner.current_recovery = self.extended_recovery(inner.current_recovery);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn extended_recovery(&self, current: Duration) -> Duration {
        std::cmp::min(
            Duration::from_secs_f32(
                current.as_secs_f32() * self.config.rate_limit_backoff_multiplier,
            ),
            self.config.max_recovery_timeout,
        )
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open
            && let Some(last_failure) = inner.last_failure_time
            && last_failure.elapsed() >= inner.current_recovery
        {
            tracing::info!(breaker = %self.name, "Circuit half-open, probing");
            inner.state = BreakerState::HalfOpen;
            inner.success_count = 0;
        }
    }
}
