// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Circuit breaker for calls to external dependencies.
//!
//! `Closed` lets calls through and counts consecutive failures. Reaching the
//! threshold opens the circuit: calls are rejected without being attempted
//! until the reset timeout elapses and the breaker moves to `HalfOpen`, where
//! trial calls decide between closing again and re-opening.

use fluxion_heat_types::BreakerConfig;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::HeatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("{name} circuit is open")]
    Open { name: String },

    #[error("{name} call timed out after {}s", .after.as_secs())]
    Timeout { name: String, after: Duration },

    #[error("{name} call failed: {error}")]
    Operation { name: String, error: E },
}

impl From<CircuitBreakerError<anyhow::Error>> for HeatError {
    fn from(err: CircuitBreakerError<anyhow::Error>) -> Self {
        match err {
            CircuitBreakerError::Open { name } => HeatError::Unavailable { dependency: name },
            CircuitBreakerError::Timeout { name, after } => HeatError::Timeout {
                dependency: name,
                after,
            },
            CircuitBreakerError::Operation { name, error } => HeatError::TransientDependency {
                dependency: name,
                reason: format!("{error:#}"),
            },
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    /// When an open circuit may be tried again
    reset_deadline: Option<Instant>,
    /// Bumped on every trip so stale reset timers do nothing
    generation: u64,
}

impl BreakerInner {
    fn half_open(&mut self, name: &str) {
        self.state = CircuitState::HalfOpen;
        self.half_open_successes = 0;
        self.reset_deadline = None;
        info!(breaker = name, "Circuit half-open, allowing trial calls");
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    half_open_success_threshold: u32,
    reset_timeout: Duration,
    call_timeout: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
    inner: Arc<Mutex<BreakerInner>>,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            half_open_success_threshold: config.half_open_success_threshold.max(1),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            max_attempts: config.max_attempts.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                reset_deadline: None,
                generation: 0,
            })),
            reset_task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, moving an expired open circuit to half-open
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner);
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    fn expire_open(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && inner
                .reset_deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
        {
            inner.half_open(&self.name);
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.half_open_successes = 0;
        inner.generation += 1;
        inner.reset_deadline = Some(Instant::now() + self.reset_timeout);
        warn!(
            breaker = %self.name,
            failures = inner.consecutive_failures,
            reset_secs = self.reset_timeout.as_secs(),
            "Circuit opened"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // Without a runtime the deadline is checked lazily on the next call
            return;
        };
        let shared = Arc::clone(&self.inner);
        let name = self.name.clone();
        let generation = inner.generation;
        let reset_timeout = self.reset_timeout;
        let task = runtime.spawn(async move {
            tokio::time::sleep(reset_timeout).await;
            let mut inner = shared.lock();
            if inner.state == CircuitState::Open && inner.generation == generation {
                inner.half_open(&name);
            }
        });
        if let Some(previous) = self.reset_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.half_open_success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    info!(breaker = %self.name, "Circuit closed");
                }
            }
            CircuitState::Closed | CircuitState::Open => {
                inner.consecutive_failures = 0;
            }
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let state = inner.state;
        match state {
            CircuitState::HalfOpen => self.trip(&mut inner),
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                self.trip(&mut inner);
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Run one call through the breaker, bounded by the call timeout
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock();
            self.expire_open(&mut inner);
            if inner.state == CircuitState::Open {
                debug!(breaker = %self.name, "Rejected call, circuit open");
                return Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                });
            }
        }

        match tokio::time::timeout(self.call_timeout, op()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.on_failure();
                Err(CircuitBreakerError::Operation {
                    name: self.name.clone(),
                    error,
                })
            }
            Err(_) => {
                self.on_failure();
                Err(CircuitBreakerError::Timeout {
                    name: self.name.clone(),
                    after: self.call_timeout,
                })
            }
        }
    }

    /// Run a call with bounded retries and exponential backoff
    ///
    /// The closure receives the 1-based attempt number. Retrying stops as soon
    /// as the circuit opens.
    pub async fn call_with_retry<F, Fut, T, E>(&self, mut op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match self.call(|| op(attempt)).await {
                Ok(value) => return Ok(value),
                Err(err @ CircuitBreakerError::Open { .. }) => return Err(err),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self
                        .retry_base_delay
                        .saturating_mul(2_u32.saturating_pow(attempt - 1));
                    warn!(
                        breaker = %self.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Call failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Cancel the pending reset timer
    pub fn shutdown(&self) {
        if let Some(task) = self.reset_task.lock().take() {
            task.abort();
            debug!(breaker = %self.name, "Reset timer cancelled");
        }
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        if let Some(task) = self.reset_task.get_mut().take() {
            task.abort();
        }
    }
}
