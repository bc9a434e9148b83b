use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Fails fast after `failure_threshold` consecutive provider failures.
/// Once `reset_timeout` has passed one trial call goes out; everyone else
/// keeps failing fast until it reports back. A trial that never reports
/// back is given up on after another `reset_timeout`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    opened_at: RwLock<Option<Instant>>,
    trial_started: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            opened_at: RwLock::new(None),
            trial_started: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a call may go out now.
    pub async fn allow(&self) -> bool {
        if *self.state.read().await == CircuitState::Closed {
            return true;
        }

        let mut state = self.state.write().await;
        match *state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.claim_trial().await,
            CircuitState::Open => {
                let opened_at = *self.opened_at.read().await;
                match opened_at {
                    Some(at) if at.elapsed() >= self.reset_timeout => {
                        *state = CircuitState::HalfOpen;
                        tracing::info!(provider = %self.name, "payment circuit half-open");
                        self.claim_trial().await
                    }
                    _ => false,
                }
            }
        }
    }

    // Caller must hold the state write lock.
    async fn claim_trial(&self) -> bool {
        let mut trial = self.trial_started.write().await;
        match *trial {
            Some(at) if at.elapsed() < self.reset_timeout => false,
            _ => {
                *trial = Some(Instant::now());
                true
            }
        }
    }

    /// Hands back a trial slot whose call ended without telling us anything
    /// about provider health.
    pub async fn release(&self) {
        let _state = self.state.write().await;
        *self.trial_started.write().await = None;
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!(provider = %self.name, "payment circuit closed");
        }
        *state = CircuitState::Closed;
        *self.trial_started.write().await = None;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;
        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            if *state != CircuitState::Open {
                tracing::error!(provider = %self.name, failures = count, "payment circuit opened");
            }
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
            *self.trial_started.write().await = None;
        }
    }
}
