//! Circuit breaker state machine guarding a flaky external tool adapter
//! (spec §6, tool adapter contract). No teacher counterpart — grounded on
//! the CLOSED/OPEN/HALF_OPEN convention used across the `other_examples/` corpus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may currently be attempted. OPEN transitions to
    /// HALF_OPEN once the cooldown elapses, admitting exactly one probe.
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false, // a probe is already in flight
            CircuitState::Open => {
                if inner.opened_at.map(|t| t.elapsed() >= self.cooldown).unwrap_or(false) {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }
}

/// Lazily creates and hands out one breaker per tool name, so each tool
/// adapter trips independently of the others.
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    cooldown: Duration,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_tool(&self, tool: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("circuit breaker registry mutex poisoned");
        breakers
            .entry(tool.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.failure_threshold, self.cooldown)))
            .clone()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}
