//! Agent Lifecycle (spec §4.2): state machine, idempotent startup/shutdown,
//! state ownership enforcement.

pub mod llm;
pub mod planner;
pub mod worker;

use crate::errors::{StartupError, StateOwner, StateViolationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
    Paused,
    ShuttingDown,
    Terminated,
}

/// `Planner::plan` and `Worker::run_steps` are called directly by
/// `Orchestrator::orchestrate` rather than through a shared `process`
/// trait object: one is sync and scores a goal against the registry, the
/// other is async and drives a step list with retry/compensation, and
/// forcing both through one `AgentRequest -> AgentResponse` shape bought
/// no real polymorphism (see DESIGN.md's Open Question decisions). Only
/// the lifecycle state machine below is actually shared between them.
///
/// Shared lifecycle tracker embedded by concrete agents (Planner/Worker).
/// `startup`/`shutdown` are idempotent and state transitions are logged.
pub struct AgentLifecycle {
    state: Mutex<LifecycleState>,
    agent_keys: Mutex<HashMap<String, serde_json::Value>>,
}

impl AgentLifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
            agent_keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().expect("lifecycle mutex poisoned")
    }

    /// Idempotent: no-op if already READY. Atomic: on failure the state is
    /// rolled back to TERMINATED when `cleanup_on_error` is true.
    pub fn startup(&self, cleanup_on_error: bool, init: impl FnOnce() -> Result<(), String>) -> Result<(), StartupError> {
        {
            let mut state = self.state.lock().expect("lifecycle mutex poisoned");
            if *state == LifecycleState::Ready {
                return Ok(());
            }
            tracing::info!(from = ?*state, to = ?LifecycleState::Initializing, "lifecycle transition");
            *state = LifecycleState::Initializing;
        }

        match init() {
            Ok(()) => {
                let mut state = self.state.lock().expect("lifecycle mutex poisoned");
                tracing::info!(from = ?LifecycleState::Initializing, to = ?LifecycleState::Ready, "lifecycle transition");
                *state = LifecycleState::Ready;
                Ok(())
            }
            Err(message) => {
                let mut state = self.state.lock().expect("lifecycle mutex poisoned");
                if cleanup_on_error {
                    *state = LifecycleState::Terminated;
                    Err(StartupError {
                        message,
                        rolled_back: true,
                    })
                } else {
                    Err(StartupError {
                        message,
                        rolled_back: false,
                    })
                }
            }
        }
    }

    /// MUST NOT raise: failures are logged and swallowed. Final state is
    /// always TERMINATED.
    pub fn shutdown(&self, flush: impl FnOnce() -> Result<(), String>) {
        let mut state = self.state.lock().expect("lifecycle mutex poisoned");
        if *state == LifecycleState::Terminated {
            return;
        }
        *state = LifecycleState::ShuttingDown;
        drop(state);

        if let Err(e) = flush() {
            tracing::warn!(error = %e, "agent shutdown flush failed, swallowing");
        }

        self.agent_keys.lock().expect("lifecycle mutex poisoned").clear();
        *self.state.lock().expect("lifecycle mutex poisoned") = LifecycleState::Terminated;
    }

    pub fn pause(&self) {
        let mut state = self.state.lock().expect("lifecycle mutex poisoned");
        if *state == LifecycleState::Ready {
            *state = LifecycleState::Paused;
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().expect("lifecycle mutex poisoned");
        if *state == LifecycleState::Paused {
            *state = LifecycleState::Ready;
        }
    }

    /// Writes to AGENT-scope keys; any other owner raises `StateViolationError`.
    pub fn write_agent_key(&self, key: &str, owner: StateOwner, value: serde_json::Value) -> Result<(), StateViolationError> {
        if owner != StateOwner::Agent && owner != StateOwner::Shared {
            return Err(StateViolationError {
                key: key.to_string(),
                owner,
            });
        }
        self.agent_keys.lock().expect("lifecycle mutex poisoned").insert(key.to_string(), value);
        Ok(())
    }

    pub fn agent_keys_empty(&self) -> bool {
        self.agent_keys.lock().expect("lifecycle mutex poisoned").is_empty()
    }
}

impl Default for AgentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_is_idempotent() {
        let lifecycle = AgentLifecycle::new();
        lifecycle.startup(true, || Ok(())).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        lifecycle.startup(true, || panic!("should not re-run init")).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn shutdown_is_idempotent_and_never_panics() {
        let lifecycle = AgentLifecycle::new();
        lifecycle.startup(true, || Ok(())).unwrap();
        lifecycle.write_agent_key("k", StateOwner::Agent, serde_json::json!(1)).unwrap();
        lifecycle.shutdown(|| Err("flush failed".to_string()));
        assert_eq!(lifecycle.state(), LifecycleState::Terminated);
        assert!(lifecycle.agent_keys_empty());
        lifecycle.shutdown(|| Ok(()));
        assert_eq!(lifecycle.state(), LifecycleState::Terminated);
    }

    #[test]
    fn state_ownership_rejects_cross_owner_write() {
        let lifecycle = AgentLifecycle::new();
        let err = lifecycle
            .write_agent_key("trace_id", StateOwner::Orchestrator, serde_json::json!("x"))
            .unwrap_err();
        assert_eq!(err.owner, StateOwner::Orchestrator);
    }

    #[test]
    fn startup_failure_rolls_back_to_terminated() {
        let lifecycle = AgentLifecycle::new();
        let err = lifecycle.startup(true, || Err("boom".to_string())).unwrap_err();
        assert!(err.rolled_back);
        assert_eq!(lifecycle.state(), LifecycleState::Terminated);
    }
}
