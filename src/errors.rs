//! Typed errors shared across the substrate.
//!
//! Library code returns these via `Result<_, E>`; the demo binary converts
//! them to `anyhow::Error` at its outer boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical failure-mode taxonomy. Every failure classifies into exactly
/// one mode; classification is by exception class first, then message
/// keyword, defaulting to `AgentLogic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
    UserInvalidInput,
    AgentLogic,
    SystemNetwork,
    SystemTimeout,
    SystemUnavailable,
    PolicyBudget,
    PolicyApprovalDenied,
    PolicySecurity,
}

impl FailureMode {
    pub fn retryable(self) -> bool {
        matches!(
            self,
            FailureMode::SystemNetwork | FailureMode::SystemTimeout | FailureMode::SystemUnavailable
        )
    }

    /// Classify a raw error message by keyword, falling back to `AgentLogic`.
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("deadline") {
            FailureMode::SystemTimeout
        } else if lower.contains("network") || lower.contains("connection refused") || lower.contains("dns") {
            FailureMode::SystemNetwork
        } else if lower.contains("forbidden") || lower.contains("denied") {
            FailureMode::PolicyApprovalDenied
        } else if lower.contains("validation") || lower.contains("invalid") {
            FailureMode::UserInvalidInput
        } else {
            FailureMode::AgentLogic
        }
    }
}

/// Tagged error type carried on `AgentResponse::error` and in traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentErrorType {
    Validation,
    Execution,
    Timeout,
    Resource,
    Permission,
    Network,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{error_type:?}: {message}")]
pub struct AgentError {
    pub error_type: AgentErrorType,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default)]
    pub retry_after: Option<u64>,
    #[serde(default)]
    pub trace_context: Option<String>,
}

impl AgentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            error_type: AgentErrorType::Validation,
            message: message.into(),
            details: HashMap::new(),
            recoverable: false,
            retry_after: None,
            trace_context: None,
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self {
            error_type: AgentErrorType::Permission,
            message: message.into(),
            details: HashMap::new(),
            recoverable: false,
            retry_after: None,
            trace_context: None,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            error_type: AgentErrorType::Execution,
            message: message.into(),
            details: HashMap::new(),
            recoverable: false,
            retry_after: None,
            trace_context: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            error_type: AgentErrorType::Timeout,
            message: message.into(),
            details: HashMap::new(),
            recoverable: true,
            retry_after: None,
            trace_context: None,
        }
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_context = Some(trace_id.into());
        self
    }
}

/// Error raised by the orchestrator at any lifecycle stage.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("orchestration failed at {stage}: {message}")]
pub struct OrchestrationError {
    pub stage: String,
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub cause: Option<String>,
    pub recoverable: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OrchestrationError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
            recoverable,
            metadata: HashMap::new(),
        }
    }

    pub fn with_partial_result(mut self, partial: serde_json::Value) -> Self {
        self.metadata.insert("partial_result".to_string(), partial);
        self
    }
}

/// Raised when an agent attempts to mutate a state key it does not own.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("agent attempted to write key '{key}' owned by {owner:?}")]
pub struct StateViolationError {
    pub key: String,
    pub owner: StateOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateOwner {
    Agent,
    Memory,
    Orchestrator,
    Shared,
}

/// Raised by `Agent::startup` on unrecoverable initialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("startup failed: {message}")]
pub struct StartupError {
    pub message: String,
    pub rolled_back: bool,
}
