//! Canonical Request / Response / Error contract used uniformly across agents.

use crate::errors::AgentError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub trace_id: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub priority: u8,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub parent_context: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_profile() -> String {
    "default".to_string()
}

impl RequestMetadata {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            profile: default_profile(),
            priority: 0,
            timeout_seconds: None,
            parent_context: None,
            tags: Vec::new(),
        }
    }
}

/// One step of an executable plan. `index` is dense and zero-based within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    pub reason: String,
    pub trace_id: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub goal: String,
    pub task: String,
    pub metadata: RequestMetadata,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub context: Vec<serde_json::Value>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
}

impl AgentRequest {
    /// Construct, rejecting empty `goal`/`task` (required-non-empty invariant).
    pub fn new(
        goal: impl Into<String>,
        task: impl Into<String>,
        metadata: RequestMetadata,
    ) -> Result<Self, AgentError> {
        let goal = goal.into();
        let task = task.into();
        if goal.trim().is_empty() {
            return Err(AgentError::validation("goal must not be empty"));
        }
        if task.trim().is_empty() {
            return Err(AgentError::validation("task must not be empty"));
        }
        Ok(Self {
            goal,
            task,
            metadata,
            inputs: HashMap::new(),
            context: Vec::new(),
            constraints: Vec::new(),
            expected_output: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    Error,
    Partial,
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub cache_hit: Option<bool>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<AgentError>,
    #[serde(default)]
    pub trace: Vec<serde_json::Value>,
    #[serde(default)]
    pub metadata: ResponseMeta,
    pub timestamp: String,
}

impl AgentResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            result: Some(result),
            error: None,
            trace: Vec::new(),
            metadata: ResponseMeta::default(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(error: AgentError) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error: Some(error),
            trace: Vec::new(),
            metadata: ResponseMeta::default(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<serde_json::Value>) -> Self {
        self.trace = trace;
        self
    }

    /// Enforces the response invariant: SUCCESS implies result, ERROR implies error.
    pub fn is_well_formed(&self) -> bool {
        match self.status {
            ResponseStatus::Success => self.result.is_some(),
            ResponseStatus::Error => self.error.is_some(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_goal() {
        let err = AgentRequest::new("", "do it", RequestMetadata::new("t1")).unwrap_err();
        assert!(matches!(err.error_type, crate::errors::AgentErrorType::Validation));
    }

    #[test]
    fn success_response_is_well_formed() {
        let resp = AgentResponse::success(serde_json::json!({"ok": true}));
        assert!(resp.is_well_formed());
    }

    #[test]
    fn error_response_without_error_is_malformed() {
        let resp = AgentResponse {
            status: ResponseStatus::Error,
            result: None,
            error: None,
            trace: vec![],
            metadata: ResponseMeta::default(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        assert!(!resp.is_well_formed());
    }
}
