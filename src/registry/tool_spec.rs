//! `ToolSpec`: immutable, schema-validated tool declaration.

use crate::errors::AgentError;
use crate::registry::sandbox::SandboxProfile;
use serde_json::Value;
use std::collections::HashMap;

pub type ToolHandler = std::sync::Arc<
    dyn Fn(&HashMap<String, Value>, &crate::context::ExecutionContext) -> Result<Value, AgentError>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub handler: ToolHandler,
    /// JSON-Schema object describing `parameters` (type/required/enum/min/max/pattern).
    pub parameters: Value,
    pub cost: f64,
    pub max_tokens: Option<u64>,
    pub sandbox_profile: SandboxProfile,
    pub network_allowed: bool,
    pub read_only: bool,
    pub timeout_seconds: u64,
    pub approval_required: bool,
    pub approval_timeout_seconds: u64,
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    pub tags: Vec<String>,
    pub version: String,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("cost", &self.cost)
            .field("sandbox_profile", &self.sandbox_profile)
            .field("approval_required", &self.approval_required)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        sandbox_profile: SandboxProfile,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
            parameters: serde_json::json!({"type": "object", "properties": {}, "required": []}),
            cost: 0.01,
            max_tokens: None,
            network_allowed: sandbox_profile.network_allowed_by_default(),
            sandbox_profile,
            read_only: true,
            timeout_seconds: 30,
            approval_required: false,
            approval_timeout_seconds: 60,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            tags: Vec::new(),
            version: "1.0.0".to_string(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_approval_required(mut self, required: bool) -> Self {
        self.approval_required = required;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Term bag used by the planner's scoring (`name + description + tags`).
    pub fn term_bag(&self) -> Vec<String> {
        crate::agents::planner::normalize_terms(&format!(
            "{} {} {}",
            self.name,
            self.description,
            self.tags.join(" ")
        ))
    }

    /// Validate `inputs` against `parameters` (type/required/enum/bounds/pattern).
    /// Failure is a non-retryable `Validation` error per spec §4.4 step 2.
    pub fn validate_inputs(&self, inputs: &HashMap<String, Value>) -> Result<(), AgentError> {
        let inputs_value = Value::Object(inputs.clone().into_iter().collect());
        let validator = jsonschema::validator_for(&self.parameters)
            .map_err(|e| AgentError::validation(format!("invalid tool schema for '{}': {e}", self.name)))?;
        let errors: Vec<String> = validator
            .iter_errors(&inputs_value)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgentError::validation(format!(
                "input validation failed for tool '{}': {}",
                self.name,
                errors.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;

    fn echo_spec() -> ToolSpec {
        ToolSpec::new(
            "echo",
            "Echo text back",
            SandboxProfile::PySlim,
            std::sync::Arc::new(|inputs, _ctx| Ok(Value::Object(inputs.clone().into_iter().collect()))),
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }))
    }

    #[test]
    fn validate_inputs_rejects_missing_required_field() {
        let spec = echo_spec();
        let inputs = HashMap::new();
        assert!(spec.validate_inputs(&inputs).is_err());
    }

    #[test]
    fn validate_inputs_accepts_matching_shape() {
        let spec = echo_spec();
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), Value::String("hi".to_string()));
        assert!(spec.validate_inputs(&inputs).is_ok());
    }

    #[test]
    fn handler_executes() {
        let spec = echo_spec();
        let ctx = ExecutionContext::new("t1");
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), Value::String("hi".to_string()));
        let out = (spec.handler)(&inputs, &ctx).unwrap();
        assert_eq!(out["text"], Value::String("hi".to_string()));
    }
}
