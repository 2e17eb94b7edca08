mod sandbox;
mod tool_spec;

pub use sandbox::SandboxProfile;
pub use tool_spec::{ToolHandler, ToolSpec};

use crate::errors::AgentError;
use std::collections::HashMap;

/// Module namespaces tools may register from. Registration from any other
/// namespace is rejected (spec §4.4.1: tools MUST belong to an allowlisted
/// module namespace).
#[derive(Debug, Clone, Default)]
pub struct NamespaceAllowlist {
    allowed: Vec<String>,
}

impl NamespaceAllowlist {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn permits(&self, namespace: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == namespace)
    }
}

/// Static lookup of tool specs: name → handler + schema + policy.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
    /// Preserves insertion order for deterministic tie-breaking in the planner.
    insertion_order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: &str, allowlist: &NamespaceAllowlist, spec: ToolSpec) -> Result<(), AgentError> {
        if !allowlist.permits(namespace) {
            return Err(AgentError::permission(format!(
                "namespace '{namespace}' is not allowlisted for tool registration"
            )));
        }
        if self.tools.contains_key(&spec.name) {
            return Err(AgentError::validation(format!(
                "tool '{}' is already registered",
                spec.name
            )));
        }
        self.insertion_order.push(spec.name.clone());
        self.tools.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Tools in registration order, optionally filtered by an allowlist of
    /// glob patterns (used by the planner to respect per-profile visibility).
    pub fn iter_in_order(&self) -> impl Iterator<Item = &ToolSpec> {
        self.insertion_order.iter().filter_map(move |name| self.tools.get(name))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
