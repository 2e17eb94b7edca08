//! `ExecutionContext`: immutable, request-scoped, freely shareable across tasks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Created at request entry, lives until the terminal lifecycle event, then
/// discarded. Derived contexts are new values produced by `with_*` methods;
/// the original is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub trace_id: String,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub memory_scope: Option<String>,
    pub conversation_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    pub parent_context: Option<Arc<ExecutionContext>>,
}

fn default_profile() -> String {
    "default".to_string()
}

impl ExecutionContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            request_id: None,
            user_id: None,
            memory_scope: None,
            conversation_id: None,
            session_id: None,
            profile: default_profile(),
            metadata: HashMap::new(),
            parent_context: None,
        }
    }

    pub fn with_profile(&self, profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..self.clone()
        }
    }

    pub fn with_request_id(&self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..self.clone()
        }
    }

    pub fn with_metadata(&self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert(key.into(), value);
        Self {
            metadata,
            ..self.clone()
        }
    }

    /// Derive a child context for a nested orchestration, preserving trace_id.
    pub fn child(&self) -> Self {
        Self {
            parent_context: Some(Arc::new(self.clone())),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_profile_does_not_mutate_original() {
        let ctx = ExecutionContext::new("trace-1");
        let child = ctx.with_profile("prod");
        assert_eq!(ctx.profile, "default");
        assert_eq!(child.profile, "prod");
        assert_eq!(child.trace_id, "trace-1");
    }

    #[test]
    fn child_preserves_trace_id_and_links_parent() {
        let ctx = ExecutionContext::new("trace-1").with_profile("prod");
        let nested = ctx.child();
        assert_eq!(nested.trace_id, "trace-1");
        assert_eq!(nested.profile, "prod");
        assert!(nested.parent_context.is_some());
    }
}
