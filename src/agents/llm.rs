//! `LlmClient` trait seam (spec §1 non-goals: LLM invocation is out of
//! scope). A Planner or Reviewer that wants model-backed reasoning calls
//! through this trait; this crate ships only the deterministic default so
//! the substrate runs and tests without network access.

use crate::context::ExecutionContext;
use crate::errors::AgentError;

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, ctx: &ExecutionContext) -> Result<String, AgentError>;
}

/// Echoes back the normalized term bag of the prompt. Deterministic and
/// offline, so it never changes planner output across runs — domain code
/// swaps this out for a real model client.
pub struct DeterministicLlmClient;

#[async_trait::async_trait]
impl LlmClient for DeterministicLlmClient {
    async fn complete(&self, prompt: &str, _ctx: &ExecutionContext) -> Result<String, AgentError> {
        let terms = super::planner::normalize_terms(prompt);
        Ok(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_client_is_stable_across_calls() {
        let client = DeterministicLlmClient;
        let ctx = ExecutionContext::new("trace-llm");
        let a = client.complete("Find Cheap Flights", &ctx).await.unwrap();
        let b = client.complete("Find Cheap Flights", &ctx).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "find cheap flights");
    }
}
