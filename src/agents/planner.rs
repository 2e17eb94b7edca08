//! Planner Agent (spec §4.3): deterministic, vector-ranked plan generation.
//! Generalized off the teacher's `phases/mod.rs::Planner` trait and
//! `GoosePlanner` shape, with the LLM call replaced by the deterministic
//! term-overlap scoring the spec mandates as the default algorithm.

use crate::context::ExecutionContext;
use crate::errors::AgentError;
use crate::io_contract::PlanStep;
use crate::memory::MemoryBackend;
use crate::registry::ToolRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["a", "an", "the", "to", "for", "of", "and", "or", "in", "on", "with", "is", "are"]
        .into_iter()
        .collect()
});

static TERM_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Normalize text into a bag of lowercased alphanumeric, stopword-free terms.
pub fn normalize_terms(text: &str) -> Vec<String> {
    TERM_SPLIT
        .split(&text.to_lowercase())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Fixed additive bonus per matching memory hit (Open Question pinned in
/// DESIGN.md), capped so a single bonus cannot push score above 1.0.
const MEMORY_HIT_BONUS: f32 = 0.15;

pub struct Planner<'a> {
    pub registry: &'a ToolRegistry,
    pub memory: &'a dyn MemoryBackend,
    pub max_steps: usize,
    pub top_k_memory: usize,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a ToolRegistry, memory: &'a dyn MemoryBackend, max_steps: usize) -> Self {
        Self {
            registry,
            memory,
            max_steps,
            top_k_memory: 5,
        }
    }

    /// Same `(goal, registry snapshot, memory snapshot, profile)` ⇒ identical
    /// plan. Ties broken by registry insertion order (primary) then
    /// lexicographic tool name (secondary, the pinned tie-break rule).
    pub fn plan(&self, goal: &str, ctx: &ExecutionContext) -> Result<Vec<PlanStep>, AgentError> {
        if self.registry.is_empty() {
            return Err(AgentError::validation("tool registry is empty, cannot plan"));
        }

        let goal_terms = normalize_terms(goal);
        let memory_hits: HashSet<String> = self
            .memory
            .search(goal, &ctx.profile, self.top_k_memory)
            .into_iter()
            .map(|hit| hit.record.text)
            .collect();

        let mut scored: Vec<(usize, String, f32)> = self
            .registry
            .iter_in_order()
            .enumerate()
            .map(|(order, spec)| {
                let tool_terms = spec.term_bag();
                let overlap = goal_terms.iter().filter(|t| tool_terms.contains(t)).count();
                let base = overlap as f32 / goal_terms.len().max(1) as f32;
                let bonus = if memory_hits.iter().any(|hit| hit.to_lowercase().contains(&spec.name.to_lowercase())) {
                    MEMORY_HIT_BONUS
                } else {
                    0.0
                };
                (order, spec.name.clone(), (base + bonus).min(1.0))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        let nonzero = scored.iter().filter(|(_, _, score)| *score > 0.0).count();
        if nonzero == 0 {
            // All scores zero: fall back to a single default/echo-style step
            // using the first registered tool, per §4.3 step 5.
            let first = self.registry.iter_in_order().next().ok_or_else(|| {
                AgentError::validation("no tools available for default plan step")
            })?;
            self.memory.remember(goal, crate::memory::MemoryMetadata {
                profile: ctx.profile.clone(),
                trace_id: Some(ctx.trace_id.clone()),
                tags: vec![],
            });
            return Ok(vec![PlanStep {
                tool: first.name.clone(),
                input: [("goal".to_string(), serde_json::json!(goal))].into_iter().collect(),
                reason: "default step: no tool scored above zero".to_string(),
                trace_id: ctx.trace_id.clone(),
                index: 0,
            }]);
        }

        // N is bounded by registry size, not strictly by the nonzero count:
        // once at least one tool scores above zero, fill remaining slots
        // from the sorted list (lowest-scoring, including zero-score tools)
        // rather than truncating the plan early.
        let n = self.max_steps.clamp(1, scored.len());
        let steps: Vec<PlanStep> = scored
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(index, (_, name, score))| PlanStep {
                tool: name,
                input: [("goal".to_string(), serde_json::json!(goal))].into_iter().collect(),
                reason: format!("score={score:.4}"),
                trace_id: ctx.trace_id.clone(),
                index,
            })
            .collect();

        self.memory.remember(
            goal,
            crate::memory::MemoryMetadata {
                profile: ctx.profile.clone(),
                trace_id: Some(ctx.trace_id.clone()),
                tags: vec![],
            },
        );

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LocalMemory;
    use crate::registry::{NamespaceAllowlist, SandboxProfile, ToolRegistry, ToolSpec};
    use serde_json::Value;

    fn echo_handler(_inputs: &std::collections::HashMap<String, Value>, _ctx: &ExecutionContext) -> Result<Value, AgentError> {
        Ok(Value::Null)
    }

    fn registry_for_s1() -> ToolRegistry {
        let allowlist = NamespaceAllowlist::default();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new("search_flights", "Search flights", SandboxProfile::PySlim, std::sync::Arc::new(echo_handler)),
            )
            .unwrap();
        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new("compare_prices", "Compare prices", SandboxProfile::PySlim, std::sync::Arc::new(echo_handler)),
            )
            .unwrap();
        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new("echo", "Echo text", SandboxProfile::PySlim, std::sync::Arc::new(echo_handler)),
            )
            .unwrap();
        registry
    }

    #[test]
    fn s1_plan_determinism() {
        let registry = registry_for_s1();
        let memory = LocalMemory::new();
        let planner = Planner::new(&registry, &memory, 2);
        let ctx = ExecutionContext::new("trace-s1");

        let plan1 = planner.plan("find cheap flights", &ctx).unwrap();
        let names1: Vec<&str> = plan1.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(names1, vec!["search_flights", "compare_prices"]);

        let plan2 = planner.plan("find cheap flights", &ctx).unwrap();
        assert_eq!(plan1, plan2);
    }

    #[test]
    fn empty_registry_is_validation_error() {
        let registry = ToolRegistry::new();
        let memory = LocalMemory::new();
        let planner = Planner::new(&registry, &memory, 2);
        let ctx = ExecutionContext::new("t1");
        let err = planner.plan("anything", &ctx).unwrap_err();
        assert!(matches!(err.error_type, crate::errors::AgentErrorType::Validation));
    }

    #[test]
    fn dense_zero_based_index() {
        let registry = registry_for_s1();
        let memory = LocalMemory::new();
        let planner = Planner::new(&registry, &memory, 3);
        let ctx = ExecutionContext::new("t1");
        let plan = planner.plan("flights prices", &ctx).unwrap();
        for (i, step) in plan.iter().enumerate() {
            assert_eq!(step.index, i);
        }
    }
}
