//! Per-profile guardrail policy: tool allowlist, budget accumulators,
//! approval rules. Grounded on the teacher's `Guardrails` struct, with the
//! security-keyword / sensitive-file hard-stop checks generalized into a
//! single allowlist + budget gate per spec §4.7.

use crate::config::{BudgetConfig, BudgetPolicy};
use glob::Pattern;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSnapshot {
    pub cost: f64,
    pub calls: u32,
    pub tokens: u64,
}

#[derive(Debug)]
struct BudgetAccumulators {
    cost: f64,
    calls: u32,
    tokens: u64,
}

/// `check_tool` enforces the allowlist; `budget_guard` enforces the ceiling
/// and returns `(allowed, warning_triggered)`; `charge` commits the
/// accumulators on successful execution.
pub struct GuardrailPolicy {
    pub profile: String,
    tool_allowlist: Vec<String>,
    budget_config: BudgetConfig,
    accumulators: Mutex<BudgetAccumulators>,
}

impl GuardrailPolicy {
    pub fn new(profile: impl Into<String>, tool_allowlist: Vec<String>, budget_config: BudgetConfig) -> Self {
        Self {
            profile: profile.into(),
            tool_allowlist,
            budget_config,
            accumulators: Mutex::new(BudgetAccumulators {
                cost: 0.0,
                calls: 0,
                tokens: 0,
            }),
        }
    }

    /// Allowlist patterns may be exact names or glob patterns.
    pub fn check_tool(&self, name: &str) -> bool {
        if self.tool_allowlist.is_empty() {
            return true;
        }
        self.tool_allowlist.iter().any(|pattern_str| {
            pattern_str == name
                || Pattern::new(pattern_str)
                    .map(|p| p.matches(name))
                    .unwrap_or(false)
        })
    }

    /// Compute whether charging `(cost, tokens)` would exceed the ceiling.
    /// Under `block`, returns `(false, false)` without mutating state when it
    /// would breach — the caller must not charge in that case (S3: the
    /// rejected call's accumulator is never incremented).
    pub fn budget_guard(&self, cost: f64, tokens: u64) -> (bool, bool) {
        let acc = self.accumulators.lock().expect("guardrail mutex poisoned");
        let next_cost = acc.cost + cost;
        let next_calls = acc.calls + 1;
        let next_tokens = acc.tokens + tokens;

        let exceeds = next_cost > self.budget_config.max_cost
            || next_calls > self.budget_config.max_calls
            || next_tokens > self.budget_config.max_tokens;

        if exceeds {
            return match self.budget_config.policy {
                BudgetPolicy::Block => (false, false),
                BudgetPolicy::Warn => (true, true),
            };
        }

        let cost_ratio = next_cost / self.budget_config.max_cost.max(f64::EPSILON);
        let calls_ratio = next_calls as f64 / self.budget_config.max_calls.max(1) as f64;
        let tokens_ratio = next_tokens as f64 / self.budget_config.max_tokens.max(1) as f64;
        let utilization = cost_ratio.max(calls_ratio).max(tokens_ratio);
        let warning = utilization >= self.budget_config.warning_threshold;
        (true, warning)
    }

    /// Commit the accumulators on successful execution. Must only be called
    /// after `budget_guard` returned `allowed = true`.
    pub fn charge(&self, cost: f64, tokens: u64) {
        let mut acc = self.accumulators.lock().expect("guardrail mutex poisoned");
        acc.cost += cost;
        acc.calls += 1;
        acc.tokens += tokens;
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let acc = self.accumulators.lock().expect("guardrail mutex poisoned");
        BudgetSnapshot {
            cost: acc.cost,
            calls: acc.calls,
            tokens: acc.tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(max_calls: u32) -> GuardrailPolicy {
        let mut budget = BudgetConfig::default();
        budget.max_calls = max_calls;
        budget.policy = BudgetPolicy::Block;
        GuardrailPolicy::new("prod", vec![], budget)
    }

    #[test]
    fn s3_budget_block_second_call_rejected_and_not_charged() {
        let policy = policy_with(1);
        let (allowed1, _) = policy.budget_guard(0.01, 0);
        assert!(allowed1);
        policy.charge(0.01, 0);

        let (allowed2, _) = policy.budget_guard(0.01, 0);
        assert!(!allowed2);
        // not charged
        assert_eq!(policy.snapshot().calls, 1);
    }

    #[test]
    fn allowlist_supports_glob() {
        let policy = GuardrailPolicy::new("prod", vec!["search_*".to_string()], BudgetConfig::default());
        assert!(policy.check_tool("search_flights"));
        assert!(!policy.check_tool("delete_account"));
    }

    #[test]
    fn empty_allowlist_permits_everything() {
        let policy = GuardrailPolicy::new("prod", vec![], BudgetConfig::default());
        assert!(policy.check_tool("anything"));
    }
}
