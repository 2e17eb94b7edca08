//! Configuration surface (spec §6): recognized keys, precedence
//! explicit call args > environment > config file > defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetPolicy {
    Warn,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_cost")]
    pub max_cost: f64,
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_budget_policy")]
    pub policy: BudgetPolicy,
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

fn default_max_cost() -> f64 {
    100.0
}
fn default_max_calls() -> u32 {
    100
}
fn default_max_tokens() -> u64 {
    500_000
}
fn default_budget_policy() -> BudgetPolicy {
    BudgetPolicy::Block
}
fn default_warning_threshold() -> f64 {
    0.8
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_cost: default_max_cost(),
            max_calls: default_max_calls(),
            max_tokens: default_max_tokens(),
            policy: default_budget_policy(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_auto_export")]
    pub auto_export: bool,
}

fn default_buffer_size() -> usize {
    1000
}
fn default_auto_export() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            auto_export: default_auto_export(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Memory backend selector: "local" or an external backend name.
    #[serde(default = "default_memory_backend")]
    pub memory_backend: String,
    /// Where the local memory backend persists its JSON state.
    #[serde(default = "default_memory_state_path")]
    pub memory_state_path: PathBuf,
}

fn default_profile() -> String {
    "default".to_string()
}
fn default_max_steps() -> usize {
    10
}
fn default_memory_backend() -> String {
    "local".to_string()
}
fn default_memory_state_path() -> PathBuf {
    PathBuf::from(".orc-substrate/memory.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            max_steps: default_max_steps(),
            budget: BudgetConfig::default(),
            observability: ObservabilityConfig::default(),
            retry: RetryConfig::default(),
            memory_backend: default_memory_backend(),
            memory_state_path: default_memory_state_path(),
        }
    }
}

impl Config {
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Environment variables (`ORC_*`) override config-file values but are
    /// themselves overridden by explicit call args applied by the caller.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("ORC_PROFILE")
            && !val.is_empty()
        {
            self.profile = val;
        }
        if let Ok(val) = std::env::var("ORC_MAX_STEPS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.max_steps = n;
        }
        if let Ok(val) = std::env::var("ORC_BUDGET_MAX_COST")
            && let Ok(n) = val.parse::<f64>()
        {
            self.budget.max_cost = n;
        }
        if let Ok(val) = std::env::var("ORC_BUDGET_MAX_CALLS")
            && let Ok(n) = val.parse::<u32>()
        {
            self.budget.max_calls = n;
        }
        if let Ok(val) = std::env::var("ORC_BUDGET_MAX_TOKENS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.budget.max_tokens = n;
        }
        if let Ok(val) = std::env::var("ORC_BUDGET_POLICY") {
            self.budget.policy = if val.eq_ignore_ascii_case("warn") {
                BudgetPolicy::Warn
            } else {
                BudgetPolicy::Block
            };
        }
        if let Ok(val) = std::env::var("ORC_MEMORY_BACKEND")
            && !val.is_empty()
        {
            self.memory_backend = val;
        }
        self
    }

    /// Priority: config file > env vars > defaults (explicit call args, if
    /// any, are applied by the caller on top of the returned value).
    pub fn load_with_env(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        Self::load_or_default(path).map(|c| c.apply_env_overrides())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = Config::default();
        assert_eq!(cfg.profile, "default");
        assert_eq!(cfg.max_steps, 10);
        assert_eq!(cfg.budget.warning_threshold, 0.8);
    }

    #[test]
    fn env_override_applies_and_clamps_nothing_unexpected() {
        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe {
            std::env::set_var("ORC_MAX_STEPS", "4");
        }
        let cfg = Config::default().apply_env_overrides();
        assert_eq!(cfg.max_steps, 4);
        unsafe {
            std::env::remove_var("ORC_MAX_STEPS");
        }
    }
}
