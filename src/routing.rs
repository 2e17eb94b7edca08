//! Routing decisions (spec §4.1.2): round-robin and capability-match,
//! grounded on the teacher's mutex-guarded `SessionRegistry` counter.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target: String,
    pub reason: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Thread-safe counter for round-robin routing. Pure given the snapshot of
/// `available_agents`; the counter update itself is the only side effect.
pub struct RoundRobinRouter {
    counter: Mutex<usize>,
}

impl RoundRobinRouter {
    pub fn new() -> Self {
        Self { counter: Mutex::new(0) }
    }

    pub fn route(&self, available_agents: &[String]) -> RoutingDecision {
        if available_agents.is_empty() {
            return RoutingDecision {
                target: String::new(),
                reason: "no agents available".to_string(),
                metadata: serde_json::json!({}),
                fallback: None,
            };
        }
        let mut counter = self.counter.lock().expect("router mutex poisoned");
        let idx = *counter % available_agents.len();
        *counter = counter.wrapping_add(1);
        RoutingDecision {
            target: available_agents[idx].clone(),
            reason: format!("round-robin index {idx}"),
            metadata: serde_json::json!({"index": idx}),
            fallback: available_agents.get(idx + 1).or_else(|| available_agents.first()).cloned(),
        }
    }
}

impl Default for RoundRobinRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Scores candidates against a predicate set, breaking ties by lexicographic id.
pub fn capability_match_route(
    task: &str,
    available_agents: &[(String, Vec<String>)],
) -> RoutingDecision {
    let task_lower = task.to_lowercase();
    let mut scored: Vec<(String, usize)> = available_agents
        .iter()
        .map(|(id, capabilities)| {
            let score = capabilities
                .iter()
                .filter(|cap| task_lower.contains(&cap.to_lowercase()))
                .count();
            (id.clone(), score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    match scored.first() {
        Some((target, score)) => RoutingDecision {
            target: target.clone(),
            reason: format!("capability-match score {score}"),
            metadata: serde_json::json!({"score": score}),
            fallback: scored.get(1).map(|(id, _)| id.clone()),
        },
        None => RoutingDecision {
            target: String::new(),
            reason: "no agents available".to_string(),
            metadata: serde_json::json!({}),
            fallback: None,
        },
    }
}
