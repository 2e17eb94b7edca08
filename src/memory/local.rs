//! Local, in-memory backend: deterministic hashing embedder, token-overlap
//! scoring, atomic JSON persistence on `flush` (write-temp-then-rename,
//! grounded on the teacher's `OrchestrationState::save`).

use super::{MemoryBackend, MemoryHit, MemoryMetadata, MemoryRecord};
use crate::agents::planner::normalize_terms;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;

const EMBEDDING_DIM: usize = 16;

/// Deterministic hashing embedder: same text ⇒ same vector, no network
/// dependency, so tests and the default plan are reproducible.
pub fn deterministic_embedding(text: &str) -> Vec<f32> {
    let terms = normalize_terms(text);
    let mut vector = vec![0f32; EMBEDDING_DIM];
    for term in &terms {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % EMBEDDING_DIM;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct PersistedState {
    records: Vec<MemoryRecord>,
}

pub struct LocalMemory {
    records: Mutex<Vec<MemoryRecord>>,
    state_path: Option<PathBuf>,
}

impl LocalMemory {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            state_path: None,
        }
    }

    pub fn with_persistence(state_path: PathBuf) -> Self {
        let mut mem = Self::new();
        if let Ok(content) = std::fs::read_to_string(&state_path)
            && let Ok(state) = serde_json::from_str::<PersistedState>(&content)
        {
            mem.records = Mutex::new(state.records);
        }
        mem.state_path = Some(state_path);
        mem
    }

    fn token_overlap_score(goal_terms: &[String], record_terms: &[String]) -> f32 {
        if goal_terms.is_empty() {
            return 0.0;
        }
        let overlap = goal_terms.iter().filter(|t| record_terms.contains(t)).count();
        overlap as f32 / goal_terms.len() as f32
    }
}

impl Default for LocalMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend for LocalMemory {
    fn remember(&self, text: &str, metadata: MemoryMetadata) {
        let embedding = deterministic_embedding(text);
        let mut records = self.records.lock().expect("memory mutex poisoned");
        records.push(MemoryRecord {
            text: text.to_string(),
            metadata,
            embedding: Some(embedding),
        });
    }

    fn search(&self, query: &str, profile: &str, top_k: usize) -> Vec<MemoryHit> {
        let query_terms = normalize_terms(query);
        let records = self.records.lock().expect("memory mutex poisoned");
        let mut hits: Vec<MemoryHit> = records
            .iter()
            .filter(|r| r.metadata.profile == profile)
            .map(|r| {
                let record_terms = normalize_terms(&r.text);
                let score = Self::token_overlap_score(&query_terms, &record_terms);
                MemoryHit {
                    record: r.clone(),
                    score,
                }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        hits
    }

    fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let records = self.records.lock().expect("memory mutex poisoned");
        let state = PersistedState {
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&state)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Option<MemoryRecord> {
        let records = self.records.lock().expect("memory mutex poisoned");
        records.iter().find(|r| r.text == key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_yields_same_embedding() {
        assert_eq!(deterministic_embedding("find cheap flights"), deterministic_embedding("find cheap flights"));
    }

    #[test]
    fn s5_profile_isolation() {
        let mem = LocalMemory::new();
        mem.remember(
            "secret-A",
            MemoryMetadata {
                profile: "A".to_string(),
                trace_id: None,
                tags: vec![],
            },
        );
        assert!(mem.search("secret", "B", 3).is_empty());
        assert_eq!(mem.search("secret", "A", 3).len(), 1);
    }

    #[test]
    fn flush_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let mem = LocalMemory::with_persistence(path.clone());
        mem.remember(
            "find cheap flights",
            MemoryMetadata {
                profile: "default".to_string(),
                trace_id: Some("t1".to_string()),
                tags: vec![],
            },
        );
        mem.flush().unwrap();

        let reloaded = LocalMemory::with_persistence(path);
        let hits = reloaded.search("cheap flights", "default", 5);
        assert_eq!(hits.len(), 1);
    }
}
