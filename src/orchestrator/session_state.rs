//! Versioned, atomic checkpoint of an in-flight orchestration session, so a
//! long-running run can survive a process restart (spec §3.3 is silent on
//! this; the teacher's `OrchestrationState::{save,load,migrate}` answer —
//! checkpoint atomically, with a schema version — is adopted, see DESIGN.md).

use serde::{Deserialize, Serialize};
use std::path::Path;

const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCheckpoint {
    pub schema_version: u32,
    pub trace_id: String,
    pub goal: String,
    pub stage: String,
    pub trace: Vec<serde_json::Value>,
}

impl SessionCheckpoint {
    pub fn new(trace_id: impl Into<String>, goal: impl Into<String>, stage: &str, trace: Vec<serde_json::Value>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            trace_id: trace_id.into(),
            goal: goal.into(),
            stage: stage.to_string(),
            trace,
        }
    }

    /// Write-temp-then-rename, matching `memory::LocalMemory::flush`.
    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.trace_id));
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn load(dir: &Path, trace_id: &str) -> std::io::Result<Option<Self>> {
        let path = dir.join(format!("{trace_id}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let raw: serde_json::Value = serde_json::from_str(&content)?;
        Self::migrate(raw).map(Some)
    }

    /// Upgrades an on-disk checkpoint to the current schema. Only version 1
    /// exists today; this is the seam a future bump plugs a transform into.
    fn migrate(raw: serde_json::Value) -> std::io::Result<Self> {
        let version = raw.get("schema_version").and_then(|v| v.as_u64()).unwrap_or(0);
        if version != CURRENT_SCHEMA_VERSION as u64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unsupported checkpoint schema version {version}"),
            ));
        }
        serde_json::from_value(raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = SessionCheckpoint::new("trace-1", "find cheap flights", "EXECUTE", vec![serde_json::json!({"event": "stage"})]);
        checkpoint.save(dir.path()).unwrap();

        let loaded = SessionCheckpoint::load(dir.path(), "trace-1").unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn missing_checkpoint_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SessionCheckpoint::load(dir.path(), "nonexistent").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace-bad.json");
        std::fs::write(&path, serde_json::json!({"schema_version": 99, "trace_id": "trace-bad"}).to_string()).unwrap();
        let result = SessionCheckpoint::load(dir.path(), "trace-bad");
        assert!(result.is_err());
    }
}
