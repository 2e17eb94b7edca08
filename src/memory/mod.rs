//! Vector Memory substrate (spec §4.6): profile-isolated, pluggable backends.

mod local;

pub use local::LocalMemory;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub text: String,
    pub metadata: MemoryMetadata,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub profile: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Backend trait implemented by `LocalMemory` and, externally, by a
/// concrete vector-DB adapter (not part of this substrate — only the
/// interface is specified, per the non-goal).
pub trait MemoryBackend: Send + Sync {
    fn remember(&self, text: &str, metadata: MemoryMetadata);
    /// `search` filters to `metadata.profile == requesting profile`; a
    /// cross-profile read is structurally impossible through this API.
    fn search(&self, query: &str, profile: &str, top_k: usize) -> Vec<MemoryHit>;
    fn flush(&self) -> std::io::Result<()>;
    fn load(&self, key: &str) -> Option<MemoryRecord>;
}
