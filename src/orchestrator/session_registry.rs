//! Tracks concurrently in-flight orchestration sessions by trace id (spec
//! §5: "multiple requests execute concurrently"). Grounded on the teacher's
//! mutex-guarded session map: short lock, read or mutate one entry, release
//! — never held across an `.await`.

use super::LifecycleStage;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, LifecycleStage>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    pub fn begin(&self, trace_id: &str) {
        let mut sessions = self.sessions.lock().expect("session registry mutex poisoned");
        sessions.insert(trace_id.to_string(), LifecycleStage::Initialize);
    }

    pub fn update(&self, trace_id: &str, stage: LifecycleStage) {
        let mut sessions = self.sessions.lock().expect("session registry mutex poisoned");
        sessions.insert(trace_id.to_string(), stage);
    }

    pub fn stage_of(&self, trace_id: &str) -> Option<LifecycleStage> {
        let sessions = self.sessions.lock().expect("session registry mutex poisoned");
        sessions.get(trace_id).copied()
    }

    /// Drops the session once it reaches a terminal stage; returns its last
    /// known stage for callers that want to log it.
    pub fn end(&self, trace_id: &str) -> Option<LifecycleStage> {
        let mut sessions = self.sessions.lock().expect("session registry mutex poisoned");
        sessions.remove(trace_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().expect("session registry mutex poisoned").len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_sessions_are_isolated_by_trace_id() {
        let registry = SessionRegistry::new();
        registry.begin("t1");
        registry.begin("t2");
        registry.update("t1", LifecycleStage::Execute);
        assert_eq!(registry.stage_of("t1"), Some(LifecycleStage::Execute));
        assert_eq!(registry.stage_of("t2"), Some(LifecycleStage::Initialize));
        assert_eq!(registry.active_count(), 2);

        registry.end("t1");
        assert_eq!(registry.stage_of("t1"), None);
        assert_eq!(registry.active_count(), 1);
    }
}
