//! Sandbox profile contract (spec §4.4.2). Declarative only — no concrete
//! sandbox runtime is implemented here, per the non-goal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxProfile {
    PySlim,
    PyFull,
    NodeSlim,
    NodeFull,
    Orchestrator,
}

impl SandboxProfile {
    pub fn network_allowed_by_default(self) -> bool {
        matches!(self, SandboxProfile::PyFull | SandboxProfile::NodeFull | SandboxProfile::Orchestrator)
    }

    /// Writable roots declared by the profile contract table.
    pub fn writable_roots(self) -> &'static [&'static str] {
        match self {
            SandboxProfile::PySlim | SandboxProfile::NodeSlim => &["/workdir"],
            SandboxProfile::PyFull | SandboxProfile::NodeFull => &["/workdir", "/tmp"],
            SandboxProfile::Orchestrator => &["/"],
        }
    }

    /// Canonicalize `path` and reject it if it falls outside the profile's
    /// writable roots. `Orchestrator` is unrestricted ("Full" in the table).
    pub fn check_path(self, path: &Path) -> Result<PathBuf, String> {
        if self == SandboxProfile::Orchestrator {
            return Ok(path.to_path_buf());
        }
        let roots = self.writable_roots();
        let path_str = path.to_string_lossy();
        if roots.iter().any(|root| path_str.starts_with(root)) {
            Ok(path.to_path_buf())
        } else {
            Err(format!(
                "path '{}' is outside writable roots {:?} for profile {:?}",
                path_str, roots, self
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slim_profile_rejects_tmp() {
        let res = SandboxProfile::PySlim.check_path(Path::new("/tmp/x"));
        assert!(res.is_err());
    }

    #[test]
    fn full_profile_allows_tmp() {
        let res = SandboxProfile::PyFull.check_path(Path::new("/tmp/x"));
        assert!(res.is_ok());
    }

    #[test]
    fn orchestrator_profile_unrestricted() {
        let res = SandboxProfile::Orchestrator.check_path(Path::new("/etc/shadow"));
        assert!(res.is_ok());
    }
}
