//! Bind-mount and cross-job lock descriptors.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A single `volumes` entry: a host path bind-mounted at a container-guest
/// path. Three defaults (`/code`, `/etc/passwd`, `/etc/group`) are inserted
/// by the config loader unless already present or suppressed with
/// `source: null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Host-side source path, resolved against `${CFGDIR}` unless absolute.
    /// `None` means "suppress this default mount".
    pub source: Option<Utf8PathBuf>,
    /// Mount read-only.
    #[serde(default)]
    pub read_only: bool,
}

/// A declarative lock descriptor consumed by the outer CI driver, not
/// enforced by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiLock {
    pub repo_name: String,
    pub branch: String,
    pub lock_on_change: LockOnChange,
    /// Only acquire the lock from this phase onward; `None` means from the
    /// start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_phase_onward: Option<String>,
}

/// When a `ci-locks` entry applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockOnChange {
    Always,
    OnlyOnChange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ci_lock_identity_is_repo_and_branch() {
        let a = CiLock {
            repo_name: "repo".into(),
            branch: "main".into(),
            lock_on_change: LockOnChange::Always,
            from_phase_onward: None,
        };
        let b = CiLock {
            repo_name: "repo".into(),
            branch: "main".into(),
            lock_on_change: LockOnChange::OnlyOnChange,
            from_phase_onward: Some("build".into()),
        };
        // Two locks over the same (repo, branch) are a config error at
        // load time regardless of their other fields — equality here is
        // only over the identity the loader rejects duplicates on.
        assert_eq!(
            (a.repo_name.as_str(), a.branch.as_str()),
            (b.repo_name.as_str(), b.branch.as_str())
        );
    }
}
