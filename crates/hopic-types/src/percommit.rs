//! `PerCommitMeta` — the cross-subcommand state record.
//!
//! Stored as a Git config section `hopic.<commit-sha>` in the workspace
//! repository; see `hopic-core::percommit` for the read/write
//! implementation. This module only owns the shape.

use serde::{Deserialize, Serialize};

/// State handed from `prepare-source-tree`/`checkout-source-tree` to
/// `build` and `submit` through the workspace's local Git configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerCommitMeta {
    /// Target ref, as known at checkout time.
    pub ref_: String,
    /// Remote name the ref was fetched from.
    pub remote: String,
    /// Shell-quoted refspecs to push at submit time.
    pub refspecs: Vec<String>,
    /// Commit the change was prepared against.
    pub target_commit: String,
    /// Tip of the source branch/PR, if applicable.
    pub source_commit: Option<String>,
    /// Tip of the commit range an autosquash pass would fold, if computed.
    pub autosquashed_commit: Option<String>,
    /// Whether the version-bump state machine produced a new version for
    /// this commit.
    pub version_bumped: bool,
}

impl PerCommitMeta {
    /// The Git config section name this record lives under, keyed by the
    /// commit it describes.
    pub fn section_name(commit_sha: &str) -> String {
        format!("hopic.{commit_sha}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_name_is_keyed_by_commit() {
        assert_eq!(PerCommitMeta::section_name("abc123"), "hopic.abc123");
    }
}
