//! SemVer and Caruso-SemVer version parsing, ordering and incrementing,
//! plus `git describe` interpretation and hotfix-branch identifier
//! extraction for the Hopic change-integration engine.
//!
//! Two concrete version formats exist side by side ([`SemVer`] and
//! [`CarusoVer`]) rather than one polymorphic type, because their
//! incrementing operations genuinely differ (Caruso has no `major`/`minor`
//! bump, SemVer has no `increment`/`fix` pair). Both implement
//! [`VersionFormat`], the seam [`read_version`]/[`replace_version`] and the
//! config loader's version-policy dispatch use to stay generic over which
//! one is configured.

mod caruso;
mod git_describe;
mod hotfix;
mod identifiers;
mod io;
mod semver;

pub use caruso::CarusoVer;
pub use git_describe::GitVersion;
pub use hotfix::hotfix_id;
pub use io::{read_version, replace_version};
pub use semver::SemVer;

use regex::Regex;

/// A commit's classification, as produced by a commit-message classifier
/// external to this crate. [`VersionFormat::next_version_for_commits`]
/// folds a sequence of these into a single version bump.
pub trait CommitSignal {
    fn has_breaking_change(&self) -> bool;
    fn has_new_feature(&self) -> bool;
    fn has_fix(&self) -> bool;
}

/// A parseable, orderable, incrementable version format.
pub trait VersionFormat: std::fmt::Display + Clone + std::fmt::Debug + Sized {
    /// The compiled pattern `parse` matches against. Also used by
    /// [`replace_version`] to locate an existing version string in a file.
    fn version_regex() -> &'static Regex;

    /// Parses a version string, optionally prefixed with `version=`.
    fn parse(s: &str) -> Option<Self>;

    /// Advances the version for a batch of classified commits: major on any
    /// breaking change, else minor on any new feature, else patch on any
    /// fix, else unchanged.
    fn next_version_for_commits<'a>(
        &self,
        commits: impl IntoIterator<Item = &'a dyn CommitSignal>,
    ) -> anyhow::Result<Self>;
}

/// A marker error for versioning failures that must surface as a distinct
/// exit code at the CLI boundary, rather than a generic failure.
#[derive(Debug)]
pub struct VersioningFailure(pub String);

impl std::fmt::Display for VersioningFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for VersioningFailure {}
