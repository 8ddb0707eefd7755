//! Normalized build-step shapes produced by the config loader.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;

/// A single normalized step in a phase/variant's command sequence.
///
/// The loader guarantees exactly one of the two shapes below: a step either
/// carries `sh` (a shell command to run) or it is metadata-only, applying
/// settings forward to later steps in the same variant. This invariant is
/// enforced at construction, not by the type system alone, because the
/// config loader assembles a `Step` incrementally while walking a YAML
/// mapping and only knows at the end whether `sh` was present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// The command to run, already POSIX-shell-split. `None` for a
    /// metadata-only step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sh: Option<Vec<String>>,

    /// Extra environment for this step. A `None` value removes an
    /// inherited variable of the same name rather than setting it empty.
    #[serde(default)]
    pub environment: BTreeMap<String, Option<String>>,

    /// Per-step timeout, in seconds. Only valid once per variant on a
    /// metadata-only step before the first `sh` step executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Container image override for this step only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Bind-mount the host Docker socket into the container.
    #[serde(default)]
    pub docker_in_docker: bool,

    /// Credentials to resolve and expose as environment variables.
    #[serde(default)]
    pub with_credentials: Vec<Credential>,

    /// Additional containers whose volumes should be inherited
    /// (`docker run --volumes-from`), identified by the image that
    /// produced them.
    #[serde(default)]
    pub volumes_from: Vec<String>,

    /// Raw passthrough arguments appended to the `docker run` invocation.
    #[serde(default)]
    pub extra_docker_args: BTreeMap<String, String>,

    /// Iteration mode: run once, or once per commit in a named range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<Foreach>,

    /// Gate on whether the current commit represents a change.
    #[serde(default)]
    pub run_on_change: RunOnChange,

    /// Worktree sub-commits this step may declare changes into, keyed by
    /// the worktree subdirectory.
    #[serde(default)]
    pub worktrees: BTreeMap<String, WorktreeSpec>,

    /// Artifacts that must exist after this step (build fails otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArtifactSpec>,

    /// Artifacts the step may or may not have produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<ArtifactSpec>,

    /// JUnit-style test-result files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junit: Option<ArtifactSpec>,

    /// Human-readable label, surfaced in `getinfo` and log lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Outer-driver node/agent label. The first step in a variant that
    /// sets this binds it for the whole variant across every phase
    ///; a later disagreement is a config error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_label: Option<String>,

    /// Whether this phase's variant must wait for every variant of the
    /// previous phase to finish before starting. Defaults to `true`;
    /// setting it `false` is rejected when the previous phase's same
    /// variant used `run-on-change`, `stash`, or `worktrees`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_on_full_previous_phase: Option<bool>,

    /// Preserve workspace changes made by this step into the next phase
    /// (inter-phase-dependent, like `worktrees`/`run-on-change`).
    #[serde(default)]
    pub stash: bool,
}

impl Step {
    /// A step with no command and no settings — the identity element steps
    /// fold into when the loader assembles a variant's sequence.
    pub fn metadata_only() -> Self {
        Self {
            sh: None,
            environment: BTreeMap::new(),
            timeout: None,
            image: None,
            docker_in_docker: false,
            with_credentials: Vec::new(),
            volumes_from: Vec::new(),
            extra_docker_args: BTreeMap::new(),
            foreach: None,
            run_on_change: RunOnChange::default(),
            worktrees: BTreeMap::new(),
            archive: None,
            fingerprint: None,
            junit: None,
            description: None,
            node_label: None,
            wait_on_full_previous_phase: None,
            stash: false,
        }
    }

    /// Whether this step carries a shell command, as opposed to being
    /// purely a carrier of forward-applied settings.
    pub fn is_shell(&self) -> bool {
        self.sh.is_some()
    }
}

/// A worktree declaration: which files to stage and commit into a
/// sub-repository checked out at `worktrees[subdir]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorktreeSpec {
    /// Explicit file list to stage. Empty means "stage all untracked and
    /// modified files" within the worktree.
    #[serde(default)]
    pub changed_files: Vec<Utf8PathBuf>,
    /// Commit message for the worktree sub-commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

/// `run-on-change` gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOnChange {
    /// Always execute the step.
    #[default]
    Always,
    /// Skip the step if a change is present; otherwise run.
    Never,
    /// Run only when a change is present and the target ref is
    /// publish-allowed.
    Only,
    /// Like `Only`, but additionally requires `version-bumped` to be set
    /// on the current commit's `PerCommitMeta`.
    NewVersionOnly,
}

/// `foreach` iteration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Foreach {
    /// Iterate the commits introduced by the source branch.
    SourceCommit,
    /// Iterate the commits an autosquash pass would produce.
    AutosquashedCommit,
}

/// `{ artifacts | test_results: [pattern], target?, allow_missing: bool }`
///. Patterns are POSIX globs where `**` matches any number
/// of path components and the `(*)` shorthand normalizes to `*`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Glob patterns, already normalized (`(*)` → `*`).
    pub patterns: Vec<String>,
    /// Optional rename/relocation target for matched files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Utf8PathBuf>,
    /// If true, a pattern matching nothing is not an error.
    #[serde(default)]
    pub allow_missing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_only_step_has_no_command() {
        let step = Step::metadata_only();
        assert!(!step.is_shell());
        assert!(step.sh.is_none());
    }

    #[test]
    fn run_on_change_defaults_to_always() {
        assert_eq!(RunOnChange::default(), RunOnChange::Always);
    }

    #[test]
    fn step_roundtrips_through_json() {
        let mut step = Step::metadata_only();
        step.sh = Some(vec!["echo".into(), "hi".into()]);
        step.environment.insert("FOO".into(), Some("bar".into()));
        step.environment.insert("BAZ".into(), None);

        let json = serde_json::to_string(&step).expect("serialize");
        let back: Step = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, step);
    }
}
