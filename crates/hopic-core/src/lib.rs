//! Change preparation, phase execution, and submission engine for the
//! Hopic change-integration CI tool.
//!
//! This crate owns everything between `hopic-config` having produced a
//! [`hopic_types::PipelineConfig`] and `hopic-cli` driving a build end to
//! end: commit classification and version-bump state (`classifier`,
//! `version_state`, `commits`), the three `prepare-source-tree` modes
//! (`prepare`), per-commit bookkeeping (`percommit`), variant/phase
//! execution (`phase`), artifact resolution (`artifact`), submission
//! (`submit`), the shared error taxonomy (`errors`), and `tracing` setup
//! (`observability`).

mod artifact;
mod classifier;
mod commits;
mod errors;
mod observability;
mod percommit;
mod phase;
mod prepare;
mod submit;
mod version_state;

pub use artifact::{resolve_artifacts, ArtifactNormalizer, NullNormalizer};
pub use classifier::{is_known_type_tag, CommitClassifier, ConventionalClassifier};
pub use commits::{classify_all, log_first_parent_no_merges, squashed_identity_tuples, RawCommit};
pub use errors::HopicError;
pub use observability::{env_filter, init, ObservabilityConfig};
pub use percommit::{read as read_percommit, remove as remove_percommit, write as write_percommit};
pub use phase::{
    bundle_worktree_range, ChangeContext, CredentialResolver, ForeachRanges, NullCredentialResolver, StepOutcome,
    VariantRunner, VersionVars,
};
pub use prepare::{
    build_post_submit_bump_commit, prepare_source_tree, GitIdentity, MergeChangeRequestOptions, PrepareIdentity,
    PrepareMode, PrepareOutcome,
};
pub use submit::{submit, SubmitOptions, SubmitOutcome};
pub use version_state::{guard, hotfix_rebase, is_eligible, is_publish_allowed, Hotfixable};
