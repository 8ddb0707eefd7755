//! Maps a top-level `anyhow::Error` to its stable process exit code:
//! `hopic-core::HopicError` covers most of the taxonomy, but three
//! categories are actually raised by other crates' own error types rather
//! than by `HopicError` itself, so all must be checked here:
//! `CommitAncestorMismatch` and `GitNotesMismatch` from `hopic-git`, and
//! `ConfigError` from `hopic-config` (the loader's own error type, distinct
//! from `HopicError::Configuration`, since `hopic-config` has no dependency
//! on `hopic-core`).

use hopic_config::ConfigError;
use hopic_core::HopicError;
use hopic_git::{CommitAncestorMismatch, NotesError};

/// When an error never carried its own exit code, 1 is the generic
/// fallback (the subprocess exit code is propagated directly otherwise).
const GENERIC_FAILURE: i32 = 1;

pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(hopic_err) = err.downcast_ref::<HopicError>() {
        return hopic_err.exit_code();
    }
    if err.downcast_ref::<CommitAncestorMismatch>().is_some() {
        return 37;
    }
    if err.downcast_ref::<NotesError>().is_some() {
        return 39;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 32;
    }
    GENERIC_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_hopic_error_by_its_own_exit_code() {
        let err = HopicError::unknown_phase(vec!["deploy".into()]);
        assert_eq!(exit_code_for(&err), 35);
    }

    #[test]
    fn maps_commit_ancestor_mismatch_to_37() {
        let err: anyhow::Error =
            CommitAncestorMismatch { commit: "abc".into(), ref_name: "refs/heads/main".into() }.into();
        assert_eq!(exit_code_for(&err), 37);
    }

    #[test]
    fn maps_config_loader_error_to_32() {
        let err: anyhow::Error = ConfigError::new("no pipeline config found");
        assert_eq!(exit_code_for(&err), 32);
    }

    #[test]
    fn unmapped_error_falls_back_to_generic_failure() {
        let err = anyhow::anyhow!("something unrelated broke");
        assert_eq!(exit_code_for(&err), GENERIC_FAILURE);
    }
}
