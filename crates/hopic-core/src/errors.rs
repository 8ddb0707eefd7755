//! The stable error taxonomy and exit codes the Hopic CLI surfaces to users.
//!
//! Every variant mirrors one of the Click exceptions the original Python
//! implementation raised, message wording and all, so a script that greps
//! Hopic's stderr output or checks its exit code keeps working unchanged.
//! `hopic-cli`'s `main` downcasts the top-level `anyhow::Error` against this
//! type (and against the marker errors the lower crates define) to pick the
//! process exit code.

use std::fmt;

/// One variant per stable error category, each carrying exactly the fields
/// needed to format its message.
#[derive(Debug)]
pub enum HopicError {
    /// A pipeline config file failed to parse or violated an invariant.
    /// `file` is `None` when the error isn't tied to a specific path.
    Configuration { message: String, file: Option<String> },
    /// The version engine could not compute a next version.
    Versioning { message: String },
    /// A step referenced a credential id the keystore has no entry for.
    MissingCredentialVar { credential_id: String, var_name: String },
    /// `build`/`getinfo` was asked for a phase the config doesn't define.
    UnknownPhase { phase: Vec<String> },
    /// The conventional-commits bump and the merge-commit bump disagreed.
    VersionBumpMismatch { commit_version: String, merge_version: String },
    /// A `checkout-source-tree` target commit isn't an ancestor of the
    /// remote ref it's meant to update — usually a force-push.
    CommitAncestorMismatch { commit: String, ancestor_commit: String, r#ref: String },
    /// An `archive`/`fingerprint`/`junit` pattern matched nothing and
    /// `allow_missing` was not set.
    MissingFile { message: String },
    /// `git notes` already carries a Hopic signature that disagrees with
    /// the one this run would write.
    GitNotesMismatch { object: String, new_note: String, existing_note: String },
    /// A step's wall-clock budget expired.
    StepTimeoutExpired { timeout: u64, cmd: Option<String>, before: bool },
}

impl HopicError {
    /// The stable process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 32,
            Self::Versioning { .. } => 33,
            Self::MissingCredentialVar { .. } => 34,
            Self::UnknownPhase { .. } => 35,
            Self::VersionBumpMismatch { .. } => 36,
            Self::CommitAncestorMismatch { .. } => 37,
            Self::MissingFile { .. } => 38,
            Self::GitNotesMismatch { .. } => 39,
            Self::StepTimeoutExpired { .. } => 40,
        }
    }

    pub fn configuration(message: impl Into<String>) -> anyhow::Error {
        Self::Configuration { message: message.into(), file: None }.into()
    }

    pub fn configuration_in(file: impl Into<String>, message: impl Into<String>) -> anyhow::Error {
        Self::Configuration { message: message.into(), file: Some(file.into()) }.into()
    }

    pub fn missing_credential_var(credential_id: impl Into<String>, var_name: impl Into<String>) -> anyhow::Error {
        Self::MissingCredentialVar { credential_id: credential_id.into(), var_name: var_name.into() }.into()
    }

    pub fn unknown_phase(phase: Vec<String>) -> anyhow::Error {
        Self::UnknownPhase { phase }.into()
    }
}

impl fmt::Display for HopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { message, file: Some(file) } => {
                write!(f, "configuration error in '{file}': {message}")
            }
            Self::Configuration { message, file: None } => {
                write!(f, "configuration error: {message}")
            }
            Self::Versioning { message } => write!(f, "{message}"),
            Self::MissingCredentialVar { credential_id, var_name } => write!(
                f,
                "credential '{credential_id}' not available when trying to expand variable '{var_name}'"
            ),
            Self::UnknownPhase { phase } => {
                write!(f, "build does not contain phase(s): {}", phase.join(", "))
            }
            Self::VersionBumpMismatch { commit_version, merge_version } => write!(
                f,
                "Version bump for commit messages results in different version ({commit_version}) \
                 than the version based on the merge message ({merge_version})."
            ),
            Self::CommitAncestorMismatch { commit, ancestor_commit, r#ref } => write!(
                f,
                "attempting to checkout commit '{commit}' which is not an ancestor of remote ref '{ref}' ('{ancestor_commit}')\n\
                 possibly remote ref '{ref}' was force pushed to"
            ),
            Self::MissingFile { message } => write!(f, "{message}"),
            Self::GitNotesMismatch { object, new_note, existing_note } => write!(
                f,
                "attempting to add a different note to object '{object}' which already had a Hopic note\n\
                 new note:\n{new_note}\n\n\
                 existing note:\n{existing_note}"
            ),
            Self::StepTimeoutExpired { timeout, cmd, before } => {
                write!(f, "Timeout of {timeout} seconds expired {} executing build command", if *before { "before" } else { "while" })?;
                if let Some(cmd) = cmd {
                    write!(f, ": {cmd}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for HopicError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_spec_table() {
        assert_eq!(HopicError::Configuration { message: String::new(), file: None }.exit_code(), 32);
        assert_eq!(HopicError::Versioning { message: String::new() }.exit_code(), 33);
        assert_eq!(
            HopicError::MissingCredentialVar { credential_id: String::new(), var_name: String::new() }.exit_code(),
            34
        );
        assert_eq!(HopicError::UnknownPhase { phase: vec![] }.exit_code(), 35);
        assert_eq!(
            HopicError::VersionBumpMismatch { commit_version: String::new(), merge_version: String::new() }.exit_code(),
            36
        );
        assert_eq!(
            HopicError::CommitAncestorMismatch {
                commit: String::new(),
                ancestor_commit: String::new(),
                r#ref: String::new()
            }
            .exit_code(),
            37
        );
        assert_eq!(HopicError::MissingFile { message: String::new() }.exit_code(), 38);
        assert_eq!(
            HopicError::GitNotesMismatch { object: String::new(), new_note: String::new(), existing_note: String::new() }
                .exit_code(),
            39
        );
        assert_eq!(
            HopicError::StepTimeoutExpired { timeout: 1, cmd: None, before: false }.exit_code(),
            40
        );
    }

    #[test]
    fn configuration_message_includes_file_when_present() {
        let err = HopicError::Configuration { message: "bad yaml".into(), file: Some("hopic-ci-config.yaml".into()) };
        assert_eq!(err.to_string(), "configuration error in 'hopic-ci-config.yaml': bad yaml");
    }

    #[test]
    fn step_timeout_message_includes_cmd_when_present() {
        let err = HopicError::StepTimeoutExpired { timeout: 4, cmd: Some("sh -c 'sleep 10'".into()), before: false };
        assert_eq!(err.to_string(), "Timeout of 4 seconds expired while executing build command: sh -c 'sleep 10'");
    }

    #[test]
    fn downcasts_through_anyhow() {
        let err: anyhow::Error = HopicError::unknown_phase(vec!["deploy".into()]);
        let hopic_err = err.downcast_ref::<HopicError>().expect("downcasts");
        assert_eq!(hopic_err.exit_code(), 35);
    }
}
