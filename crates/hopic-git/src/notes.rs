//! Hopic's signature note on the submit commit.
//!
//! Every commit Hopic produces at `refs/notes/hopic/<target-ref>` carries a
//! `Committed-by:` identity line, the runtime version, and the plugin list
//! active at the time. A pre-existing note without the expected version
//! line means a different, incompatible Hopic run already touched this
//! commit, and the submit must refuse rather than overwrite it.

use anyhow::{Context, Result};
use camino::Utf8Path;

use crate::{command, ensure_success, run_optional};

#[derive(Debug)]
pub struct NotesMismatch {
    pub commit: String,
}

impl std::fmt::Display for NotesMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "a Hopic note already exists on {} but does not match this runtime's version",
            self.commit
        )
    }
}

impl std::error::Error for NotesMismatch {}

pub use NotesMismatch as NotesError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesSignature {
    pub committer_identity: String,
    pub hopic_version: String,
    pub plugins: Vec<String>,
}

impl NotesSignature {
    fn render(&self) -> String {
        let mut body = format!(
            "Committed-by: {}\nHopic-Version: {}\n",
            self.committer_identity, self.hopic_version
        );
        for plugin in &self.plugins {
            body.push_str(&format!("Hopic-Plugin: {plugin}\n"));
        }
        body
    }

    fn parse(text: &str) -> Option<Self> {
        let mut committer_identity = None;
        let mut hopic_version = None;
        let mut plugins = Vec::new();
        for line in text.lines() {
            if let Some(v) = line.strip_prefix("Committed-by: ") {
                committer_identity = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Hopic-Version: ") {
                hopic_version = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Hopic-Plugin: ") {
                plugins.push(v.to_string());
            }
        }
        Some(Self {
            committer_identity: committer_identity?,
            hopic_version: hopic_version?,
            plugins,
        })
    }
}

fn notes_ref(target_ref: &str) -> String {
    format!("refs/notes/hopic/{target_ref}")
}

/// Reads the existing note on `commit` under `refs/notes/hopic/<target_ref>`,
/// if any.
pub fn read_notes_signature(
    tree: &Utf8Path,
    target_ref: &str,
    commit: &str,
) -> Result<Option<NotesSignature>> {
    let ref_name = notes_ref(target_ref);
    let Some(text) = run_optional(tree, &["notes", "--ref", ref_name.as_str(), "show", commit])?
    else {
        return Ok(None);
    };
    Ok(NotesSignature::parse(&text))
}

/// Writes `signature` as a note on `commit`, refusing if a note already
/// exists whose `Hopic-Version` line doesn't match `signature`'s.
pub fn write_notes_signature(
    tree: &Utf8Path,
    target_ref: &str,
    commit: &str,
    signature: &NotesSignature,
) -> Result<()> {
    if let Some(existing) = read_notes_signature(tree, target_ref, commit)? {
        if existing.hopic_version != signature.hopic_version {
            return Err(NotesMismatch {
                commit: commit.to_string(),
            }
            .into());
        }
        return Ok(());
    }

    let ref_name = notes_ref(target_ref);
    let output = command(
        tree,
        &[
            "notes",
            "--ref",
            ref_name.as_str(),
            "add",
            "-m",
            &signature.render(),
            commit,
        ],
    )
    .output()
    .with_context(|| format!("writing Hopic notes signature on {commit}"))?;
    ensure_success(&["notes", "add"], &output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo(dir: &Utf8Path) -> String {
        Command::new("git").args(["init", "-q"]).current_dir(dir).status().unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir)
            .status()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test User"])
            .current_dir(dir)
            .status()
            .unwrap();
        Command::new("git")
            .args(["commit", "--allow-empty", "-q", "-m", "initial"])
            .current_dir(dir)
            .status()
            .unwrap();
        String::from_utf8(
            Command::new("git")
                .args(["rev-parse", "HEAD"])
                .current_dir(dir)
                .output()
                .unwrap()
                .stdout,
        )
        .unwrap()
        .trim()
        .to_string()
    }

    fn signature(version: &str) -> NotesSignature {
        NotesSignature {
            committer_identity: "Hopic <1.0.0>".to_string(),
            hopic_version: version.to_string(),
            plugins: vec!["hopic-git".to_string()],
        }
    }

    #[test]
    fn writes_and_reads_back_a_fresh_signature() {
        let td = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(td.path()).expect("utf8");
        let commit = init_repo(root);

        write_notes_signature(root, "main", &commit, &signature("1.0.0")).expect("writes");
        let read = read_notes_signature(root, "main", &commit)
            .expect("reads")
            .expect("present");
        assert_eq!(read.hopic_version, "1.0.0");
    }

    #[test]
    fn rewriting_same_version_is_a_noop() {
        let td = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(td.path()).expect("utf8");
        let commit = init_repo(root);

        write_notes_signature(root, "main", &commit, &signature("1.0.0")).expect("writes");
        write_notes_signature(root, "main", &commit, &signature("1.0.0")).expect("idempotent");
    }

    #[test]
    fn rewriting_different_version_is_refused() {
        let td = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(td.path()).expect("utf8");
        let commit = init_repo(root);

        write_notes_signature(root, "main", &commit, &signature("1.0.0")).expect("writes");
        let err = write_notes_signature(root, "main", &commit, &signature("2.0.0"))
            .expect_err("must refuse");
        assert!(err.downcast_ref::<NotesMismatch>().is_some());
    }

    #[test]
    fn reading_absent_note_is_none() {
        let td = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(td.path()).expect("utf8");
        let commit = init_repo(root);

        assert!(read_notes_signature(root, "main", &commit).expect("reads").is_none());
    }
}
