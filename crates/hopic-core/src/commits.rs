//! Commit listing for the change preparer and version-bump state machine
//!: `git log --first-parent --no-merges`, parsed into
//! classified commits in base-to-tip order.

use anyhow::{Context, Result};
use camino::Utf8Path;

use crate::classifier::ConventionalClassifier;

/// One commit in a `git log --first-parent --no-merges` range, oldest-first.
#[derive(Debug, Clone)]
pub struct RawCommit {
    pub hexsha: String,
    pub author: String,
    pub authored_date: String,
    pub message: String,
}

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';

/// Lists `range` (e.g. `"<base>..<tip>"`, or a single ref for "everything
/// reachable from it") via `git log --first-parent --no-merges`, oldest
/// commit first — the order `foreach` iterations and squash-comparison both
/// need (`git log` itself reports child-to-parent, so this function
/// reverses it to restore base-to-tip).
pub fn log_first_parent_no_merges(tree: &Utf8Path, range: &str) -> Result<Vec<RawCommit>> {
    let format = format!("%H{FIELD_SEP}%an <%ae>{FIELD_SEP}%aI{FIELD_SEP}%B{RECORD_SEP}");
    let output = hopic_git::git(
        tree,
        &["log", "--first-parent", "--no-merges", &format!("--pretty=format:{format}"), range],
    )
    .with_context(|| format!("listing commits in range `{range}`"))?;

    let mut commits: Vec<RawCommit> = output
        .split(RECORD_SEP)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(|record| {
            let mut fields = record.splitn(4, FIELD_SEP);
            let hexsha = fields.next().unwrap_or_default().to_string();
            let author = fields.next().unwrap_or_default().to_string();
            let authored_date = fields.next().unwrap_or_default().to_string();
            let message = fields.next().unwrap_or_default().trim_end_matches('\n').to_string();
            RawCommit { hexsha, author, authored_date, message }
        })
        .collect();

    // `git log` emits newest-first; callers want base-to-tip.
    commits.reverse();
    Ok(commits)
}

/// Classifies every commit in `commits` against the Conventional Commits
/// grammar, in the same (base-to-tip) order.
pub fn classify_all(commits: &[RawCommit], strict: bool) -> Result<Vec<ConventionalClassifier>> {
    commits
        .iter()
        .map(|c| ConventionalClassifier::parse(c.hexsha.clone(), &c.message, strict))
        .collect()
}

/// The `(author, authored_date, message)` tuple used to compare a
/// pre-squash and post-squash commit range for equivalence, after dropping
/// autosquash-marked commits from each side.
pub fn squashed_identity_tuples(commits: &[RawCommit], classified: &[ConventionalClassifier]) -> Vec<(String, String, String)> {
    use crate::classifier::CommitClassifier;

    commits
        .iter()
        .zip(classified.iter())
        .filter(|(_, c)| !c.needs_autosquash())
        .map(|(raw, _)| (raw.author.clone(), raw.authored_date.clone(), raw.message.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo() -> (tempfile::TempDir, camino::Utf8PathBuf) {
        let td = tempdir().unwrap();
        let dir = camino::Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        Command::new("git").args(["init", "-q"]).current_dir(&dir).status().unwrap();
        Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(&dir).status().unwrap();
        Command::new("git").args(["config", "user.name", "Test User"]).current_dir(&dir).status().unwrap();
        (td, dir)
    }

    fn commit(dir: &camino::Utf8Path, message: &str) {
        std::fs::write(dir.join("f"), message).unwrap();
        Command::new("git").args(["add", "-A"]).current_dir(dir).status().unwrap();
        Command::new("git").args(["commit", "-q", "-m", message]).current_dir(dir).status().unwrap();
    }

    #[test]
    fn lists_commits_oldest_first() {
        let (_td, dir) = init_repo();
        commit(&dir, "chore: base");
        commit(&dir, "feat: add widget");
        commit(&dir, "fix: correct widget");

        let commits = log_first_parent_no_merges(&dir, "HEAD~2..HEAD").expect("logs");
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message.trim(), "feat: add widget");
        assert_eq!(commits[1].message.trim(), "fix: correct widget");
    }

    #[test]
    fn classify_all_preserves_order() {
        let (_td, dir) = init_repo();
        commit(&dir, "chore: base");
        commit(&dir, "feat: add widget");

        let commits = log_first_parent_no_merges(&dir, "HEAD~1..HEAD").expect("logs");
        let classified = classify_all(&commits, false).expect("classifies");
        assert_eq!(classified.len(), 1);
        use hopic_version::CommitSignal;
        assert!(classified[0].has_new_feature());
    }
}
