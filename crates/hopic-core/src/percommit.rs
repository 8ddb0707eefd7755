//! Read/write implementation for [`hopic_types::PerCommitMeta`]: a Git
//! config section `hopic.<commit-sha>` in the workspace's local
//! `.git/config`, the same way `hopic-git::checkout`'s `hopic.code`
//! section stores checkout-time bookkeeping.

use anyhow::{Context, Result};
use camino::Utf8Path;
use hopic_types::PerCommitMeta;

const KEY_REF: &str = "ref";
const KEY_REMOTE: &str = "remote";
const KEY_REFSPEC: &str = "refspec";
const KEY_TARGET_COMMIT: &str = "target-commit";
const KEY_SOURCE_COMMIT: &str = "source-commit";
const KEY_AUTOSQUASHED_COMMIT: &str = "autosquashed-commit";
const KEY_VERSION_BUMPED: &str = "version-bumped";

fn config_key(section: &str, key: &str) -> String {
    format!("{section}.{key}")
}

/// Reads the `hopic.<commit_sha>` section back, or `None` if the section
/// doesn't exist (an untouched `checkout-source-tree` run, or a commit that
/// was never prepared).
pub fn read(tree: &Utf8Path, commit_sha: &str) -> Result<Option<PerCommitMeta>> {
    let section = PerCommitMeta::section_name(commit_sha);

    let Some(ref_) = hopic_git::git_optional(tree, &["config", "--local", "--get", &config_key(&section, KEY_REF)])?
    else {
        return Ok(None);
    };
    let remote = hopic_git::git(tree, &["config", "--local", "--get", &config_key(&section, KEY_REMOTE)])
        .context("reading hopic.<sha>.remote")?;
    let refspecs = hopic_git::git_optional(tree, &["config", "--local", "--get-all", &config_key(&section, KEY_REFSPEC)])?
        .map(|out| out.lines().map(str::to_string).collect())
        .unwrap_or_default();
    let target_commit = hopic_git::git(tree, &["config", "--local", "--get", &config_key(&section, KEY_TARGET_COMMIT)])
        .context("reading hopic.<sha>.target-commit")?;
    let source_commit =
        hopic_git::git_optional(tree, &["config", "--local", "--get", &config_key(&section, KEY_SOURCE_COMMIT)])?;
    let autosquashed_commit = hopic_git::git_optional(
        tree,
        &["config", "--local", "--get", &config_key(&section, KEY_AUTOSQUASHED_COMMIT)],
    )?;
    let version_bumped = hopic_git::git_optional(
        tree,
        &["config", "--local", "--get", &config_key(&section, KEY_VERSION_BUMPED)],
    )?
    .is_some_and(|v| v == "true");

    Ok(Some(PerCommitMeta {
        ref_,
        remote,
        refspecs,
        target_commit,
        source_commit,
        autosquashed_commit,
        version_bumped,
    }))
}

/// Writes `meta` into the `hopic.<commit_sha>` section, replacing any
/// previous contents for that commit.
pub fn write(tree: &Utf8Path, commit_sha: &str, meta: &PerCommitMeta) -> Result<()> {
    let section = PerCommitMeta::section_name(commit_sha);
    let _ = hopic_git::git_optional(tree, &["config", "--remove-section", &section]);

    hopic_git::git(tree, &["config", "--local", &config_key(&section, KEY_REF), &meta.ref_])
        .context("writing hopic.<sha>.ref")?;
    hopic_git::git(tree, &["config", "--local", &config_key(&section, KEY_REMOTE), &meta.remote])
        .context("writing hopic.<sha>.remote")?;
    for refspec in &meta.refspecs {
        hopic_git::git(tree, &["config", "--local", "--add", &config_key(&section, KEY_REFSPEC), refspec])
            .context("writing hopic.<sha>.refspec")?;
    }
    hopic_git::git(tree, &["config", "--local", &config_key(&section, KEY_TARGET_COMMIT), &meta.target_commit])
        .context("writing hopic.<sha>.target-commit")?;
    if let Some(source_commit) = &meta.source_commit {
        hopic_git::git(tree, &["config", "--local", &config_key(&section, KEY_SOURCE_COMMIT), source_commit])
            .context("writing hopic.<sha>.source-commit")?;
    }
    if let Some(autosquashed_commit) = &meta.autosquashed_commit {
        hopic_git::git(
            tree,
            &["config", "--local", &config_key(&section, KEY_AUTOSQUASHED_COMMIT), autosquashed_commit],
        )
        .context("writing hopic.<sha>.autosquashed-commit")?;
    }
    hopic_git::git(
        tree,
        &[
            "config",
            "--local",
            &config_key(&section, KEY_VERSION_BUMPED),
            if meta.version_bumped { "true" } else { "false" },
        ],
    )
    .context("writing hopic.<sha>.version-bumped")?;

    Ok(())
}

/// Removes the `hopic.<commit_sha>` section outright, used once a commit's
/// state has been carried forward to a new one (or consumed by `submit`).
pub fn remove(tree: &Utf8Path, commit_sha: &str) -> Result<()> {
    let section = PerCommitMeta::section_name(commit_sha);
    let _ = hopic_git::git_optional(tree, &["config", "--remove-section", &section]);
    Ok(())
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

    #[test]
    fn round_trips_through_git_config() {
        let (_td, dir) = init_repo();
        let meta = PerCommitMeta {
            ref_: "refs/heads/main".to_string(),
            remote: "origin".to_string(),
            refspecs: vec!["+refs/heads/main:refs/heads/main".to_string()],
            target_commit: "deadbeef".to_string(),
            source_commit: Some("cafef00d".to_string()),
            autosquashed_commit: None,
            version_bumped: true,
        };
        write(&dir, "abc123", &meta).expect("write");
        let back = read(&dir, "abc123").expect("read").expect("present");
        assert_eq!(back, meta);
    }

    #[test]
    fn missing_section_reads_as_none() {
        let (_td, dir) = init_repo();
        assert!(read(&dir, "nonexistent").expect("read").is_none());
    }

    #[test]
    fn rewrite_replaces_previous_contents() {
        let (_td, dir) = init_repo();
        let first = PerCommitMeta {
            ref_: "refs/heads/main".to_string(),
            remote: "origin".to_string(),
            refspecs: vec!["a".to_string(), "b".to_string()],
            target_commit: "one".to_string(),
            source_commit: None,
            autosquashed_commit: None,
            version_bumped: false,
        };
        write(&dir, "abc123", &first).expect("write");

        let second = PerCommitMeta {
            ref_: "refs/heads/main".to_string(),
            remote: "origin".to_string(),
            refspecs: vec!["c".to_string()],
            target_commit: "two".to_string(),
            source_commit: None,
            autosquashed_commit: None,
            version_bumped: false,
        };
        write(&dir, "abc123", &second).expect("write");

        let back = read(&dir, "abc123").expect("read").expect("present");
        assert_eq!(back, second);
    }
}
