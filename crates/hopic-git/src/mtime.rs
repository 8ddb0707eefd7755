//! Restores file modification times from Git history.
//!
//! A fresh checkout stamps every file with the checkout time, which defeats
//! any build system that uses mtimes for incremental rebuilds. Walking
//! `git whatchanged` in reverse and applying each file's last-touched
//! commit time recovers the times a long-lived working copy would have had.

use std::fs;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use camino::Utf8Path;

use crate::command;

/// Sets every tracked file's mtime to the commit time it was last changed
/// in. Symlinks are only updated on platforms where the mtime can be set
/// without following the link; gitlinks (submodule entries) are skipped
/// entirely, since they don't correspond to a file in this tree.
pub fn restore_mtime_from_git(tree: &Utf8Path) -> Result<()> {
    let output = command(
        tree,
        &["whatchanged", "--pretty=%ct", "--name-status", "--no-renames"],
    )
    .output()
    .context("running git whatchanged")?;
    crate::ensure_success(&["whatchanged"], &output)?;

    let log = String::from_utf8_lossy(&output.stdout);
    let mut seen = std::collections::HashSet::new();
    let mut current_time: Option<i64> = None;

    for line in log.lines() {
        if let Ok(ts) = line.parse::<i64>() {
            current_time = Some(ts);
            continue;
        }
        let Some(time) = current_time else { continue };
        let Some((status, path)) = line.split_once('\t') else { continue };
        if status.starts_with('D') {
            continue;
        }
        if !seen.insert(path.to_string()) {
            continue;
        }
        apply_mtime(tree, path, time)?;
    }

    Ok(())
}

fn apply_mtime(tree: &Utf8Path, relative_path: &str, unix_time: i64) -> Result<()> {
    let full_path = tree.join(relative_path);
    let metadata = match fs::symlink_metadata(&full_path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };

    if metadata.file_type().is_symlink() {
        // Setting a symlink's own mtime without following it isn't exposed
        // by std; skip rather than silently touching the link's target.
        return Ok(());
    }

    let time = UNIX_EPOCH + Duration::from_secs(unix_time.max(0) as u64);
    set_file_mtime(&full_path, time)
}

fn set_file_mtime(path: &std::path::Path, time: std::time::SystemTime) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    file.set_modified(time)
        .with_context(|| format!("setting mtime on {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo(dir: &Utf8Path) {
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
    }

    #[test]
    fn restores_mtime_of_tracked_file() {
        let td = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(td.path()).expect("utf8");
        init_repo(root);
        fs::write(root.join("a.txt"), "hello").unwrap();
        Command::new("git").args(["add", "a.txt"]).current_dir(root).status().unwrap();
        Command::new("git")
            .args(["commit", "-q", "-m", "add a.txt"])
            .current_dir(root)
            .status()
            .unwrap();

        // Bump mtime far into the future so we can tell it was rewritten.
        let far_future = std::time::SystemTime::now() + Duration::from_secs(365 * 24 * 3600);
        let file = fs::File::open(root.join("a.txt")).unwrap();
        file.set_modified(far_future).unwrap();

        restore_mtime_from_git(root).expect("restores mtimes");

        let restored = fs::metadata(root.join("a.txt")).unwrap().modified().unwrap();
        assert!(restored < far_future);
    }
}
