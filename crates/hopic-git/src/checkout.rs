//! `checkout_tree`: clone-or-reuse a working tree, point
//! it at a specific ref/commit, and leave it in a known-clean state.

use std::fs;

use anyhow::{Context, Result};
use camino::Utf8Path;

use crate::{command, ensure_success, is_repository, mtime::restore_mtime_from_git, run};

/// A marker for the one failure in this module that must surface as a
/// distinct exit code: the requested `commit` is not reachable from the
/// fetched ref.
#[derive(Debug)]
pub struct CommitAncestorMismatch {
    pub commit: String,
    pub ref_name: String,
}

impl std::fmt::Display for CommitAncestorMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "commit {} is not an ancestor of fetched ref {}",
            self.commit, self.ref_name
        )
    }
}

impl std::error::Error for CommitAncestorMismatch {}

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub remote: String,
    pub ref_name: String,
    /// When set, verified reachable from the fetched ref after checkout.
    pub commit: Option<String>,
    /// Run configured clean commands and `git clean -xdff` after checkout.
    pub clean: bool,
    pub remote_name: String,
    /// Delete all existing tags before fetching, unless false.
    pub tags: bool,
    pub allow_submodule_failure: bool,
    pub clean_commands: Vec<String>,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            remote: String::new(),
            ref_name: "HEAD".to_string(),
            commit: None,
            clean: true,
            remote_name: "origin".to_string(),
            tags: true,
            allow_submodule_failure: false,
            clean_commands: Vec::new(),
        }
    }
}

/// Prepares `tree` to contain a checkout of `opts.ref_name` (and, if given,
/// exactly `opts.commit`) fetched from `opts.remote`.
pub fn checkout_tree(tree: &Utf8Path, opts: &CheckoutOptions) -> Result<()> {
    if is_repository(tree) {
        wipe_submodule_state(tree)?;
    } else {
        if opts.clean && tree.exists() {
            clear_directory_contents(tree)?;
        }
        fs::create_dir_all(tree).with_context(|| format!("creating worktree directory {tree}"))?;
        let status = command(tree.parent().unwrap_or(tree), &["clone", "--no-checkout", opts.remote.as_str(), tree.as_str()])
            .status()
            .with_context(|| format!("cloning {} into {tree}", opts.remote))?;
        anyhow::ensure!(status.success(), "git clone of {} into {tree} failed", opts.remote);
    }

    // hopic.code is the Hopic-managed section the previous run may have left
    // behind; carrying it over between checkouts is never wanted.
    let _ = command(tree, &["config", "--remove-section", "hopic.code"]).status();
    run(tree, &["config", "color.ui", "always"])?;

    if !opts.tags {
        delete_all_tags(tree)?;
    }

    remove_remote_if_present(tree, &opts.remote_name)?;
    run(tree, &["remote", "add", opts.remote_name.as_str(), opts.remote.as_str()])?;
    run(
        tree,
        &["fetch", opts.remote_name.as_str(), opts.ref_name.as_str()],
    )?;

    let fetched = run(tree, &["rev-parse", "FETCH_HEAD"])?;

    let target_commit = if let Some(commit) = &opts.commit {
        let is_ancestor = command(tree, &["merge-base", "--is-ancestor", commit.as_str(), fetched.as_str()])
            .status()
            .with_context(|| format!("checking ancestry of {commit}"))?;
        if !is_ancestor.success() {
            return Err(CommitAncestorMismatch {
                commit: commit.clone(),
                ref_name: opts.ref_name.clone(),
            }
            .into());
        }
        commit.clone()
    } else {
        fetched
    };

    run(tree, &["checkout", "--detach", "--force", target_commit.as_str()])?;
    run(tree, &["reset", "--hard", target_commit.as_str()])?;
    sync_submodules(tree, opts.allow_submodule_failure)?;

    run(
        tree,
        &[
            "fetch",
            opts.remote_name.as_str(),
            "--prune",
            "refs/notes/hopic/*:refs/notes/hopic/*",
        ],
    )?;

    if opts.clean {
        run_clean_commands(tree, &opts.clean_commands)?;
        let output = command(tree, &["clean", "-xdff"])
            .output()
            .context("running git clean -xdff")?;
        ensure_success(&["clean", "-xdff"], &output)?;
        restore_mtime_from_git(tree)?;
    }

    Ok(())
}

fn wipe_submodule_state(tree: &Utf8Path) -> Result<()> {
    let _ = command(tree, &["submodule", "deinit", "--all", "--force"]).status();
    Ok(())
}

fn sync_submodules(tree: &Utf8Path, allow_failure: bool) -> Result<()> {
    let status = command(tree, &["submodule", "update", "--init", "--recursive"])
        .status()
        .context("syncing submodules")?;
    if !status.success() && !allow_failure {
        anyhow::bail!("submodule sync failed");
    }
    Ok(())
}

fn delete_all_tags(tree: &Utf8Path) -> Result<()> {
    let tags = run(tree, &["tag", "-l"])?;
    for tag in tags.lines().filter(|l| !l.is_empty()) {
        run(tree, &["tag", "-d", tag])?;
    }
    Ok(())
}

fn remove_remote_if_present(tree: &Utf8Path, remote_name: &str) -> Result<()> {
    let _ = command(tree, &["remote", "remove", remote_name]).status();
    Ok(())
}

fn run_clean_commands(tree: &Utf8Path, commands: &[String]) -> Result<()> {
    for cmd in commands {
        let parts = shell_words::split(cmd)
            .with_context(|| format!("splitting clean command {cmd:?}"))?;
        let Some((program, args)) = parts.split_first() else {
            continue;
        };
        let status = std::process::Command::new(program)
            .args(args)
            .current_dir(tree)
            .status()
            .with_context(|| format!("running clean command {cmd:?}"))?;
        anyhow::ensure!(status.success(), "clean command {cmd:?} failed");
    }
    Ok(())
}

/// Deletes everything inside `dir` without removing `dir` itself — removing
/// the current working directory out from under the process is disallowed.
fn clear_directory_contents(dir: &Utf8Path) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory {dir}"))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(())
}
