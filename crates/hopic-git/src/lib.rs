//! Repository driver: Hopic's thin, shell-out wrapper around `git`
//!.
//!
//! Every operation here runs the `git` binary via [`std::process::Command`]
//! rather than binding to libgit2 — the same choice the rest of this
//! workspace makes for subprocess-shaped work. The binary can be overridden
//! with the `HOPIC_GIT_BIN` environment variable, which the test suite uses
//! to substitute a fake `git` script.

mod checkout;
mod mtime;
mod notes;

pub use checkout::{checkout_tree, CheckoutOptions, CommitAncestorMismatch};
pub use mtime::restore_mtime_from_git;
pub use notes::{read_notes_signature, write_notes_signature, NotesError, NotesSignature};

use std::env;
use std::process::{Command, Output};

use anyhow::{Context, Result};
use camino::Utf8Path;

/// Runs `git <args>` in `cwd`, returning stdout trimmed on success.
pub(crate) fn run(cwd: &Utf8Path, args: &[&str]) -> Result<String> {
    let output = command(cwd, args).output().with_context(|| {
        format!("failed to execute git {args:?} in {cwd}")
    })?;
    ensure_success(args, &output)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Like [`run`], but returns `None` instead of erroring when git exits
/// non-zero — useful for probes like `git describe --exact-match`.
pub(crate) fn run_optional(cwd: &Utf8Path, args: &[&str]) -> Result<Option<String>> {
    let output = command(cwd, args).output().with_context(|| {
        format!("failed to execute git {args:?} in {cwd}")
    })?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

pub(crate) fn command(cwd: &Utf8Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(git_program());
    cmd.args(args).current_dir(cwd);
    cmd
}

pub(crate) fn ensure_success(args: &[&str], output: &Output) -> Result<()> {
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn git_program() -> String {
    env::var("HOPIC_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}

/// Whether `path` is inside a Git working tree.
pub fn is_repository(path: &Utf8Path) -> bool {
    command(path, &["rev-parse", "--is-inside-work-tree"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// `git describe --tags --long --dirty --always` for the tree at `path`.
pub fn describe(path: &Utf8Path) -> Result<hopic_version::GitVersion> {
    let out = run(path, &["describe", "--tags", "--long", "--dirty", "--always"])?;
    Ok(hopic_version::GitVersion::from_description(&out))
}

/// Runs an arbitrary `git` subcommand in `tree`, failing on non-zero exit.
/// Escape hatch for the change preparer's merge/commit/stage sequences,
/// which don't warrant a dedicated wrapper function each.
pub fn git(tree: &Utf8Path, args: &[&str]) -> Result<String> {
    run(tree, args)
}

/// Like [`git`], but returns `None` on non-zero exit rather than erroring.
pub fn git_optional(tree: &Utf8Path, args: &[&str]) -> Result<Option<String>> {
    run_optional(tree, args)
}
