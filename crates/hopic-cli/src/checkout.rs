//! `checkout-source-tree`: clones/updates the workspace,
//! persists the `hopic.code` bookkeeping section `hopic_git::checkout_tree`
//! itself only ever clears, and seeds the resulting HEAD's `PerCommitMeta`
//! so `prepare-source-tree` has something to read forward from.

use anyhow::{Context, Result};
use camino::Utf8Path;
use hopic_git::CheckoutOptions;
use hopic_types::PerCommitMeta;

pub struct CheckoutArgs {
    pub target_remote: String,
    pub target_ref: String,
    pub target_commit: Option<String>,
    pub clean: bool,
    pub ignore_initial_submodule_checkout_failure: bool,
}

/// Runs the checkout and returns the resolved commit hash, to be printed
/// on stdout by the caller.
pub fn run(workspace: &Utf8Path, args: &CheckoutArgs) -> Result<String> {
    let opts = CheckoutOptions {
        remote: args.target_remote.clone(),
        ref_name: args.target_ref.clone(),
        commit: args.target_commit.clone(),
        clean: args.clean,
        remote_name: "origin".to_string(),
        tags: true,
        allow_submodule_failure: args.ignore_initial_submodule_checkout_failure,
        clean_commands: load_clean_commands(workspace),
    };

    hopic_git::checkout_tree(workspace, &opts).context("checking out source tree")?;
    let commit = hopic_git::git(workspace, &["rev-parse", "HEAD"])?;

    persist_hopic_code_section(workspace, args)?;
    seed_percommit_meta(workspace, &commit, args)?;

    Ok(commit)
}

/// Best-effort: a pre-existing config file may be malformed (it belongs to
/// whatever was checked out *before* this run), so a load failure here must
/// not abort the checkout.
fn load_clean_commands(workspace: &Utf8Path) -> Vec<String> {
    let Ok(path) = hopic_config::discover_config_path(workspace, None) else {
        return Vec::new();
    };
    hopic_config::load(&path, &hopic_config::NoExtensions, &crate::vars::base_vars(workspace, &[]))
        .map(|cfg| cfg.clean)
        .unwrap_or_default()
}

fn persist_hopic_code_section(workspace: &Utf8Path, args: &CheckoutArgs) -> Result<()> {
    hopic_git::git(workspace, &["config", "--local", "hopic.code.dir", "."])?;
    hopic_git::git(workspace, &["config", "--local", "hopic.code.cfg-remote", &args.target_remote])?;
    hopic_git::git(workspace, &["config", "--local", "hopic.code.cfg-ref", &args.target_ref])?;
    hopic_git::git(workspace, &["config", "--local", "hopic.code.cfg-clean", if args.clean { "true" } else { "false" }])?;
    Ok(())
}

fn seed_percommit_meta(workspace: &Utf8Path, commit: &str, args: &CheckoutArgs) -> Result<()> {
    let meta = PerCommitMeta {
        ref_: args.target_ref.clone(),
        remote: "origin".to_string(),
        // `HEAD` rather than the resolved hash: `prepare-source-tree` carries
        // this refspec forward unchanged onto whatever new commit it produces,
        // so a literal commit hash here would go stale the moment HEAD moves.
        refspecs: vec![format!("HEAD:{}", args.target_ref)],
        target_commit: commit.to_string(),
        source_commit: None,
        autosquashed_commit: None,
        version_bumped: false,
    };
    hopic_core::write_percommit(workspace, commit, &meta)
}
