//! `submit`: pushes the prepared commit's refspecs and runs
//! `post-submit`, via `hopic_core::submit`.

use anyhow::Result;
use camino::Utf8Path;
use hopic_core::{NullNormalizer, SubmitOptions, SubmitOutcome};

use crate::credentials::EnvCredentialResolver;

pub fn run(workspace: &Utf8Path, config: &hopic_types::PipelineConfig, target_remote: Option<&str>) -> Result<SubmitOutcome> {
    if let Some(remote) = target_remote {
        override_remote(workspace, remote)?;
    }

    let committer_identity = committer_identity(workspace)?;
    let opts = SubmitOptions {
        committer_identity,
        hopic_version: env!("CARGO_PKG_VERSION").to_string(),
        plugins: Vec::new(),
    };
    let credentials = EnvCredentialResolver::new();
    let normalizer = NullNormalizer;
    let source_date_epoch = crate::build::resolve_source_date_epoch(workspace)?;

    hopic_core::submit(workspace, config, &opts, &credentials, &normalizer, source_date_epoch)
}

fn override_remote(workspace: &Utf8Path, remote: &str) -> Result<()> {
    let head = hopic_git::git(workspace, &["rev-parse", "HEAD"])?;
    if let Some(mut meta) = hopic_core::read_percommit(workspace, &head)? {
        meta.remote = remote.to_string();
        hopic_core::write_percommit(workspace, &head, &meta)?;
    }
    Ok(())
}

fn committer_identity(workspace: &Utf8Path) -> Result<String> {
    let name = hopic_git::git(workspace, &["config", "--get", "user.name"]).unwrap_or_else(|_| "Hopic".to_string());
    let email = hopic_git::git(workspace, &["config", "--get", "user.email"]).unwrap_or_else(|_| "hopic@localhost".to_string());
    Ok(format!("{name} <{email}>"))
}
