//! The submitter: pushes the prepared commit's recorded
//! refspecs atomically to its target remote, signs the commit with a Hopic
//! notes signature, runs `post-submit` steps as a restricted variant, and
//! appends the PostSubmitBump commit's own refspec when configured.

use anyhow::{Context, Result};
use camino::Utf8Path;
use hopic_git::NotesSignature;
use hopic_types::{PerCommitMeta, PipelineConfig};

use crate::artifact::ArtifactNormalizer;
use crate::errors::HopicError;
use crate::percommit;
use crate::phase::{ChangeContext, CredentialResolver, ForeachRanges, StepOutcome, VariantRunner, VersionVars};
use crate::prepare;

/// Everything `submit` needs beyond what's already recorded in
/// `PerCommitMeta`.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub committer_identity: String,
    pub hopic_version: String,
    pub plugins: Vec<String>,
}

/// What `submit` did: the commit pushed, the `post-submit` step outcomes,
/// and the PostSubmitBump commit's own refspec if one was generated.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmitOutcome {
    pub commit: String,
    pub target_ref: String,
    pub post_submit_steps: Vec<StepOutcome>,
    pub post_submit_bump_commit: Option<String>,
}

/// Pushes the current HEAD's `PerCommitMeta` refspecs to its recorded
/// remote, signs it, runs `post-submit`, and appends the PostSubmitBump
/// commit's push when `version.file.after-submit.bump` is set.
pub fn submit(
    tree: &Utf8Path,
    config: &PipelineConfig,
    opts: &SubmitOptions,
    credentials: &dyn CredentialResolver,
    normalizer: &dyn ArtifactNormalizer,
    source_date_epoch: i64,
) -> Result<SubmitOutcome> {
    let head = hopic_git::git(tree, &["rev-parse", "HEAD"])?;
    let meta = percommit::read(tree, &head)?
        .ok_or_else(|| HopicError::configuration(format!("no prepared state recorded for commit '{head}'")))?;

    push_refspecs(tree, &meta)?;

    let signature = NotesSignature {
        committer_identity: opts.committer_identity.clone(),
        hopic_version: opts.hopic_version.clone(),
        plugins: opts.plugins.clone(),
    };
    hopic_git::write_notes_signature(tree, &meta.ref_, &head, &signature)?;

    percommit::remove(tree, &head)?;

    let change = ChangeContext { has_change: true, publish_allowed: true, version_bumped: meta.version_bumped };
    let runner = VariantRunner {
        tree,
        config,
        change,
        version_vars: VersionVars::default(),
        credentials,
        normalizer,
        source_date_epoch,
        uid: 0,
        gid: 0,
        default_image: None,
        foreach_ranges: ForeachRanges::default(),
        signals: None,
    };

    let mut post_submit_steps = Vec::new();
    for (phase_name, steps) in &config.post_submit {
        post_submit_steps.extend(runner.run(phase_name, steps)?);
    }

    let post_submit_bump_commit = prepare::build_post_submit_bump_commit(tree, config, &head, &opts.hopic_version)?;
    if let Some(bump_commit) = &post_submit_bump_commit {
        let refspec = format!("{bump_commit}:{}", meta.ref_);
        hopic_git::git(tree, &["push", meta.remote.as_str(), &refspec]).context("pushing the PostSubmitBump commit")?;
    }

    Ok(SubmitOutcome { commit: head, target_ref: meta.ref_.clone(), post_submit_steps, post_submit_bump_commit })
}

fn push_refspecs(tree: &Utf8Path, meta: &PerCommitMeta) -> Result<()> {
    anyhow::ensure!(!meta.refspecs.is_empty(), "no refspecs recorded for this commit; nothing to push");
    let mut args = vec!["push", "--atomic", meta.remote.as_str()];
    for refspec in &meta.refspecs {
        args.push(refspec);
    }
    hopic_git::git(tree, &args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::NullNormalizer;
    use crate::phase::NullCredentialResolver;
    use hopic_types::config::{BumpPolicy, TagPolicy, VersionFormat, VersionPolicy};
    use std::process::Command;
    use tempfile::tempdir;

    fn minimal_config() -> PipelineConfig {
        PipelineConfig {
            version: VersionPolicy {
                format: VersionFormat::Semver,
                bump: BumpPolicy::Disabled,
                on_every_change: false,
                tag: TagPolicy::Bool(true),
                build: None,
                hotfix_branch: None,
                file: None,
            },
            phases: indexmap::IndexMap::new(),
            post_submit: indexmap::IndexMap::new(),
            volumes: indexmap::IndexMap::new(),
            image: None,
            pass_through_environment_vars: Vec::new(),
            clean: Vec::new(),
            ci_locks: Vec::new(),
            project_name: "example".to_string(),
            modality_source_preparation: indexmap::IndexMap::new(),
            publish_from_branch: None,
        }
    }

    fn init_remote_and_clone() -> (tempfile::TempDir, tempfile::TempDir, camino::Utf8PathBuf) {
        let remote_td = tempdir().unwrap();
        let remote = camino::Utf8PathBuf::from_path_buf(remote_td.path().to_path_buf()).unwrap();
        Command::new("git").args(["init", "-q", "--bare"]).current_dir(&remote).status().unwrap();

        let clone_td = tempdir().unwrap();
        let clone_dir = camino::Utf8PathBuf::from_path_buf(clone_td.path().to_path_buf()).unwrap();
        Command::new("git").args(["clone", "-q", remote.as_str(), clone_dir.as_str()]).status().unwrap();
        Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(&clone_dir).status().unwrap();
        Command::new("git").args(["config", "user.name", "Test User"]).current_dir(&clone_dir).status().unwrap();
        std::fs::write(clone_dir.join("f"), "content").unwrap();
        Command::new("git").args(["add", "-A"]).current_dir(&clone_dir).status().unwrap();
        Command::new("git").args(["commit", "-q", "-m", "feat: initial"]).current_dir(&clone_dir).status().unwrap();

        (remote_td, clone_td, clone_dir)
    }

    #[test]
    fn push_refspecs_rejects_empty_refspec_list() {
        let td = tempdir().unwrap();
        let dir = camino::Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        Command::new("git").args(["init", "-q"]).current_dir(&dir).status().unwrap();

        let meta = PerCommitMeta {
            ref_: "refs/heads/main".to_string(),
            remote: "origin".to_string(),
            refspecs: Vec::new(),
            target_commit: "deadbeef".to_string(),
            source_commit: None,
            autosquashed_commit: None,
            version_bumped: false,
        };
        let err = push_refspecs(&dir, &meta).expect_err("must reject");
        assert!(err.to_string().contains("nothing to push"));
    }

    #[test]
    fn submit_pushes_refspecs_and_clears_percommit_state() {
        let (_remote_td, _clone_td, dir) = init_remote_and_clone();
        let head = hopic_git::git(&dir, &["rev-parse", "HEAD"]).unwrap();

        let meta = PerCommitMeta {
            ref_: "refs/heads/main".to_string(),
            remote: "origin".to_string(),
            refspecs: vec!["HEAD:refs/heads/main".to_string()],
            target_commit: head.clone(),
            source_commit: None,
            autosquashed_commit: None,
            version_bumped: false,
        };
        percommit::write(&dir, &head, &meta).unwrap();

        let config = minimal_config();
        let opts =
            SubmitOptions { committer_identity: "Hopic <ci@example.com>".to_string(), hopic_version: "1.0.0".to_string(), plugins: vec![] };

        let outcome = submit(&dir, &config, &opts, &NullCredentialResolver, &NullNormalizer, 0).expect("submits");
        assert_eq!(outcome.commit, head);
        assert!(outcome.post_submit_steps.is_empty());
        assert!(percommit::read(&dir, &head).unwrap().is_none());

        let note = hopic_git::read_notes_signature(&dir, "refs/heads/main", &head).unwrap().expect("note written");
        assert_eq!(note.hopic_version, "1.0.0");
    }

    #[test]
    fn submit_fails_without_recorded_percommit_state() {
        let (_remote_td, _clone_td, dir) = init_remote_and_clone();
        let config = minimal_config();
        let opts =
            SubmitOptions { committer_identity: "Hopic <ci@example.com>".to_string(), hopic_version: "1.0.0".to_string(), plugins: vec![] };

        let err = submit(&dir, &config, &opts, &NullCredentialResolver, &NullNormalizer, 0).expect_err("must fail");
        let hopic_err = err.downcast_ref::<HopicError>().expect("HopicError");
        assert_eq!(hopic_err.exit_code(), 32);
    }
}
