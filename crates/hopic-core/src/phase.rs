//! The phase/variant step runner: walks one variant's step
//! sequence in declaration order, folding metadata-only steps' settings
//! forward into the shell steps that follow them (`hopic_types::Step`'s own
//! doc comment on this; the config loader normalizes one YAML mapping entry
//! into one [`Step`] and leaves the forward-application to execution time),
//! gating each shell step on `run-on-change`, debiting a single per-variant
//! timeout budget across steps, resolving credentials, assembling each
//! step's environment, and dispatching to host or containerized execution.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use hopic_process::{sanitize_locale_env, ContainerSpec, SignalGuard, VolumeMount};
use hopic_types::config::PipelineConfig;
use hopic_types::step::{Foreach, RunOnChange, Step, WorktreeSpec};
use hopic_types::Credential;

use crate::artifact::{resolve_artifacts, ArtifactNormalizer};
use crate::commits;
use crate::errors::HopicError;

/// Resolves a [`Credential`] request to the `(name, value)` pairs a step's
/// environment substitutes in. The keystore itself is out of this crate's
/// scope; this is the seam a concrete CLI wires a
/// real lookup into.
pub trait CredentialResolver {
    fn resolve(&self, credential: &Credential) -> Result<Vec<(String, String)>>;
}

/// Every credential is unavailable. Exercises the `MissingCredentialVar`
/// error path without requiring a real keystore.
pub struct NullCredentialResolver;

impl CredentialResolver for NullCredentialResolver {
    fn resolve(&self, credential: &Credential) -> Result<Vec<(String, String)>> {
        let var = credential.variable_names().first().copied().unwrap_or_default().to_string();
        Err(HopicError::missing_credential_var(credential.id().to_string(), var))
    }
}

/// Whether the commit under build carries a change, and whether it's
/// allowed to publish — the facts `run-on-change` gates on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeContext {
    pub has_change: bool,
    pub publish_allowed: bool,
    pub version_bumped: bool,
}

impl ChangeContext {
    fn gates(&self, mode: RunOnChange) -> bool {
        match mode {
            RunOnChange::Always => true,
            RunOnChange::Never => !self.has_change,
            RunOnChange::Only => self.has_change && self.publish_allowed,
            RunOnChange::NewVersionOnly => self.has_change && self.publish_allowed && self.version_bumped,
        }
    }
}

/// Version strings substituted into every step's environment.
#[derive(Debug, Clone, Default)]
pub struct VersionVars {
    pub version: Option<String>,
    pub pure_version: Option<String>,
    pub deb_version: Option<String>,
    pub publish_version: Option<String>,
}

/// `foreach` commit ranges, precomputed by the caller from the current
/// commit's `PerCommitMeta`.
#[derive(Debug, Clone, Default)]
pub struct ForeachRanges {
    pub source_commit: Option<String>,
    pub autosquashed_commit: Option<String>,
}

/// Settings a metadata-only step applies forward to the shell steps that
/// follow it in the same variant (see `hopic_types::Step`'s doc comment).
#[derive(Debug, Clone, Default)]
struct CarriedSettings {
    image: Option<String>,
    docker_in_docker: bool,
    with_credentials: Vec<Credential>,
    volumes_from: Vec<String>,
    extra_docker_args: BTreeMap<String, String>,
    environment: BTreeMap<String, Option<String>>,
    node_label: Option<String>,
    wait_on_full_previous_phase: Option<bool>,
    stash: bool,
}

impl CarriedSettings {
    fn fold(&mut self, step: &Step, variant_description: &str) -> Result<()> {
        if let Some(image) = &step.image {
            self.image = Some(image.clone());
        }
        if step.docker_in_docker {
            self.docker_in_docker = true;
        }
        self.with_credentials.extend(step.with_credentials.iter().cloned());
        for name in &step.volumes_from {
            if !self.volumes_from.contains(name) {
                self.volumes_from.push(name.clone());
            }
        }
        for (key, value) in &step.extra_docker_args {
            self.extra_docker_args.insert(key.clone(), value.clone());
        }
        for (name, value) in &step.environment {
            self.environment.insert(name.clone(), value.clone());
        }
        if let Some(label) = &step.node_label {
            match &self.node_label {
                Some(existing) if existing != label => {
                    return Err(HopicError::configuration(format!(
                        "'{variant_description}': conflicting node-label '{existing}' and '{label}' within the same variant"
                    )));
                }
                _ => self.node_label = Some(label.clone()),
            }
        }
        if let Some(wait) = step.wait_on_full_previous_phase {
            self.wait_on_full_previous_phase = Some(wait);
        }
        if step.stash {
            self.stash = true;
        }
        Ok(())
    }
}

/// A per-variant wall-clock budget, set once by a metadata-only step before
/// the first shell step and debited as shell steps run.
#[derive(Debug, Default)]
struct TimeoutBudget {
    remaining: Option<Duration>,
    original_seconds: Option<u64>,
    locked: bool,
}

impl TimeoutBudget {
    fn observe_metadata(&mut self, seconds: Option<u64>, variant_description: &str) -> Result<()> {
        if let Some(seconds) = seconds {
            if self.locked {
                return Err(HopicError::configuration(format!(
                    "'{variant_description}': `timeout` can only be set once per variant, before the first shell step"
                )));
            }
            self.remaining = Some(Duration::from_secs(seconds));
            self.original_seconds = Some(seconds);
        }
        Ok(())
    }

    fn lock(&mut self) {
        self.locked = true;
    }

    fn take_for_step(&self, description: &str) -> Result<Option<Duration>> {
        match self.remaining {
            None => Ok(None),
            Some(d) if d.is_zero() => Err(HopicError::StepTimeoutExpired {
                timeout: self.original_seconds.unwrap_or(0),
                cmd: Some(description.to_string()),
                before: true,
            }
            .into()),
            Some(d) => Ok(Some(d)),
        }
    }

    fn debit(&mut self, elapsed: Duration) {
        if let Some(remaining) = self.remaining {
            self.remaining = Some(remaining.saturating_sub(elapsed));
        }
    }
}

/// What one shell step produced: exit status, matched artifacts, and any
/// worktree sub-commits it created.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepOutcome {
    pub description: String,
    pub exit_code: i32,
    pub archived: Vec<Utf8PathBuf>,
    pub fingerprinted: Vec<Utf8PathBuf>,
    pub junit: Vec<Utf8PathBuf>,
    pub worktree_commits: BTreeMap<String, String>,
}

fn argv_description(step: &Step) -> String {
    step.sh.as_ref().map(|argv| argv.join(" ")).unwrap_or_default()
}

/// Executes one variant's step sequence against a checked-out tree.
pub struct VariantRunner<'a> {
    pub tree: &'a Utf8Path,
    pub config: &'a PipelineConfig,
    pub change: ChangeContext,
    pub version_vars: VersionVars,
    pub credentials: &'a dyn CredentialResolver,
    pub normalizer: &'a dyn ArtifactNormalizer,
    pub source_date_epoch: i64,
    pub uid: u32,
    pub gid: u32,
    /// The pipeline's default image, already resolved to a literal tag by
    /// the caller (including any `ImageSource::IvyManifest` lookup — Ivy-
    /// manifest image resolution is a runtime concern this crate leaves to
    /// `hopic_config::ivy`, not something the phase runner re-implements).
    pub default_image: Option<String>,
    pub foreach_ranges: ForeachRanges,
    pub signals: Option<&'a SignalGuard>,
}

impl<'a> VariantRunner<'a> {
    pub fn run(&self, variant_description: &str, steps: &[Step]) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::new();
        let mut carried = CarriedSettings::default();
        let mut budget = TimeoutBudget::default();

        for step in steps {
            if !step.is_shell() {
                budget.observe_metadata(step.timeout, variant_description)?;
                carried.fold(step, variant_description)?;
                continue;
            }

            carried.fold(step, variant_description)?;
            budget.lock();

            if !self.change.gates(step.run_on_change) {
                continue;
            }

            let description = step.description.clone().unwrap_or_else(|| argv_description(step));
            let env = self.assemble_environment(step, &carried)?;
            let image = carried
                .image
                .clone()
                .or_else(|| step.image.clone())
                .or_else(|| self.default_image.clone());

            let commit_range = step.foreach.and_then(|mode| match mode {
                Foreach::SourceCommit => self.foreach_ranges.source_commit.clone(),
                Foreach::AutosquashedCommit => self.foreach_ranges.autosquashed_commit.clone(),
            });
            let iterations = match &commit_range {
                Some(range) => commits::log_first_parent_no_merges(self.tree, range)?.len().max(1),
                None => 1,
            };

            let mut exit_code = 0;
            for _ in 0..iterations {
                let allowed = budget.take_for_step(&description)?;
                let start = Instant::now();
                exit_code = match &image {
                    Some(image) => self.run_containerized(step, &carried, &env, allowed, &description, image)?,
                    None => self.run_on_host(step, &env, allowed, &description)?,
                };
                budget.debit(start.elapsed());
                if exit_code != 0 {
                    break;
                }
            }

            if exit_code != 0 {
                anyhow::bail!("step '{description}' exited with status {exit_code}");
            }

            let force_optional = !self.change.has_change;
            let archived = match &step.archive {
                Some(spec) => resolve_artifacts(self.tree, spec, force_optional, self.source_date_epoch, self.normalizer)?,
                None => Vec::new(),
            };
            let fingerprinted = match &step.fingerprint {
                Some(spec) => resolve_artifacts(self.tree, spec, true, self.source_date_epoch, self.normalizer)?,
                None => Vec::new(),
            };
            let junit = match &step.junit {
                Some(spec) => resolve_artifacts(self.tree, spec, true, self.source_date_epoch, self.normalizer)?,
                None => Vec::new(),
            };

            let mut worktree_commits = BTreeMap::new();
            for (subdir, worktree) in &step.worktrees {
                if let Some(commit) = commit_worktree(self.tree, subdir, worktree)? {
                    worktree_commits.insert(subdir.clone(), commit);
                }
            }

            outcomes.push(StepOutcome { description, exit_code, archived, fingerprinted, junit, worktree_commits });
        }

        Ok(outcomes)
    }

    /// Assembles a step's environment in a fixed order: container identity
    /// vars (when containerized) → allow-listed host passthroughs →
    /// reproducible-build version vars →
    /// resolved credentials → the step's own (and carried-forward)
    /// `environment` mapping, then locale sanitization always last.
    fn assemble_environment(&self, step: &Step, carried: &CarriedSettings) -> Result<Vec<(String, String)>> {
        let containerized = carried.image.is_some() || step.image.is_some() || self.default_image.is_some();
        let mut env: Vec<(String, String)> = Vec::new();

        if containerized {
            env.push(("HOME".to_string(), "/home/sandbox".to_string()));
            env.push(("_JAVA_OPTIONS".to_string(), "-Duser.home=/home/sandbox".to_string()));
        }

        for name in &self.config.pass_through_environment_vars {
            if let Ok(value) = std::env::var(name) {
                env.push((name.clone(), value));
            }
        }

        env.push(("SOURCE_DATE_EPOCH".to_string(), self.source_date_epoch.to_string()));
        for (name, value) in [
            ("VERSION", &self.version_vars.version),
            ("PURE_VERSION", &self.version_vars.pure_version),
            ("DEBVERSION", &self.version_vars.deb_version),
            ("PUBLISH_VERSION", &self.version_vars.publish_version),
        ] {
            if let Some(value) = value {
                env.push((name.to_string(), value.clone()));
            }
        }

        let mut credential_env = Vec::new();
        for credential in &carried.with_credentials {
            credential_env.extend(self.credentials.resolve(credential)?);
        }
        for (name, value) in credential_env {
            env.retain(|(k, _)| k != &name);
            env.push((name, value));
        }

        for (name, value) in &carried.environment {
            env.retain(|(k, _)| k != name);
            if let Some(value) = value {
                env.push((name.clone(), value.clone()));
            }
        }

        sanitize_locale_env(&mut env);
        Ok(env)
    }

    fn run_on_host(
        &self,
        step: &Step,
        env: &[(String, String)],
        timeout: Option<Duration>,
        description: &str,
    ) -> Result<i32> {
        let argv = step.sh.as_ref().context("shell step without a command")?;
        let mut cmd = std::process::Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(self.tree).env_clear();
        for (key, value) in env {
            cmd.env(key, value);
        }

        let outcome = hopic_process::run_with_timeout(&mut cmd, timeout, |child| {
            self.signals.and_then(|g| g.caught()).is_some_and(|_| {
                let _ = child.kill();
                true
            })
        })?;

        if outcome.timed_out {
            return Err(HopicError::StepTimeoutExpired {
                timeout: timeout.map(|d| d.as_secs()).unwrap_or(0),
                cmd: Some(description.to_string()),
                before: false,
            }
            .into());
        }
        Ok(outcome.exit_code)
    }

    fn build_container_spec(
        &self,
        step: &Step,
        carried: &CarriedSettings,
        env: &[(String, String)],
        image: &str,
    ) -> ContainerSpec {
        let volumes = self
            .config
            .volumes
            .iter()
            .filter_map(|(guest, spec)| {
                let source = spec.source.clone()?;
                Some(VolumeMount { host_source: source, guest_target: guest.clone(), read_only: spec.read_only })
            })
            .collect();

        ContainerSpec {
            image: image.to_string(),
            uid: self.uid,
            gid: self.gid,
            tty: false,
            volumes,
            volumes_from: carried.volumes_from.clone(),
            docker_in_docker: carried.docker_in_docker || step.docker_in_docker,
            // Detecting the host docker socket's group id requires
            // introspection this crate's public surface doesn't expose;
            // a concrete CLI wires it in by constructing the container
            // spec itself when that matters.
            docker_socket_group_gid: None,
            env: env.to_vec(),
            extra_docker_args: carried.extra_docker_args.values().cloned().collect(),
            argv: step.sh.clone().unwrap_or_default(),
        }
    }

    fn run_containerized(
        &self,
        step: &Step,
        carried: &CarriedSettings,
        env: &[(String, String)],
        timeout: Option<Duration>,
        description: &str,
        image: &str,
    ) -> Result<i32> {
        let spec = self.build_container_spec(step, carried, env, image);
        let cidfile = Utf8PathBuf::from(format!("/tmp/hopic-cid-{}", std::process::id()));
        let mut cmd = spec.command(self.tree, &cidfile);

        let mut stop_issued = false;
        let outcome = hopic_process::run_with_timeout(&mut cmd, timeout, |_child| {
            let Some(guard) = self.signals else { return false };
            if guard.caught().is_none() {
                return false;
            }
            let cid = std::fs::read_to_string(&cidfile).ok().map(|s| s.trim().to_string());
            match (cid, stop_issued) {
                (Some(cid), false) => {
                    let _ = std::process::Command::new("docker").args(["stop", &cid]).status();
                    stop_issued = true;
                    guard.reset();
                    false
                }
                (Some(cid), true) => {
                    let _ = std::process::Command::new("docker").args(["kill", &cid]).status();
                    true
                }
                (None, _) => true,
            }
        })?;

        let _ = std::fs::remove_file(&cidfile);

        if outcome.timed_out {
            return Err(HopicError::StepTimeoutExpired {
                timeout: timeout.map(|d| d.as_secs()).unwrap_or(0),
                cmd: Some(description.to_string()),
                before: false,
            }
            .into());
        }
        Ok(outcome.exit_code)
    }
}

/// Stages and commits a worktree's declared changes: explicit
/// `changed-files`, or everything untracked/modified when the list is
/// empty. Returns `None` when nothing was staged.
fn commit_worktree(tree: &Utf8Path, subdir: &str, worktree: &WorktreeSpec) -> Result<Option<String>> {
    let worktree_path = tree.join(subdir);
    if !hopic_git::is_repository(&worktree_path) {
        return Ok(None);
    }

    if worktree.changed_files.is_empty() {
        hopic_git::git(&worktree_path, &["add", "-A"])?;
    } else {
        let files: Vec<&str> = worktree.changed_files.iter().map(|p| p.as_str()).collect();
        let mut args = vec!["add", "--"];
        args.extend(files);
        hopic_git::git(&worktree_path, &args)?;
    }

    if hopic_git::git_optional(&worktree_path, &["diff", "--cached", "--quiet"])?.is_some() {
        return Ok(None);
    }

    let message = worktree.commit_message.clone().unwrap_or_else(|| format!("Changes from {subdir}"));
    hopic_git::git(&worktree_path, &["commit", "-q", "-m", &message])?;
    let new_commit = hopic_git::git(&worktree_path, &["rev-parse", "HEAD"])?;
    Ok(Some(new_commit))
}

/// Generates a `git bundle` for `<base>..<new_commit>` in the worktree
/// checked out at `subdir`, and the refspec that updates `worktree_ref` to
/// `new_commit` once the bundle is pushed/fetched.
pub fn bundle_worktree_range(
    tree: &Utf8Path,
    subdir: &str,
    base: &str,
    new_commit: &str,
    worktree_ref: &str,
    bundle_path: &Utf8Path,
) -> Result<String> {
    let worktree_path = tree.join(subdir);
    hopic_git::git(&worktree_path, &["bundle", "create", bundle_path.as_str(), &format!("{base}..{new_commit}")])?;
    Ok(format!("{new_commit}:{worktree_ref}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_on_change_never_skips_when_there_is_a_change() {
        let ctx = ChangeContext { has_change: true, publish_allowed: true, version_bumped: false };
        assert!(!ctx.gates(RunOnChange::Never));
        assert!(ctx.gates(RunOnChange::Always));
    }

    #[test]
    fn run_on_change_only_requires_change_and_publish_allowed() {
        let ctx = ChangeContext { has_change: true, publish_allowed: false, version_bumped: false };
        assert!(!ctx.gates(RunOnChange::Only));
        let ctx = ChangeContext { has_change: true, publish_allowed: true, version_bumped: false };
        assert!(ctx.gates(RunOnChange::Only));
    }

    #[test]
    fn new_version_only_additionally_requires_version_bumped() {
        let ctx = ChangeContext { has_change: true, publish_allowed: true, version_bumped: false };
        assert!(!ctx.gates(RunOnChange::NewVersionOnly));
        let ctx = ChangeContext { has_change: true, publish_allowed: true, version_bumped: true };
        assert!(ctx.gates(RunOnChange::NewVersionOnly));
    }

    #[test]
    fn carried_settings_reject_conflicting_node_labels() {
        let mut carried = CarriedSettings::default();
        let mut first = Step::metadata_only();
        first.node_label = Some("linux".to_string());
        carried.fold(&first, "build/native").expect("first label accepted");

        let mut second = Step::metadata_only();
        second.node_label = Some("windows".to_string());
        let err = carried.fold(&second, "build/native").expect_err("must conflict");
        assert!(err.to_string().contains("conflicting node-label"));
    }

    #[test]
    fn timeout_budget_can_only_be_set_once_before_first_shell_step() {
        let mut budget = TimeoutBudget::default();
        budget.observe_metadata(Some(60), "build/native").expect("first set ok");
        budget.lock();
        let err = budget.observe_metadata(Some(30), "build/native").expect_err("must reject");
        assert!(err.to_string().contains("can only be set once"));
    }

    #[test]
    fn timeout_budget_debits_elapsed_time_across_steps() {
        let mut budget = TimeoutBudget::default();
        budget.observe_metadata(Some(10), "build/native").unwrap();
        budget.debit(Duration::from_secs(7));
        let remaining = budget.take_for_step("second step").unwrap();
        assert_eq!(remaining, Some(Duration::from_secs(3)));
    }

    #[test]
    fn exhausted_timeout_budget_fails_before_spawning() {
        let mut budget = TimeoutBudget::default();
        budget.observe_metadata(Some(5), "build/native").unwrap();
        budget.debit(Duration::from_secs(5));
        let err = budget.take_for_step("late step").expect_err("must fail");
        let hopic_err = err.downcast_ref::<HopicError>().expect("HopicError");
        assert_eq!(hopic_err.exit_code(), 40);
    }
}
