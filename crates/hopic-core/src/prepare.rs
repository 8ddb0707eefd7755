//! The change preparer: one command, three mutually
//! exclusive sub-modes, exactly one of which produces a commit, followed by
//! the version-bump state machine (§4.5.1) and `PerCommitMeta` persistence.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use hopic_config::InterpolationValue;
use hopic_types::config::{BumpPolicy, VersionFormat as CfgVersionFormat};
use hopic_types::{PerCommitMeta, PipelineConfig};

use crate::classifier::CommitClassifier;
use crate::commits;
use crate::errors::HopicError;
use crate::version_state::{self, Hotfixable};

/// `--author-name`/`--author-email`/`--author-date`, and the equivalent
/// committer fields, carried through from the CLI into the final commit.
#[derive(Debug, Clone, Default)]
pub struct GitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PrepareIdentity {
    pub author: Option<GitIdentity>,
    pub committer: Option<GitIdentity>,
}

/// `merge-change-request`'s arguments.
#[derive(Debug, Clone)]
pub struct MergeChangeRequestOptions {
    pub source_remote: String,
    pub source_ref: String,
    pub change_request: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub approved_by: Vec<String>,
}

/// The three sub-modes `prepare-source-tree` dispatches to.
#[derive(Debug, Clone)]
pub enum PrepareMode {
    MergeChangeRequest(MergeChangeRequestOptions),
    ApplyModalityChange { name: String },
    BumpVersion,
}

/// The bump-profile override `bump-version` and, nominally, other sub-modes
/// may request.
#[derive(Debug, Clone)]
struct BumpOverride {
    on_every_change: bool,
    strict: bool,
}

/// What a sub-mode hands the state machine: `None` means "no-op, HEAD
/// unchanged" (a `bump-version` call against an exact tag, or a
/// modality-change whose steps staged nothing).
struct ModeOutput {
    message: String,
    allow_empty: bool,
    source_commit: Option<String>,
    base_commit: Option<String>,
    bump_override: Option<BumpOverride>,
}

/// `prepare-source-tree`'s result: the new (or unchanged) HEAD commit, and
/// the version the state machine computed, if any.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PrepareOutcome {
    pub commit: String,
    pub version: Option<String>,
}

/// Runs one sub-mode, then the version-bump state machine, then writes
/// `PerCommitMeta` for the resulting commit (carrying `ref`/`remote`
/// forward from the commit it replaces).
pub fn prepare_source_tree(
    tree: &Utf8Path,
    config: &PipelineConfig,
    target_ref: &str,
    mode: PrepareMode,
    identity: &PrepareIdentity,
    vars: &HashMap<String, InterpolationValue>,
    hopic_version: &str,
) -> Result<PrepareOutcome> {
    let head_before = hopic_git::git(tree, &["rev-parse", "HEAD"])?;
    let previous_meta = crate::percommit::read(tree, &head_before)?;

    let mode_output = match mode {
        PrepareMode::MergeChangeRequest(opts) => Some(run_merge_change_request(tree, &opts, hopic_version)?),
        PrepareMode::ApplyModalityChange { name } => run_apply_modality_change(tree, config, &name, vars)?,
        PrepareMode::BumpVersion => run_bump_version(tree, hopic_version)?,
    };

    let Some(mode_output) = mode_output else {
        return Ok(PrepareOutcome { commit: head_before, version: None });
    };

    let classifier_refs_owned = classified_range_commits(tree, config, &mode_output)?;
    let classifier_refs: Vec<&dyn CommitClassifier> =
        classifier_refs_owned.iter().map(|c| c as &dyn CommitClassifier).collect();

    let version_string = match config.version.format {
        CfgVersionFormat::Semver => bump_and_persist::<hopic_version::SemVer, _>(
            tree,
            config,
            target_ref,
            &classifier_refs,
            mode_output.bump_override.as_ref(),
            |current, classifiers, policy, hotfix_id| version_state::bump(current, classifiers, policy, hotfix_id),
        )?,
        CfgVersionFormat::Carver => bump_and_persist::<hopic_version::CarusoVer, _>(
            tree,
            config,
            target_ref,
            &classifier_refs,
            mode_output.bump_override.as_ref(),
            |current, classifiers, policy, hotfix_id| version_state::bump(current, classifiers, policy, hotfix_id),
        )?,
    };

    let new_commit = create_commit(tree, &mode_output, identity)?;

    let new_meta = PerCommitMeta {
        ref_: previous_meta.as_ref().map(|m| m.ref_.clone()).unwrap_or_else(|| target_ref.to_string()),
        remote: previous_meta.as_ref().map(|m| m.remote.clone()).unwrap_or_default(),
        refspecs: previous_meta.as_ref().map(|m| m.refspecs.clone()).unwrap_or_default(),
        target_commit: new_commit.clone(),
        source_commit: mode_output.source_commit.clone(),
        autosquashed_commit: None,
        version_bumped: version_string.is_some(),
    };
    crate::percommit::remove(tree, &head_before)?;
    crate::percommit::write(tree, &new_commit, &new_meta)?;

    Ok(PrepareOutcome { commit: new_commit, version: version_string })
}

/// Lists and classifies the commit range a sub-mode says the state machine
/// should see; empty unless the sub-mode carried both a `base_commit` and a
/// `source_commit`.
fn classified_range_commits(
    tree: &Utf8Path,
    config: &PipelineConfig,
    mode_output: &ModeOutput,
) -> Result<Vec<crate::classifier::ConventionalClassifier>> {
    let (Some(base), Some(source)) = (&mode_output.base_commit, &mode_output.source_commit) else {
        return Ok(Vec::new());
    };
    if base == source {
        return Ok(Vec::new());
    }
    let strict = matches!(config.version.bump, BumpPolicy::ConventionalCommits { strict: true, .. });
    let raw = commits::log_first_parent_no_merges(tree, &format!("{base}..{source}"))?;
    commits::classify_all(&raw, strict)
}

/// Runs the version-bump state machine for one version format, persisting
/// to a configured version file if the policy defines one, and returns the
/// rendered next version (`None` when not eligible or unchanged).
fn bump_and_persist<V, F>(
    tree: &Utf8Path,
    config: &PipelineConfig,
    target_ref: &str,
    classifiers: &[&dyn CommitClassifier],
    bump_override: Option<&BumpOverride>,
    compute_next: F,
) -> Result<Option<String>>
where
    V: Hotfixable,
    F: Fn(&V, &[&dyn CommitClassifier], &BumpPolicy, &[String]) -> Result<V>,
{
    let effective_policy = match bump_override {
        Some(o) => {
            BumpPolicy::ConventionalCommits { strict: o.strict, reject_breaking_changes_on: None, reject_new_features_on: None }
        }
        None => config.version.bump.clone(),
    };
    let on_every_change = bump_override.map(|o| o.on_every_change).unwrap_or(config.version.on_every_change);

    let mut policy_view = config.version.clone();
    policy_view.on_every_change = on_every_change;

    let hotfix_pattern = config
        .version
        .hotfix_branch
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("parsing hotfix-branch pattern")?;
    let hotfix_id = match &hotfix_pattern {
        Some(pattern) => hopic_version::hotfix_id(pattern, Some(target_ref))?,
        None => Vec::new(),
    };
    let hotfix_active = !hotfix_id.is_empty();

    version_state::guard(classifiers, &effective_policy, target_ref, hotfix_active, on_every_change)?;

    if !version_state::is_eligible(&effective_policy, &policy_view, target_ref) {
        return Ok(None);
    }

    let mut current: V = current_version(tree, config)?;
    if hotfix_active && config.version.file.is_none() {
        current = version_state::hotfix_rebase(tree, &hotfix_id, &current)?;
    }

    let mut next = compute_next(&current, classifiers, &effective_policy, &hotfix_id)?;
    // `on-every-change` requires the version to advance even when the
    // conventional-commits computation found no bump-worthy commit.
    if on_every_change && hotfix_id.is_empty() && next == current {
        next = next.next_prerelease_seeded(&[]);
    }

    if let Some(file) = &config.version.file {
        let path = tree.join(&file.path);
        hopic_version::replace_version(&path, &next)?;
        hopic_git::git(tree, &["add", "--", file.path.as_str()])?;
    }

    Ok(Some(next.to_string()))
}

fn current_version<V: hopic_version::VersionFormat>(tree: &Utf8Path, config: &PipelineConfig) -> Result<V> {
    if let Some(file) = &config.version.file {
        let path = tree.join(&file.path);
        if let Some(v) = hopic_version::read_version::<V>(&path)? {
            return Ok(v);
        }
    }
    let described = hopic_git::describe(tree).context("reading the current version from `git describe`")?;
    let semver = described.to_semver(None).ok_or_else(|| {
        HopicError::Versioning { message: format!("`git describe` output `{}` has no parseable version tag", described.tag_name) }
    })?;
    V::parse(&semver.to_string())
        .ok_or_else(|| HopicError::Versioning { message: format!("`{semver}` is not a valid version for the configured format") }.into())
}

fn create_commit(tree: &Utf8Path, mode_output: &ModeOutput, identity: &PrepareIdentity) -> Result<String> {
    let program = std::env::var("HOPIC_GIT_BIN").unwrap_or_else(|_| "git".to_string());
    let mut cmd = std::process::Command::new(program);
    cmd.current_dir(tree).arg("commit").arg("-m").arg(&mode_output.message);
    if mode_output.allow_empty {
        cmd.arg("--allow-empty");
    }
    if let Some(author) = &identity.author {
        if let (Some(name), Some(email)) = (&author.name, &author.email) {
            cmd.arg(format!("--author={name} <{email}>"));
        }
        if let Some(date) = &author.date {
            cmd.env("GIT_AUTHOR_DATE", date);
        }
    }
    if let Some(committer) = &identity.committer {
        if let Some(date) = &committer.date {
            cmd.env("GIT_COMMITTER_DATE", date);
        }
    }
    let status = cmd.status().context("running git commit")?;
    anyhow::ensure!(status.success(), "git commit exited with {status}");
    hopic_git::git(tree, &["rev-parse", "HEAD"])
}

fn approval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<name>[^:]+):(?P<sha>[0-9a-fA-F]{40})$").expect("valid regex"))
}

/// Validates the `--approved-by` entries against the reviewed-vs-final
/// commit range: an entry approving the exact source tip
/// is always accepted; otherwise the approval's own range and the PR's
/// range are each squashed (autosquash-marked commits dropped) and their
/// `(author, authored_date, message)` tuples compared — equivalent to a
/// "tree diff is empty" check, since two commit sequences with identical
/// post-squash tuples necessarily produce identical trees.
fn validate_approvals(tree: &Utf8Path, approved_by: &[String], base: &str, source_tip: &str) -> Result<Vec<String>> {
    let re = approval_re();
    let pr_commits = commits::log_first_parent_no_merges(tree, &format!("{base}..{source_tip}"))?;
    let pr_classified = commits::classify_all(&pr_commits, false)?;
    let pr_tuples = commits::squashed_identity_tuples(&pr_commits, &pr_classified);

    let mut kept = Vec::new();
    for entry in approved_by {
        let Some(caps) = re.captures(entry) else { continue };
        let name = caps["name"].to_string();
        let sha = caps["sha"].to_string();

        if sha.eq_ignore_ascii_case(source_tip) {
            kept.push(name);
            continue;
        }

        let reviewed_commits = commits::log_first_parent_no_merges(tree, &format!("{base}..{sha}"))?;
        let reviewed_classified = commits::classify_all(&reviewed_commits, false)?;
        let reviewed_tuples = commits::squashed_identity_tuples(&reviewed_commits, &reviewed_classified);

        if reviewed_tuples == pr_tuples {
            kept.push(name);
        }
    }
    Ok(kept)
}

fn run_merge_change_request(tree: &Utf8Path, opts: &MergeChangeRequestOptions, hopic_version: &str) -> Result<ModeOutput> {
    let _ = hopic_git::git_optional(tree, &["remote", "remove", "source"]);
    hopic_git::git(tree, &["remote", "add", "source", &opts.source_remote]).context("adding the `source` remote")?;
    hopic_git::git(tree, &["fetch", "source", &opts.source_ref]).context("fetching the source branch")?;
    let source_tip = hopic_git::git(tree, &["rev-parse", "FETCH_HEAD"])?;
    let base = hopic_git::git(tree, &["merge-base", "HEAD", &source_tip])?;

    hopic_git::git(tree, &["merge", "--no-ff", "--no-commit", &source_tip]).context("merging the change request")?;

    let mut message = match &opts.change_request {
        Some(id) => format!("Merge #{id}"),
        None => "Merge".to_string(),
    };
    if let Some(title) = &opts.title {
        message.push_str(&format!(": {title}"));
    }
    if let Some(description) = &opts.description {
        message.push('\n');
        message.push_str(description);
    }

    for name in validate_approvals(tree, &opts.approved_by, &base, &source_tip)? {
        message.push_str(&format!("\nAcked-by: {name}"));
    }
    message.push_str(&format!("\nMerged-by: Hopic {hopic_version}"));

    Ok(ModeOutput {
        message,
        allow_empty: false,
        source_commit: Some(source_tip),
        base_commit: Some(base),
        bump_override: None,
    })
}

/// `apply-modality-change(name)`. `modality-source-
/// preparation` steps share the regular [`hopic_types::Step`] shape — the
/// loader doesn't carve out a distinct, narrower type for them — so the
/// "constrained to shell / changed-files / commit-message fields" rule is
/// honored here by simply never reading anything off `Step` beyond `sh`,
/// `environment`, and a single `worktrees` entry used as a stand-in for a
/// step-level "changed files" declaration (`Step` has no such top-level
/// field; `WorktreeSpec::changed_files`/`commit_message` are the closest
/// shape it exposes).
fn run_apply_modality_change(
    tree: &Utf8Path,
    config: &PipelineConfig,
    name: &str,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<Option<ModeOutput>> {
    let steps = config
        .modality_source_preparation
        .get(name)
        .ok_or_else(|| HopicError::configuration(format!("unknown modality-source-preparation entry '{name}'")))?;

    let mut declared_changed_files: Vec<Utf8PathBuf> = Vec::new();
    let mut declared_message: Option<String> = None;

    for step in steps {
        if let Some(argv) = &step.sh {
            run_modality_shell(tree, argv, &step.environment, vars)?;
        }
        for worktree in step.worktrees.values() {
            declared_changed_files.extend(worktree.changed_files.iter().cloned());
            if declared_message.is_none() {
                declared_message = worktree.commit_message.clone();
            }
        }
    }

    if declared_changed_files.is_empty() {
        stage_all_except_code_dir(tree, config)?;
    } else {
        let mut args = vec!["add", "--"];
        let paths: Vec<&str> = declared_changed_files.iter().map(Utf8PathBuf::as_str).collect();
        args.extend(paths);
        hopic_git::git(tree, &args)?;
    }

    let merge_in_progress =
        tree.join(".git/MERGE_HEAD").exists() && tree.join(".git/ORIG_HEAD").exists();
    let index_changed = hopic_git::git_optional(tree, &["diff", "--cached", "--quiet"])?.is_none();

    if !index_changed && !merge_in_progress {
        return Ok(None);
    }

    let message = declared_message.unwrap_or_else(|| format!("chore: apply modality '{name}'"));
    Ok(Some(ModeOutput {
        message,
        allow_empty: false,
        source_commit: None,
        base_commit: None,
        bump_override: None,
    }))
}

fn run_modality_shell(
    tree: &Utf8Path,
    argv: &[String],
    environment: &std::collections::BTreeMap<String, Option<String>>,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<()> {
    let (program, args) = argv.split_first().context("modality step has an empty `sh` command")?;
    let program = hopic_config::interpolate(program, vars)?;
    let mut cmd = std::process::Command::new(program);
    cmd.current_dir(tree);
    for arg in args {
        cmd.arg(hopic_config::interpolate(arg, vars)?);
    }
    for (key, value) in environment {
        match value {
            Some(value) => {
                cmd.env(key, hopic_config::interpolate(value, vars)?);
            }
            None => {
                cmd.env_remove(key);
            }
        }
    }
    let status = cmd.status().with_context(|| format!("running modality step command {argv:?}"))?;
    anyhow::ensure!(status.success(), "modality step command {argv:?} exited with {status}");
    Ok(())
}

fn stage_all_except_code_dir(tree: &Utf8Path, config: &PipelineConfig) -> Result<()> {
    let code_dir = config.volumes.get(Utf8Path::new("/code")).and_then(|v| v.source.clone());
    match code_dir {
        Some(code_dir) => {
            let exclude = format!(":(exclude){code_dir}");
            hopic_git::git(tree, &["add", "-A", "--", ".", &exclude])?;
        }
        None => {
            hopic_git::git(tree, &["add", "-A"])?;
        }
    }
    Ok(())
}

fn run_bump_version(tree: &Utf8Path, hopic_version: &str) -> Result<Option<ModeOutput>> {
    let described = hopic_git::describe(tree)?;
    if described.exact() {
        return Ok(None);
    }
    Ok(Some(ModeOutput {
        message: format!("chore: release new version\n\nBumped-by: Hopic {hopic_version}"),
        allow_empty: true,
        source_commit: None,
        base_commit: None,
        bump_override: Some(BumpOverride { on_every_change: true, strict: false }),
    }))
}

/// The **PostSubmitBump** branch: when
/// `version.file.after-submit.bump` is set, builds a second, non-advancing
/// commit on top of `base_commit` that bumps the version file — a plumbing
/// `commit-tree` against the already-staged working tree, immediately
/// followed by a hard reset back to `base_commit` so the workspace is left
/// exactly as it was.
pub fn build_post_submit_bump_commit(
    tree: &Utf8Path,
    config: &PipelineConfig,
    base_commit: &str,
    hopic_version: &str,
) -> Result<Option<String>> {
    let Some(file) = &config.version.file else { return Ok(None) };
    let Some(after_submit) = &file.after_submit else { return Ok(None) };
    if !after_submit.bump {
        return Ok(None);
    }

    let path = tree.join(&file.path);
    let message = format!("chore: bump version for next development cycle\n\nBumped-by: Hopic {hopic_version}");

    match config.version.format {
        CfgVersionFormat::Semver => {
            let current: hopic_version::SemVer = hopic_version::read_version(&path)?
                .ok_or_else(|| HopicError::Versioning { message: format!("no version found in {}", file.path) })?;
            hopic_version::replace_version(&path, &current.next_patch())?;
        }
        CfgVersionFormat::Carver => {
            let current: hopic_version::CarusoVer = hopic_version::read_version(&path)?
                .ok_or_else(|| HopicError::Versioning { message: format!("no version found in {}", file.path) })?;
            hopic_version::replace_version(&path, &current.next_fix())?;
        }
    }

    hopic_git::git(tree, &["add", "-A"])?;
    let tree_sha = hopic_git::git(tree, &["write-tree"])?;
    let commit_sha = hopic_git::git(tree, &["commit-tree", &tree_sha, "-p", base_commit, "-m", &message])?;
    hopic_git::git(tree, &["reset", "--hard", base_commit])?;
    Ok(Some(commit_sha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo() -> (tempfile::TempDir, Utf8PathBuf) {
        let td = tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
        Command::new("git").args(["init", "-q"]).current_dir(&dir).status().unwrap();
        Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(&dir).status().unwrap();
        Command::new("git").args(["config", "user.name", "Test User"]).current_dir(&dir).status().unwrap();
        (td, dir)
    }

    fn commit(dir: &Utf8Path, message: &str) -> String {
        std::fs::write(dir.join("f"), message).unwrap();
        Command::new("git").args(["add", "-A"]).current_dir(dir).status().unwrap();
        Command::new("git").args(["commit", "-q", "-m", message]).current_dir(dir).status().unwrap();
        hopic_git::git(dir, &["rev-parse", "HEAD"]).unwrap()
    }

    #[test]
    fn approval_matching_source_tip_is_always_kept() {
        let (_td, dir) = init_repo();
        let base = commit(&dir, "chore: base");
        let tip = commit(&dir, "feat: add widget");
        let kept = validate_approvals(&dir, &[format!("Alice:{tip}")], &base, &tip).unwrap();
        assert_eq!(kept, vec!["Alice".to_string()]);
    }

    #[test]
    fn approval_at_base_with_real_changes_is_dropped() {
        let (_td, dir) = init_repo();
        let base = commit(&dir, "chore: base");
        let tip = commit(&dir, "feat: add widget");
        let kept = validate_approvals(&dir, &[format!("Charlie:{base}")], &base, &tip).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn approval_before_a_fixup_commit_survives_autosquash_dropping() {
        let (_td, dir) = init_repo();
        let base = commit(&dir, "chore: base");
        let feat = commit(&dir, "feat: add widget");
        let _fixup = commit(&dir, "fixup! feat: add widget");
        let tip = hopic_git::git(&dir, &["rev-parse", "HEAD"]).unwrap();
        let kept = validate_approvals(&dir, &[format!("Alice:{feat}")], &base, &tip).unwrap();
        assert_eq!(kept, vec!["Alice".to_string()]);
    }

    #[test]
    fn malformed_approval_entries_are_ignored() {
        let (_td, dir) = init_repo();
        let base = commit(&dir, "chore: base");
        let tip = commit(&dir, "feat: add widget");
        let kept = validate_approvals(&dir, &["not-an-entry".to_string()], &base, &tip).unwrap();
        assert!(kept.is_empty());
    }
}
