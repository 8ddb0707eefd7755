//! Converts the permissive [`crate::raw`] shape into the strict
//! [`hopic_types::PipelineConfig`]: shell-string
//! splitting, leading `NAME=value` environment extraction, artifact-spec
//! expansion, credential/volume/ci-lock normalization.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use camino::Utf8Path;
use hopic_types::config::{AfterSubmit, BumpPolicy, ImageSource, TagPolicy, VersionFile, VersionFormat, VersionPolicy};
use hopic_types::step::{ArtifactSpec, Foreach, RunOnChange, WorktreeSpec};
use hopic_types::volume::{CiLock, LockOnChange};
use hopic_types::{PipelineConfig, Step};

use crate::interpolate::InterpolationValue;
use crate::raw::{
    RawArtifactSpec, RawBumpPolicy, RawCiLock, RawImageSource, RawPipelineConfig, RawShell, RawStepOrMeta,
    RawTagPolicy, RawVersionPolicy,
};
use crate::{credential, volumes, ConfigError};

pub fn normalize(
    raw: RawPipelineConfig,
    cfg_dir: &Utf8Path,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<PipelineConfig> {
    let mut phases = indexmap::IndexMap::new();
    for (phase_name, variants) in raw.phases {
        let mut normalized_variants = indexmap::IndexMap::new();
        for (variant_name, steps) in variants {
            let steps = steps.into_iter().map(normalize_step).collect::<Result<Vec<_>>>()?;
            normalized_variants.insert(variant_name, steps);
        }
        phases.insert(phase_name, normalized_variants);
    }

    let mut post_submit = indexmap::IndexMap::new();
    for (phase_name, steps) in raw.post_submit {
        let steps = steps.into_iter().map(normalize_step).collect::<Result<Vec<_>>>()?;
        post_submit.insert(phase_name, steps);
    }

    let mut modality_source_preparation = indexmap::IndexMap::new();
    for (modality_name, steps) in raw.modality_source_preparation {
        let steps = steps.into_iter().map(normalize_step).collect::<Result<Vec<_>>>()?;
        modality_source_preparation.insert(modality_name, steps);
    }

    let volumes = volumes::resolve_volumes(raw.volumes, cfg_dir, vars)?;

    let ci_locks = raw.ci_locks.into_iter().map(normalize_ci_lock).collect::<Result<Vec<_>>>()?;

    Ok(PipelineConfig {
        version: normalize_version_policy(raw.version)?,
        phases,
        post_submit,
        volumes,
        image: raw.image.map(normalize_image_source),
        pass_through_environment_vars: raw.pass_through_environment_vars,
        clean: raw.clean,
        ci_locks,
        project_name: raw.project_name,
        modality_source_preparation,
        publish_from_branch: raw.publish_from_branch,
    })
}

fn normalize_image_source(raw: RawImageSource) -> ImageSource {
    match raw {
        RawImageSource::Literal(s) => ImageSource::Literal(s),
        RawImageSource::IvyManifest { ivy_manifest } => ImageSource::IvyManifest { ivy_manifest },
    }
}

fn normalize_version_policy(raw: RawVersionPolicy) -> Result<VersionPolicy> {
    Ok(VersionPolicy {
        format: normalize_version_format(&raw.format)?,
        bump: normalize_bump_policy(raw.bump),
        on_every_change: raw.on_every_change,
        tag: normalize_tag_policy(raw.tag),
        build: raw.build,
        hotfix_branch: raw.hotfix_branch,
        file: raw.file.map(|f| VersionFile {
            path: f.path,
            after_submit: f.after_submit.map(|a| AfterSubmit { bump: a.bump }),
        }),
    })
}

fn normalize_version_format(format: &str) -> Result<VersionFormat> {
    match format {
        "semver" => Ok(VersionFormat::Semver),
        "carver" => Ok(VersionFormat::Carver),
        other => Err(ConfigError::new(format!("unknown version format `{other}`"))),
    }
}

fn normalize_bump_policy(raw: RawBumpPolicy) -> BumpPolicy {
    match raw {
        RawBumpPolicy::Disabled => BumpPolicy::Disabled,
        RawBumpPolicy::Constant { field } => BumpPolicy::Constant { field },
        RawBumpPolicy::ConventionalCommits { strict, reject_breaking_changes_on, reject_new_features_on } => {
            BumpPolicy::ConventionalCommits { strict, reject_breaking_changes_on, reject_new_features_on }
        }
    }
}

fn normalize_tag_policy(raw: Option<RawTagPolicy>) -> TagPolicy {
    match raw {
        None => TagPolicy::Bool(true),
        Some(RawTagPolicy::Bool(b)) => TagPolicy::Bool(b),
        Some(RawTagPolicy::Format(f)) => TagPolicy::Format(f),
    }
}

fn normalize_ci_lock(raw: RawCiLock) -> Result<CiLock> {
    let lock_on_change = match raw.lock_on_change.as_deref() {
        None | Some("always") => LockOnChange::Always,
        Some("only-on-change") => LockOnChange::OnlyOnChange,
        Some(other) => {
            return Err(ConfigError::new(format!("unknown `ci-locks` entry `lock-on-change` value `{other}`")))
        }
    };
    Ok(CiLock { repo_name: raw.repo_name, branch: raw.branch, lock_on_change, from_phase_onward: raw.from_phase_onward })
}

fn normalize_step(raw: RawStepOrMeta) -> Result<Step> {
    let mut environment: BTreeMap<String, Option<String>> = BTreeMap::new();

    let sh = match raw.sh {
        None => None,
        Some(shell) => {
            let argv = split_shell(&shell)?;
            let (leading_env, rest) = extract_leading_env(argv);
            environment.extend(leading_env);
            Some(rest)
        }
    };
    for (name, value) in raw.environment {
        environment.insert(name, value);
    }

    let foreach = raw.foreach.as_deref().map(normalize_foreach).transpose()?;
    let run_on_change = raw
        .run_on_change
        .as_deref()
        .map(normalize_run_on_change)
        .transpose()?
        .unwrap_or_default();

    let worktrees = raw
        .worktrees
        .into_iter()
        .map(|(path, spec)| {
            (path.to_string(), WorktreeSpec { changed_files: spec.changed_files, commit_message: spec.commit_message })
        })
        .collect();

    Ok(Step {
        sh,
        environment,
        timeout: raw.timeout,
        image: raw.image,
        docker_in_docker: raw.docker_in_docker,
        with_credentials: credential::normalize_credentials(raw.with_credentials)?,
        volumes_from: raw.volumes_from.iter().map(|v| v.image().to_string()).collect(),
        extra_docker_args: raw.extra_docker_args.into_iter().collect(),
        foreach,
        run_on_change,
        worktrees,
        archive: raw.archive.map(normalize_artifact_spec),
        fingerprint: raw.fingerprint.map(normalize_artifact_spec),
        junit: raw.junit.map(normalize_artifact_spec),
        description: raw.description,
        node_label: raw.node_label,
        wait_on_full_previous_phase: raw.wait_on_full_previous_phase,
        stash: raw.stash,
    })
}

fn normalize_artifact_spec(raw: RawArtifactSpec) -> ArtifactSpec {
    match raw {
        RawArtifactSpec::Pattern(pattern) => {
            ArtifactSpec { patterns: vec![normalize_glob(&pattern)], target: None, allow_missing: false }
        }
        RawArtifactSpec::Patterns(patterns) => ArtifactSpec {
            patterns: patterns.iter().map(|p| normalize_glob(p)).collect(),
            target: None,
            allow_missing: false,
        },
        RawArtifactSpec::Full { artifacts, target, allow_empty } => ArtifactSpec {
            patterns: artifacts.iter().map(|p| normalize_glob(p)).collect(),
            target,
            allow_missing: allow_empty,
        },
    }
}

/// The `(*)` shorthand normalizes to `*`.
fn normalize_glob(pattern: &str) -> String {
    pattern.replace("(*)", "*")
}

fn normalize_foreach(value: &str) -> Result<Foreach> {
    match collapse(value).as_str() {
        "sourcecommit" => Ok(Foreach::SourceCommit),
        "autosquashedcommit" => Ok(Foreach::AutosquashedCommit),
        _ => Err(ConfigError::new(format!("unknown `foreach` value `{value}`"))),
    }
}

fn normalize_run_on_change(value: &str) -> Result<RunOnChange> {
    match collapse(value).as_str() {
        "always" => Ok(RunOnChange::Always),
        "never" => Ok(RunOnChange::Never),
        "only" => Ok(RunOnChange::Only),
        "newversiononly" => Ok(RunOnChange::NewVersionOnly),
        _ => Err(ConfigError::new(format!("unknown `run-on-change` value `{value}`"))),
    }
}

fn collapse(s: &str) -> String {
    s.to_ascii_lowercase().replace(['-', '_'], "")
}

/// Splits a `sh:` value into argv: already-split sequences pass through,
/// single strings are split with POSIX shell quoting rules.
fn split_shell(raw: &RawShell) -> Result<Vec<String>> {
    match raw {
        RawShell::Single(s) => shell_words::split(s).map_err(|e| ConfigError::new(format!("splitting `sh` string: {e}"))),
        RawShell::Argv(argv) => Ok(argv.clone()),
    }
}

/// Leading `NAME=value` tokens become step environment entries, the same
/// way a POSIX shell treats `FOO=bar cmd args`.
fn extract_leading_env(argv: Vec<String>) -> (BTreeMap<String, Option<String>>, Vec<String>) {
    let mut env = BTreeMap::new();
    let mut split_at = 0;
    for token in &argv {
        match token.split_once('=') {
            Some((name, value)) if is_valid_env_name(name) => {
                env.insert(name.to_string(), Some(value.to_string()));
                split_at += 1;
            }
            _ => break,
        }
    }
    let rest = argv[split_at..].to_vec();
    (env, rest)
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
