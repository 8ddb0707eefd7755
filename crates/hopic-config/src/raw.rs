//! The permissive, kebab-case shape the YAML surface actually presents
//!, deserialized straight off the post-tag-resolution
//! [`serde_yaml::Value`] tree. [`crate::normalize`] turns this into the
//! strict, normalized [`hopic_types::PipelineConfig`].

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawPipelineConfig {
    pub version: RawVersionPolicy,
    #[serde(default)]
    pub phases: IndexMap<String, IndexMap<String, Vec<RawStepOrMeta>>>,
    #[serde(default)]
    pub post_submit: IndexMap<String, Vec<RawStepOrMeta>>,
    #[serde(default)]
    pub volumes: IndexMap<Utf8PathBuf, RawVolumeSpec>,
    #[serde(default)]
    pub image: Option<RawImageSource>,
    #[serde(default)]
    pub pass_through_environment_vars: Vec<String>,
    #[serde(default)]
    pub clean: Vec<String>,
    #[serde(default)]
    pub ci_locks: Vec<RawCiLock>,
    pub project_name: String,
    #[serde(default)]
    pub modality_source_preparation: IndexMap<String, Vec<RawStepOrMeta>>,
    #[serde(default)]
    pub publish_from_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawImageSource {
    IvyManifest { ivy_manifest: Utf8PathBuf },
    Literal(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawVersionPolicy {
    pub format: String,
    pub bump: RawBumpPolicy,
    #[serde(default)]
    pub on_every_change: bool,
    #[serde(default)]
    pub tag: Option<RawTagPolicy>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub hotfix_branch: Option<String>,
    #[serde(default)]
    pub file: Option<RawVersionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTagPolicy {
    Bool(bool),
    Format(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawVersionFile {
    pub path: Utf8PathBuf,
    #[serde(default)]
    pub after_submit: Option<RawAfterSubmit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawAfterSubmit {
    #[serde(default)]
    pub bump: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum RawBumpPolicy {
    Disabled,
    Constant {
        #[serde(default)]
        field: Option<String>,
    },
    ConventionalCommits {
        #[serde(default)]
        strict: bool,
        #[serde(default)]
        reject_breaking_changes_on: Option<String>,
        #[serde(default)]
        reject_new_features_on: Option<String>,
    },
}

/// A step as it appears in the YAML: a mapping, possibly with `sh` given
/// as a single shell string rather than an already-split argv.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawStepOrMeta {
    #[serde(default)]
    pub sh: Option<RawShell>,
    #[serde(default)]
    pub environment: IndexMap<String, Option<String>>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub docker_in_docker: bool,
    #[serde(default)]
    pub with_credentials: Option<RawCredentials>,
    #[serde(default)]
    pub volumes_from: Vec<RawVolumesFrom>,
    #[serde(default)]
    pub extra_docker_args: IndexMap<String, String>,
    #[serde(default)]
    pub foreach: Option<String>,
    #[serde(default)]
    pub run_on_change: Option<String>,
    #[serde(default)]
    pub worktrees: IndexMap<Utf8PathBuf, RawWorktreeSpec>,
    #[serde(default)]
    pub archive: Option<RawArtifactSpec>,
    #[serde(default)]
    pub fingerprint: Option<RawArtifactSpec>,
    #[serde(default)]
    pub junit: Option<RawArtifactSpec>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub node_label: Option<String>,
    #[serde(default)]
    pub wait_on_full_previous_phase: Option<bool>,
    #[serde(default)]
    pub stash: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawShell {
    Single(String),
    Argv(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawVolumesFrom {
    Bare(String),
    Image { image: String },
}

impl RawVolumesFrom {
    pub fn image(&self) -> &str {
        match self {
            Self::Bare(s) => s,
            Self::Image { image } => image,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawWorktreeSpec {
    #[serde(default)]
    pub changed_files: Vec<Utf8PathBuf>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

/// `archive`/`fingerprint`/`junit` accept a bare string (one pattern), a
/// sequence of patterns, or the full mapping shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawArtifactSpec {
    Pattern(String),
    Patterns(Vec<String>),
    Full {
        #[serde(default, alias = "test-results")]
        artifacts: Vec<String>,
        #[serde(default)]
        target: Option<Utf8PathBuf>,
        #[serde(default, alias = "allow-missing", alias = "allow-empty-archive")]
        allow_empty: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawVolumeSpec {
    #[serde(default)]
    pub source: Option<Utf8PathBuf>,
    #[serde(default)]
    pub read_only: bool,
}

/// `ci-locks` entry, kept permissive since only a handful of fields are
/// actually required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawCiLock {
    pub repo_name: String,
    pub branch: String,
    #[serde(default)]
    pub lock_on_change: Option<String>,
    #[serde(default)]
    pub from_phase_onward: Option<String>,
}

/// `with-credentials` accepts a scalar (a credential id string, defaulting
/// to `username-password`), a single mapping, or a sequence of either
///.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawCredentials {
    One(RawCredentialEntry),
    Many(Vec<RawCredentialEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawCredentialEntry {
    Id(String),
    Full(RawCredentialFull),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawCredentialFull {
    pub id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub username_var: Option<String>,
    #[serde(default)]
    pub password_var: Option<String>,
    #[serde(default)]
    pub path_var: Option<String>,
    #[serde(default)]
    pub var: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Lifts a permitted `config:` sub-key's mapping entries up to the top
/// level. `pip` and `config` are allowed to
/// duplicate between the two levels; every other key lifted from
/// `config:` must not already exist at the top.
pub fn lift_config_subkey(value: &mut serde_yaml::Value) -> Result<()> {
    let serde_yaml::Value::Mapping(top) = value else {
        return Err(ConfigError::new("pipeline config must be a top-level mapping"));
    };

    let Some(nested) = top.remove("config") else {
        return Ok(());
    };
    let serde_yaml::Value::Mapping(nested) = nested else {
        return Err(ConfigError::new("`config` sub-key must be a mapping"));
    };

    for (key, val) in nested {
        let key_str = key.as_str().unwrap_or_default();
        if key_str != "pip" && key_str != "config" && top.contains_key(&key) {
            return Err(ConfigError::new(format!(
                "key `{key_str}` present both at top level and under `config:`"
            )));
        }
        top.insert(key, val);
    }
    Ok(())
}

/// The top-level `pip:` plugin list, read before templates are resolved.
pub fn collect_pip_list(value: &serde_yaml::Value) -> Result<Vec<String>> {
    let serde_yaml::Value::Mapping(top) = value else {
        return Err(ConfigError::new("pipeline config must be a top-level mapping"));
    };
    let Some(pip) = top.get("pip") else {
        return Ok(Vec::new());
    };
    serde_yaml::from_value(pip.clone()).context("parsing top-level `pip:` list")
}
