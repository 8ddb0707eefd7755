//! The parsed, validated pipeline description.
//!
//! `PipelineConfig` is immutable once the loader hands it back; nothing in
//! this crate mutates it. Order-sensitive maps use [`indexmap::IndexMap`]
//! rather than a sorted map — phases and variants must come back out of
//! `getinfo` in the order they were declared, and a `BTreeMap` would
//! silently re-sort them alphabetically.

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::step::Step;
use crate::volume::{CiLock, VolumeSpec};

/// A fully loaded and normalized pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: VersionPolicy,

    /// phase name → variant name → step sequence, both levels in
    /// declaration order.
    pub phases: IndexMap<String, IndexMap<String, Vec<Step>>>,

    /// phase name → step sequence, restricted to the command subset
    /// allowed for post-submit steps.
    #[serde(default)]
    pub post_submit: IndexMap<String, Vec<Step>>,

    /// Bind mounts, keyed by container-guest path, in declaration order.
    /// The loader is responsible for inserting the `/code`, `/etc/passwd`,
    /// `/etc/group` defaults; this type only holds the result.
    #[serde(default)]
    pub volumes: IndexMap<Utf8PathBuf, VolumeSpec>,

    /// Default container image. `None` means steps run on the host unless
    /// they override `image` themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,

    /// Environment variable names inherited verbatim from the host.
    #[serde(default)]
    pub pass_through_environment_vars: Vec<String>,

    /// Shell commands run before the built-in `git clean -xdff`.
    #[serde(default)]
    pub clean: Vec<String>,

    #[serde(default)]
    pub ci_locks: Vec<CiLock>,

    /// Scopes credential lookups; otherwise opaque to this crate.
    pub project_name: String,

    /// modality name → step sequence, constrained to shell / changed-files
    /// / commit-message fields by the loader.
    #[serde(default)]
    pub modality_source_preparation: IndexMap<String, Vec<Step>>,

    /// When set, publish-gated steps only run if the target ref matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_from_branch: Option<String>,
}

/// A container image reference: a literal tag, an Ivy-manifest lookup, or
/// explicitly "run on host".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    Literal(String),
    IvyManifest { ivy_manifest: Utf8PathBuf },
}

/// `PipelineConfig.version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionPolicy {
    pub format: VersionFormat,
    pub bump: BumpPolicy,
    #[serde(default)]
    pub on_every_change: bool,
    /// `true`/`false`, or a tag-name format string. Defaulted by the loader
    /// when absent.
    #[serde(default = "default_tag")]
    pub tag: TagPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// Regex naming a capture group `id` that extracts a hotfix identifier
    /// from the target ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotfix_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<VersionFile>,
}

fn default_tag() -> TagPolicy {
    TagPolicy::Bool(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionFormat {
    Semver,
    Carver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagPolicy {
    Bool(bool),
    Format(String),
}

/// The version file kept in sync alongside the tag/commit-described
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFile {
    pub path: Utf8PathBuf,
    #[serde(default)]
    pub after_submit: Option<AfterSubmit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AfterSubmit {
    #[serde(default)]
    pub bump: bool,
}

/// `PipelineConfig.version.bump`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum BumpPolicy {
    Disabled,
    Constant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    ConventionalCommits {
        #[serde(default)]
        strict: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reject_breaking_changes_on: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reject_new_features_on: Option<String>,
    },
}
