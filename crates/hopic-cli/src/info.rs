//! `getinfo`, `show-config`, `show-env`, `may-publish`:
//! read-only diagnostic and machine-readable projections of the loaded
//! pipeline config and current environment.

use anyhow::Result;
use camino::Utf8Path;
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::workspace::LoadedConfig;

pub struct GetinfoArgs {
    pub phases: Vec<String>,
    pub variants: Vec<String>,
    pub post_submit: bool,
}

/// A whitelisted JSON projection of the loaded config — the full
/// `PipelineConfig` carries
/// post-normalization internals (default volume mounts, interpolated
/// paths) that aren't part of the contract an outer CI driver reads.
pub fn getinfo(loaded: &LoadedConfig, args: &GetinfoArgs) -> Result<Value> {
    let config = &loaded.config;

    if args.post_submit {
        let phases: IndexMap<&str, Value> = config
            .post_submit
            .iter()
            .filter(|(name, _)| args.phases.is_empty() || args.phases.iter().any(|p| p == *name))
            .map(|(name, steps)| (name.as_str(), json!(steps.len())))
            .collect();
        return Ok(json!({ "post-submit": phases }));
    }

    if !args.phases.is_empty() {
        let unknown: Vec<String> = args.phases.iter().filter(|p| !config.phases.contains_key(p.as_str())).cloned().collect();
        if !unknown.is_empty() {
            return Err(hopic_core::HopicError::unknown_phase(unknown));
        }
    }

    let mut phases = serde_json::Map::new();
    for (phase_name, variants) in &config.phases {
        if !args.phases.is_empty() && !args.phases.iter().any(|p| p == phase_name) {
            continue;
        }
        let mut variant_map = serde_json::Map::new();
        for (variant_name, steps) in variants {
            if !args.variants.is_empty() && !args.variants.iter().any(|v| v == variant_name) {
                continue;
            }
            variant_map.insert(variant_name.clone(), json!(steps.len()));
        }
        phases.insert(phase_name.clone(), Value::Object(variant_map));
    }

    Ok(json!({
        "project-name": config.project_name,
        "version": {
            "format": config.version.format,
            "on-every-change": config.version.on_every_change,
        },
        "phases": phases,
        "publish-from-branch": config.publish_from_branch,
    }))
}

/// Dumps the fully resolved config as-is — an operator diagnostic, not a
/// stable machine contract, unlike [`getinfo`].
pub fn show_config(loaded: &LoadedConfig) -> Result<Value> {
    Ok(serde_json::to_value(&loaded.config)?)
}

/// Dumps the environment variables `build` would pass through, resolved
/// against the host.
pub fn show_env(loaded: &LoadedConfig, whitelisted: &[String]) -> Value {
    let mut env = serde_json::Map::new();
    for name in &loaded.config.pass_through_environment_vars {
        if let Ok(value) = std::env::var(name) {
            env.insert(name.clone(), json!(value));
        }
    }
    for name in whitelisted {
        if let Ok(value) = std::env::var(name) {
            env.insert(name.clone(), json!(value));
        }
    }
    env.insert("WORKSPACE".to_string(), json!(loaded.workspace.as_str()));
    Value::Object(env)
}

/// `may-publish`'s exit-0-iff predicate: whether the current target ref
/// (the HEAD commit's recorded `PerCommitMeta.ref`) matches
/// `publish-from-branch`.
pub fn may_publish(workspace: &Utf8Path, config: &hopic_types::PipelineConfig) -> Result<bool> {
    let head = hopic_git::git(workspace, &["rev-parse", "HEAD"])?;
    let target_ref = hopic_core::read_percommit(workspace, &head)?.map(|m| m.ref_).unwrap_or_default();
    Ok(hopic_core::is_publish_allowed(&target_ref, config.publish_from_branch.as_deref()))
}
