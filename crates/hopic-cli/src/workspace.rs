//! Resolves `--workspace`/`--config` against the current directory and
//! loads the pipeline config, wiring in the interpolation vars every
//! subcommand that reads the config needs.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use hopic_config::NoExtensions;
use hopic_types::PipelineConfig;

use crate::vars;

pub struct LoadedConfig {
    pub workspace: Utf8PathBuf,
    pub config_path: Utf8PathBuf,
    pub config: PipelineConfig,
}

/// Discovers the config file (explicit `--config`, else `$HOPIC_CONFIG`,
/// else the default search path) and loads it against `workspace` as the
/// `WORKSPACE` interpolation root.
pub fn load(workspace: &Utf8Path, explicit_config: Option<&Utf8Path>, whitelisted_vars: &[String]) -> Result<LoadedConfig> {
    let config_path = hopic_config::discover_config_path(workspace, explicit_config)?;
    let vars = vars::base_vars(workspace, whitelisted_vars);
    let config = hopic_config::load(&config_path, &NoExtensions, &vars)
        .with_context(|| format!("loading pipeline config {config_path}"))?;
    Ok(LoadedConfig { workspace: workspace.to_path_buf(), config_path, config })
}
