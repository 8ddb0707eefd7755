//! Pipeline configuration loader.
//!
//! Loading a pipeline file is a two-pass YAML read:
//!
//! 1. A pre-pass with custom tags left untouched: only the top-level `pip:`
//!    plugin list is collected, so [`ExtensionInstaller::install`] can make
//!    late-resolved `!template` tags available before the real parse.
//! 2. A main pass that resolves `!image-from-ivy-manifest`, `!embed` and
//!    `!template` tags against the now-installed [`TemplateRegistry`], then
//!    normalizes the result (shell splitting, artifact-spec expansion,
//!    credential defaults, volume resolution) into [`hopic_types::PipelineConfig`].
//!
//! Everything here is `pub(crate)`-heavy on purpose: the only supported
//! entry point is [`load`] (or [`load_str`] for tests), which returns an
//! already-validated config or a [`ConfigError`].

mod credential;
mod discover;
mod embed;
mod interpolate;
mod ivy;
mod normalize;
mod raw;
mod tags;
mod template;
mod validate;
mod volumes;

pub use discover::{discover_config_path, HOPIC_CONFIG_ENV};
pub use interpolate::{interpolate, InterpolationError, InterpolationValue};
pub use ivy::resolve_image as resolve_ivy_image;
pub use template::{TemplateArg, TemplateParam, TemplatePlugin, TemplateRegistry, TemplateSignature};

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use hopic_types::PipelineConfig;

/// A configuration error that should surface as a `ConfigurationError`
/// (exit 32), distinct from the generic I/O or YAML errors `anyhow`
/// otherwise wraps transparently.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> anyhow::Error {
        Self(message.into()).into()
    }
}

/// Callback invoked after the pre-pass collects the `pip:` plugin list, so
/// late-resolved `!template` tags become available for the main pass. The
/// template plug-in mechanism itself is out of scope; the
/// default installer registers nothing and leaves every `!template` tag
/// unresolved, which surfaces as a `ConfigurationError` only if the config
/// actually uses one.
pub trait ExtensionInstaller {
    fn install(&self, pip: &[String]) -> Result<TemplateRegistry>;
}

/// An installer that registers no plug-ins. Sufficient for any pipeline
/// that does not reference `!template`.
pub struct NoExtensions;

impl ExtensionInstaller for NoExtensions {
    fn install(&self, _pip: &[String]) -> Result<TemplateRegistry> {
        Ok(TemplateRegistry::new())
    }
}

/// Loads and validates the pipeline file at `path`, relative to
/// `cfg_dir` (the directory `${CFGDIR}` expands to for volume/path
/// interpolation — ordinarily `path`'s own parent). `vars` supplies the
/// remaining `${VAR}` interpolation context (`WORKSPACE`, version fields,
/// whitelisted pass-through variables); `CFGDIR` is derived from `cfg_dir`
/// and always wins over a caller-supplied entry of the same name.
pub fn load(
    path: &Utf8Path,
    installer: &dyn ExtensionInstaller,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    let cfg_dir = path
        .parent()
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    load_str(&text, &cfg_dir, installer, vars)
}

/// Like [`load`], but takes the YAML text directly — the entry point test
/// suites use to avoid a filesystem round-trip.
pub fn load_str(
    text: &str,
    cfg_dir: &Utf8Path,
    installer: &dyn ExtensionInstaller,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<PipelineConfig> {
    let mut pre_pass: serde_yaml::Value =
        serde_yaml::from_str(text).context("parsing pipeline config as YAML")?;
    raw::lift_config_subkey(&mut pre_pass)?;

    let pip = raw::collect_pip_list(&pre_pass)?;
    let registry = installer.install(&pip).context("installing config extensions")?;

    let mut main_pass = pre_pass;
    tags::resolve_tags(&mut main_pass, cfg_dir, &registry)
        .context("resolving custom YAML tags")?;

    let raw_config: raw::RawPipelineConfig =
        serde_yaml::from_value(main_pass).context("deserializing normalized pipeline config")?;

    let mut full_vars = vars.clone();
    full_vars.insert("CFGDIR".to_string(), InterpolationValue::Present(cfg_dir.to_string()));

    let config = normalize::normalize(raw_config, cfg_dir, &full_vars)?;
    validate::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
project-name: example
version:
  format: semver
  bump:
    policy: disabled
phases:
  build:
    linux:
      - sh: echo hi
"#;

    fn vars_with_workspace() -> HashMap<String, InterpolationValue> {
        let mut v = HashMap::new();
        v.insert("WORKSPACE".to_string(), InterpolationValue::Present("/ws".to_string()));
        v
    }

    #[test]
    fn loads_a_minimal_pipeline() {
        let cfg = load_str(MINIMAL, Utf8Path::new("."), &NoExtensions, &vars_with_workspace()).expect("loads");
        assert_eq!(cfg.project_name, "example");
        assert_eq!(cfg.phases["build"]["linux"][0].sh, Some(vec!["echo".into(), "hi".into()]));
    }

    #[test]
    fn config_subkey_lifts_nested_keys() {
        let yaml = r#"
config:
  project-name: example
  version:
    format: semver
    bump:
      policy: disabled
  phases:
    build:
      linux:
        - sh: echo hi
"#;
        let cfg = load_str(yaml, Utf8Path::new("."), &NoExtensions, &vars_with_workspace()).expect("loads");
        assert_eq!(cfg.project_name, "example");
    }

    #[test]
    fn rejects_non_mapping_top_level() {
        let err = load_str("- just\n- a\n- list\n", Utf8Path::new("."), &NoExtensions, &vars_with_workspace())
            .expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
