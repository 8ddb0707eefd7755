//! Locates the pipeline config file: the default search path, with an
//! explicit `--config`/`HOPIC_CONFIG` override taking precedence.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};

use crate::ConfigError;

pub const HOPIC_CONFIG_ENV: &str = "HOPIC_CONFIG";

const DEFAULT_SEARCH: [&str; 2] = ["hopic-ci-config.yaml", ".ci/hopic-ci-config.yaml"];

/// Resolves the config file path for `workspace`: an explicit `--config`
/// override wins, then `$HOPIC_CONFIG`, then the two default search paths
/// in order (first that exists). Relative overrides/env values are
/// resolved against `workspace`.
pub fn discover_config_path(workspace: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    if let Some(explicit) = explicit {
        return Ok(resolve_against(workspace, explicit));
    }

    if let Ok(from_env) = std::env::var(HOPIC_CONFIG_ENV) {
        return Ok(resolve_against(workspace, Utf8Path::new(&from_env)));
    }

    for candidate in DEFAULT_SEARCH {
        let path = workspace.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(ConfigError::new(format!(
        "no pipeline config found under {workspace}: tried {}",
        DEFAULT_SEARCH.join(", ")
    )))
}

fn resolve_against(workspace: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_override_wins_even_if_no_default_exists() {
        let td = tempdir().unwrap();
        let ws = Utf8Path::from_path(td.path()).unwrap();
        let path = discover_config_path(ws, Some(Utf8Path::new("custom.yaml"))).expect("resolves");
        assert_eq!(path, ws.join("custom.yaml"));
    }

    #[test]
    fn finds_top_level_default() {
        let td = tempdir().unwrap();
        let ws = Utf8Path::from_path(td.path()).unwrap();
        std::fs::write(ws.join("hopic-ci-config.yaml"), "").unwrap();
        let path = discover_config_path(ws, None).expect("resolves");
        assert_eq!(path, ws.join("hopic-ci-config.yaml"));
    }

    #[test]
    fn falls_back_to_dot_ci_default() {
        let td = tempdir().unwrap();
        let ws = Utf8Path::from_path(td.path()).unwrap();
        std::fs::create_dir_all(ws.join(".ci")).unwrap();
        std::fs::write(ws.join(".ci/hopic-ci-config.yaml"), "").unwrap();
        let path = discover_config_path(ws, None).expect("resolves");
        assert_eq!(path, ws.join(".ci/hopic-ci-config.yaml"));
    }

    #[test]
    fn errors_when_nothing_found() {
        let td = tempdir().unwrap();
        let ws = Utf8Path::from_path(td.path()).unwrap();
        let err = discover_config_path(ws, None).expect_err("must fail");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
