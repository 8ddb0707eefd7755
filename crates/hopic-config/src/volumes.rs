//! Bind-mount resolution: `${VAR}` substitution against a
//! restricted environment, `~/`-guest-path rewriting, and the three
//! default mounts every pipeline gets unless it opts out.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use crate::interpolate::{interpolate, InterpolationValue};
use crate::raw::RawVolumeSpec;
use crate::ConfigError;
use hopic_types::VolumeSpec;

const DEFAULT_GUEST_PATHS: [&str; 3] = ["/code", "/etc/passwd", "/etc/group"];

pub fn resolve_volumes(
    raw: IndexMap<Utf8PathBuf, RawVolumeSpec>,
    cfg_dir: &Utf8Path,
    vars: &std::collections::HashMap<String, InterpolationValue>,
) -> Result<IndexMap<Utf8PathBuf, VolumeSpec>> {
    let mut resolved = IndexMap::new();

    for (guest, spec) in raw {
        let guest = rewrite_guest_home(&guest);
        let source = match spec.source {
            None => None,
            Some(path) => Some(resolve_host_source(&path, cfg_dir, vars)?),
        };
        resolved.insert(guest, VolumeSpec { source, read_only: spec.read_only });
    }

    for guest in DEFAULT_GUEST_PATHS {
        let guest = Utf8PathBuf::from(guest);
        if resolved.contains_key(&guest) {
            continue;
        }
        let default = default_mount(&guest, vars)?;
        resolved.insert(guest, default);
    }

    Ok(resolved)
}

fn default_mount(
    guest: &Utf8Path,
    vars: &std::collections::HashMap<String, InterpolationValue>,
) -> Result<VolumeSpec> {
    match guest.as_str() {
        "/code" => {
            let workspace = match vars.get("WORKSPACE") {
                Some(InterpolationValue::Present(path)) => path.clone(),
                Some(InterpolationValue::Deferred(message)) => {
                    return Err(ConfigError::new(message.clone()))
                }
                None => {
                    return Err(ConfigError::new(
                        "cannot default the `/code` volume mount without a known workspace path",
                    ))
                }
            };
            Ok(VolumeSpec { source: Some(Utf8PathBuf::from(workspace)), read_only: false })
        }
        "/etc/passwd" => Ok(VolumeSpec { source: Some(Utf8PathBuf::from("/etc/passwd")), read_only: true }),
        "/etc/group" => Ok(VolumeSpec { source: Some(Utf8PathBuf::from("/etc/group")), read_only: true }),
        other => unreachable!("unexpected default guest path {other}"),
    }
}

/// Rewrites a guest path starting with `~/` to `/home/sandbox/…`.
fn rewrite_guest_home(guest: &Utf8Path) -> Utf8PathBuf {
    match guest.as_str().strip_prefix("~/") {
        Some(rest) => Utf8PathBuf::from(format!("/home/sandbox/{rest}")),
        None => guest.to_path_buf(),
    }
}

fn resolve_host_source(
    raw: &Utf8Path,
    cfg_dir: &Utf8Path,
    vars: &std::collections::HashMap<String, InterpolationValue>,
) -> Result<Utf8PathBuf> {
    let expanded = interpolate(raw.as_str(), vars)
        .map_err(|e| ConfigError::new(format!("resolving volume source `{raw}`: {e}")))?;
    let path = Utf8PathBuf::from(expanded);
    Ok(if path.is_absolute() { path } else { cfg_dir.join(path) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars_with_workspace() -> std::collections::HashMap<String, InterpolationValue> {
        let mut v = std::collections::HashMap::new();
        v.insert("WORKSPACE".to_string(), InterpolationValue::Present("/ws".to_string()));
        v
    }

    #[test]
    fn inserts_defaults_when_absent() {
        let resolved = resolve_volumes(IndexMap::new(), Utf8Path::new("/cfg"), &vars_with_workspace())
            .expect("resolves");
        assert_eq!(resolved[Utf8Path::new("/code")].source, Some(Utf8PathBuf::from("/ws")));
        assert_eq!(resolved[Utf8Path::new("/etc/passwd")].read_only, true);
    }

    #[test]
    fn explicit_null_source_suppresses_default() {
        let mut raw = IndexMap::new();
        raw.insert(Utf8PathBuf::from("/code"), RawVolumeSpec { source: None, read_only: false });
        let resolved = resolve_volumes(raw, Utf8Path::new("/cfg"), &vars_with_workspace()).expect("resolves");
        assert_eq!(resolved[Utf8Path::new("/code")].source, None);
    }

    #[test]
    fn relative_host_source_resolves_against_cfgdir() {
        let mut raw = IndexMap::new();
        raw.insert(
            Utf8PathBuf::from("/data"),
            RawVolumeSpec { source: Some(Utf8PathBuf::from("fixtures")), read_only: false },
        );
        let resolved =
            resolve_volumes(raw, Utf8Path::new("/cfg"), &vars_with_workspace()).expect("resolves");
        assert_eq!(resolved[Utf8Path::new("/data")].source, Some(Utf8PathBuf::from("/cfg/fixtures")));
    }

    #[test]
    fn tilde_guest_path_rewritten_to_sandbox_home() {
        let mut raw = IndexMap::new();
        raw.insert(
            Utf8PathBuf::from("~/.cache"),
            RawVolumeSpec { source: Some(Utf8PathBuf::from("/host/cache")), read_only: false },
        );
        let resolved =
            resolve_volumes(raw, Utf8Path::new("/cfg"), &vars_with_workspace()).expect("resolves");
        assert!(resolved.contains_key(Utf8Path::new("/home/sandbox/.cache")));
    }

    #[test]
    fn missing_workspace_fails_default_code_mount() {
        let err = resolve_volumes(IndexMap::new(), Utf8Path::new("/cfg"), &std::collections::HashMap::new())
            .expect_err("must fail");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
