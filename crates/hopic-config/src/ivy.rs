//! `!image-from-ivy-manifest` tag resolution.
//!
//! Reads an Ivy dependency-manifest XML file and resolves the dependency
//! whose `conf` attribute *contains* the substring `toolchain`, or which
//! carries a nested `<conf mapped="toolchain"/>`, into an image reference
//! `<repository>/<path>/<name>:<rev>`. More than one matching dependency is
//! treated as a hard [`ConfigError`] rather than a first-match-wins
//! fallback.

use std::fs;

use anyhow::Context;
use camino::Utf8Path;
use serde::Deserialize;

use crate::ConfigError;

#[derive(Debug, Deserialize)]
struct IvyModule {
    info: Info,
    dependencies: Dependencies,
}

#[derive(Debug, Deserialize)]
struct Info {
    #[serde(rename = "@organisation")]
    organisation: String,
}

#[derive(Debug, Deserialize)]
struct Dependencies {
    #[serde(rename = "dependency", default)]
    dependency: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    #[serde(rename = "@org")]
    org: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@rev")]
    rev: String,
    #[serde(rename = "@conf", default)]
    conf: Option<String>,
    #[serde(rename = "conf", default)]
    nested_conf: Vec<NestedConf>,
}

#[derive(Debug, Deserialize)]
struct NestedConf {
    #[serde(rename = "@mapped", default)]
    mapped: Option<String>,
}

impl Dependency {
    fn is_toolchain(&self) -> bool {
        self.conf.as_deref().is_some_and(|c| c.contains("toolchain"))
            || self.nested_conf.iter().any(|c| c.mapped.as_deref() == Some("toolchain"))
    }
}

/// Resolves `manifest_path` (relative paths are joined to `cfg_dir`) to an
/// image reference string.
pub fn resolve_image(manifest_path: &Utf8Path, cfg_dir: &Utf8Path) -> anyhow::Result<String> {
    let path = if manifest_path.is_absolute() {
        manifest_path.to_path_buf()
    } else {
        cfg_dir.join(manifest_path)
    };

    let text = fs::read_to_string(&path).with_context(|| format!("reading Ivy manifest {path}"))?;
    let module: IvyModule =
        quick_xml::de::from_str(&text).with_context(|| format!("parsing Ivy manifest {path}"))?;

    let matches: Vec<&Dependency> = module.dependencies.dependency.iter().filter(|d| d.is_toolchain()).collect();

    match matches.as_slice() {
        [one] => Ok(format!(
            "{}/{}/{}:{}",
            module.info.organisation,
            one.org.replace('.', "/"),
            one.name,
            one.rev
        )),
        [] => Err(ConfigError::new(format!(
            "no dependency mapped to configuration `toolchain` in Ivy manifest {path}"
        ))),
        _ => Err(ConfigError::new(format!(
            "more than one dependency mapped to configuration `toolchain` in Ivy manifest {path}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &Utf8Path, name: &str, xml: &str) -> camino::Utf8PathBuf {
        let path = dir.join(name);
        fs::write(&path, xml).unwrap();
        path
    }

    const BASE: &str = r#"<?xml version="1.0"?>
<ivy-module version="2.0">
  <info organisation="registry.example.com/toolchains" module="demo"/>
  <dependencies>
    {deps}
  </dependencies>
</ivy-module>
"#;

    #[test]
    fn resolves_single_attribute_style_match() {
        let td = tempdir().unwrap();
        let dir = Utf8Path::from_path(td.path()).unwrap();
        let xml = BASE.replace(
            "{deps}",
            r#"<dependency org="tools.gcc" name="gcc-arm" rev="9.2" conf="toolchain->default"/>"#,
        );
        let path = write_manifest(dir, "ivy.xml", &xml);
        let image = resolve_image(&path, dir).expect("resolves");
        assert_eq!(image, "registry.example.com/toolchains/tools/gcc/gcc-arm:9.2");
    }

    #[test]
    fn resolves_single_nested_conf_style_match() {
        let td = tempdir().unwrap();
        let dir = Utf8Path::from_path(td.path()).unwrap();
        let xml = BASE.replace(
            "{deps}",
            r#"<dependency org="tools.clang" name="clang" rev="14.0"><conf name="default" mapped="toolchain"/></dependency>"#,
        );
        let path = write_manifest(dir, "ivy.xml", &xml);
        let image = resolve_image(&path, dir).expect("resolves");
        assert_eq!(image, "registry.example.com/toolchains/tools/clang/clang:14.0");
    }

    #[test]
    fn no_match_is_an_error() {
        let td = tempdir().unwrap();
        let dir = Utf8Path::from_path(td.path()).unwrap();
        let xml = BASE.replace(
            "{deps}",
            r#"<dependency org="tools.gcc" name="gcc-arm" rev="9.2" conf="runtime->default"/>"#,
        );
        let path = write_manifest(dir, "ivy.xml", &xml);
        let err = resolve_image(&path, dir).expect_err("must fail");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn more_than_one_match_is_an_error() {
        let td = tempdir().unwrap();
        let dir = Utf8Path::from_path(td.path()).unwrap();
        let xml = BASE.replace(
            "{deps}",
            concat!(
                r#"<dependency org="tools.gcc" name="gcc-arm" rev="9.2" conf="toolchain->default"/>"#,
                r#"<dependency org="tools.clang" name="clang" rev="14.0" conf="toolchain->default"/>"#,
            ),
        );
        let path = write_manifest(dir, "ivy.xml", &xml);
        let err = resolve_image(&path, dir).expect_err("must fail");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
