//! Resolves the three custom YAML tags against a parsed
//! [`serde_yaml::Value`] tree, recursively, so a tag spliced in by another
//! tag's expansion (e.g. an `!embed`'d document that itself uses
//! `!template`) is resolved too.

use anyhow::{Context, Result};
use camino::Utf8Path;

use crate::{embed, ivy, template::TemplateRegistry};

const IMAGE_FROM_IVY_MANIFEST: &str = "!image-from-ivy-manifest";
const EMBED: &str = "!embed";
const TEMPLATE: &str = "!template";

pub fn resolve_tags(value: &mut serde_yaml::Value, cfg_dir: &Utf8Path, registry: &TemplateRegistry) -> Result<()> {
    match value {
        serde_yaml::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let inner = std::mem::replace(&mut tagged.value, serde_yaml::Value::Null);
            let mut resolved = resolve_one(&tag, inner, cfg_dir, registry)?;
            resolve_tags(&mut resolved, cfg_dir, registry)?;
            *value = resolved;
        }
        serde_yaml::Value::Mapping(mapping) => {
            for (_, v) in mapping.iter_mut() {
                resolve_tags(v, cfg_dir, registry)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                resolve_tags(v, cfg_dir, registry)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn resolve_one(
    tag: &str,
    inner: serde_yaml::Value,
    cfg_dir: &Utf8Path,
    registry: &TemplateRegistry,
) -> Result<serde_yaml::Value> {
    match tag {
        IMAGE_FROM_IVY_MANIFEST => {
            let manifest_path: String =
                serde_yaml::from_value(inner).context("`!image-from-ivy-manifest` value must be a string path")?;
            let image = ivy::resolve_image(Utf8Path::new(&manifest_path), cfg_dir)?;
            Ok(serde_yaml::Value::String(image))
        }
        EMBED => {
            let argv = embed_argv(&inner)?;
            match embed::run_embed(&argv, cfg_dir) {
                Ok(spliced) => Ok(spliced),
                Err(e) => Ok(embed::error_variant_step(&e.to_string())),
            }
        }
        TEMPLATE => {
            let steps = registry.resolve(&inner)?;
            Ok(serde_yaml::Value::Sequence(steps))
        }
        other => Err(crate::ConfigError::new(format!("unknown custom YAML tag `{other}`"))),
    }
}

fn embed_argv(value: &serde_yaml::Value) -> Result<Vec<String>> {
    match value {
        serde_yaml::Value::String(s) => shell_words::split(s).context("splitting `!embed` command string"),
        serde_yaml::Value::Sequence(_) => {
            serde_yaml::from_value(value.clone()).context("`!embed` sequence must be a list of strings")
        }
        _ => Err(crate::ConfigError::new("`!embed` value must be a string or a sequence of strings")),
    }
}
