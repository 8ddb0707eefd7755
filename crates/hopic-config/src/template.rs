//! `!template` tag seam.
//!
//! The template plug-in *mechanism* — strict argument-type checking
//! against a declared signature, kebab-case argument names mapping to
//! snake_case parameters, eager materialization of a generator's yielded
//! elements — is in scope. Concrete plug-in bodies are not;
//! [`TemplateRegistry`] starts empty and callers register whatever
//! [`TemplatePlugin`] implementations their `pip:` list resolved to.

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::ConfigError;

/// The shape of a single declared template parameter.
#[derive(Debug, Clone)]
pub struct TemplateParam {
    /// snake_case parameter name; the caller's kebab-case key is converted
    /// before lookup.
    pub name: String,
    pub kind: TemplateParamKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateParamKind {
    String,
    Sequence,
    Mapping,
    Bool,
    Integer,
}

/// A plug-in's full declared signature.
#[derive(Debug, Clone, Default)]
pub struct TemplateSignature {
    pub params: Vec<TemplateParam>,
}

/// A single resolved, type-checked argument value.
#[derive(Debug, Clone)]
pub enum TemplateArg {
    String(String),
    Sequence(Vec<serde_yaml::Value>),
    Mapping(serde_yaml::Mapping),
    Bool(bool),
    Integer(i64),
}

/// A registered `!template` plug-in.
pub trait TemplatePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn signature(&self) -> TemplateSignature;

    /// Produces the step mappings this template expands to. A plug-in that
    /// conceptually yields lazily (a Python generator, in the original
    /// implementation) can simply return the fully materialized `Vec`
    /// here — every element still gets validated against the declared
    /// element shape by the caller, so eager materialization loses no
    /// semantics.
    fn expand(&self, args: &HashMap<String, TemplateArg>) -> Result<Vec<serde_yaml::Value>>;
}

/// The set of plug-ins available to a `!template` tag during the main
/// parse pass, installed via [`crate::ExtensionInstaller`] after the
/// pre-pass `pip:` list is known.
#[derive(Default)]
pub struct TemplateRegistry {
    plugins: HashMap<String, Box<dyn TemplatePlugin>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn TemplatePlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Resolves a `!template` tag's mapping value: the `name` key selects
    /// the plug-in, every other key is a kebab-case argument.
    pub fn resolve(&self, value: &serde_yaml::Value) -> Result<Vec<serde_yaml::Value>> {
        let serde_yaml::Value::Mapping(mapping) = value else {
            return Err(ConfigError::new("`!template` tag value must be a mapping"));
        };

        let name = mapping
            .get("name")
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| ConfigError::new("`!template` mapping must have a string `name` key"))?;

        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| ConfigError::new(format!("no `!template` plug-in registered named `{name}`")))?;

        let signature = plugin.signature();
        let mut args = HashMap::new();
        for param in &signature.params {
            let kebab_key = param.name.replace('_', "-");
            let raw = mapping.get(kebab_key.as_str()).or_else(|| mapping.get(param.name.as_str()));
            match raw {
                Some(value) => args.insert(param.name.clone(), coerce(value, param)?),
                None if param.required => {
                    return Err(ConfigError::new(format!(
                        "`!template` plug-in `{name}` is missing required argument `{kebab_key}`"
                    )))
                }
                None => None,
            };
        }

        plugin
            .expand(&args)
            .with_context(|| format!("expanding `!template` plug-in `{name}`"))
    }
}

fn coerce(value: &serde_yaml::Value, param: &TemplateParam) -> Result<TemplateArg> {
    match (param.kind, value) {
        (TemplateParamKind::String, serde_yaml::Value::String(s)) => Ok(TemplateArg::String(s.clone())),
        (TemplateParamKind::Sequence, serde_yaml::Value::Sequence(seq)) => {
            Ok(TemplateArg::Sequence(seq.clone()))
        }
        (TemplateParamKind::Mapping, serde_yaml::Value::Mapping(map)) => {
            Ok(TemplateArg::Mapping(map.clone()))
        }
        (TemplateParamKind::Bool, serde_yaml::Value::Bool(b)) => Ok(TemplateArg::Bool(*b)),
        (TemplateParamKind::Integer, serde_yaml::Value::Number(n)) if n.is_i64() => {
            Ok(TemplateArg::Integer(n.as_i64().expect("checked is_i64")))
        }
        _ => Err(ConfigError::new(format!(
            "argument `{}` does not match declared type {:?}",
            param.name, param.kind
        ))),
    }
}
