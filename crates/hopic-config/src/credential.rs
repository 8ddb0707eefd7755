//! Normalizes `with-credentials` entries into [`hopic_types::Credential`]
//!.

use anyhow::Result;
use hopic_types::{Credential, CredentialEncoding};

use crate::raw::{RawCredentialEntry, RawCredentialFull, RawCredentials};
use crate::ConfigError;

pub fn normalize_credentials(raw: Option<RawCredentials>) -> Result<Vec<Credential>> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    match raw {
        RawCredentials::One(entry) => Ok(vec![normalize_entry(entry)?]),
        RawCredentials::Many(entries) => entries.into_iter().map(normalize_entry).collect(),
    }
}

fn normalize_entry(entry: RawCredentialEntry) -> Result<Credential> {
    match entry {
        RawCredentialEntry::Id(id) => Ok(Credential::UsernamePassword {
            id,
            username_var: "USERNAME".to_string(),
            password_var: "PASSWORD".to_string(),
            encoding: CredentialEncoding::Plain,
        }),
        RawCredentialEntry::Full(full) => normalize_full(full),
    }
}

fn normalize_full(full: RawCredentialFull) -> Result<Credential> {
    let kind = full.kind.as_deref().unwrap_or_else(|| default_kind(&full));
    let id = full.id;

    Ok(match kind {
        "username-password" => Credential::UsernamePassword {
            id,
            username_var: full.username_var.unwrap_or_else(|| "USERNAME".to_string()),
            password_var: full.password_var.unwrap_or_else(|| "PASSWORD".to_string()),
            encoding: normalize_encoding(full.encoding.as_deref())?,
        },
        "file" => Credential::File {
            id,
            path_var: full.path_var.unwrap_or_else(|| "SECRET_FILE".to_string()),
        },
        "string" => Credential::String {
            id,
            var: full.var.unwrap_or_else(|| "SECRET".to_string()),
        },
        "ssh-key" => Credential::SshKey {
            id,
            var: full.var.unwrap_or_else(|| "SSH".to_string()),
        },
        other => {
            return Err(ConfigError::new(format!(
                "unknown credential kind `{other}` for credential `{id}`"
            )))
        }
    })
}

/// When `kind` is omitted, infer it from which variable-name fields were
/// actually supplied, defaulting to `username-password` like a bare id
/// string does.
fn default_kind(full: &RawCredentialFull) -> &'static str {
    if full.path_var.is_some() {
        "file"
    } else if full.var.is_some() {
        "string"
    } else {
        "username-password"
    }
}

fn normalize_encoding(encoding: Option<&str>) -> Result<CredentialEncoding> {
    match encoding {
        None | Some("plain") => Ok(CredentialEncoding::Plain),
        Some("url") => Ok(CredentialEncoding::Url),
        Some(other) => Err(ConfigError::new(format!("unknown credential encoding `{other}`"))),
    }
}
