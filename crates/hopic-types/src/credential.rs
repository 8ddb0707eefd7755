//! Credential descriptors consumed by a step's `with-credentials` list
//!.

use serde::{Deserialize, Serialize};

/// A tagged credential request. Each variant names the environment
/// variable(s) the phase runner populates once the credential is resolved
/// from the external keystore (out of scope — only the request shape and
/// defaulted variable names live here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Credential {
    /// A username/password pair, optionally URL-encoded before
    /// substitution.
    UsernamePassword {
        id: String,
        #[serde(default = "default_username_var")]
        username_var: String,
        #[serde(default = "default_password_var")]
        password_var: String,
        #[serde(default)]
        encoding: CredentialEncoding,
    },
    /// A secret written to a temporary file; the variable holds the file's
    /// path.
    File {
        id: String,
        #[serde(default = "default_secret_file_var")]
        path_var: String,
    },
    /// An opaque secret string.
    String {
        id: String,
        #[serde(default = "default_secret_var")]
        var: String,
    },
    /// An SSH private key, written to a temporary file and wired into
    /// `GIT_SSH_COMMAND`/`ssh-agent`-style forwarding.
    SshKey {
        id: String,
        #[serde(default = "default_ssh_var")]
        var: String,
    },
}

impl Credential {
    /// The keystore lookup id this credential names.
    pub fn id(&self) -> &str {
        match self {
            Self::UsernamePassword { id, .. }
            | Self::File { id, .. }
            | Self::String { id, .. }
            | Self::SshKey { id, .. } => id,
        }
    }

    /// Every environment variable name this credential populates, in the
    /// order the obfuscation map should record them.
    pub fn variable_names(&self) -> Vec<&str> {
        match self {
            Self::UsernamePassword {
                username_var,
                password_var,
                ..
            } => vec![username_var.as_str(), password_var.as_str()],
            Self::File { path_var, .. } => vec![path_var.as_str()],
            Self::String { var, .. } => vec![var.as_str()],
            Self::SshKey { var, .. } => vec![var.as_str()],
        }
    }
}

/// Whether to URL-encode a resolved username/password before substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialEncoding {
    #[default]
    Plain,
    Url,
}

fn default_username_var() -> String {
    "USERNAME".to_string()
}

fn default_password_var() -> String {
    "PASSWORD".to_string()
}

fn default_secret_file_var() -> String {
    "SECRET_FILE".to_string()
}

fn default_secret_var() -> String {
    "SECRET".to_string()
}

fn default_ssh_var() -> String {
    "SSH".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_password_defaults_variable_names() {
        let cred = Credential::UsernamePassword {
            id: "repo-creds".into(),
            username_var: default_username_var(),
            password_var: default_password_var(),
            encoding: CredentialEncoding::Plain,
        };
        assert_eq!(cred.variable_names(), vec!["USERNAME", "PASSWORD"]);
        assert_eq!(cred.id(), "repo-creds");
    }

    #[test]
    fn deserializes_from_tagged_json() {
        let json = r#"{"kind": "string", "id": "token", "var": "TOKEN"}"#;
        let cred: Credential = serde_json::from_str(json).expect("parse");
        assert_eq!(cred.variable_names(), vec!["TOKEN"]);
    }
}
