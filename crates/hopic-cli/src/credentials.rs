//! The keystore seam `hopic_core::phase::CredentialResolver` leaves open:
//! an environment-variable-backed resolver using the
//! `HOPIC_CREDENTIAL_<ID>[_<FIELD>]` shape, generalized to Hopic's four
//! credential kinds.

use std::env;
use std::io::Write;

use anyhow::{Context, Result};
use hopic_core::HopicError;
use hopic_types::credential::CredentialEncoding;
use hopic_types::Credential;
use tempfile::NamedTempFile;

/// Resolves credentials from `HOPIC_CREDENTIAL_<NORMALIZED_ID>[_<FIELD>]`
/// environment variables. `File`/`SshKey` credentials write their secret to
/// a process-lifetime temporary file and bind the variable to its path;
/// the files live as long as this resolver does.
#[derive(Default)]
pub struct EnvCredentialResolver {
    _tempfiles: std::cell::RefCell<Vec<NamedTempFile>>,
}

impl EnvCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, credential: &Credential, field: &str, var_name: &str) -> Result<String> {
        let env_name = env_var_name(credential.id(), field);
        env::var(&env_name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| HopicError::missing_credential_var(credential.id().to_string(), var_name.to_string()))
    }

    fn write_secret_file(&self, secret: &str) -> Result<String> {
        let mut file = NamedTempFile::new().context("creating temporary credential file")?;
        file.write_all(secret.as_bytes()).context("writing temporary credential file")?;
        file.flush().context("flushing temporary credential file")?;
        let path = file.path().to_string_lossy().to_string();
        self._tempfiles.borrow_mut().push(file);
        Ok(path)
    }
}

impl hopic_core::CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, credential: &Credential) -> Result<Vec<(String, String)>> {
        match credential {
            Credential::UsernamePassword { username_var, password_var, encoding, .. } => {
                let username = self.lookup(credential, "USERNAME", username_var)?;
                let password = self.lookup(credential, "PASSWORD", password_var)?;
                let (username, password) = match encoding {
                    CredentialEncoding::Plain => (username, password),
                    CredentialEncoding::Url => (url_encode(&username), url_encode(&password)),
                };
                Ok(vec![(username_var.clone(), username), (password_var.clone(), password)])
            }
            Credential::String { var, .. } => {
                let secret = self.lookup(credential, "SECRET", var)?;
                Ok(vec![(var.clone(), secret)])
            }
            Credential::File { path_var, .. } => {
                let secret = self.lookup(credential, "SECRET", path_var)?;
                let path = self.write_secret_file(&secret)?;
                Ok(vec![(path_var.clone(), path)])
            }
            Credential::SshKey { var, .. } => {
                let secret = self.lookup(credential, "SECRET", var)?;
                let path = self.write_secret_file(&secret)?;
                Ok(vec![(var.clone(), path)])
            }
        }
    }
}

fn env_var_name(id: &str, field: &str) -> String {
    format!("HOPIC_CREDENTIAL_{}_{field}", normalize_id(id))
}

fn normalize_id(id: &str) -> String {
    id.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' }).collect()
}

/// Minimal percent-encoding for URL-embedded credentials (`user:pass@host`
/// form): escapes everything outside the unreserved RFC 3986 set.
fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
