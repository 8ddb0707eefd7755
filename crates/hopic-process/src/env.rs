//! Host-environment handling for spawned steps: which host variables pass
//! through to a step's process, and which are stripped or normalized.
//!
//! Only explicitly passed variables reach a step's child process; the host
//! environment otherwise leaks nothing in. Locale variables are the one
//! exception worth a named function, since every step needs the same fixed
//! substitution rather than a per-step decision.

/// Strips `LC_*`, `LANG`, `LANGUAGE` from `env` and replaces them with
/// `LANG=C.UTF-8`, so step output is locale-independent regardless of what
/// the host or container image ships.
pub fn sanitize_locale_env(env: &mut Vec<(String, String)>) {
    env.retain(|(key, _)| !is_locale_var(key));
    env.push(("LANG".to_string(), "C.UTF-8".to_string()));
}

fn is_locale_var(key: &str) -> bool {
    key == "LANG" || key == "LANGUAGE" || key.starts_with("LC_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_existing_locale_vars_and_sets_c_utf8() {
        let mut env = vec![
            ("LC_ALL".to_string(), "en_US.UTF-8".to_string()),
            ("LANGUAGE".to_string(), "en".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        sanitize_locale_env(&mut env);
        assert!(env.contains(&("PATH".to_string(), "/usr/bin".to_string())));
        assert!(env.contains(&("LANG".to_string(), "C.UTF-8".to_string())));
        assert!(!env.iter().any(|(k, _)| k == "LC_ALL" || k == "LANGUAGE"));
    }

    #[test]
    fn idempotent_when_no_locale_vars_present() {
        let mut env = vec![("PATH".to_string(), "/usr/bin".to_string())];
        sanitize_locale_env(&mut env);
        assert_eq!(
            env,
            vec![
                ("PATH".to_string(), "/usr/bin".to_string()),
                ("LANG".to_string(), "C.UTF-8".to_string()),
            ]
        );
    }
}
