//! Interpolation-variable assembly (including `--whitelisted-var` pass-
//! through) and the small amount of host-identity probing the config
//! loader and container runner both need.

use std::collections::HashMap;
use std::process::Command;

use camino::Utf8Path;
use hopic_config::InterpolationValue;

/// `WORKSPACE` plus one entry per `--whitelisted-var NAME`: `Present` if
/// the host actually has that variable set, `Deferred` otherwise so a
/// config that never references it still loads cleanly.
pub fn base_vars(workspace: &Utf8Path, whitelisted: &[String]) -> HashMap<String, InterpolationValue> {
    let mut vars = HashMap::new();
    vars.insert("WORKSPACE".to_string(), InterpolationValue::Present(workspace.to_string()));
    for name in whitelisted {
        let value = match std::env::var(name) {
            Ok(value) => InterpolationValue::Present(value),
            Err(_) => InterpolationValue::Deferred(format!("whitelisted variable '{name}' is not set in the environment")),
        };
        vars.insert(name.clone(), value);
    }
    vars
}

/// The `uid:gid` a containerized step runs as. Shelled out to `id -u`/
/// `id -g` rather than an `unsafe` `libc::geteuid()` FFI call, consistent
/// with the rest of this workspace's shell-out-for-subprocess-shaped-work
/// choice; falls back to `0:0` if `id` isn't available (containers anyway
/// run as root in that case).
pub fn current_uid_gid() -> (u32, u32) {
    (run_id("-u"), run_id("-g"))
}

fn run_id(flag: &str) -> u32 {
    Command::new("id")
        .arg(flag)
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn base_vars_sets_workspace_present() {
        let vars = base_vars(Utf8Path::new("/ws"), &[]);
        match vars.get("WORKSPACE") {
            Some(InterpolationValue::Present(path)) => assert_eq!(path, "/ws"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn whitelisted_var_defers_when_unset() {
        temp_env::with_var("HOPIC_CLI_TEST_UNSET_VAR", None::<&str>, || {
            let vars = base_vars(&Utf8PathBuf::from("/ws"), &["HOPIC_CLI_TEST_UNSET_VAR".to_string()]);
            assert!(matches!(vars.get("HOPIC_CLI_TEST_UNSET_VAR"), Some(InterpolationValue::Deferred(_))));
        });
    }

    #[test]
    fn whitelisted_var_present_when_set() {
        temp_env::with_var("HOPIC_CLI_TEST_SET_VAR", Some("value"), || {
            let vars = base_vars(&Utf8PathBuf::from("/ws"), &["HOPIC_CLI_TEST_SET_VAR".to_string()]);
            assert!(matches!(vars.get("HOPIC_CLI_TEST_SET_VAR"), Some(InterpolationValue::Present(v)) if v == "value"));
        });
    }

    #[test]
    fn current_uid_gid_returns_something_sane() {
        let (uid, gid) = current_uid_gid();
        let _ = (uid, gid);
    }
}
