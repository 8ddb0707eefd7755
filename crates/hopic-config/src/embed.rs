//! `!embed` tag resolution: run a sub-process at config
//! load time, parse its stdout as YAML, and splice the result into the
//! tree in place of the tag. A failing sub-process does not abort the
//! whole parse — it's replaced with a stub step that fails loudly once the
//! build actually reaches it.

use std::process::Command;

use anyhow::Context;

/// Runs `command` (already POSIX-shell-split) in `cwd`, captures stdout,
/// and parses it as YAML. Unlike the step executor this doesn't go through
/// [`hopic_process::run_with_timeout`] — it needs the sub-process's output
/// captured rather than streamed, and config loading has no per-step
/// timeout budget to enforce.
pub fn run_embed(argv: &[String], cwd: &camino::Utf8Path) -> anyhow::Result<serde_yaml::Value> {
    let Some((program, args)) = argv.split_first() else {
        anyhow::bail!("`!embed` command must not be empty");
    };

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .with_context(|| format!("running embed command {argv:?}"))?;

    if !output.status.success() {
        anyhow::bail!(
            "embed command {argv:?} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    serde_yaml::from_slice(&output.stdout)
        .with_context(|| format!("parsing stdout of embed command {argv:?} as YAML"))
}

/// The stub step spliced in when `!embed` fails: a single metadata-less
/// shell step whose command always fails, carrying `reason` as its
/// description so the failure is diagnosable instead of silent.
pub fn error_variant_step(reason: &str) -> serde_yaml::Value {
    let mut mapping = serde_yaml::Mapping::new();
    mapping.insert(
        serde_yaml::Value::String("sh".to_string()),
        serde_yaml::Value::Sequence(vec![
            serde_yaml::Value::String("false".to_string()),
        ]),
    );
    mapping.insert(
        serde_yaml::Value::String("description".to_string()),
        serde_yaml::Value::String(format!("!embed failed: {reason}")),
    );
    serde_yaml::Value::Sequence(vec![serde_yaml::Value::Mapping(mapping)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn runs_command_and_parses_yaml_stdout() {
        let value = run_embed(
            &["printf".to_string(), "- sh: echo hi\n".to_string()],
            Utf8Path::new("."),
        )
        .expect("runs");
        assert!(value.is_sequence());
    }

    #[test]
    fn failing_command_is_an_error() {
        let err = run_embed(&["false".to_string()], Utf8Path::new(".")).expect_err("must fail");
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn error_variant_step_carries_reason_in_description() {
        let value = error_variant_step("boom");
        let rendered = serde_yaml::to_string(&value).unwrap();
        assert!(rendered.contains("boom"));
    }
}
