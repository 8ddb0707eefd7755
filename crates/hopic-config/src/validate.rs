//! Cross-field invariants that only make sense once a whole
//! [`hopic_types::PipelineConfig`] is assembled —
//! everything a single step's own shape can't reject on its own.

use std::collections::HashSet;

use anyhow::Result;
use hopic_types::step::RunOnChange;
use hopic_types::{PipelineConfig, Step};

use crate::ConfigError;

pub fn validate(config: &PipelineConfig) -> Result<()> {
    validate_step_sequences(config)?;
    validate_variant_bindings(config)?;
    validate_wait_on_full_previous_phase(config)?;
    validate_post_submit_restrictions(config)?;
    validate_ci_locks(config)?;
    Ok(())
}

fn validate_step_sequences(config: &PipelineConfig) -> Result<()> {
    for variants in config.phases.values() {
        for steps in variants.values() {
            validate_timeouts(steps)?;
        }
    }
    Ok(())
}

/// A step without `sh` may carry a global timeout, but only before any
/// `sh` step in the same sequence has run; the sum of the `sh` steps'
/// own timeouts must stay strictly below that budget.
fn validate_timeouts(steps: &[Step]) -> Result<()> {
    let mut seen_sh = false;
    let mut global_timeout = None;
    let mut sh_timeout_sum: u64 = 0;

    for step in steps {
        match (&step.sh, step.timeout) {
            (None, Some(timeout)) => {
                if seen_sh {
                    return Err(ConfigError::new(
                        "a metadata-only step cannot set a timeout after an `sh` step has already run in this variant",
                    ));
                }
                global_timeout = Some(timeout);
            }
            (None, None) => {}
            (Some(_), timeout) => {
                seen_sh = true;
                sh_timeout_sum += timeout.unwrap_or(0);
            }
        }
    }

    if let Some(budget) = global_timeout {
        if sh_timeout_sum >= budget {
            return Err(ConfigError::new(format!(
                "sum of step timeouts ({sh_timeout_sum}s) must be strictly less than the variant's global timeout ({budget}s)"
            )));
        }
    }
    Ok(())
}

/// The first step that sets `node-label` binds it for the whole variant
/// across every phase; a later, differing value is a configuration
/// error. `run-on-change` is tracked the same way, but since the type
/// collapses "unset" into its default (`Always`), only a non-default
/// value counts as "setting" it here — a later, differing non-default
/// value is still rejected, matching the spirit of the invariant even
/// though an explicit `run-on-change: always` is indistinguishable from
/// not setting it at all.
fn validate_variant_bindings(config: &PipelineConfig) -> Result<()> {
    let mut node_label_binding: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    let mut run_on_change_binding: std::collections::HashMap<&str, RunOnChange> = std::collections::HashMap::new();

    for variants in config.phases.values() {
        for (variant_name, steps) in variants {
            for step in steps {
                if let Some(label) = &step.node_label {
                    match node_label_binding.get(variant_name.as_str()) {
                        Some(bound) if *bound != label.as_str() => {
                            return Err(ConfigError::new(format!(
                                "variant `{variant_name}` binds `node-label` to `{bound}`, but a later step sets `{label}`"
                            )));
                        }
                        Some(_) => {}
                        None => {
                            node_label_binding.insert(variant_name.as_str(), label.as_str());
                        }
                    }
                }

                if step.run_on_change != RunOnChange::Always {
                    match run_on_change_binding.get(variant_name.as_str()) {
                        Some(bound) if *bound != step.run_on_change => {
                            return Err(ConfigError::new(format!(
                                "variant `{variant_name}` binds `run-on-change` to `{bound:?}`, but a later step sets `{:?}`",
                                step.run_on_change
                            )));
                        }
                        Some(_) => {}
                        None => {
                            run_on_change_binding.insert(variant_name.as_str(), step.run_on_change);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// For consecutive phases A, B sharing a variant v, `wait-on-full-previous-phase`
/// in B.v defaults to `true`; setting it `false` is rejected when A.v used any
/// inter-phase-dependent option (`run-on-change`, `stash`, `worktrees`).
fn validate_wait_on_full_previous_phase(config: &PipelineConfig) -> Result<()> {
    let phases: Vec<_> = config.phases.iter().collect();
    for window in phases.windows(2) {
        let [(_, phase_a), (phase_b_name, phase_b)] = window else { unreachable!("windows(2)") };
        for (variant_name, steps_b) in phase_b.iter() {
            let Some(steps_a) = phase_a.get(variant_name) else { continue };

            let wait = steps_b
                .iter()
                .find_map(|s| s.wait_on_full_previous_phase)
                .unwrap_or(true);
            if wait {
                continue;
            }

            if uses_inter_phase_dependent_option(steps_a) {
                return Err(ConfigError::new(format!(
                    "phase `{phase_b_name}` variant `{variant_name}` sets `wait-on-full-previous-phase: false`, \
                     but the previous phase's same variant used `run-on-change`, `stash`, or `worktrees`"
                )));
            }
        }
    }
    Ok(())
}

fn uses_inter_phase_dependent_option(steps: &[Step]) -> bool {
    steps
        .iter()
        .any(|s| s.run_on_change != RunOnChange::Always || s.stash || !s.worktrees.is_empty())
}

/// A post-submit step cannot declare `archive`, `fingerprint`, `stash`, `worktrees`.
fn validate_post_submit_restrictions(config: &PipelineConfig) -> Result<()> {
    for (phase_name, steps) in &config.post_submit {
        for step in steps {
            if step.archive.is_some() || step.fingerprint.is_some() || step.stash || !step.worktrees.is_empty() {
                return Err(ConfigError::new(format!(
                    "post-submit phase `{phase_name}` declares a restricted field \
                     (`archive`, `fingerprint`, `stash`, or `worktrees` are not permitted here)"
                )));
            }
        }
    }
    Ok(())
}

fn validate_ci_locks(config: &PipelineConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for lock in &config.ci_locks {
        if !seen.insert((lock.repo_name.as_str(), lock.branch.as_str())) {
            return Err(ConfigError::new(format!(
                "duplicate `ci-locks` entry for repo `{}` branch `{}`",
                lock.repo_name, lock.branch
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopic_types::config::{BumpPolicy, TagPolicy, VersionFormat, VersionPolicy};
    use hopic_types::volume::{CiLock, LockOnChange};
    use indexmap::IndexMap;

    fn minimal_config() -> PipelineConfig {
        PipelineConfig {
            version: VersionPolicy {
                format: VersionFormat::Semver,
                bump: BumpPolicy::Disabled,
                on_every_change: false,
                tag: TagPolicy::Bool(true),
                build: None,
                hotfix_branch: None,
                file: None,
            },
            phases: IndexMap::new(),
            post_submit: IndexMap::new(),
            volumes: IndexMap::new(),
            image: None,
            pass_through_environment_vars: Vec::new(),
            clean: Vec::new(),
            ci_locks: Vec::new(),
            project_name: "example".to_string(),
            modality_source_preparation: IndexMap::new(),
            publish_from_branch: None,
        }
    }

    fn sh_step(timeout: Option<u64>) -> Step {
        let mut step = Step::metadata_only();
        step.sh = Some(vec!["echo".to_string(), "hi".to_string()]);
        step.timeout = timeout;
        step
    }

    #[test]
    fn timeout_sum_strictly_below_global_budget_is_accepted() {
        let mut global = Step::metadata_only();
        global.timeout = Some(100);
        let steps = vec![global, sh_step(Some(40)), sh_step(Some(40))];
        validate_timeouts(&steps).expect("accepted");
    }

    #[test]
    fn timeout_sum_at_or_above_budget_is_rejected() {
        let mut global = Step::metadata_only();
        global.timeout = Some(50);
        let steps = vec![global, sh_step(Some(30)), sh_step(Some(20))];
        let err = validate_timeouts(&steps).expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn metadata_only_timeout_after_sh_step_is_rejected() {
        let mut trailing = Step::metadata_only();
        trailing.timeout = Some(10);
        let steps = vec![sh_step(None), trailing];
        let err = validate_timeouts(&steps).expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn node_label_disagreement_across_phases_is_rejected() {
        let mut config = minimal_config();
        let mut build = IndexMap::new();
        let mut linux_a = Step::metadata_only();
        linux_a.node_label = Some("big-box".to_string());
        build.insert("linux".to_string(), vec![linux_a]);
        config.phases.insert("build".to_string(), build);

        let mut test = IndexMap::new();
        let mut linux_b = Step::metadata_only();
        linux_b.node_label = Some("small-box".to_string());
        test.insert("linux".to_string(), vec![linux_b]);
        config.phases.insert("test".to_string(), test);

        let err = validate(&config).expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn wait_on_full_previous_phase_false_rejected_when_previous_phase_stashes() {
        let mut config = minimal_config();
        let mut build = IndexMap::new();
        let mut build_step = Step::metadata_only();
        build_step.stash = true;
        build.insert("linux".to_string(), vec![build_step]);
        config.phases.insert("build".to_string(), build);

        let mut test = IndexMap::new();
        let mut test_step = Step::metadata_only();
        test_step.wait_on_full_previous_phase = Some(false);
        test.insert("linux".to_string(), vec![test_step]);
        config.phases.insert("test".to_string(), test);

        let err = validate(&config).expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn post_submit_step_with_archive_is_rejected() {
        let mut config = minimal_config();
        let mut step = Step::metadata_only();
        step.sh = Some(vec!["echo".to_string(), "hi".to_string()]);
        step.archive = Some(hopic_types::ArtifactSpec { patterns: vec!["*.bin".to_string()], target: None, allow_missing: false });
        config.post_submit.insert("deploy".to_string(), vec![step]);

        let err = validate(&config).expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn duplicate_ci_lock_is_rejected() {
        let mut config = minimal_config();
        config.ci_locks = vec![
            CiLock { repo_name: "repo".to_string(), branch: "main".to_string(), lock_on_change: LockOnChange::Always, from_phase_onward: None },
            CiLock { repo_name: "repo".to_string(), branch: "main".to_string(), lock_on_change: LockOnChange::OnlyOnChange, from_phase_onward: None },
        ];
        let err = validate(&config).expect_err("must reject");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
