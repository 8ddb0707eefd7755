//! The version-bump state machine: Guarded → Eligible →
//! Hotfix-rebased → Bumped → Persisted, plus the separate PostSubmitBump
//! branch. Driven by the change preparer after a sub-mode produces a commit
//! message/parent set.

use anyhow::{Context, Result};
use camino::Utf8Path;
use hopic_types::config::{BumpPolicy, VersionPolicy};
use hopic_version::{CommitSignal, VersionFormat};

use crate::classifier::CommitClassifier;
use crate::errors::HopicError;

/// Format-specific hook for the Hotfix-rebased/Bumped states' forced
/// prerelease seeding (`next_prerelease(seed=("hotfix", *hotfix_id))`).
/// `hopic_version::VersionFormat` itself doesn't carry this operation since
/// it only makes sense for formats with a prerelease component, which both
/// shipped formats happen to have.
pub trait Hotfixable: VersionFormat {
    fn next_prerelease_seeded(&self, seed: &[String]) -> Self;
}

impl Hotfixable for hopic_version::SemVer {
    fn next_prerelease_seeded(&self, seed: &[String]) -> Self {
        self.next_prerelease(Some(seed))
    }
}

impl Hotfixable for hopic_version::CarusoVer {
    fn next_prerelease_seeded(&self, seed: &[String]) -> Self {
        self.next_prerelease(Some(seed))
    }
}

/// Whether `target_ref` is allowed to publish, per `publish-from-branch`.
/// `None` means every ref is allowed.
pub fn is_publish_allowed(target_ref: &str, publish_from_branch: Option<&str>) -> bool {
    match publish_from_branch {
        None => true,
        Some(branch) => target_ref == branch || target_ref.ends_with(&format!("/{branch}")),
    }
}

/// **Guarded**: rejects commits that violate the `reject-breaking-changes-on`
/// / `reject-new-features-on` policy, or a hotfix with `on-every-change`
/// that contains no fix commit.
pub fn guard(
    commits: &[&dyn CommitClassifier],
    policy: &BumpPolicy,
    target_ref: &str,
    hotfix_active: bool,
    on_every_change: bool,
) -> Result<()> {
    let BumpPolicy::ConventionalCommits { reject_breaking_changes_on, reject_new_features_on, .. } = policy else {
        return Ok(());
    };

    let reject_breaking = hotfix_active
        || reject_breaking_changes_on
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .context("parsing reject-breaking-changes-on")?
            .is_some_and(|re| re.is_match(target_ref));
    let reject_features = hotfix_active
        || reject_new_features_on
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .context("parsing reject-new-features-on")?
            .is_some_and(|re| re.is_match(target_ref));

    if reject_breaking && commits.iter().any(|c| c.has_breaking_change()) {
        return Err(HopicError::Versioning {
            message: format!("Breaking changes are not allowed on ref '{target_ref}'"),
        }
        .into());
    }
    if reject_features && commits.iter().any(|c| c.has_new_feature()) {
        return Err(HopicError::Versioning {
            message: format!("New features are not allowed on ref '{target_ref}'"),
        }
        .into());
    }
    if hotfix_active && on_every_change && !commits.iter().any(|c| c.has_fix()) {
        return Err(HopicError::Versioning {
            message: "a hotfix with on-every-change requires at least one fix commit".to_string(),
        }
        .into());
    }
    Ok(())
}

/// **Eligible**: whether the state machine should even attempt a bump.
pub fn is_eligible(policy: &BumpPolicy, version_policy: &VersionPolicy, target_ref: &str) -> bool {
    !matches!(policy, BumpPolicy::Disabled)
        && version_policy.on_every_change
        && is_publish_allowed(target_ref, version_policy.hotfix_branch.as_deref())
}

/// **Hotfix-rebased**: re-derives the base version from `git describe` when
/// the version isn't tracked in a file, and validates it's a legitimate
/// hotfix base (a full release, or already on this hotfix's prerelease
/// track).
pub fn hotfix_rebase<V: VersionFormat>(tree: &Utf8Path, hotfix_id: &[String], current: &V) -> Result<V> {
    let described = hopic_git::describe(tree).context("re-deriving base version for hotfix rebase")?;
    let base: V = described
        .to_semver(None)
        .and_then(|semver| V::parse(&semver.to_string()))
        .unwrap_or_else(|| current.clone());

    let hotfix_label = format!("hotfix.{}", hotfix_id.join("."));
    let rendered = base.to_string();
    let is_full_release = !rendered.contains('-');
    let is_same_hotfix_track = rendered.contains(&format!("-{hotfix_label}"));
    if !is_full_release && !is_same_hotfix_track {
        return Err(HopicError::Versioning {
            message: format!("'{rendered}' is not a valid base for hotfix '{}': not a release and not already on this hotfix's track", hotfix_id.join(".")),
        }
        .into());
    }
    let release_portion = rendered.split('-').next().unwrap_or(&rendered);
    if hotfix_id.iter().any(|id| release_portion.contains(id.as_str())) {
        return Err(HopicError::Versioning {
            message: format!("hotfix id '{}' textually contains the base version's release portion '{release_portion}'", hotfix_id.join(".")),
        }
        .into());
    }
    Ok(base)
}

/// **Bumped**: computes the next version from the bump policy and the
/// classified commit set, forcing a hotfix-seeded prerelease when active.
/// The result is checked to be `>=` the current version.
pub fn bump<V: Hotfixable + ConstantBump>(
    current: &V,
    commits: &[&dyn CommitClassifier],
    policy: &BumpPolicy,
    hotfix_id: &[String],
) -> Result<V> {
    let signals: Vec<&dyn CommitSignal> = commits.iter().map(|c| *c as &dyn CommitSignal).collect();

    let mut next = match policy {
        BumpPolicy::Disabled => current.clone(),
        BumpPolicy::Constant { field } => match field.as_deref() {
            Some("major") => current.next_major_for(),
            Some("minor") | None => current.next_minor_for(),
            Some("patch") => current.next_patch_for(),
            Some(other) => {
                return Err(HopicError::Versioning { message: format!("unknown constant bump field '{other}'") }.into());
            }
        },
        BumpPolicy::ConventionalCommits { .. } => current.next_version_for_commits(signals)?,
    };

    if !hotfix_id.is_empty() {
        let mut seed = vec!["hotfix".to_string()];
        seed.extend(hotfix_id.iter().cloned());
        next = current.next_prerelease_seeded(&seed);
    }

    if next < *current {
        return Err(HopicError::Versioning {
            message: format!("computed next version '{next}' is not >= current version '{current}'"),
        }
        .into());
    }
    Ok(next)
}

/// A small adapter over the three fixed bump directions so [`bump`] can stay
/// generic over `constant` fields without widening [`VersionFormat`] itself.
trait ConstantBump: VersionFormat {
    fn next_major_for(&self) -> Self;
    fn next_minor_for(&self) -> Self;
    fn next_patch_for(&self) -> Self;
}

impl ConstantBump for hopic_version::SemVer {
    fn next_major_for(&self) -> Self {
        self.next_major()
    }
    fn next_minor_for(&self) -> Self {
        self.next_minor()
    }
    fn next_patch_for(&self) -> Self {
        self.next_patch()
    }
}

impl ConstantBump for hopic_version::CarusoVer {
    fn next_major_for(&self) -> Self {
        self.next_fix()
    }
    fn next_minor_for(&self) -> Self {
        self.next_fix()
    }
    fn next_patch_for(&self) -> Self {
        self.next_fix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ConventionalClassifier;
    use hopic_types::config::BumpPolicy;
    use hopic_version::SemVer;

    fn commits(messages: &[&str]) -> Vec<ConventionalClassifier> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| ConventionalClassifier::parse(format!("sha{i}"), m, false).unwrap())
            .collect()
    }

    #[test]
    fn feat_commit_bumps_minor() {
        let current = SemVer::new(0, 0, 0);
        let parsed = commits(&["feat: add something useful"]);
        let refs: Vec<&dyn CommitClassifier> = parsed.iter().map(|c| c as &dyn CommitClassifier).collect();
        let policy = BumpPolicy::ConventionalCommits { strict: false, reject_breaking_changes_on: None, reject_new_features_on: None };
        let next = bump(&current, &refs, &policy, &[]).expect("bumps");
        assert_eq!(next.to_string(), "0.1.0");
    }

    #[test]
    fn refactor_commit_does_not_bump() {
        let current = SemVer::new(0, 0, 0);
        let parsed = commits(&["refactor: clean up"]);
        let refs: Vec<&dyn CommitClassifier> = parsed.iter().map(|c| c as &dyn CommitClassifier).collect();
        let policy = BumpPolicy::ConventionalCommits { strict: false, reject_breaking_changes_on: None, reject_new_features_on: None };
        let next = bump(&current, &refs, &policy, &[]).expect("computes");
        assert_eq!(next, current);
    }

    #[test]
    fn breaking_change_rejected_on_release_branch() {
        let parsed = commits(&["refactor!: break API"]);
        let refs: Vec<&dyn CommitClassifier> = parsed.iter().map(|c| c as &dyn CommitClassifier).collect();
        let policy = BumpPolicy::ConventionalCommits {
            strict: false,
            reject_breaking_changes_on: Some(r"^release/.*".to_string()),
            reject_new_features_on: None,
        };
        let err = guard(&refs, &policy, "release/42", false, false).expect_err("must reject");
        let hopic_err = err.downcast_ref::<HopicError>().expect("HopicError");
        assert_eq!(hopic_err.exit_code(), 33);
        assert!(hopic_err.to_string().contains("Breaking changes are not allowed"));
    }

    #[test]
    fn publish_from_branch_gates_eligibility() {
        assert!(is_publish_allowed("main", None));
        assert!(is_publish_allowed("refs/heads/main", Some("main")));
        assert!(!is_publish_allowed("refs/heads/feature", Some("main")));
    }
}
