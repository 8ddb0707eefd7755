//! `build`: resolves the default container image, current
//! version vars, and change context, then drives `hopic_core::VariantRunner`
//! over the selected phases/variants in declaration order.

use anyhow::{Context, Result};
use camino::Utf8Path;
use hopic_core::{ChangeContext, ForeachRanges, StepOutcome, VariantRunner, VersionVars};
use hopic_process::SignalGuard;
use hopic_types::config::{ImageSource, VersionFormat as CfgVersionFormat};
use hopic_version::{CarusoVer, SemVer, VersionFormat};

use crate::credentials::EnvCredentialResolver;
use crate::vars;
use crate::workspace::LoadedConfig;

pub struct BuildArgs {
    pub phases: Vec<String>,
    pub variants: Vec<String>,
    pub dry_run: bool,
    pub publishable_version: bool,
}

pub fn run(loaded: &LoadedConfig, args: &BuildArgs) -> Result<Vec<StepOutcome>> {
    let selected_phases = select_phases(loaded, &args.phases)?;

    if args.dry_run {
        print_plan(&selected_phases);
        return Ok(Vec::new());
    }

    let head = hopic_git::git(&loaded.workspace, &["rev-parse", "HEAD"])?;
    let meta = hopic_core::read_percommit(&loaded.workspace, &head)?;

    let target_ref = meta.as_ref().map(|m| m.ref_.clone()).unwrap_or_default();
    let change = ChangeContext {
        has_change: meta.is_some(),
        publish_allowed: hopic_core::is_publish_allowed(&target_ref, loaded.config.publish_from_branch.as_deref()),
        version_bumped: meta.as_ref().is_some_and(|m| m.version_bumped),
    };
    let foreach_ranges = ForeachRanges {
        source_commit: meta.as_ref().and_then(|m| m.source_commit.clone()),
        autosquashed_commit: meta.as_ref().and_then(|m| m.autosquashed_commit.clone()),
    };

    let version_vars = compute_version_vars(&loaded.workspace, &loaded.config, args.publishable_version)?;
    let default_image = resolve_default_image(loaded)?;
    let (uid, gid) = vars::current_uid_gid();
    let credentials = EnvCredentialResolver::new();
    let normalizer = hopic_core::NullNormalizer;
    let source_date_epoch = resolve_source_date_epoch(&loaded.workspace)?;

    let signals = SignalGuard::install().context("installing signal handlers")?;

    let runner = VariantRunner {
        tree: &loaded.workspace,
        config: &loaded.config,
        change,
        version_vars,
        credentials: &credentials,
        normalizer: &normalizer,
        source_date_epoch,
        uid,
        gid,
        default_image,
        foreach_ranges,
        signals: Some(&signals),
    };

    let mut outcomes = Vec::new();
    for (phase_name, variants) in &selected_phases {
        for (variant_name, steps) in variants.iter() {
            let description = format!("{phase_name}/{variant_name}");
            outcomes.extend(runner.run(&description, steps)?);
            if let Some(signum) = signals.caught() {
                std::process::exit(128 + signum);
            }
        }
    }

    Ok(outcomes)
}

type SelectedPhases<'a> = Vec<(&'a str, Vec<(&'a str, &'a [hopic_types::Step])>)>;

fn select_phases<'a>(loaded: &'a LoadedConfig, requested: &[String]) -> Result<SelectedPhases<'a>> {
    if !requested.is_empty() {
        let unknown: Vec<String> =
            requested.iter().filter(|p| !loaded.config.phases.contains_key(p.as_str())).cloned().collect();
        if !unknown.is_empty() {
            return Err(hopic_core::HopicError::unknown_phase(unknown));
        }
    }

    let mut selected = Vec::new();
    for (phase_name, variants) in &loaded.config.phases {
        if !requested.is_empty() && !requested.iter().any(|p| p == phase_name) {
            continue;
        }
        let variants: Vec<(&str, &[hopic_types::Step])> =
            variants.iter().map(|(name, steps)| (name.as_str(), steps.as_slice())).collect();
        selected.push((phase_name.as_str(), variants));
    }
    Ok(selected)
}

fn print_plan(selected: &SelectedPhases<'_>) {
    for (phase_name, variants) in selected {
        for (variant_name, steps) in variants {
            for step in steps.iter() {
                if !step.is_shell() {
                    continue;
                }
                let description = step.description.clone().unwrap_or_else(|| {
                    step.sh.as_ref().map(|argv| argv.join(" ")).unwrap_or_default()
                });
                println!("{phase_name}/{variant_name}: {description}");
            }
        }
    }
}

fn resolve_default_image(loaded: &LoadedConfig) -> Result<Option<String>> {
    let Some(image) = &loaded.config.image else { return Ok(None) };
    match image {
        ImageSource::Literal(tag) => Ok(Some(tag.clone())),
        ImageSource::IvyManifest { ivy_manifest } => {
            let cfg_dir = loaded.config_path.parent().unwrap_or(Utf8Path::new("."));
            hopic_config::resolve_ivy_image(ivy_manifest, cfg_dir).map(Some)
        }
    }
}

/// `SOURCE_DATE_EPOCH` if the host set it (it's meant to be authoritative
/// when present); otherwise HEAD's author timestamp, the common
/// reproducible-build fallback.
pub(crate) fn resolve_source_date_epoch(workspace: &Utf8Path) -> Result<i64> {
    if let Ok(value) = std::env::var("SOURCE_DATE_EPOCH") {
        return value.parse().context("parsing SOURCE_DATE_EPOCH");
    }
    let epoch = hopic_git::git(workspace, &["log", "-1", "--format=%ct", "HEAD"])?;
    epoch.trim().parse().context("parsing HEAD's commit timestamp")
}

/// Renders `VERSION`/`PURE_VERSION`/`DEBVERSION`/`PUBLISH_VERSION`. The version string
/// itself comes from the configured version file when present, else (for
/// SemVer only — Caruso-SemVer has no `git describe` interpretation) from
/// `git describe`.
fn compute_version_vars(workspace: &Utf8Path, config: &hopic_types::PipelineConfig, publishable: bool) -> Result<VersionVars> {
    let rendered = match (&config.version.file, config.version.format) {
        (Some(file), CfgVersionFormat::Semver) => {
            hopic_version::read_version::<SemVer>(&workspace.join(&file.path))?.map(|v| v.to_string())
        }
        (Some(file), CfgVersionFormat::Carver) => {
            hopic_version::read_version::<CarusoVer>(&workspace.join(&file.path))?.map(|v| v.to_string())
        }
        (None, CfgVersionFormat::Semver) => {
            hopic_git::describe(workspace).ok().and_then(|gv| gv.to_semver(None)).map(|v| v.to_string())
        }
        (None, CfgVersionFormat::Carver) => None,
    };

    let Some(rendered) = rendered else { return Ok(VersionVars::default()) };

    let (pure, suffix) = split_pure(&rendered);
    let build = suffix.iter().find(|s| s.starts_with('+')).cloned().unwrap_or_default();

    let publish_version = if publishable {
        format!("{pure}{build}")
    } else {
        let short_hash = hopic_git::git(workspace, &["rev-parse", "--short", "HEAD"]).unwrap_or_default();
        format!("{pure}-{short_hash}{build}")
    };

    Ok(VersionVars {
        version: Some(rendered.clone()),
        pure_version: Some(pure.clone()),
        deb_version: Some(rendered.replace('+', "~")),
        publish_version: Some(publish_version),
    })
}

/// Splits a rendered version into its bare `major.minor.patch` prefix and
/// the remaining prerelease/build suffix pieces (each still carrying its
/// `-`/`+` separator).
fn split_pure(rendered: &str) -> (String, Vec<String>) {
    let dash = rendered.find('-');
    let plus = rendered.find('+');
    let cut = [dash, plus].into_iter().flatten().min();
    match cut {
        None => (rendered.to_string(), Vec::new()),
        Some(idx) => {
            let pure = rendered[..idx].to_string();
            let suffix = rendered[idx..].to_string();
            let parts = suffix
                .match_indices(['-', '+'])
                .map(|(i, _)| i)
                .chain(std::iter::once(suffix.len()))
                .collect::<Vec<_>>()
                .windows(2)
                .map(|w| suffix[w[0]..w[1]].to_string())
                .collect();
            (pure, parts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_pure_separates_prerelease_and_build() {
        let (pure, suffix) = split_pure("1.2.3-4+gabc1234");
        assert_eq!(pure, "1.2.3");
        assert_eq!(suffix, vec!["-4".to_string(), "+gabc1234".to_string()]);
    }

    #[test]
    fn split_pure_handles_bare_version() {
        let (pure, suffix) = split_pure("1.2.3");
        assert_eq!(pure, "1.2.3");
        assert!(suffix.is_empty());
    }
}
