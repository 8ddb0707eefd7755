//! Caruso-SemVer: overlaps SemVer in its major.minor.patch-prerelease
//! syntax but is a distinct, incompatible format because of the mandatory
//! `+PI<increment>.<fix>` suffix.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::identifiers;
use crate::{CommitSignal, VersionFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarusoVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<String>,
    pub increment: u64,
    pub fix: u64,
}

impl CarusoVer {
    pub fn new(major: u64, minor: u64, patch: u64, increment: u64, fix: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
            increment,
            fix,
        }
    }

    fn prerelease_separator(&self) -> &'static str {
        if self.prerelease.is_empty() { "" } else { "-" }
    }

    /// Only `next_fix` and `next_prerelease` are defined for this format;
    /// there is no `next_major`/`next_minor`/`next_patch`.
    pub fn next_fix(&self) -> Self {
        if !self.prerelease.is_empty() {
            return Self::new(self.major, self.minor, self.patch, self.increment, self.fix);
        }
        Self::new(self.major, self.minor, self.patch, self.increment, self.fix + 1)
    }

    pub fn next_prerelease(&self, seed: Option<&[String]>) -> Self {
        if self.prerelease.is_empty() {
            let seed = seed
                .map(<[String]>::to_vec)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| vec!["1".to_string()]);
            return Self {
                prerelease: seed,
                fix: self.fix + 1,
                ..self.clone()
            };
        }

        let prerelease = identifiers::increment_least_significant_numeric(&self.prerelease)
            .unwrap_or_else(|| {
                let mut p = self.prerelease.clone();
                p.push("1".to_string());
                p
            });
        Self {
            prerelease,
            ..self.clone()
        }
    }

    pub fn with_prerelease(mut self, prerelease: Vec<String>) -> Self {
        self.prerelease = prerelease;
        self
    }
}

impl std::fmt::Display for CarusoVer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        write!(f, "{}{}", self.prerelease_separator(), self.prerelease.join("."))?;
        write!(f, "+PI{}.{}", self.increment, self.fix)
    }
}

impl PartialOrd for CarusoVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CarusoVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.increment, self.fix)
            .cmp(&(other.major, other.minor, other.patch, other.increment, other.fix))
            .then_with(|| match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (true, true) => Ordering::Equal,
                (false, false) => identifiers::compare(&self.prerelease, &other.prerelease),
            })
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(?:version=)?
            (?P<major>0|[1-9][0-9]*)
            \.(?P<minor>0|[1-9][0-9]*)
            \.(?P<patch>0|[1-9][0-9]*)
            (?:-(?P<prerelease>[-0-9a-zA-Z]+(?:\.[-0-9a-zA-Z]+)*))?
            \+PI(?P<increment>0|[1-9][0-9]*)\.(?P<fix>0|[1-9][0-9]*)
            \s*$
            ",
        )
        .expect("static carver regex is valid")
    })
}

impl VersionFormat for CarusoVer {
    fn version_regex() -> &'static Regex {
        version_regex()
    }

    fn parse(s: &str) -> Option<Self> {
        let caps = version_regex().captures(s)?;
        let prerelease = caps
            .name("prerelease")
            .map(|m| m.as_str().split('.').map(str::to_string).collect())
            .unwrap_or_default();
        Some(Self {
            major: caps["major"].parse().ok()?,
            minor: caps["minor"].parse().ok()?,
            patch: caps["patch"].parse().ok()?,
            prerelease,
            increment: caps["increment"].parse().ok()?,
            fix: caps["fix"].parse().ok()?,
        })
    }

    fn next_version_for_commits<'a>(
        &self,
        _commits: impl IntoIterator<Item = &'a dyn CommitSignal>,
    ) -> anyhow::Result<Self> {
        anyhow::bail!(crate::VersioningFailure(
            "Caruso-SemVer has no commit-driven bump policy; only next-fix and next-prerelease apply".to_string()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mandatory_pi_suffix() {
        let v = CarusoVer::parse("1.2.3+PI4.5").expect("parses");
        assert_eq!((v.increment, v.fix), (4, 5));
    }

    #[test]
    fn rejects_missing_pi_suffix() {
        assert!(CarusoVer::parse("1.2.3").is_none());
    }

    #[test]
    fn next_fix_strips_prerelease_if_present() {
        let v = CarusoVer::new(1, 0, 0, 2, 3).with_prerelease(vec!["rc".into()]);
        assert_eq!(v.next_fix(), CarusoVer::new(1, 0, 0, 2, 3));
    }

    #[test]
    fn next_fix_increments_when_no_prerelease() {
        assert_eq!(CarusoVer::new(1, 0, 0, 2, 3).next_fix(), CarusoVer::new(1, 0, 0, 2, 4));
    }

    #[test]
    fn ordering_includes_increment_and_fix_before_prerelease() {
        let a = CarusoVer::new(1, 0, 0, 1, 0);
        let b = CarusoVer::new(1, 0, 0, 2, 0);
        assert!(a < b);
    }

    #[test]
    fn next_version_for_commits_is_unsupported() {
        let v = CarusoVer::new(1, 0, 0, 1, 0);
        let commits: Vec<&dyn CommitSignal> = Vec::new();
        assert!(v.next_version_for_commits(commits).is_err());
    }
}
