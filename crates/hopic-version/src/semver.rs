//! Semantic Versioning 2.0.0 (<https://semver.org/spec/v2.0.0.html>),
//! including an incrementing strategy for the prerelease field that the
//! spec leaves unstated: each increment moves strictly forward, and that
//! relationship is transitive across repeated increments.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::identifiers;
use crate::{CommitSignal, VersionFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<String>,
    pub build: Vec<String>,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
            build: Vec::new(),
        }
    }

    fn prerelease_separator(&self) -> &'static str {
        if self.prerelease.is_empty() { "" } else { "-" }
    }

    fn build_separator(&self) -> &'static str {
        if self.build.is_empty() { "" } else { "+" }
    }

    pub fn next_major(&self) -> Self {
        if !self.prerelease.is_empty() && self.minor == 0 && self.patch == 0 {
            return Self::new(self.major, self.minor, self.patch);
        }
        Self::new(self.major + 1, 0, 0)
    }

    pub fn next_minor(&self) -> Self {
        if !self.prerelease.is_empty() && self.patch == 0 {
            return Self::new(self.major, self.minor, self.patch);
        }
        Self::new(self.major, self.minor + 1, 0)
    }

    pub fn next_patch(&self) -> Self {
        if !self.prerelease.is_empty() {
            return Self::new(self.major, self.minor, self.patch);
        }
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Seeds a fresh prerelease (bumping patch) if none is present;
    /// otherwise increments its least-significant numeric identifier, or
    /// appends `"1"` if none is numeric.
    pub fn next_prerelease(&self, seed: Option<&[String]>) -> Self {
        if self.prerelease.is_empty() {
            let seed = seed
                .map(<[String]>::to_vec)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| vec!["1".to_string()]);
            return Self {
                major: self.major,
                minor: self.minor,
                patch: self.patch + 1,
                prerelease: seed,
                build: Vec::new(),
            };
        }

        let prerelease = identifiers::increment_least_significant_numeric(&self.prerelease)
            .unwrap_or_else(|| {
                let mut p = self.prerelease.clone();
                p.push("1".to_string());
                p
            });
        Self {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            prerelease,
            build: Vec::new(),
        }
    }

    pub fn with_prerelease(mut self, prerelease: Vec<String>) -> Self {
        self.prerelease = prerelease;
        self
    }

    pub fn with_build(mut self, build: Vec<String>) -> Self {
        self.build = build;
        self
    }
}

impl std::fmt::Display for SemVer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        write!(f, "{}{}", self.prerelease_separator(), self.prerelease.join("."))?;
        write!(f, "{}{}", self.build_separator(), self.build.join("."))
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
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
            (?:\+(?P<build>[-0-9a-zA-Z]+(?:\.[-0-9a-zA-Z]+)*))?
            \s*$
            ",
        )
        .expect("static semver regex is valid")
    })
}

impl VersionFormat for SemVer {
    fn version_regex() -> &'static Regex {
        version_regex()
    }

    fn parse(s: &str) -> Option<Self> {
        let caps = version_regex().captures(s)?;
        let split = |name: &str| -> Vec<String> {
            caps.name(name)
                .map(|m| m.as_str().split('.').map(str::to_string).collect())
                .unwrap_or_default()
        };
        Some(Self {
            major: caps["major"].parse().ok()?,
            minor: caps["minor"].parse().ok()?,
            patch: caps["patch"].parse().ok()?,
            prerelease: split("prerelease"),
            build: split("build"),
        })
    }

    fn next_version_for_commits<'a>(
        &self,
        commits: impl IntoIterator<Item = &'a dyn CommitSignal>,
    ) -> anyhow::Result<Self> {
        let mut has_new_feature = false;
        let mut has_fix = false;
        for commit in commits {
            if commit.has_breaking_change() {
                return Ok(self.next_major());
            }
            has_new_feature |= commit.has_new_feature();
            has_fix |= commit.has_fix();
        }
        Ok(if has_new_feature {
            self.next_minor()
        } else if has_fix {
            self.next_patch()
        } else {
            self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_version() {
        let v = SemVer::parse("1.2.3").expect("parses");
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert!(v.prerelease.is_empty());
    }

    #[test]
    fn parses_prerelease_and_build() {
        let v = SemVer::parse("1.2.3-rc.1+build.5").expect("parses");
        assert_eq!(v.prerelease, vec!["rc", "1"]);
        assert_eq!(v.build, vec!["build", "5"]);
    }

    #[test]
    fn parses_with_version_equals_prefix() {
        assert_eq!(SemVer::parse("version=1.0.0"), SemVer::parse("1.0.0"));
    }

    #[test]
    fn rejects_leading_zero_in_major() {
        assert!(SemVer::parse("01.0.0").is_none());
    }

    #[test]
    fn next_major_on_zero_prerelease_strips_instead_of_increments() {
        let v = SemVer::new(1, 0, 0).with_prerelease(vec!["rc".into(), "1".into()]);
        assert_eq!(v.next_major(), SemVer::new(1, 0, 0));
    }

    #[test]
    fn next_major_on_release_increments() {
        assert_eq!(SemVer::new(1, 2, 3).next_major(), SemVer::new(2, 0, 0));
    }

    #[test]
    fn next_prerelease_seeds_when_absent() {
        let v = SemVer::new(1, 2, 3);
        assert_eq!(v.next_prerelease(None), SemVer::new(1, 2, 4).with_prerelease(vec!["1".into()]));
    }

    #[test]
    fn next_prerelease_increments_rightmost_numeric_identifier() {
        let v = SemVer::new(1, 2, 3).with_prerelease(vec!["rc".into(), "1".into()]);
        assert_eq!(
            v.next_prerelease(None),
            SemVer::new(1, 2, 3).with_prerelease(vec!["rc".into(), "2".into()])
        );
    }

    #[test]
    fn ordering_treats_prerelease_as_lower_precedence() {
        let release = SemVer::new(1, 0, 0);
        let prerelease = SemVer::new(1, 0, 0).with_prerelease(vec!["alpha".into()]);
        assert!(prerelease < release);
    }

    #[test]
    fn ordering_ignores_build_metadata() {
        let a = SemVer::new(1, 0, 0).with_build(vec!["a".into()]);
        let b = SemVer::new(1, 0, 0).with_build(vec!["b".into()]);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_ne!(a, b);
    }

    #[test]
    fn repeated_prerelease_increments_stay_strictly_increasing() {
        let a = SemVer::new(1, 0, 0);
        let b = a.next_prerelease(None);
        let c = b.next_prerelease(None);
        let d = a.next_patch();
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn releases() -> impl Strategy<Value = SemVer> {
        (0u64..1000, 0u64..1000, 0u64..1000).prop_map(|(major, minor, patch)| SemVer::new(major, minor, patch))
    }

    proptest! {
        /// `str(Version.parse(str(v))) == str(v)` for every parseable version.
        #[test]
        fn round_trips_through_display_and_parse(v in releases()) {
            let rendered = v.to_string();
            let parsed = SemVer::parse(&rendered).expect("renders back to a parseable version");
            prop_assert_eq!(parsed.to_string(), rendered);
        }

        /// `v.next_major() > v.next_minor() > v.next_patch() > v`.
        #[test]
        fn next_field_ordering_holds_for_releases(v in releases()) {
            prop_assert!(v.next_major() > v.next_minor());
            prop_assert!(v.next_minor() > v.next_patch());
            prop_assert!(v.next_patch() > v);
        }

        /// `v.next_prerelease()` is always `>= v`.
        #[test]
        fn next_prerelease_never_goes_backwards(v in releases()) {
            prop_assert!(v.next_prerelease(None) >= v);
        }
    }
}
