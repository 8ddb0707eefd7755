//! Interpretation of `git describe --tags --long --dirty --always` output.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::semver::SemVer;
use crate::VersionFormat;

fn commit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(.*)-g)?([0-9a-f]+)$").expect("static regex is valid"))
}

fn distance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)-([0-9]+)$").expect("static regex is valid"))
}

fn tag_cleanup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^0-9]+").expect("static regex is valid"))
}

/// The decomposed shape of a `git describe` string:
/// `[<tag>[-<count>]-g<hash>][-dirty]`, tolerating the case where no prior
/// tag exists and only a commit hash is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitVersion {
    pub tag_name: String,
    pub dirty: bool,
    pub commit_count: Option<u64>,
    pub commit_hash: Option<String>,
}

impl GitVersion {
    pub fn exact(&self) -> bool {
        !self.dirty && self.commit_count == Some(0)
    }

    pub fn from_description(description: &str) -> Self {
        let (dirty, description) = match description.strip_suffix("-dirty") {
            Some(rest) => (true, rest),
            None => (false, description),
        };

        let (description, commit_hash) = match commit_re().captures(description) {
            Some(caps) => {
                let hash = caps.get(2).map(|m| m.as_str().to_string());
                let rest = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                (rest, hash)
            }
            None => (description, None),
        };

        let (tag_name, commit_count) = match distance_re().captures(description) {
            Some(caps) => (
                caps[1].to_string(),
                Some(caps[2].parse::<u64>().expect("digits matched by regex")),
            ),
            None => (description.to_string(), None),
        };

        Self {
            tag_name,
            dirty,
            commit_count,
            commit_hash,
        }
    }

    /// Converts to a SemVer: strips a non-digit tag prefix, bumps to the
    /// next patch prerelease if dirty or ahead of the tag and the tag
    /// itself carried no prerelease, appends the commit count and a
    /// dirty-timestamp identifier, and records the abbreviated commit hash
    /// as build metadata.
    pub fn to_semver(&self, dirty_at: Option<DateTime<Utc>>) -> Option<SemVer> {
        let version_part = tag_cleanup_re().replace(&self.tag_name, "");
        let mut version = SemVer::parse(&version_part)?;

        let ahead_or_dirty = self.commit_count.unwrap_or(0) > 0 || self.dirty;
        if ahead_or_dirty && version.prerelease.is_empty() {
            version = version.next_patch();
        }

        if let Some(count) = self.commit_count.filter(|c| *c > 0) {
            version.prerelease.push(count.to_string());
        }

        if self.dirty {
            let stamp = dirty_at.unwrap_or_else(Utc::now);
            if self.commit_count.unwrap_or(0) == 0 {
                // Ensures a dirty commit sorts before the next clean one.
                version.prerelease.push("0".to_string());
            }
            version.prerelease.push("dirty".to_string());
            version.prerelease.push(stamp.format("%Y%m%d%H%M%S").to_string());
        }

        if let Some(hash) = &self.commit_hash {
            version.build.push(format!("g{hash}"));
        }

        Some(version)
    }
}
