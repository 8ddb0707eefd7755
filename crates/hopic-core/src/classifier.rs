//! Commit-message classification.
//!
//! The version engine is consumed, not implemented, against anything that
//! exposes [`hopic_version::CommitSignal`]. [`CommitClassifier`] extends that
//! contract with the bits the change preparer and phase runner need:
//! autosquash detection, footer access, and the raw subject for error
//! messages. [`ConventionalClassifier`] is the default implementation,
//! ported from the project's own `verify-commit-message.py` linter — but
//! only the classification rules that matter to version bumping, not that
//! script's cosmetic lint checks (title case, Jira tickets, line length, ...).

use regex::Regex;
use std::sync::OnceLock;

use hopic_version::CommitSignal;

/// A commit recognized by a breaking/feat/fix classification policy, plus
/// the autosquash and raw-text accessors the preparer needs.
pub trait CommitClassifier: CommitSignal {
    /// Whether this commit is `fixup!`/`squash!`-marked and would be folded
    /// away by an autosquash pass rather than contributing its own bump.
    fn needs_autosquash(&self) -> bool;
    /// The subject line, with any `fixup!`/`squash!` prefix still attached.
    fn subject(&self) -> &str;
    /// The full, unwrapped subject line as it appeared in the raw message
    /// (used for error messages pointing back at the offending commit).
    fn full_subject(&self) -> &str;
    /// Body paragraphs after the subject, footer-shaped lines included.
    fn footers(&self) -> &[String];
    fn hexsha(&self) -> &str;
}

/// Tags Conventional Commits requires or whitelists for non-bumping commits
/// (`verify-commit-message.py`'s `accepted_tags`, plus `feat`/`fix`).
const ACCEPTED_TAGS: &[&str] = &[
    "build", "chore", "ci", "docs", "perf", "refactor", "revert", "style", "test", "improvement",
];

fn subject_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?x)^(?P<type_tag>\w+)(?:\((?P<scope>[^()]*)\))?(?P<breaking>!)?:\s(?P<description>.*)$")
            .expect("subject_re is a valid, tested regex")
    })
}

fn breaking_change_footer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^BREAKING(\s+)CHANGE\b(\s*)(:?)(\s*)(\S?)").expect("valid regex"))
}

/// The default [`CommitClassifier`], implementing the Conventional Commits
/// subset needed here: type-tag detection, the `!` breaking marker, and a
/// `BREAKING CHANGE:` footer at the start of a paragraph.
#[derive(Debug, Clone)]
pub struct ConventionalClassifier {
    hexsha: String,
    full_subject: String,
    subject: String,
    footers: Vec<String>,
    type_tag: Option<String>,
    breaking_bang: bool,
    breaking_footer: bool,
}

impl ConventionalClassifier {
    /// Parses `message` (a full, possibly multi-line commit message) for
    /// `hexsha`. In `strict` mode, a subject that doesn't match the
    /// Conventional Commits grammar at all is rejected rather than silently
    /// classified as "no signal".
    pub fn parse(hexsha: impl Into<String>, message: &str, strict: bool) -> anyhow::Result<Self> {
        let mut lines = message.lines();
        let full_subject = lines.next().unwrap_or_default().to_string();
        let subject = full_subject
            .strip_prefix("fixup! ")
            .or_else(|| full_subject.strip_prefix("squash! "))
            .unwrap_or(&full_subject)
            .to_string();

        let captures = subject_re().captures(&subject);
        if captures.is_none() && strict {
            anyhow::bail!(
                "commit message's subject not formatted according to Conventional Commits: {full_subject:?}"
            );
        }

        let type_tag = captures.as_ref().and_then(|c| c.name("type_tag")).map(|m| m.as_str().to_string());
        let breaking_bang = captures
            .as_ref()
            .and_then(|c| c.name("breaking"))
            .is_some_and(|m| !m.as_str().trim().is_empty());

        let body: Vec<String> = lines.map(str::to_string).collect();
        let footers = body.iter().filter(|l| !l.trim().is_empty()).cloned().collect::<Vec<_>>();
        let breaking_footer = body
            .split(|l| l.trim().is_empty())
            .any(|paragraph| paragraph.first().is_some_and(|first| breaking_change_footer_re().is_match(first)));

        Ok(Self {
            hexsha: hexsha.into(),
            full_subject,
            subject,
            footers,
            type_tag,
            breaking_bang,
            breaking_footer,
        })
    }
}

impl CommitSignal for ConventionalClassifier {
    fn has_breaking_change(&self) -> bool {
        self.breaking_bang || self.breaking_footer
    }

    fn has_new_feature(&self) -> bool {
        self.type_tag.as_deref() == Some("feat")
    }

    fn has_fix(&self) -> bool {
        self.type_tag.as_deref() == Some("fix")
    }
}

impl CommitClassifier for ConventionalClassifier {
    fn needs_autosquash(&self) -> bool {
        self.full_subject.starts_with("fixup! ") || self.full_subject.starts_with("squash! ")
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn full_subject(&self) -> &str {
        &self.full_subject
    }

    fn footers(&self) -> &[String] {
        &self.footers
    }

    fn hexsha(&self) -> &str {
        &self.hexsha
    }
}

/// `ACCEPTED_TAGS` plus `feat`/`fix`, for callers that want to validate a
/// type tag outside of full message parsing (e.g. config-driven policy
/// checks).
pub fn is_known_type_tag(tag: &str) -> bool {
    tag == "feat" || tag == "fix" || ACCEPTED_TAGS.contains(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feat_sets_new_feature() {
        let c = ConventionalClassifier::parse("abc123", "feat: add widget", false).unwrap();
        assert!(c.has_new_feature());
        assert!(!c.has_fix());
        assert!(!c.has_breaking_change());
    }

    #[test]
    fn fix_sets_fix() {
        let c = ConventionalClassifier::parse("abc123", "fix: correct off-by-one", false).unwrap();
        assert!(c.has_fix());
        assert!(!c.has_new_feature());
    }

    #[test]
    fn refactor_sets_neither() {
        let c = ConventionalClassifier::parse("abc123", "refactor: simplify loader", false).unwrap();
        assert!(!c.has_new_feature());
        assert!(!c.has_fix());
        assert!(!c.has_breaking_change());
    }

    #[test]
    fn bang_marks_breaking_change() {
        let c = ConventionalClassifier::parse("abc123", "feat!: drop legacy flag", false).unwrap();
        assert!(c.has_breaking_change());
    }

    #[test]
    fn breaking_change_footer_marks_breaking_change() {
        let msg = "fix: change default timeout\n\nBREAKING CHANGE: the default timeout is now 30s";
        let c = ConventionalClassifier::parse("abc123", msg, false).unwrap();
        assert!(c.has_breaking_change());
    }

    #[test]
    fn mid_paragraph_breaking_change_text_does_not_count() {
        let msg = "fix: change default timeout\n\nSee also BREAKING CHANGE notes elsewhere";
        let c = ConventionalClassifier::parse("abc123", msg, false).unwrap();
        assert!(!c.has_breaking_change());
    }

    #[test]
    fn fixup_prefix_needs_autosquash_and_classifies_underlying_subject() {
        let c = ConventionalClassifier::parse("abc123", "fixup! feat: add widget", false).unwrap();
        assert!(c.needs_autosquash());
        assert!(c.has_new_feature());
        assert_eq!(c.subject(), "feat: add widget");
    }

    #[test]
    fn strict_mode_rejects_non_conventional_subject() {
        let err = ConventionalClassifier::parse("abc123", "did some stuff", true).unwrap_err();
        assert!(err.to_string().contains("Conventional Commits"));
    }

    #[test]
    fn non_strict_mode_accepts_non_conventional_subject_with_no_signal() {
        let c = ConventionalClassifier::parse("abc123", "did some stuff", false).unwrap();
        assert!(!c.has_new_feature());
        assert!(!c.has_fix());
        assert!(!c.has_breaking_change());
    }

    #[test]
    fn known_type_tags_include_feat_fix_and_whitelist() {
        assert!(is_known_type_tag("feat"));
        assert!(is_known_type_tag("fix"));
        assert!(is_known_type_tag("chore"));
        assert!(!is_known_type_tag("bogus"));
    }
}
