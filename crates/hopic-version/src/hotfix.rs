//! Hotfix-identifier extraction from a branch name.

use std::sync::OnceLock;

use regex::Regex;

use crate::VersioningFailure;

const REJECTED_PREFIXES: &[&str] = &[
    "a", "b", "c", "rc", "alpha", "beta", "pre", "preview", "post", "rev", "r", "dev",
];

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z](?:[-.a-zA-Z0-9]*[a-zA-Z0-9])?$").expect("static regex is valid")
    })
}

fn trailing_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+$").expect("static regex is valid"))
}

/// Extracts the hotfix identifier captured by `pattern`'s `id` group (or
/// its sole capture group) from `branch_name`, split on `.`/`-`.
/// Returns an empty vector when there is no branch name or no match, since
/// "not a hotfix branch" is not itself an error.
pub fn hotfix_id(pattern: &Regex, branch_name: Option<&str>) -> anyhow::Result<Vec<String>> {
    let Some(branch_name) = branch_name else {
        return Ok(Vec::new());
    };

    let Some(caps) = pattern.captures(branch_name) else {
        return Ok(Vec::new());
    };

    let hotfix = caps
        .name("id")
        .or_else(|| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(branch_name);

    if !identifier_re().is_match(hotfix) {
        anyhow::bail!(VersioningFailure(format!(
            "Hotfix ID '{hotfix}' is not a valid identifier"
        )));
    }

    let prefix = hotfix.split(['-', '.']).next().unwrap_or(hotfix);
    let stripped_prefix = trailing_digits_re().replace(prefix, "");
    if REJECTED_PREFIXES.contains(&stripped_prefix.as_ref()) {
        anyhow::bail!(VersioningFailure(format!(
            "Hotfix ID '{hotfix}' starts with reserved prefix {prefix}"
        )));
    }

    Ok(hotfix.split('.').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_named_capture_group() {
        let pattern = Regex::new(r"^hotfix/(?P<id>[^/]+)$").unwrap();
        let id = hotfix_id(&pattern, Some("hotfix/acme-42")).expect("extracts");
        assert_eq!(id, vec!["acme-42"]);
    }

    #[test]
    fn falls_back_to_sole_unnamed_group() {
        let pattern = Regex::new(r"^hotfix/([^/]+)$").unwrap();
        let id = hotfix_id(&pattern, Some("hotfix/acme-42")).expect("extracts");
        assert_eq!(id, vec!["acme-42"]);
    }

    #[test]
    fn rejects_reserved_prerelease_prefix() {
        let pattern = Regex::new(r"^hotfix/(?P<id>[^/]+)$").unwrap();
        assert!(hotfix_id(&pattern, Some("hotfix/rc1")).is_err());
    }

    #[test]
    fn no_match_is_not_an_error() {
        let pattern = Regex::new(r"^hotfix/(?P<id>[^/]+)$").unwrap();
        assert_eq!(hotfix_id(&pattern, Some("main")).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn no_branch_name_is_not_an_error() {
        let pattern = Regex::new(r"^hotfix/(?P<id>[^/]+)$").unwrap();
        assert_eq!(hotfix_id(&pattern, None).unwrap(), Vec::<String>::new());
    }
}
