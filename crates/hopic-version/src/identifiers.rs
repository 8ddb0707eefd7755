//! Shared prerelease-identifier helpers used by both [`crate::SemVer`] and
//! [`crate::CarusoVer`].

use std::cmp::Ordering;

/// SemVer 2.0.0 precedence between two dot-separated identifier sequences:
/// numeric identifiers compare numerically and sort before alphanumeric
/// ones; a shorter sequence whose shared prefix is equal sorts first.
pub fn compare(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let x_num = x.parse::<u64>().ok();
        let y_num = y.parse::<u64>().ok();
        let ord = match (x_num, y_num) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Finds the least-significant (rightmost) purely-numeric identifier and
/// returns the prerelease with it incremented, or `None` if no identifier
/// in the sequence is numeric.
pub fn increment_least_significant_numeric(prerelease: &[String]) -> Option<Vec<String>> {
    let idx = prerelease.iter().rposition(|elem| is_numeric_identifier(elem))?;
    let mut next = prerelease.to_vec();
    let value: u64 = next[idx].parse().expect("validated numeric identifier");
    next[idx] = (value + 1).to_string();
    Some(next)
}

fn is_numeric_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) && (s == "0" || !s.starts_with('0'))
}
