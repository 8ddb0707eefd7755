//! `${NAME}`/`$NAME` variable interpolation.
//!
//! `$$` escapes to a literal `$`. A referenced name missing from the
//! variable map is an error; a name present but carrying a
//! [`InterpolationValue::Deferred`] sentinel re-raises that sentinel's
//! message instead of a generic "missing variable" — this is how credential
//! absence is deferred from config load time to the first step that
//! actually references the credential's variable.

use std::collections::HashMap;

/// One entry in the variable map [`interpolate`] substitutes against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpolationValue {
    Present(String),
    /// The variable exists but resolving it failed; the message is only
    /// surfaced if something actually references this name.
    Deferred(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum InterpolationError {
    MissingVariable(String),
    Deferred(String),
}

impl std::fmt::Display for InterpolationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVariable(name) => write!(f, "undefined variable `{name}` referenced"),
            Self::Deferred(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for InterpolationError {}

/// Substitutes every `${NAME}`/`$NAME` reference in `template` against
/// `vars`, collapsing `$$` to a literal `$`.
pub fn interpolate(
    template: &str,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<String, InterpolationError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            let ch_len = next_char_len(template, i);
            out.push_str(&template[i..i + ch_len]);
            i += ch_len;
            continue;
        }

        if bytes.get(i + 1) == Some(&b'$') {
            out.push('$');
            i += 2;
            continue;
        }

        if bytes.get(i + 1) == Some(&b'{') {
            let Some(end) = template[i + 2..].find('}') else {
                out.push_str(&template[i..]);
                break;
            };
            let name = &template[i + 2..i + 2 + end];
            out.push_str(&resolve(name, vars)?);
            i += 2 + end + 1;
            continue;
        }

        let name_len = template[i + 1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(template.len() - i - 1);
        if name_len == 0 {
            out.push('$');
            i += 1;
            continue;
        }
        let name = &template[i + 1..i + 1 + name_len];
        out.push_str(&resolve(name, vars)?);
        i += 1 + name_len;
    }
    Ok(out)
}

fn next_char_len(s: &str, byte_index: usize) -> usize {
    s[byte_index..].chars().next().map(char::len_utf8).unwrap_or(1)
}

fn resolve(
    name: &str,
    vars: &HashMap<String, InterpolationValue>,
) -> Result<String, InterpolationError> {
    match vars.get(name) {
        Some(InterpolationValue::Present(value)) => Ok(value.clone()),
        Some(InterpolationValue::Deferred(message)) => Err(InterpolationError::Deferred(message.clone())),
        None => Err(InterpolationError::MissingVariable(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, InterpolationValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), InterpolationValue::Present(v.to_string())))
            .collect()
    }

    #[test]
    fn substitutes_braced_reference() {
        let v = vars(&[("CFGDIR", "/work/cfg")]);
        assert_eq!(interpolate("${CFGDIR}/sub", &v).unwrap(), "/work/cfg/sub");
    }

    #[test]
    fn substitutes_bare_reference() {
        let v = vars(&[("CFGDIR", "/work/cfg")]);
        assert_eq!(interpolate("$CFGDIR/sub", &v).unwrap(), "/work/cfg/sub");
    }

    #[test]
    fn double_dollar_escapes_to_literal() {
        let v = vars(&[]);
        assert_eq!(interpolate("price: $$5", &v).unwrap(), "price: $5");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let v = vars(&[]);
        let err = interpolate("${MISSING}", &v).unwrap_err();
        assert_eq!(err, InterpolationError::MissingVariable("MISSING".to_string()));
    }

    #[test]
    fn deferred_sentinel_surfaces_only_when_referenced() {
        let mut v = vars(&[]);
        v.insert(
            "SECRET".to_string(),
            InterpolationValue::Deferred("credential `secret` not available".to_string()),
        );
        assert_eq!(interpolate("no refs here", &v).unwrap(), "no refs here");
        let err = interpolate("${SECRET}", &v).unwrap_err();
        assert_eq!(
            err,
            InterpolationError::Deferred("credential `secret` not available".to_string())
        );
    }

    #[test]
    fn bare_reference_stops_at_non_identifier_char() {
        let v = vars(&[("A", "x")]);
        assert_eq!(interpolate("$A-suffix", &v).unwrap(), "x-suffix");
    }
}
