//! Dual-value cells and environment interpolation
//!
//! Current-schema (apiVersion >= 1) documents wrap every scalar in a
//! [`ValueCell`] holding both the literal configuration text (`raw`) and the
//! value after `$VAR` / `${VAR}` expansion (`resolved`). Normalization uses
//! `resolved`; deprecation checks look at `raw`, so a field whose variable
//! expands to nothing is still reported as configured.

use serde::Deserialize;
use std::collections::HashMap;

/// Source of environment variables for interpolation
pub trait Environment: Send + Sync {
    /// Value of `name`, or `None` when unset
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Expand `$NAME` and `${NAME}` references. Unset variables expand to the
/// empty string, `$$` is a literal `$`, and a `$` not starting a reference is
/// kept as is.
pub fn interpolate(input: &str, env: &dyn Environment) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            rest = stripped;
        } else if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    out.push_str(&env.var(&braced[..end]).unwrap_or_default());
                    rest = &braced[end + 1..];
                }
                None => {
                    // unterminated reference, keep the text
                    out.push('$');
                    rest = after;
                }
            }
        } else {
            let name_len = name_length(after);
            if name_len == 0 {
                out.push('$');
            } else {
                out.push_str(&env.var(&after[..name_len]).unwrap_or_default());
            }
            rest = &after[name_len..];
        }
    }

    out.push_str(rest);
    out
}

fn name_length(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map_or(s.len(), |(i, _)| i)
}

/// A scalar exactly as written in the document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawScalar {
    /// Literal configuration text, before interpolation
    pub fn raw_text(&self) -> String {
        match self {
            RawScalar::Bool(b) => b.to_string(),
            RawScalar::Int(i) => i.to_string(),
            RawScalar::Float(f) => f.to_string(),
            RawScalar::Text(s) => s.clone(),
        }
    }
}

/// A configuration value in both its literal and interpolated form
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCell<T> {
    pub raw: String,
    pub resolved: T,
}

impl<T> ValueCell<T> {
    /// Whether the field was configured at all, regardless of what it resolved to
    pub fn is_configured(&self) -> bool {
        !self.raw.is_empty()
    }
}

fn resolve_text(input: Option<&RawScalar>, env: &dyn Environment) -> (String, String) {
    let raw = input.map(RawScalar::raw_text).unwrap_or_default();
    let resolved = interpolate(&raw, env);
    (raw, resolved)
}

pub fn string_cell(input: Option<&RawScalar>, env: &dyn Environment) -> ValueCell<String> {
    let (raw, resolved) = resolve_text(input, env);
    ValueCell { raw, resolved }
}

/// Integer cell; an empty resolved value is `0`
pub fn int_cell(input: Option<&RawScalar>, env: &dyn Environment) -> Result<ValueCell<i64>, String> {
    let (raw, text) = resolve_text(input, env);
    let resolved = if text.trim().is_empty() {
        0
    } else {
        text.trim()
            .parse::<i64>()
            .map_err(|e| format!("{text:?} is not an integer: {e}"))?
    };
    Ok(ValueCell { raw, resolved })
}

/// Boolean cell; an empty resolved value is `false`
pub fn bool_cell(input: Option<&RawScalar>, env: &dyn Environment) -> Result<ValueCell<bool>, String> {
    let (raw, text) = resolve_text(input, env);
    let resolved = match text.trim() {
        "" => false,
        "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
        "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
        other => return Err(format!("{other:?} is not a boolean")),
    };
    Ok(ValueCell { raw, resolved })
}

/// Interpolate every string leaf of a JSON value; numbers, booleans and
/// nulls are returned untouched so integer/float typing survives.
pub fn interpolate_json(value: &serde_json::Value, env: &dyn Environment) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(s) => Value::String(interpolate(s, env)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate_json(v, env)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_json(v, env)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_braced_and_bare_references() {
        let env = env(&[("HOST", "db.local"), ("PORT", "5432")]);
        assert_eq!(interpolate("${HOST}:$PORT", &env), "db.local:5432");
        assert_eq!(interpolate("postgres://$HOST/x", &env), "postgres://db.local/x");
    }

    #[test]
    fn test_unset_variable_is_empty() {
        let env = env(&[]);
        assert_eq!(interpolate("${EMPTY_ENV}", &env), "");
        assert_eq!(interpolate("a$MISSING-b", &env), "a-b");
    }

    #[test]
    fn test_literal_dollars() {
        let env = env(&[("X", "1")]);
        assert_eq!(interpolate("cost: $$5", &env), "cost: $5");
        assert_eq!(interpolate("ends with $", &env), "ends with $");
        assert_eq!(interpolate("$ 5", &env), "$ 5");
        assert_eq!(interpolate("${X", &env), "${X");
    }

    #[test]
    fn test_cell_keeps_raw_when_resolved_empty() {
        let env = env(&[]);
        let input = RawScalar::Text("${EMPTY_ENV}".to_string());
        let cell = string_cell(Some(&input), &env);
        assert_eq!(cell.raw, "${EMPTY_ENV}");
        assert_eq!(cell.resolved, "");
        assert!(cell.is_configured());
    }

    #[test]
    fn test_missing_cell_is_unconfigured() {
        let cell = string_cell(None, &env(&[]));
        assert!(!cell.is_configured());
        assert_eq!(cell.resolved, "");
    }

    #[test]
    fn test_typed_cells() {
        let env = env(&[("ORG", "3"), ("ON", "true")]);
        let org = int_cell(Some(&RawScalar::Text("$ORG".to_string())), &env).unwrap();
        assert_eq!(org.resolved, 3);
        let on = bool_cell(Some(&RawScalar::Text("${ON}".to_string())), &env).unwrap();
        assert!(on.resolved);
        let native = bool_cell(Some(&RawScalar::Bool(true)), &env).unwrap();
        assert_eq!(native.raw, "true");
        assert!(native.resolved);
        assert!(int_cell(Some(&RawScalar::Text("abc".to_string())), &env).is_err());
        assert!(bool_cell(Some(&RawScalar::Text("maybe".to_string())), &env).is_err());
    }

    #[test]
    fn test_json_numbers_untouched() {
        let env = env(&[("MODE", "disable")]);
        let value = serde_json::json!({
            "postgresVersion": 903,
            "ratio": 0.5,
            "sslmode": "$MODE",
            "nested": [{"x": "${MODE}"}],
        });
        let out = interpolate_json(&value, &env);
        assert!(out["postgresVersion"].is_i64());
        assert!(out["ratio"].is_f64());
        assert_eq!(out["sslmode"], "disable");
        assert_eq!(out["nested"][0]["x"], "disable");
    }

    proptest! {
        #[test]
        fn property_text_without_dollar_is_unchanged(s in "[^$]*") {
            let env = HashMap::new();
            prop_assert_eq!(interpolate(&s, &env), s);
        }

        #[test]
        fn property_braced_reference_expands(name in "[A-Z_][A-Z0-9_]{0,12}", value in "[a-z0-9./:]{0,20}") {
            let mut env = HashMap::new();
            env.insert(name.clone(), value.clone());
            let expanded = interpolate(&format!("<${{{name}}}>"), &env);
            prop_assert_eq!(expanded, format!("<{value}>"));
        }
    }
}
