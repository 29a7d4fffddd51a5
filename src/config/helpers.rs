// src/config/helpers.rs
// YAML traversal and environment-variable resolution for config loading

use anyhow::{Context, Result};
use serde_yaml::Value;
use std::path::Path;

/// Load a YAML file into a value. Missing files yield `Value::Null` so a
/// partially-populated config directory falls back to defaults; malformed
/// files are a startup error.
pub fn load_yaml(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Null);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Resolve a config string that may name an environment variable.
///
/// Values ending in `_ENV` or written entirely in upper case are treated
/// as env-var names and replaced with the variable's value (empty when
/// unset); anything else is returned verbatim.
pub fn resolve_env(value: &str) -> String {
    let is_env_ref = value.ends_with("_ENV")
        || (value.len() > 1
            && value
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            && value.chars().any(|c| c.is_ascii_uppercase()));
    if is_env_ref {
        std::env::var(value).unwrap_or_default()
    } else {
        value.to_string()
    }
}

pub fn get_str(value: &Value, key: &str, default: &str) -> String {
    match value.get(key).and_then(Value::as_str) {
        Some(s) => resolve_env(s),
        None => default.to_string(),
    }
}

/// Like `get_str` but without env resolution, for values that are never
/// secret references (mode names, endpoint names).
pub fn get_raw_str(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

pub fn get_bool(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn get_u64(value: &Value, key: &str, default: u64) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(default)
}

pub fn get_string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Iterate a YAML mapping in file order, yielding (key, value) pairs for
/// string keys. Config order is significant for retrieval endpoints.
pub fn mapping_entries(value: &Value) -> Vec<(String, Value)> {
    match value.as_mapping() {
        Some(map) => map
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v.clone())))
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_references_resolve() {
        unsafe { std::env::set_var("NLWEB_TEST_KEY_ENV", "secret") };
        assert_eq!(resolve_env("NLWEB_TEST_KEY_ENV"), "secret");
        assert_eq!(resolve_env("MISSING_VAR_THAT_IS_UPPER"), "");
        assert_eq!(resolve_env("plain-value"), "plain-value");
        assert_eq!(resolve_env("localhost"), "localhost");
    }

    #[test]
    fn mapping_preserves_order() {
        let value: Value = serde_yaml::from_str("b: 1\na: 2\nc: 3\n").unwrap();
        let keys: Vec<String> = mapping_entries(&value).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }
}
