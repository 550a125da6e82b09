//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChatpushSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `CHATPUSH_*` environment overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ChatpushSettings;

/// Resolve the path to the settings file (`~/.chatpush/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatpush").join("settings.json")
}

/// Settings plus the environment overrides that were skipped.
///
/// Loading runs before logging is installed, so rejected values are handed
/// back for the caller to report.
#[derive(Debug)]
pub struct LoadedSettings {
    /// The validated settings.
    pub settings: ChatpushSettings,
    /// `CHATPUSH_*` variables whose values did not parse.
    pub rejected: Vec<RejectedOverride>,
}

/// An environment variable that was set but could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name.
    pub key: &'static str,
    /// Raw value as found in the environment.
    pub value: String,
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env<F>(path: &Path, env: F) -> Result<LoadedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults =
        serde_json::to_value(ChatpushSettings::default()).map_err(SettingsError::Defaults)?;
    let parse_err = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_err)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChatpushSettings = serde_json::from_value(merged).map_err(parse_err)?;
    let rejected = apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(LoadedSettings { settings, rejected })
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides read through `env`. Unparseable values are skipped and returned.
fn apply_overrides<F>(settings: &mut ChatpushSettings, env: F) -> Vec<RejectedOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rejected = Vec::new();
    let rej = &mut rejected;
    if let Some(v) = read_string(&env, "CHATPUSH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_parsed(&env, rej, "CHATPUSH_PORT", |s| parse_u16_range(s, 0, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = read_parsed(&env, rej, "CHATPUSH_SEND_QUEUE", |s| {
        parse_usize_range(s, 1, 65_536)
    }) {
        settings.server.send_queue_capacity = v;
    }
    if let Some(v) = read_parsed(&env, rej, "CHATPUSH_HEARTBEAT_INTERVAL", |s| {
        parse_u64_range(s, 1, 3_600)
    }) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_parsed(&env, rej, "CHATPUSH_HEARTBEAT_TIMEOUT", |s| {
        parse_u64_range(s, 1, 86_400)
    }) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = read_string(&env, "CHATPUSH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_parsed(&env, rej, "CHATPUSH_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
    rejected
}

fn read_string<F>(env: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(name).filter(|v| !v.is_empty())
}

fn read_parsed<F, T>(
    env: &F,
    rejected: &mut Vec<RejectedOverride>,
    name: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
{
    let val = read_string(env, name)?;
    let result = parse(&val);
    if result.is_none() {
        rejected.push(RejectedOverride {
            key: name,
            value: val,
        });
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_with_env(path, no_env).unwrap().settings;
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "logging": {"json": false}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, no_env).unwrap().settings;
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert!(!settings.logging.json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_with_env(&path, no_env);
        assert!(matches!(result.unwrap_err(), SettingsError::Parse { .. }));
    }

    #[test]
    fn wrong_field_type_is_parse_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();

        match load_with_env(&path, no_env).unwrap_err() {
            SettingsError::Parse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let err = load_with_env(dir.path(), no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }), "{err:?}");
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }

    #[test]
    fn load_invalid_combination_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"sendQueueCapacity": 0}}"#).unwrap();

        let result = load_with_env(&path, no_env);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::Invalid { field: "sendQueueCapacity", .. }
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9090}}"#).unwrap();

        let env = env_from(&[
            ("CHATPUSH_PORT", "7000"),
            ("CHATPUSH_HOST", "0.0.0.0"),
            ("CHATPUSH_LOG_JSON", "off"),
            ("CHATPUSH_LOG_LEVEL", "debug"),
        ]);
        let loaded = load_with_env(&path, env).unwrap();
        assert!(loaded.rejected.is_empty());
        let settings = loaded.settings;
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(!settings.logging.json);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = ChatpushSettings::default();
        let rejected = apply_overrides(
            &mut settings,
            env_from(&[
                ("CHATPUSH_PORT", "99999"),
                ("CHATPUSH_SEND_QUEUE", "0"),
                ("CHATPUSH_LOG_JSON", "maybe"),
                ("CHATPUSH_HEARTBEAT_INTERVAL", "abc"),
            ]),
        );
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.send_queue_capacity, 256);
        assert!(settings.logging.json);
        assert_eq!(settings.server.heartbeat_interval_secs, 30);

        let mut keys: Vec<&str> = rejected.iter().map(|r| r.key).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "CHATPUSH_HEARTBEAT_INTERVAL",
                "CHATPUSH_LOG_JSON",
                "CHATPUSH_PORT",
                "CHATPUSH_SEND_QUEUE",
            ]
        );
        assert!(rejected.contains(&RejectedOverride {
            key: "CHATPUSH_PORT",
            value: "99999".into(),
        }));
    }

    #[test]
    fn rejected_overrides_reach_the_caller() {
        let env = env_from(&[("CHATPUSH_LOG_JSON", "maybe"), ("CHATPUSH_PORT", "9001")]);
        let loaded = load_with_env(Path::new("/nonexistent/settings.json"), env).unwrap();
        assert_eq!(loaded.settings.server.port, 9001);
        assert_eq!(
            loaded.rejected,
            vec![RejectedOverride {
                key: "CHATPUSH_LOG_JSON",
                value: "maybe".into(),
            }]
        );
    }

    #[test]
    fn empty_env_values_ignored() {
        let mut settings = ChatpushSettings::default();
        let rejected = apply_overrides(&mut settings, env_from(&[("CHATPUSH_HOST", "")]));
        assert!(rejected.is_empty());
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn heartbeat_env_overrides() {
        let mut settings = ChatpushSettings::default();
        let _ = apply_overrides(
            &mut settings,
            env_from(&[
                ("CHATPUSH_HEARTBEAT_INTERVAL", "10"),
                ("CHATPUSH_HEARTBEAT_TIMEOUT", "40"),
                ("CHATPUSH_SEND_QUEUE", "32"),
            ]),
        );
        assert_eq!(settings.server.heartbeat_interval_secs, 10);
        assert_eq!(settings.server.heartbeat_timeout_secs, 40);
        assert_eq!(settings.server.send_queue_capacity, 32);
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
    }
}
