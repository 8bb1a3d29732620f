//! Where wsreq's settings come from.
//!
//! Three layers, later ones winning: compiled defaults, the optional
//! `~/.wsreq/settings.json` file, then `WSREQ_*` variables. The CLI applies
//! its own flags over the result. The file only needs the keys it changes,
//! e.g. `{"client": {"timeoutMs": 5000}}` keeps every other default.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::WsreqSettings;

/// `$HOME/.wsreq/settings.json`, under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".wsreq").join("settings.json")
}

/// Settings for the current user: [`settings_path`] plus the environment.
pub fn load_settings() -> Result<WsreqSettings> {
    load_settings_from_path(&settings_path())
}

/// Settings from `path` plus the environment, validated.
///
/// No file at `path` means defaults. An unreadable file, malformed JSON or a
/// value [`WsreqSettings::validate`] rejects is an error, such as a ws path
/// without a leading `/`. The CLI falls back to defaults on error.
pub fn load_settings_from_path(path: &Path) -> Result<WsreqSettings> {
    let defaults = serde_json::to_value(WsreqSettings::default())?;

    let merged = match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(?path, "settings file found");
            deep_merge(defaults, serde_json::from_str(&content)?)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(?path, "no settings file, using defaults");
            defaults
        }
        Err(e) => return Err(e.into()),
    };

    let mut settings: WsreqSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Overlay `source` on `target`.
///
/// Sections merge key by key, so a file naming only `client.path` keeps the
/// default `client.port`. Anything that is not an object on both sides is
/// taken from `source` whole. A `null` in `source` leaves the default alone.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let value = match merged.remove(&key) {
                    Some(current) => deep_merge(current, value),
                    None => value,
                };
                let _ = merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, source) => source,
    }
}

/// Apply `WSREQ_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut WsreqSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value stays.
pub fn apply_overrides(settings: &mut WsreqSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = env.string("WSREQ_PATH") {
        settings.client.path = v;
    }
    if let Some(v) = env.u64("WSREQ_TIMEOUT_MS", 3000, 3_600_000) {
        settings.client.timeout_ms = v;
    }
    if let Some(v) = env.usize("WSREQ_CLIENTS", 1, 1024) {
        settings.client.clients = v;
    }
    if let Some(v) = env.u16("WSREQ_PORT", 1, 65535) {
        settings.client.port = v;
        settings.server.port = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("WSREQ_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("WSREQ_WS_PATH") {
        settings.server.ws_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("WSREQ_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("WSREQ_LOG_JSON") {
        settings.logging.json = v;
    }
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

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 45000, "host": "127.0.0.1"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "127.0.0.1");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4, 5]));
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
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    #[test]
    fn merge_empty_source() {
        let target = serde_json::json!({"a": 1, "b": {"c": 2}});
        let merged = deep_merge(target.clone(), serde_json::json!({}));
        assert_eq!(merged, target);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.client.port, 45000);
        assert_eq!(settings.server.ws_path, "/api/ws");
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"client": {"timeoutMs": 5000, "path": "/socket"}, "logging": {"json": true}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.client.timeout_ms, 5000);
        assert_eq!(settings.client.path, "/socket");
        assert_eq!(settings.client.clients, 1);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_settings_from_path(dir.path());
        assert!(matches!(result.unwrap_err(), SettingsError::Io(_)));
    }

    #[test]
    fn load_invalid_value_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"wsPath": "no-slash"}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_in_range_values() {
        let mut s = WsreqSettings::default();
        apply_overrides(
            &mut s,
            vars(&[
                ("WSREQ_PATH", "/ws"),
                ("WSREQ_TIMEOUT_MS", "4500"),
                ("WSREQ_CLIENTS", "3"),
                ("WSREQ_PORT", "46000"),
                ("WSREQ_HOST", "0.0.0.0"),
                ("WSREQ_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(s.client.path, "/ws");
        assert_eq!(s.client.timeout_ms, 4500);
        assert_eq!(s.client.clients, 3);
        assert_eq!(s.client.port, 46000);
        assert_eq!(s.server.port, 46000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert!(s.logging.json);
    }

    #[test]
    fn overrides_ignore_out_of_range_values() {
        let mut s = WsreqSettings::default();
        apply_overrides(
            &mut s,
            vars(&[
                ("WSREQ_TIMEOUT_MS", "100"),
                ("WSREQ_CLIENTS", "0"),
                ("WSREQ_PORT", "99999"),
                ("WSREQ_LOG_JSON", "maybe"),
                ("WSREQ_HOST", ""),
            ]),
        );
        assert_eq!(s, WsreqSettings::default());
    }

    #[test]
    fn invalid_override_logs_warning() {
        let (logs, _guard) = wsreq_logging::test_utils::capture_logs();
        let mut s = WsreqSettings::default();
        apply_overrides(&mut s, vars(&[("WSREQ_CLIENTS", "lots")]));
        assert!(logs.has_event(tracing::Level::WARN, "invalid env var"));
        let events = logs.events();
        assert_eq!(events[0].field("key"), Some("WSREQ_CLIENTS"));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("3000", 3000, 3_600_000), Some(3000));
        assert_eq!(parse_u64_range("2999", 3000, 3_600_000), None);
        assert_eq!(parse_usize_range("abc", 1, 1024), None);
    }
}
