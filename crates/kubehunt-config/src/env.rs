//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that
//! no config file set. The variables are passed in as a map so callers and
//! tests control exactly what is visible.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: ValueKind,
}

#[derive(Clone, Copy)]
enum ValueKind {
    Text,
    Integer,
    Boolean,
}

/// All supported `KUBEHUNT_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "KUBEHUNT_DEFAULT_PORT",
        field_path: "scan.default_port",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KUBEHUNT_PROTOCOL",
        field_path: "scan.default_protocol",
        kind: ValueKind::Text,
    },
    EnvMapping {
        var_name: "KUBEHUNT_SETTLE_TIMEOUT_MS",
        field_path: "scan.settle_timeout_ms",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KUBEHUNT_HTTP_TIMEOUT_SECS",
        field_path: "http.timeout_secs",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KUBEHUNT_ACCEPT_INVALID_CERTS",
        field_path: "http.accept_invalid_certs",
        kind: ValueKind::Boolean,
    },
    EnvMapping {
        var_name: "KUBEHUNT_TOKEN",
        field_path: "credentials.token",
        kind: ValueKind::Text,
    },
    EnvMapping {
        var_name: "KUBEHUNT_TOKEN_FILE",
        field_path: "credentials.token_file",
        kind: ValueKind::Text,
    },
    EnvMapping {
        var_name: "KUBEHUNT_ACTIVE",
        field_path: "active.enabled",
        kind: ValueKind::Boolean,
    },
    EnvMapping {
        var_name: "KUBEHUNT_NAMESPACE_PREFIX",
        field_path: "active.namespace_prefix",
        kind: ValueKind::Text,
    },
    EnvMapping {
        var_name: "KUBEHUNT_LOG_LEVEL",
        field_path: "logging.level",
        kind: ValueKind::Text,
    },
    EnvMapping {
        var_name: "KUBEHUNT_LOG_FORMAT",
        field_path: "logging.format",
        kind: ValueKind::Text,
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources.get(mapping.field_path).is_some_and(ConfigLayer::is_file) {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field(merged, mapping.field_path, coerce(mapping.kind, val));
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Parse a value as its field type. Unparseable numbers and booleans stay
/// strings so deserialization reports them against the field.
fn coerce(kind: ValueKind, val: &str) -> toml::Value {
    match kind {
        ValueKind::Integer => val
            .parse::<i64>()
            .map_or_else(|_| toml::Value::String(val.to_owned()), toml::Value::Integer),
        ValueKind::Boolean => val
            .parse::<bool>()
            .map_or_else(|_| toml::Value::String(val.to_owned()), toml::Value::Boolean),
        ValueKind::Text => toml::Value::String(val.to_owned()),
    }
}

/// Set `section.field` in the tree, creating the section table if needed.
fn set_field(root: &mut toml::Value, path: &str, val: toml::Value) {
    let Some((section, field)) = path.split_once('.') else {
        return;
    };
    let Some(root) = root.as_table_mut() else {
        return;
    };
    let section = root
        .entry(section.to_owned())
        .or_insert(toml::Value::Table(toml::map::Map::new()));
    if let Some(table) = section.as_table_mut() {
        table.insert(field.to_owned(), val);
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn defaults() -> (toml::Value, FieldSources) {
        let val: toml::Value = toml::from_str("[scan]\ndefault_port = 443").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("scan.default_port".to_owned(), ConfigLayer::Defaults);
        (val, sources)
    }

    #[test]
    fn test_env_overrides_defaults() {
        let (mut val, mut sources) = defaults();
        let env = make_env(&[("KUBEHUNT_DEFAULT_PORT", "6443")]);

        assert_eq!(apply_env_fallbacks(&mut val, &mut sources, &env), 1);
        assert_eq!(val["scan"]["default_port"].as_integer(), Some(6443));
        assert_eq!(
            sources.get("scan.default_port"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_env_does_not_override_files() {
        let (mut val, mut sources) = defaults();
        sources.insert("scan.default_port".to_owned(), ConfigLayer::Explicit);
        let env = make_env(&[("KUBEHUNT_DEFAULT_PORT", "6443")]);

        assert_eq!(apply_env_fallbacks(&mut val, &mut sources, &env), 0);
        assert_eq!(val["scan"]["default_port"].as_integer(), Some(443));
    }

    #[test]
    fn test_env_creates_missing_sections() {
        let (mut val, mut sources) = defaults();
        let env = make_env(&[("KUBEHUNT_ACTIVE", "true"), ("KUBEHUNT_TOKEN", "abc")]);

        assert_eq!(apply_env_fallbacks(&mut val, &mut sources, &env), 2);
        assert_eq!(val["active"]["enabled"].as_bool(), Some(true));
        assert_eq!(val["credentials"]["token"].as_str(), Some("abc"));
    }

    #[test]
    fn test_unparseable_values_stay_strings() {
        let (mut val, mut sources) = defaults();
        let env = make_env(&[("KUBEHUNT_DEFAULT_PORT", "not-a-port")]);

        apply_env_fallbacks(&mut val, &mut sources, &env);
        assert_eq!(val["scan"]["default_port"].as_str(), Some("not-a-port"));
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let (mut val, mut sources) = defaults();
        let env = make_env(&[("HOME", "/root"), ("KUBEHUNT_UNKNOWN", "x")]);
        assert_eq!(apply_env_fallbacks(&mut val, &mut sources, &env), 0);
    }
}
