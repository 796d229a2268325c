//! Precedence between defaults, user file, explicit file and environment.

use std::collections::HashMap;
use std::fs;

use kubehunt_config::loader::load_with_env;
use kubehunt_config::{ConfigError, ConfigLayer, ShowFormat};

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[test]
fn test_defaults_only() {
    let home = tempfile::tempdir().unwrap();
    let resolved = load_with_env(None, Some(home.path()), &env(&[])).unwrap();

    assert_eq!(resolved.config.scan.default_port, 443);
    assert_eq!(resolved.config.scan.default_protocol, "https");
    assert!(!resolved.config.active.enabled);
    assert!(resolved.loaded_files.is_empty());
    assert_eq!(
        resolved.field_sources.get("scan.default_port"),
        Some(&ConfigLayer::Defaults)
    );
}

#[test]
fn test_explicit_overrides_user() {
    let home = tempfile::tempdir().unwrap();
    fs::write(
        home.path().join("config.toml"),
        "[scan]\ndefault_port = 8443\nsettle_timeout_ms = 5000\n",
    )
    .unwrap();

    let explicit_dir = tempfile::tempdir().unwrap();
    let explicit = explicit_dir.path().join("scan.toml");
    fs::write(&explicit, "[scan]\ndefault_port = 6443\n").unwrap();

    let resolved = load_with_env(Some(&explicit), Some(home.path()), &env(&[])).unwrap();

    assert_eq!(resolved.config.scan.default_port, 6443);
    assert_eq!(resolved.config.scan.settle_timeout_ms, 5000);
    assert_eq!(resolved.loaded_files.len(), 2);
    assert_eq!(
        resolved.field_sources.get("scan.default_port"),
        Some(&ConfigLayer::Explicit)
    );
    assert_eq!(
        resolved.field_sources.get("scan.settle_timeout_ms"),
        Some(&ConfigLayer::User)
    );
}

#[test]
fn test_env_fills_only_unset_fields() {
    let home = tempfile::tempdir().unwrap();
    fs::write(home.path().join("config.toml"), "[active]\nenabled = false\n").unwrap();

    let vars = env(&[
        ("KUBEHUNT_ACTIVE", "true"),
        ("KUBEHUNT_DEFAULT_PORT", "6443"),
        ("KUBEHUNT_LOG_LEVEL", "debug"),
    ]);
    let resolved = load_with_env(None, Some(home.path()), &vars).unwrap();

    assert!(!resolved.config.active.enabled, "file value must win over env");
    assert_eq!(resolved.config.scan.default_port, 6443);
    assert_eq!(resolved.config.logging.level, "debug");
    assert_eq!(
        resolved.field_sources.get("logging.level"),
        Some(&ConfigLayer::Environment)
    );
}

#[test]
fn test_missing_explicit_file_is_error() {
    let home = tempfile::tempdir().unwrap();
    let missing = home.path().join("nope.toml");

    let err = load_with_env(Some(&missing), Some(home.path()), &env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::ReadError { .. }));
}

#[test]
fn test_invalid_env_value_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let vars = env(&[("KUBEHUNT_PROTOCOL", "gopher")]);

    let err = load_with_env(None, Some(home.path()), &vars).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::ValidationError { ref field, .. } if field == "scan.default_protocol"
    ));
}

#[test]
fn test_token_is_loaded_but_never_shown() {
    let home = tempfile::tempdir().unwrap();
    let vars = env(&[("KUBEHUNT_TOKEN", "so-secret")]);
    let resolved = load_with_env(None, Some(home.path()), &vars).unwrap();

    assert_eq!(resolved.config.credentials.token.as_deref(), Some("so-secret"));

    for format in [ShowFormat::Toml, ShowFormat::Json] {
        let shown = resolved.show(format, None).unwrap();
        assert!(!shown.contains("so-secret"), "{format:?} leaked the token");
    }
    assert!(!format!("{:?}", resolved.config).contains("so-secret"));
}
