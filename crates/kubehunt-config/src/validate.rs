//! Configuration validation rules.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted namespace prefix. Leaves room for the random suffix and
/// object-kind infixes inside the 63-character DNS label limit.
pub const MAX_NAMESPACE_PREFIX_LEN: usize = 40;

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first invalid field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_scan(config)?;
    validate_http(config)?;
    validate_active(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message,
    }
}

fn validate_scan(config: &Config) -> ConfigResult<()> {
    let scan = &config.scan;

    if !matches!(scan.default_protocol.as_str(), "http" | "https") {
        return Err(invalid(
            "scan.default_protocol",
            format!(
                "unsupported protocol '{}'; expected one of: http, https",
                scan.default_protocol
            ),
        ));
    }

    if scan.default_port == 0 {
        return Err(invalid("scan.default_port", "must be greater than 0".to_owned()));
    }

    if scan.settle_timeout_ms == 0 {
        return Err(invalid(
            "scan.settle_timeout_ms",
            "must be greater than 0".to_owned(),
        ));
    }

    Ok(())
}

fn validate_http(config: &Config) -> ConfigResult<()> {
    if config.http.timeout_secs == 0 {
        return Err(invalid("http.timeout_secs", "must be greater than 0".to_owned()));
    }
    if config.http.user_agent.trim().is_empty() {
        return Err(invalid("http.user_agent", "must not be empty".to_owned()));
    }
    Ok(())
}

fn validate_active(config: &Config) -> ConfigResult<()> {
    let prefix = &config.active.namespace_prefix;

    if prefix.is_empty() || prefix.len() > MAX_NAMESPACE_PREFIX_LEN {
        return Err(invalid(
            "active.namespace_prefix",
            format!("must be 1 to {MAX_NAMESPACE_PREFIX_LEN} characters long"),
        ));
    }

    let starts_with_letter = prefix.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let label_chars = prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !starts_with_letter || !label_chars {
        return Err(invalid(
            "active.namespace_prefix",
            format!(
                "'{prefix}' is not a DNS label prefix; use lowercase letters, digits and '-', \
                 starting with a letter"
            ),
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}
