//! CLI handlers for the `kubehunt config` subcommand.

use anyhow::Result;
use kubehunt_config::{ResolvedConfig, ShowFormat};

use crate::theme::Theme;

/// Render the resolved configuration with source annotations.
pub(crate) fn show_config(
    resolved: &ResolvedConfig,
    format: &str,
    section: Option<&str>,
) -> Result<String> {
    let show_format = match format {
        "json" => ShowFormat::Json,
        _ => ShowFormat::Toml,
    };

    resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))
}

/// Summarize a configuration that loaded and validated.
pub(crate) fn validation_summary(resolved: &ResolvedConfig) -> String {
    let mut lines = vec![Theme::success("Configuration is valid.")];
    if resolved.loaded_files.is_empty() {
        lines.push(Theme::dimmed("No config files found; using defaults."));
    } else {
        lines.push(String::new());
        lines.push("Loaded files:".to_owned());
        for path in &resolved.loaded_files {
            lines.push(format!("  - {path}"));
        }
    }
    lines.join("\n")
}
