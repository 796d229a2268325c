//! kubehunt - Kubernetes API server hunter.
//!
//! Seeds the event bus with a discovered API server, lets the passive
//! hunters probe it, optionally runs the active hunter, and prints a report.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kubehunt_config::{Config, ResolvedConfig};
use kubehunt_telemetry::{LogConfig, LogFormat, setup_logging};

mod commands;
mod report;
mod theme;

use commands::{config, scan};
use report::OutputFormat;
use theme::Theme;

/// kubehunt - probe a Kubernetes API server for exposed access
#[derive(Parser)]
#[command(name = "kubehunt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an explicit configuration file
    #[arg(short, long, global = true, env = "KUBEHUNT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hunt a single API server
    Scan {
        /// Host name or address of the API server
        #[arg(long)]
        host: String,

        /// Port (defaults to `scan.default_port`)
        #[arg(long)]
        port: Option<u16>,

        /// Protocol, http or https (defaults to `scan.default_protocol`)
        #[arg(long)]
        protocol: Option<String>,

        /// Service account token to probe with
        #[arg(long)]
        token: Option<String>,

        /// Authorize state-changing probes (creates and deletes objects)
        #[arg(long)]
        active: bool,

        /// Report format: pretty or json
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
        /// Show only a specific section (e.g. scan, active, logging)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(cli.config.as_deref());

    // Logging from config, with --verbose override. Falls back to defaults
    // so a broken config file is still reported.
    let mut log_config = match &loaded {
        Ok(resolved) => LogConfig::from_section(&resolved.config.logging)
            .unwrap_or_else(|_| LogConfig::new("warn").with_format(LogFormat::Compact)),
        Err(_) => LogConfig::new("warn").with_format(LogFormat::Compact),
    };
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Scan {
            host,
            port,
            protocol,
            token,
            active,
            format,
        } => {
            let resolved = loaded?;
            let options = scan::ScanOptions {
                host,
                port,
                protocol,
                token,
                active,
            };
            let report = scan::run_scan(options, &resolved.config).await?;
            println!("{}", report.render(OutputFormat::parse(&format))?);
        },
        Commands::Config { command } => handle_config(command, loaded)?,
    }

    Ok(())
}

fn handle_config(
    command: ConfigCommands,
    loaded: kubehunt_config::ConfigResult<ResolvedConfig>,
) -> Result<()> {
    match command {
        ConfigCommands::Show { format, section } => {
            let output = config::show_config(&loaded?, &format, section.as_deref())?;
            println!("{output}");
        },
        ConfigCommands::Validate => match loaded {
            Ok(resolved) => println!("{}", config::validation_summary(&resolved)),
            Err(e) => {
                eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
                std::process::exit(1);
            },
        },
    }
    Ok(())
}
