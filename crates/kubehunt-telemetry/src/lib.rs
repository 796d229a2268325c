//! Kubehunt Telemetry - Logging and scan correlation.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - A scan context whose span tags every log line of one scan
//!
//! # Example
//!
//! ```rust,no_run
//! use kubehunt_telemetry::{LogConfig, LogFormat, ScanContext, setup_logging};
//!
//! # fn main() -> Result<(), kubehunt_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("kubehunt_hunters=debug");
//! setup_logging(&config)?;
//!
//! let scan = ScanContext::new("10.0.0.1:6443");
//! let _entered = scan.span().entered();
//! tracing::info!("hunting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::ScanContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};
