//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kubehunt_telemetry::prelude::*;` to import all essential types.

// Errors
pub use crate::{TelemetryError, TelemetryResult};

// Logging configuration
pub use crate::{FileRotation, LogConfig, LogFormat, LogTarget};

// Setup functions
pub use crate::{setup_default_logging, setup_logging};

// Scan context
pub use crate::ScanContext;
