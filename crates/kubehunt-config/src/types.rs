//! Configuration types.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// In-cluster service account token path.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target defaults and settling.
    pub scan: ScanSection,
    /// HTTP client behaviour.
    pub http: HttpSection,
    /// Where the service account token comes from.
    pub credentials: CredentialsSection,
    /// Gate for state-changing probes.
    pub active: ActiveSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

impl Config {
    /// How long to wait for the bus to settle.
    #[must_use]
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.settle_timeout_ms)
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ScanSection
// ---------------------------------------------------------------------------

/// Defaults for the seed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Port used when `--port` is not given.
    pub default_port: u16,
    /// Protocol used when `--protocol` is not given.
    pub default_protocol: String,
    /// Upper bound on waiting for all hunters to finish, in milliseconds.
    pub settle_timeout_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            default_port: 443,
            default_protocol: "https".to_owned(),
            settle_timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpSection
// ---------------------------------------------------------------------------

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Skip TLS certificate verification. Clusters commonly use
    /// self-signed certificates.
    pub accept_invalid_certs: bool,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            accept_invalid_certs: true,
            user_agent: "kubehunt".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialsSection
// ---------------------------------------------------------------------------

/// Credential sources.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    /// Token file, read only when it exists.
    pub token_file: Option<String>,
    /// Inline token. Prefer `KUBEHUNT_TOKEN` over storing this in a file.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl CredentialsSection {
    /// Token file as a path.
    #[must_use]
    pub fn token_file_path(&self) -> Option<PathBuf> {
        self.token_file
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            token_file: Some(DEFAULT_TOKEN_FILE.to_owned()),
            token: None,
        }
    }
}

impl std::fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("token_file", &self.token_file)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl Serialize for CredentialsSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CredentialsSection", 1)?;
        state.serialize_field("token_file", &self.token_file)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// ActiveSection
// ---------------------------------------------------------------------------

/// Active hunting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveSection {
    /// Run state-changing probes without `--active`.
    pub enabled: bool,
    /// Prefix of every object the active hunter creates.
    pub namespace_prefix: String,
}

impl Default for ActiveSection {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace_prefix: "kubehunt-".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["kubehunt_hunters=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
