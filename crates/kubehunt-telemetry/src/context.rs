//! Scan context for correlating log lines across hunters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation context for one scan of one target.
///
/// Every event a scan produces carries the same `scan_id`; the span from
/// [`ScanContext::span`] tags log lines with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanContext {
    /// Unique scan identifier.
    pub scan_id: Uuid,
    /// `host:port` being scanned.
    pub target: String,
    /// Whether state-changing probes are authorized for this scan.
    pub active: bool,
    /// When the scan started.
    pub started_at: DateTime<Utc>,
}

impl ScanContext {
    /// Start a new scan context.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            target: target.into(),
            active: false,
            started_at: Utc::now(),
        }
    }

    /// Mark the scan as active.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Time since the scan started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        // started_at is set at construction, so now is never earlier
        #[allow(clippy::arithmetic_side_effects)]
        let elapsed = Utc::now() - self.started_at;
        elapsed
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed().num_milliseconds()
    }

    /// Tracing span carrying the scan's correlation fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "scan",
            scan_id = %self.scan_id,
            target = %self.target,
            active = self.active,
        )
    }

    /// First eight characters of the scan id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.scan_id.simple().to_string().chars().take(8).collect()
    }
}
