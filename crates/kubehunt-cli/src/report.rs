//! Scan report: collection of findings off the bus and rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubehunt_events::{
    Category, DeliveryFailure, EventBus, EventBusBuilder, EventKind, EventSubscriber, HuntEvent,
    Identity, SubscriberResult,
};
use serde::Serialize;
use uuid::Uuid;

use crate::theme::Theme;

/// Output format for the scan report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Colored, human-readable.
    Pretty,
    /// One JSON document on stdout.
    Json,
}

impl OutputFormat {
    pub(crate) fn parse(format: &str) -> Self {
        match format {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Subscribes to every derived event kind and keeps what it sees.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReportCollector {
    events: Arc<Mutex<Vec<Arc<HuntEvent>>>>,
}

impl ReportCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register for every kind a hunter can publish.
    pub(crate) fn subscribe_to(&self, builder: &mut EventBusBuilder) {
        let subscriber: Arc<dyn EventSubscriber> = Arc::new(self.clone());
        builder.subscribe_many(EventKind::DERIVED, &subscriber);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<HuntEvent>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Passive-phase aggregates, in arrival order.
    pub(crate) fn finished(&self) -> Vec<Arc<HuntEvent>> {
        self.lock()
            .iter()
            .filter(|e| e.kind() == EventKind::PassiveHuntFinished)
            .cloned()
            .collect()
    }

    /// Classified events as findings, oldest first.
    pub(crate) fn findings(&self) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .lock()
            .iter()
            .filter_map(|e| Finding::from_event(e))
            .collect();
        findings.sort_by_key(|f| f.timestamp);
        findings
    }
}

#[async_trait]
impl EventSubscriber for ReportCollector {
    async fn on_event(&self, event: Arc<HuntEvent>, _bus: &EventBus) -> SubscriberResult {
        self.lock().push(event);
        Ok(())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "report_collector"
    }
}

/// One reported finding.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Finding {
    pub(crate) kind: EventKind,
    pub(crate) name: String,
    pub(crate) category: Category,
    pub(crate) identity: Identity,
    pub(crate) evidence: String,
    pub(crate) source: String,
    pub(crate) timestamp: DateTime<Utc>,
}

impl Finding {
    fn from_event(event: &HuntEvent) -> Option<Self> {
        let category = event.classification()?;
        Some(Self {
            kind: event.kind(),
            name: event.name(),
            category,
            identity: event.identity(),
            evidence: event.evidence(),
            source: event.metadata.source.clone(),
            timestamp: event.metadata.timestamp,
        })
    }
}

/// Everything one scan produced.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScanReport {
    pub(crate) scan_id: Uuid,
    pub(crate) target: String,
    pub(crate) active: bool,
    /// False if the bus was still busy when the settle timeout hit.
    pub(crate) settled: bool,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) elapsed_ms: i64,
    pub(crate) findings: Vec<Finding>,
    pub(crate) hunter_errors: Vec<String>,
    pub(crate) delivery_failures: Vec<DeliveryFailure>,
}

impl ScanReport {
    /// Number of findings per category.
    pub(crate) fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            let count: &mut usize = counts.entry(finding.category.to_string()).or_default();
            *count = count.saturating_add(1);
        }
        counts
    }

    pub(crate) fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Pretty => Ok(self.render_pretty()?),
        }
    }

    fn render_pretty(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        writeln!(out, "{}", Theme::header("kubehunt scan report"))?;
        writeln!(out, "{}", Theme::kv("Target", &self.target))?;
        writeln!(out, "{}", Theme::kv("Scan", &self.scan_id.to_string()))?;
        let mode = if self.active { "active" } else { "passive" };
        writeln!(out, "{}", Theme::kv("Mode", mode))?;
        writeln!(out, "{}", Theme::separator())?;

        if self.findings.is_empty() {
            writeln!(out, "{}", Theme::info("No findings"))?;
        }
        for finding in &self.findings {
            writeln!(out, "[{}] {}", Theme::category(finding.category), finding.name)?;
            if !finding.evidence.is_empty() {
                writeln!(out, "    {}", Theme::dimmed(&finding.evidence))?;
            }
        }

        writeln!(out, "{}", Theme::separator())?;
        for (category, count) in self.category_counts() {
            writeln!(out, "{}", Theme::kv(&category, &count.to_string()))?;
        }

        if !self.settled {
            writeln!(
                out,
                "{}",
                Theme::warning("Some hunters were still running when the scan timed out")
            )?;
        }
        for error in &self.hunter_errors {
            writeln!(out, "{}", Theme::error(error))?;
        }
        for failure in &self.delivery_failures {
            writeln!(
                out,
                "{}",
                Theme::error(&format!(
                    "{} failed on {}: {}",
                    failure.subscriber, failure.kind, failure.reason
                ))
            )?;
        }
        if self.settled && self.hunter_errors.is_empty() && self.delivery_failures.is_empty() {
            writeln!(
                out,
                "{}",
                Theme::success(&format!("Scan completed in {} ms", self.elapsed_ms))
            )?;
        }

        Ok(out)
    }
}
