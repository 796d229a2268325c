//! `kubehunt scan`: seed the bus, run the hunters, collect the report.

use std::path::Path;

use anyhow::{Context, Result, bail};
use kubehunt_config::{Config, CredentialsSection};
use kubehunt_events::{DeliveryFailure, EventBus, HuntEvent, Target};
use kubehunt_hunters::{
    ActiveAuthorization, ApiClient, ApiServerActiveHunter, ClientConfig, register_passive_hunters,
};
use kubehunt_telemetry::ScanContext;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{Instrument, debug, info, warn};

use crate::report::{ReportCollector, ScanReport};

/// Command-line options for one scan.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScanOptions {
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) protocol: Option<String>,
    pub(crate) token: Option<String>,
    pub(crate) active: bool,
}

/// Scan one API server and return the report.
///
/// Active probes run only when `--active` is passed or `active.enabled`
/// is set, once per passive-phase aggregate.
pub(crate) async fn run_scan(options: ScanOptions, config: &Config) -> Result<ScanReport> {
    let target = build_target(&options, config)?;
    let credential = resolve_credential(options.token, &config.credentials);
    let authorization = if options.active {
        ActiveAuthorization::from_flag(true, "--active flag")
    } else {
        ActiveAuthorization::from_flag(config.active.enabled, "active.enabled in configuration")
    };

    let client = ApiClient::new(&client_config(config)).context("failed to build HTTP client")?;
    let collector = ReportCollector::new();
    let mut builder = EventBus::builder();
    register_passive_hunters(&mut builder, &client);
    collector.subscribe_to(&mut builder);
    let bus = builder.build()?;
    let mut failures = bus.failures();

    let context = ScanContext::new(target.to_string()).with_active(authorization.is_some());
    let settle = config.settle_timeout();
    let seed = HuntEvent::seed(target, credential).with_scan_id(context.scan_id);

    let (settled, hunter_errors) = async {
        info!("Publishing seed event");
        bus.publish(seed);
        let mut settled = bus.wait_idle(settle).await;
        if !settled {
            warn!(timeout_ms = config.scan.settle_timeout_ms, "Passive phase did not settle");
        }

        let mut hunter_errors = Vec::new();
        if let Some(authorization) = &authorization {
            for aggregate in collector.finished() {
                let hunter = ApiServerActiveHunter::new(
                    aggregate,
                    client.clone(),
                    authorization,
                    config.active.namespace_prefix.clone(),
                )?;
                if let Err(e) = hunter.execute(&bus).await {
                    warn!(error = %e, "Active hunter failed");
                    hunter_errors.push(format!("{}: {e}", ApiServerActiveHunter::NAME));
                }
            }
            settled &= bus.wait_idle(settle).await;
        }
        Ok::<_, anyhow::Error>((settled, hunter_errors))
    }
    .instrument(context.span())
    .await?;

    Ok(ScanReport {
        scan_id: context.scan_id,
        target: context.target.clone(),
        active: context.active,
        settled,
        started_at: context.started_at,
        elapsed_ms: context.elapsed_ms(),
        findings: collector.findings(),
        hunter_errors,
        delivery_failures: drain_failures(&mut failures),
    })
}

fn build_target(options: &ScanOptions, config: &Config) -> Result<Target> {
    if options.host.trim().is_empty() {
        bail!("--host must not be empty");
    }
    let protocol = options
        .protocol
        .clone()
        .unwrap_or_else(|| config.scan.default_protocol.clone());
    if !matches!(protocol.as_str(), "http" | "https") {
        bail!("unsupported protocol '{protocol}'; expected http or https");
    }
    let port = options.port.unwrap_or(config.scan.default_port);
    Ok(Target::new(options.host.trim(), Some(port), protocol))
}

fn client_config(config: &Config) -> ClientConfig {
    ClientConfig::default()
        .with_timeout(config.http_timeout())
        .with_accept_invalid_certs(config.http.accept_invalid_certs)
        .with_user_agent(format!("{}/{}", config.http.user_agent, env!("CARGO_PKG_VERSION")))
}

/// Pick the credential: `--token`, then the configured token, then the
/// token file if it exists. Blank tokens count as none.
pub(crate) fn resolve_credential(
    flag: Option<String>,
    credentials: &CredentialsSection,
) -> Option<String> {
    if let Some(token) = non_blank(flag) {
        debug!("Using token from --token");
        return Some(token);
    }
    if let Some(token) = non_blank(credentials.token.clone()) {
        debug!("Using token from configuration");
        return Some(token);
    }
    credentials.token_file_path().and_then(|path| read_token_file(&path))
}

fn read_token_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let token = non_blank(Some(contents));
            if token.is_none() {
                warn!(path = %path.display(), "Token file is empty; scanning anonymously");
            } else {
                debug!(path = %path.display(), "Using token file");
            }
            token
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No token file; scanning anonymously");
            None
        },
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Token file unreadable; scanning anonymously"
            );
            None
        },
    }
}

fn non_blank(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
}

fn drain_failures(failures: &mut broadcast::Receiver<DeliveryFailure>) -> Vec<DeliveryFailure> {
    let mut drained = Vec::new();
    loop {
        match failures.try_recv() {
            Ok(failure) => drained.push(failure),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Delivery failures were dropped");
            },
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    drained
}
