//! Cycle scheduling.
//!
//! A cycle is the unit of work: scan, resolve identities, run the presence
//! state machine, export. Cycles never overlap: the daemon loop awaits each
//! cycle inline and skips ticks that fell due while one was running, so a
//! slow scan delays the schedule instead of stacking writers.

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use netwatch_store::Store;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::export::InfluxExporter;
use crate::presence::{self, CycleSummary, ResolvedObservation};
use crate::resolve::ArpResolver;
use crate::scanner::NmapScanner;

/// Execute a single cycle: sweep → resolve → presence → export.
///
/// A scan failure aborts before any store write, leaving state exactly as of
/// the last completed cycle. An export failure is logged and swallowed: the
/// registry and log have already committed, and the watermark makes the
/// exporter retry next cycle.
pub async fn run_cycle(
    scanner: &NmapScanner,
    resolver: &ArpResolver,
    store: &Store,
    exporter: Option<&InfluxExporter>,
    config: &MonitorConfig,
) -> Result<CycleSummary> {
    let now = Utc::now();
    let sweep = scanner.ping_sweep(&config.network, now).await?;

    let mut observations = Vec::with_capacity(sweep.observations.len());
    for observation in sweep.observations {
        let id = resolver.identify(&observation).await;
        observations.push(ResolvedObservation { id, observation });
    }

    let outcome = presence::run_cycle(store, &observations, now, config.liveness_window())?;

    if let Some(exporter) = exporter {
        match exporter.export(store).await {
            Ok(shipped) => {
                tracing::debug!(
                    devices = shipped.devices,
                    events = shipped.events,
                    "Telemetry exported"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Telemetry export failed, will retry next cycle");
            }
        }
    }

    tracing::info!(
        scan_id = %sweep.scan_id,
        target = %sweep.target,
        scanned = outcome.summary.scanned,
        created = outcome.summary.created,
        reconnected = outcome.summary.reconnected,
        went_offline = outcome.summary.went_offline,
        duration_ms = sweep.duration.as_millis(),
        "Cycle complete"
    );

    Ok(outcome.summary)
}

/// Run cycles forever at the configured interval.
///
/// A failed cycle is logged and retried at the next tick; state is exactly
/// as of the last completed cycle.
pub async fn run_daemon(
    scanner: &NmapScanner,
    resolver: &ArpResolver,
    store: &Store,
    exporter: Option<&InfluxExporter>,
    config: &MonitorConfig,
) -> Result<()> {
    let mut ticker = tokio::time::interval(config.scan_interval());
    // Skip-if-busy: a cycle that overruns the interval finishes first and
    // the missed ticks are dropped, never run concurrently.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        target = %config.network,
        interval_secs = config.scan_interval_secs,
        liveness_window_secs = config.liveness_window_secs,
        "Monitor daemon started"
    );

    loop {
        ticker.tick().await;

        if let Err(e) = run_cycle(scanner, resolver, store, exporter, config).await {
            tracing::error!(target = %config.network, error = %e, "Cycle failed");
        }
    }
}
