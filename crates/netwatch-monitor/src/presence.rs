//! The presence state machine.
//!
//! Converts one cycle's observation set plus the registry's prior state into
//! per-device Online/Offline status and a list of transition events. Each
//! device is a two-state machine that starts Online at creation (it was just
//! observed) and runs forever; there is no terminal state and no deletion.
//!
//! Debounce rule: absence from a scan is never sufficient to go Offline.
//! Only silence past the liveness window counts, and a device observed in
//! the current cycle can never flip Offline in that same cycle.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use netwatch_core::{DeviceStatus, HardwareId, Observation, TransitionEvent};
use netwatch_store::Store;

use crate::error::Result;

/// An observation paired with its resolved hardware identity.
#[derive(Debug, Clone)]
pub struct ResolvedObservation {
    pub id: HardwareId,
    pub observation: Observation,
}

/// What one cycle did, for logging and export.
#[derive(Debug, Default)]
pub struct CycleSummary {
    /// Hosts in this cycle's observation set.
    pub scanned: usize,
    /// Devices created (first observation ever).
    pub created: usize,
    /// Offline devices flipped back Online.
    pub reconnected: usize,
    /// Online devices flipped Offline by the liveness window.
    pub went_offline: usize,
}

/// Outcome of one presence cycle.
pub struct CycleOutcome {
    /// All transition events generated this cycle, in timestamp order.
    pub events: Vec<TransitionEvent>,
    pub summary: CycleSummary,
}

/// Run one presence cycle against the registry.
///
/// 1. Upsert every observation; newly created devices start Online and log
///    their initial Online event.
/// 2. Any observed device that was Offline flips Online exactly once (the
///    reconnect transition). A device that stays Online across cycles emits
///    nothing.
/// 3. Every Online device absent from this cycle and silent past the
///    liveness window flips Offline.
///
/// Each flip pairs its registry update with its log append in one store
/// transaction, so a crash mid-cycle never leaves the two in disagreement.
/// An empty observation set needs no special handling: steps 1 and 2 are
/// vacuous and step 3 ages out whatever the window says.
pub fn run_cycle(
    store: &Store,
    observations: &[ResolvedObservation],
    now: DateTime<Utc>,
    liveness_window: Duration,
) -> Result<CycleOutcome> {
    let mut events = Vec::new();
    let mut summary = CycleSummary {
        scanned: observations.len(),
        ..CycleSummary::default()
    };
    let mut present: HashSet<HardwareId> = HashSet::new();

    for resolved in observations {
        let upserted = store.upsert(&resolved.id, &resolved.observation, now)?;
        present.insert(resolved.id.clone());

        if let Some(initial) = upserted.created {
            summary.created += 1;
            events.push(initial);
            continue;
        }

        // Reconnect: the upsert re-reads the registry row, so a second
        // observation of the same device within one scan sees Online and
        // does not re-emit.
        if upserted.device.status == DeviceStatus::Offline {
            let event = store.set_status(&upserted.device, DeviceStatus::Online, now)?;
            summary.reconnected += 1;
            events.push(event);
        }
    }

    let offline = store.mark_stale(now, liveness_window, &present)?;
    summary.went_offline = offline.len();
    events.extend(offline);

    // All of this cycle's events carry the same `now`; the sort keeps the
    // contract explicit and stable for callers appending to the export feed.
    events.sort_by_key(|e| e.timestamp);

    Ok(CycleOutcome { events, summary })
}
