//! SQLite store: device registry, transition log, export watermark.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use netwatch_core::{Device, DeviceStatus, HardwareId, Observation, TransitionEvent};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::{Result, StoreError};

/// Thread-safe handle to the netwatch database.
///
/// Clone is cheap (inner Arc). The monitor runs a single cycle at a time, so
/// the mutex only arbitrates between the cycle and the exporter's reads.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

/// Outcome of a registry upsert.
pub struct Upserted {
    pub device: Device,
    /// The initial Online event, present only when the device was created
    /// by this upsert. Written in the same transaction as the insert.
    pub created: Option<TransitionEvent>,
}

impl Store {
    /// Open (and initialize) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        };
        store.initialize()?;
        tracing::info!(path = %store.path.display(), "Store opened");
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                mac         TEXT PRIMARY KEY,
                ip          TEXT NOT NULL,
                hostname    TEXT,
                first_seen  INTEGER NOT NULL,
                last_seen   INTEGER NOT NULL,
                status      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transition_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                mac         TEXT NOT NULL,
                ip          TEXT NOT NULL,
                hostname    TEXT,
                new_status  TEXT NOT NULL,
                timestamp   INTEGER NOT NULL,
                FOREIGN KEY (mac) REFERENCES devices(mac)
            );

            CREATE INDEX IF NOT EXISTS idx_transition_log_timestamp
                ON transition_log(timestamp);

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    // ── Device registry ───────────────────────────────────────────

    /// Create or update the device record for one observation.
    ///
    /// New devices start Online with `first_seen = last_seen = now`; their
    /// initial Online event is written in the same transaction, so the
    /// registry and the log agree from the first row on. Existing devices get
    /// `last_known_ip` and `last_seen` refreshed; the hostname is only
    /// overwritten by a non-empty value. Status of existing devices is never
    /// touched here — flips belong to the presence engine.
    pub fn upsert(
        &self,
        id: &HardwareId,
        obs: &Observation,
        now: DateTime<Utc>,
    ) -> Result<Upserted> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing = query_device(&tx, id)?;
        let upserted = match existing {
            None => {
                let device = Device {
                    id: id.clone(),
                    last_known_ip: obs.ip.clone(),
                    hostname: obs.hostname_or_none().map(String::from),
                    first_seen: now,
                    last_seen: now,
                    status: DeviceStatus::Online,
                };
                tx.execute(
                    "INSERT INTO devices (mac, ip, hostname, first_seen, last_seen, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        device.id.as_str(),
                        device.last_known_ip,
                        device.hostname,
                        device.first_seen.timestamp(),
                        device.last_seen.timestamp(),
                        device.status.as_str(),
                    ],
                )?;
                let event = insert_event(&tx, &device, DeviceStatus::Online, now)?;
                Upserted {
                    device,
                    created: Some(event),
                }
            }
            Some(mut device) => {
                device.last_known_ip = obs.ip.clone();
                if let Some(hostname) = obs.hostname_or_none() {
                    device.hostname = Some(hostname.to_string());
                }
                // last_seen is non-decreasing even if the clock stepped back.
                device.last_seen = device.last_seen.max(now);
                tx.execute(
                    "UPDATE devices SET ip = ?2, hostname = ?3, last_seen = ?4 WHERE mac = ?1",
                    params![
                        device.id.as_str(),
                        device.last_known_ip,
                        device.hostname,
                        device.last_seen.timestamp(),
                    ],
                )?;
                Upserted {
                    device,
                    created: None,
                }
            }
        };

        tx.commit()?;
        Ok(upserted)
    }

    /// Flip a device's status and log the transition, atomically.
    ///
    /// The caller guarantees the flip is a real change; this is what keeps
    /// consecutive events for one device alternating.
    pub fn set_status(
        &self,
        device: &Device,
        new_status: DeviceStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionEvent> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE devices SET status = ?2 WHERE mac = ?1",
            params![device.id.as_str(), new_status.as_str()],
        )?;
        let event = insert_event(&tx, device, new_status, now)?;

        tx.commit()?;
        Ok(event)
    }

    /// Flip every Online device past the liveness window to Offline.
    ///
    /// Devices in `present` were observed this cycle and are skipped
    /// unconditionally: presence in the current scan always wins over a stale
    /// `last_seen`, so a device can never go Offline in the cycle that saw
    /// it. Each flip is its own registry-update-plus-event transaction.
    pub fn mark_stale(
        &self,
        now: DateTime<Utc>,
        liveness_window: Duration,
        present: &HashSet<HardwareId>,
    ) -> Result<Vec<TransitionEvent>> {
        let cutoff = now - liveness_window;
        let candidates: Vec<Device> = self
            .all_devices()?
            .into_iter()
            .filter(|d| {
                d.status == DeviceStatus::Online
                    && d.last_seen.timestamp() <= cutoff.timestamp()
                    && !present.contains(&d.id)
            })
            .collect();

        let mut events = Vec::with_capacity(candidates.len());
        for device in &candidates {
            events.push(self.set_status(device, DeviceStatus::Offline, now)?);
        }
        Ok(events)
    }

    pub fn get_device(&self, id: &HardwareId) -> Result<Option<Device>> {
        let conn = self.lock()?;
        query_device(&conn, id)
    }

    /// Read-only snapshot of the full registry, ordered by identifier.
    pub fn all_devices(&self) -> Result<Vec<Device>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT mac, ip, hostname, first_seen, last_seen, status
             FROM devices ORDER BY mac",
        )?;
        let rows = stmt.query_map([], raw_device)?;

        let mut devices = Vec::new();
        for row in rows {
            devices.push(device_from_raw(row?)?);
        }
        Ok(devices)
    }

    // ── Transition log ────────────────────────────────────────────

    /// All events with `timestamp >= since`, in non-decreasing timestamp
    /// order (append order breaks ties).
    pub fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<TransitionEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT mac, ip, hostname, new_status, timestamp
             FROM transition_log WHERE timestamp >= ?1 ORDER BY timestamp, id",
        )?;
        let rows = stmt.query_map(params![since.timestamp()], raw_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(event_from_raw(row?)?);
        }
        Ok(events)
    }

    /// Fold the full log into latest-status-per-device.
    ///
    /// Consistency check only: the registry's `status` column is the
    /// canonical answer, and this replay must reproduce it exactly.
    pub fn replay_status(&self) -> Result<HashMap<HardwareId, DeviceStatus>> {
        let events = self.events_since(DateTime::<Utc>::MIN_UTC)?;
        let mut statuses = HashMap::new();
        for event in events {
            statuses.insert(event.device_id, event.new_status);
        }
        Ok(statuses)
    }

    // ── Export watermark ──────────────────────────────────────────

    /// Timestamp up to which (exclusive) events have been exported.
    pub fn export_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'export_watermark'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            None => Ok(None),
            Some(raw) => {
                let secs: i64 = raw.parse().map_err(|_| StoreError::Corrupt {
                    table: "meta",
                    column: "value",
                    value: raw.clone(),
                })?;
                Ok(Some(timestamp(secs, "meta")?))
            }
        }
    }

    pub fn set_export_watermark(&self, ts: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('export_watermark', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![ts.timestamp().to_string()],
        )?;
        Ok(())
    }
}

/// Append one transition event inside the caller's transaction.
fn insert_event(
    tx: &Transaction<'_>,
    device: &Device,
    new_status: DeviceStatus,
    now: DateTime<Utc>,
) -> Result<TransitionEvent> {
    let event = TransitionEvent {
        device_id: device.id.clone(),
        ip_at_time: device.last_known_ip.clone(),
        hostname_at_time: device.hostname.clone(),
        new_status,
        timestamp: now,
    };
    tx.execute(
        "INSERT INTO transition_log (mac, ip, hostname, new_status, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.device_id.as_str(),
            event.ip_at_time,
            event.hostname_at_time,
            event.new_status.as_str(),
            event.timestamp.timestamp(),
        ],
    )?;
    Ok(event)
}

fn query_device(conn: &Connection, id: &HardwareId) -> Result<Option<Device>> {
    let raw = conn
        .query_row(
            "SELECT mac, ip, hostname, first_seen, last_seen, status
             FROM devices WHERE mac = ?1",
            params![id.as_str()],
            raw_device,
        )
        .optional()?;
    raw.map(device_from_raw).transpose()
}

type RawDevice = (String, String, Option<String>, i64, i64, String);
type RawEvent = (String, String, Option<String>, String, i64);

fn raw_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDevice> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn raw_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn device_from_raw(raw: RawDevice) -> Result<Device> {
    let (mac, ip, hostname, first_seen, last_seen, status) = raw;
    Ok(Device {
        id: HardwareId::new(&mac),
        last_known_ip: ip,
        hostname,
        first_seen: timestamp(first_seen, "devices")?,
        last_seen: timestamp(last_seen, "devices")?,
        status: parse_status(&status, "devices")?,
    })
}

fn event_from_raw(raw: RawEvent) -> Result<TransitionEvent> {
    let (mac, ip, hostname, new_status, ts) = raw;
    Ok(TransitionEvent {
        device_id: HardwareId::new(&mac),
        ip_at_time: ip,
        hostname_at_time: hostname,
        new_status: parse_status(&new_status, "transition_log")?,
        timestamp: timestamp(ts, "transition_log")?,
    })
}

fn parse_status(raw: &str, table: &'static str) -> Result<DeviceStatus> {
    DeviceStatus::parse(raw).ok_or_else(|| StoreError::Corrupt {
        table,
        column: "status",
        value: raw.to_string(),
    })
}

fn timestamp(secs: i64, table: &'static str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| StoreError::Corrupt {
        table,
        column: "timestamp",
        value: secs.to_string(),
    })
}
