//! Telemetry export to InfluxDB 1.x over the HTTP line protocol.
//!
//! Ships the current registry snapshot (`active_devices` measurement) and
//! any transition events newer than the export watermark (`connection_log`
//! measurement). Delivery is at-least-once: the watermark only advances
//! after a successful write, and a duplicated point with identical tags and
//! timestamp is idempotent on the Influx side.
//!
//! Export failure never rolls back the registry or the log; the cycle has
//! already committed by the time this runs.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use netwatch_core::{Device, DeviceStatus, TransitionEvent};
use netwatch_store::Store;
use reqwest::Client;

use crate::config::InfluxConfig;
use crate::error::Result;

/// InfluxDB export sink.
pub struct InfluxExporter {
    client: Client,
    url: String,
    database: String,
    /// Network tag attached to every point, so one Influx database can hold
    /// several monitored segments.
    network: String,
    /// Whether `CREATE DATABASE` has succeeded yet. The sink being down at
    /// startup must not stop presence tracking, so creation is retried
    /// lazily on export until it goes through.
    database_ready: AtomicBool,
}

/// What one export shipped.
#[derive(Debug)]
pub struct ExportSummary {
    pub devices: usize,
    pub events: usize,
}

impl InfluxExporter {
    pub fn new(config: &InfluxConfig, network: &str) -> Self {
        Self {
            client: Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            network: network.to_string(),
            database_ready: AtomicBool::new(false),
        }
    }

    /// Create the target database if it does not exist yet.
    pub async fn ensure_database(&self) -> Result<()> {
        self.client
            .post(format!("{}/query", self.url))
            .form(&[("q", format!("CREATE DATABASE \"{}\"", self.database))])
            .send()
            .await?
            .error_for_status()?;
        self.database_ready.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Export the registry snapshot plus all events past the watermark.
    ///
    /// The watermark is persisted in the store and only advanced once the
    /// write succeeded, so a failed export is retried wholesale next cycle.
    pub async fn export(&self, store: &Store) -> Result<ExportSummary> {
        if !self.database_ready.load(Ordering::Relaxed) {
            self.ensure_database().await?;
        }

        let devices = store.all_devices()?;
        let since = store
            .export_watermark()?
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let events = store.events_since(since)?;

        let mut lines = Vec::with_capacity(devices.len() + events.len());
        for device in &devices {
            lines.push(device_line(device, &self.network));
        }
        for event in &events {
            lines.push(event_line(event, &self.network));
        }

        if lines.is_empty() {
            return Ok(ExportSummary {
                devices: 0,
                events: 0,
            });
        }

        self.client
            .post(format!("{}/write", self.url))
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(lines.join("\n"))
            .send()
            .await?
            .error_for_status()?;

        if let Some(last) = events.last() {
            store.set_export_watermark(last.timestamp)?;
        }

        Ok(ExportSummary {
            devices: devices.len(),
            events: events.len(),
        })
    }
}

/// One `active_devices` point per device, timestamped at its last_seen.
fn device_line(device: &Device, network: &str) -> String {
    let mut tags = format!(
        "mac={},ip={},network={}",
        escape_tag(device.id.as_str()),
        escape_tag(&device.last_known_ip),
        escape_tag(network),
    );
    if let Some(hostname) = &device.hostname {
        tags.push_str(&format!(",hostname={}", escape_tag(hostname)));
    }

    format!(
        "active_devices,{tags} status=\"{}\",online={}i,first_seen={}i,last_seen={}i {}",
        device.status,
        (device.status == DeviceStatus::Online) as u8,
        device.first_seen.timestamp(),
        device.last_seen.timestamp(),
        device.last_seen.timestamp(),
    )
}

/// One `connection_log` point per transition event.
fn event_line(event: &TransitionEvent, network: &str) -> String {
    let mut tags = format!(
        "mac={},connection_status={},network={}",
        escape_tag(event.device_id.as_str()),
        event.new_status,
        escape_tag(network),
    );
    if let Some(hostname) = &event.hostname_at_time {
        tags.push_str(&format!(",hostname={}", escape_tag(hostname)));
    }

    format!(
        "connection_log,{tags} ip=\"{}\" {}",
        escape_field(&event.ip_at_time),
        event.timestamp.timestamp(),
    )
}

/// Escape a tag value: commas, spaces, and equals signs.
fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('=', "\\=")
}

/// Escape a string field value: backslashes and double quotes.
fn escape_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::HardwareId;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn device_line_format() {
        let device = Device {
            id: HardwareId::new("aa:bb:cc:dd:ee:01"),
            last_known_ip: "192.168.0.23".to_string(),
            hostname: Some("nas.local".to_string()),
            first_seen: t(100),
            last_seen: t(200),
            status: DeviceStatus::Online,
        };

        assert_eq!(
            device_line(&device, "192.168.0.0/24"),
            "active_devices,mac=AA:BB:CC:DD:EE:01,ip=192.168.0.23,network=192.168.0.0/24,\
             hostname=nas.local status=\"online\",online=1i,first_seen=100i,last_seen=200i 200"
        );
    }

    #[test]
    fn device_line_without_hostname_omits_tag() {
        let device = Device {
            id: HardwareId::new("aa:bb:cc:dd:ee:01"),
            last_known_ip: "192.168.0.23".to_string(),
            hostname: None,
            first_seen: t(100),
            last_seen: t(200),
            status: DeviceStatus::Offline,
        };

        let line = device_line(&device, "192.168.0.0/24");
        assert!(!line.contains("hostname="));
        assert!(line.contains("status=\"offline\",online=0i"));
    }

    #[test]
    fn event_line_format() {
        let event = TransitionEvent {
            device_id: HardwareId::new("aa:bb:cc:dd:ee:01"),
            ip_at_time: "192.168.0.23".to_string(),
            hostname_at_time: None,
            new_status: DeviceStatus::Offline,
            timestamp: t(65),
        };

        assert_eq!(
            event_line(&event, "192.168.0.0/24"),
            "connection_log,mac=AA:BB:CC:DD:EE:01,connection_status=offline,\
             network=192.168.0.0/24 ip=\"192.168.0.23\" 65"
        );
    }

    #[test]
    fn tag_values_are_escaped() {
        assert_eq!(escape_tag("a b,c=d"), "a\\ b\\,c\\=d");
        assert_eq!(escape_field("say \"hi\""), "say \\\"hi\\\"");
    }

    #[tokio::test]
    async fn unreachable_sink_errors_without_touching_state() {
        use netwatch_core::Observation;

        let store = Store::in_memory().unwrap();
        store
            .upsert(
                &HardwareId::new("aa:bb:cc:dd:ee:01"),
                &Observation {
                    ip: "192.168.0.23".to_string(),
                    mac: None,
                    hostname: None,
                    scan_time: t(100),
                },
                t(100),
            )
            .unwrap();

        // Nothing listens here: every request fails with a connect error.
        let config = crate::config::InfluxConfig {
            enabled: true,
            url: "http://127.0.0.1:9".to_string(),
            database: "netwatch_test".to_string(),
        };
        let exporter = InfluxExporter::new(&config, "192.168.0.0/24");

        // The error surfaces as a plain Err for the cycle runner to log;
        // the watermark stays put so nothing is skipped later.
        assert!(exporter.export(&store).await.is_err());
        assert!(store.export_watermark().unwrap().is_none());

        // The exporter stays usable for the next cycle's retry.
        assert!(exporter.export(&store).await.is_err());
        assert!(store.export_watermark().unwrap().is_none());
    }
}
