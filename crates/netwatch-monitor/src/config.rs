//! Configuration for the netwatch presence monitor.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use ipnet::IpNet;
use serde::Deserialize;

use crate::error::{MonitorError, Result};

/// Top-level monitor configuration.
///
/// Loaded from `netwatch.toml` `[monitor]` section or
/// `NETWATCH_MONITOR__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Network segment to sweep, in CIDR notation.
    #[serde(default = "default_network")]
    pub network: String,

    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Maximum silence in seconds before an Online device is declared
    /// Offline.
    #[serde(default = "default_liveness_window")]
    pub liveness_window_secs: u64,

    /// Seconds between scheduled cycles in daemon mode.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// SQLite database path. Derived from the network when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Telemetry export sink.
    #[serde(default)]
    pub influx: InfluxConfig,
}

/// InfluxDB 1.x export sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    /// Whether export is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the InfluxDB HTTP API.
    #[serde(default = "default_influx_url")]
    pub url: String,

    /// Target database, created on startup if missing.
    #[serde(default = "default_influx_database")]
    pub database: String,
}

impl MonitorConfig {
    /// Validate the network target and return it parsed.
    pub fn target(&self) -> Result<IpNet> {
        self.network
            .parse()
            .map_err(|_| MonitorError::InvalidTarget(self.network.clone()))
    }

    /// The liveness window as a chrono duration.
    pub fn liveness_window(&self) -> Duration {
        Duration::seconds(self.liveness_window_secs as i64)
    }

    /// The scan interval as a std duration, for the tokio ticker.
    pub fn scan_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.scan_interval_secs)
    }

    /// Database path: explicit, or derived from the network like
    /// `network_monitor_192.168.0.0_24.db`.
    pub fn database_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "network_monitor_{}.db",
                self.network.replace('/', "_")
            ))
        })
    }
}

fn default_network() -> String {
    "192.168.0.0/24".to_string()
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_liveness_window() -> u64 {
    60
}

fn default_scan_interval() -> u64 {
    300
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_influx_database() -> String {
    "network_monitor".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            nmap_path: default_nmap_path(),
            liveness_window_secs: default_liveness_window(),
            scan_interval_secs: default_scan_interval(),
            db_path: None,
            influx: InfluxConfig::default(),
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            url: default_influx_url(),
            database: default_influx_database(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.network, "192.168.0.0/24");
        assert_eq!(config.nmap_path, "nmap");
        assert_eq!(config.liveness_window_secs, 60);
        assert_eq!(config.scan_interval_secs, 300);
        assert!(config.influx.enabled);
    }

    #[test]
    fn test_target_validation() {
        let mut config = MonitorConfig::default();
        assert!(config.target().is_ok());

        config.network = "not-a-cidr".to_string();
        assert!(matches!(
            config.target(),
            Err(MonitorError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_derived_database_path() {
        let config = MonitorConfig::default();
        assert_eq!(
            config.database_path(),
            PathBuf::from("network_monitor_192.168.0.0_24.db")
        );

        let explicit = MonitorConfig {
            db_path: Some(PathBuf::from("/var/lib/netwatch/netwatch.db")),
            ..MonitorConfig::default()
        };
        assert_eq!(
            explicit.database_path(),
            PathBuf::from("/var/lib/netwatch/netwatch.db")
        );
    }
}
