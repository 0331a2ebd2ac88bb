//! Core domain types for presence tracking.
//!
//! A device is identified by its hardware address, not its IP: leases move,
//! MACs (mostly) do not. Everything time-related is `DateTime<Utc>`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identity ──────────────────────────────────────────────────────

/// Hardware identifier for a device, normally a MAC address.
///
/// Stored normalized (uppercase, colon-separated) so that `aa-bb-cc-dd-ee-ff`
/// and `AA:BB:CC:DD:EE:FF` resolve to the same device. When resolution fails
/// entirely the sentinel value [`HardwareId::UNKNOWN`] is used; every
/// unresolved host collapses onto that one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareId(String);

impl HardwareId {
    /// Sentinel identifier for hosts whose MAC could not be resolved.
    pub const UNKNOWN: &'static str = "UNKNOWN";

    /// Build a normalized identifier from a raw MAC string.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().replace('-', ":").to_uppercase())
    }

    /// The sentinel identity for unresolved hosts.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Liveness status of a device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// Parse the stored representation. Unknown strings are rejected rather
    /// than defaulted: a corrupt status column must not silently pass.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Device ────────────────────────────────────────────────────────

/// A tracked device: one row per distinct hardware identifier.
///
/// Devices are never deleted. "No longer on the network" is
/// `status = Offline`, which preserves `first_seen` history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Primary key. Immutable once assigned.
    pub id: HardwareId,
    /// IP from the most recent observation.
    pub last_known_ip: String,
    /// Last-known-good hostname: an empty observation never erases this.
    pub hostname: Option<String>,
    /// Set at creation, never mutated afterwards.
    pub first_seen: DateTime<Utc>,
    /// Timestamp of the most recent observation; non-decreasing.
    pub last_seen: DateTime<Utc>,
    /// Derived from the transition log; owned by the presence engine.
    pub status: DeviceStatus,
}

// ── Observation ───────────────────────────────────────────────────

/// One host seen by one scan. Ephemeral: consumed by the presence engine
/// within the cycle that produced it, never persisted directly.
#[derive(Debug, Clone)]
pub struct Observation {
    pub ip: String,
    /// MAC as reported by the scanner, if it reported one.
    pub mac: Option<String>,
    /// Reverse-DNS name, if any. Empty strings are treated as absent.
    pub hostname: Option<String>,
    pub scan_time: DateTime<Utc>,
}

impl Observation {
    /// Hostname with empty-string observations normalized to `None`.
    pub fn hostname_or_none(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_normalizes() {
        assert_eq!(
            HardwareId::new("aa-bb-cc-dd-ee-ff"),
            HardwareId::new("AA:BB:CC:DD:EE:FF")
        );
        assert_eq!(HardwareId::new(" aa:bb:cc:dd:ee:ff ").as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn sentinel_identity() {
        let id = HardwareId::unknown();
        assert!(id.is_unknown());
        assert!(!HardwareId::new("aa:bb:cc:dd:ee:ff").is_unknown());
        // Two unresolved hosts collapse onto the same identity.
        assert_eq!(HardwareId::unknown(), HardwareId::unknown());
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [DeviceStatus::Online, DeviceStatus::Offline] {
            assert_eq!(DeviceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeviceStatus::parse("flapping"), None);
    }

    #[test]
    fn status_serde_is_lowercase() {
        let json = serde_json::to_string(&DeviceStatus::Online).unwrap();
        assert_eq!(json, "\"online\"");
    }

    #[test]
    fn empty_hostname_is_absent() {
        let obs = Observation {
            ip: "10.0.0.5".to_string(),
            mac: None,
            hostname: Some(String::new()),
            scan_time: Utc::now(),
        };
        assert_eq!(obs.hostname_or_none(), None);
    }
}
