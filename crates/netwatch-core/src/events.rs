//! Transition events: the append-only presence audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceStatus, HardwareId};

/// A single logged status flip for one device.
///
/// Events are immutable once written. For any one device, consecutive events
/// strictly alternate between Online and Offline; the registry's current
/// `status` always equals the `new_status` of the device's latest event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionEvent {
    pub device_id: HardwareId,
    /// The device's IP at the moment of the flip.
    pub ip_at_time: String,
    /// The device's hostname at the moment of the flip, if known.
    pub hostname_at_time: Option<String>,
    pub new_status: DeviceStatus,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = TransitionEvent {
            device_id: HardwareId::new("aa:bb:cc:dd:ee:ff"),
            ip_at_time: "192.168.0.23".to_string(),
            hostname_at_time: Some("nas.local".to_string()),
            new_status: DeviceStatus::Offline,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
