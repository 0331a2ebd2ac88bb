//! netwatch-core: Shared domain types for the netwatch presence monitor.
//!
//! This crate provides the types shared between the store and the monitor
//! daemon:
//! - Device identity and the Online/Offline status model
//! - Scan observations (ephemeral, one per discovered host per cycle)
//! - Transition events (the append-only presence audit trail)

pub mod events;
pub mod types;

pub use events::TransitionEvent;
pub use types::{Device, DeviceStatus, HardwareId, Observation};
