//! netwatch-monitor: LAN presence monitor daemon.
//!
//! Wraps nmap to ping-sweep a network segment on a schedule, resolves each
//! discovered host to a hardware identity, and runs the presence state
//! machine against the SQLite registry. Status flips land in the append-only
//! transition log and are shipped to InfluxDB.

pub mod config;
pub mod error;
pub mod export;
pub mod nmap_xml;
pub mod presence;
pub mod resolve;
pub mod scanner;
pub mod scheduler;
