//! netwatch-store: SQLite persistence for the device registry and
//! transition log.
//!
//! The registry is a materialized view of the transition log's latest state
//! per device. Every status flip writes the registry UPDATE and the log
//! INSERT inside one SQLite transaction, so the two can never disagree.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{Store, Upserted};
