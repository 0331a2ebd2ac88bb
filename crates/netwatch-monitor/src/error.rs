//! Error types for the netwatch-monitor crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    #[error("Store error: {0}")]
    Store(#[from] netwatch_store::StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    Export(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
