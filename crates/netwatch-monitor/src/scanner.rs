//! Nmap process wrapper.
//!
//! Executes a ping sweep (`nmap -sn`) as a child process via
//! `tokio::process::Command` and turns the XML output into observations.
//! A scan either yields the full host list or fails as a unit; partial
//! output is never consumed.

use std::time::Instant;

use chrono::{DateTime, Utc};
use netwatch_core::Observation;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::nmap_xml;

/// Result of a single ping sweep.
pub struct SweepResult {
    /// Unique ID for this scan run.
    pub scan_id: Uuid,
    /// The target CIDR expression.
    pub target: String,
    /// One observation per host that answered, in scan order.
    pub observations: Vec<Observation>,
    /// Wall-clock duration of the scan.
    pub duration: std::time::Duration,
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
}

impl NmapScanner {
    pub fn new(nmap_path: &str) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| MonitorError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        String::from_utf8(output.stdout).map_err(|e| MonitorError::XmlParse(e.to_string()))
    }

    /// Run a ping sweep against the given target.
    ///
    /// Nmap is invoked with `-sn -oX -` so XML lands on stdout. The process
    /// runs under `tokio::process::Command` and does not block the runtime.
    pub async fn ping_sweep(&self, target: &str, scan_time: DateTime<Utc>) -> Result<SweepResult> {
        let scan_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::info!(
            scan_id = %scan_id,
            target = %target,
            "Starting ping sweep"
        );

        let output = Command::new(&self.nmap_path)
            .arg("-sn")
            .arg("-oX")
            .arg("-")
            .arg(target)
            .output()
            .await
            .map_err(|e| MonitorError::NmapNotFound {
                path: format!("{}: {e}", self.nmap_path),
            })?;

        let duration = start.elapsed();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(MonitorError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let nmap_run = nmap_xml::parse_nmap_xml(&output.stdout)?;
        let observations = observations_from_run(&nmap_run, scan_time);

        tracing::info!(
            scan_id = %scan_id,
            target = %target,
            hosts_up = observations.len(),
            duration_ms = duration.as_millis(),
            "Ping sweep complete"
        );

        Ok(SweepResult {
            scan_id,
            target: target.to_string(),
            observations,
            duration,
        })
    }
}

/// Convert a parsed nmap run into observations, one per host that is up
/// and has an IPv4 address.
pub fn observations_from_run(run: &nmap_xml::NmapRun, scan_time: DateTime<Utc>) -> Vec<Observation> {
    run.hosts
        .iter()
        .filter(|h| h.is_up())
        .filter_map(|h| {
            Some(Observation {
                ip: h.ipv4()?.to_string(),
                mac: h.mac().map(String::from),
                hostname: h.hostname().map(String::from),
                scan_time,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmap_xml::parse_nmap_xml;

    #[test]
    fn down_hosts_and_ipv6_only_hosts_are_skipped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap">
  <host>
    <status state="up"/>
    <address addr="192.168.0.7" addrtype="ipv4"/>
    <address addr="AA:BB:CC:DD:EE:07" addrtype="mac"/>
  </host>
  <host>
    <status state="down"/>
    <address addr="192.168.0.8" addrtype="ipv4"/>
  </host>
  <host>
    <status state="up"/>
    <address addr="fe80::1" addrtype="ipv6"/>
  </host>
</nmaprun>"#;

        let run = parse_nmap_xml(xml.as_bytes()).unwrap();
        let observations = observations_from_run(&run, Utc::now());

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].ip, "192.168.0.7");
        assert_eq!(observations[0].mac.as_deref(), Some("AA:BB:CC:DD:EE:07"));
        assert_eq!(observations[0].hostname, None);
    }
}
