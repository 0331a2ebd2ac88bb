//! Identity resolution: map an observed IP to a hardware identifier.
//!
//! Fallback chain: MAC reported by the scanner itself (privileged scans see
//! ARP replies directly), then the kernel ARP table, then an `arp -n`
//! subprocess. Resolution is best-effort and never fails the cycle; a host
//! that defeats the whole chain is tracked under the sentinel identity.

use std::path::PathBuf;

use netwatch_core::{HardwareId, Observation};
use tokio::process::Command;

const PROC_NET_ARP: &str = "/proc/net/arp";
const NULL_MAC: &str = "00:00:00:00:00:00";

/// Best-effort MAC resolver backed by the system ARP table.
pub struct ArpResolver {
    proc_path: PathBuf,
}

impl ArpResolver {
    pub fn new() -> Self {
        Self {
            proc_path: PathBuf::from(PROC_NET_ARP),
        }
    }

    /// Resolve one observation to its hardware identity.
    pub async fn identify(&self, obs: &Observation) -> HardwareId {
        if let Some(mac) = &obs.mac {
            return HardwareId::new(mac);
        }
        match self.resolve(&obs.ip).await {
            Some(mac) => HardwareId::new(&mac),
            None => {
                tracing::debug!(ip = %obs.ip, "MAC resolution failed, using sentinel identity");
                HardwareId::unknown()
            }
        }
    }

    /// Look up an IP in the ARP table, trying `/proc/net/arp` first and an
    /// `arp -n <ip>` subprocess second.
    pub async fn resolve(&self, ip: &str) -> Option<String> {
        if let Ok(contents) = tokio::fs::read_to_string(&self.proc_path).await {
            if let Some(mac) = lookup_proc_arp(&contents, ip) {
                return Some(mac);
            }
        }

        let output = Command::new("arp").arg("-n").arg(ip).output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        parse_arp_output(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for ArpResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the MAC for `ip` in `/proc/net/arp` contents.
///
/// Columns: IP address, HW type, Flags, HW address, Mask, Device. Entries
/// with the null MAC are incomplete and treated as unresolved.
fn lookup_proc_arp(contents: &str, ip: &str) -> Option<String> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let entry_ip = fields.next()?;
            let mac = fields.nth(2)?;
            (entry_ip == ip && mac != NULL_MAC).then(|| mac.to_string())
        })
        .next()
}

/// Extract the MAC from `arp -n <ip>` output (third column of the last line).
fn parse_arp_output(output: &str) -> Option<String> {
    let line = output.trim().lines().last()?;
    let mac = line.split_whitespace().nth(2)?;
    // "no entry" responses and incomplete entries have no MAC in that column.
    mac.contains(':').then(|| mac.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_ARP: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.0.1      0x1         0x2         aa:bb:cc:dd:ee:01     *        eth0
192.168.0.50     0x1         0x0         00:00:00:00:00:00     *        eth0
192.168.0.23     0x1         0x2         aa:bb:cc:dd:ee:23     *        wlan0
";

    #[test]
    fn proc_arp_lookup_finds_entry() {
        assert_eq!(
            lookup_proc_arp(PROC_ARP, "192.168.0.23"),
            Some("aa:bb:cc:dd:ee:23".to_string())
        );
    }

    #[test]
    fn proc_arp_lookup_rejects_incomplete_entry() {
        assert_eq!(lookup_proc_arp(PROC_ARP, "192.168.0.50"), None);
    }

    #[test]
    fn proc_arp_lookup_misses_unknown_ip() {
        assert_eq!(lookup_proc_arp(PROC_ARP, "192.168.0.200"), None);
    }

    #[test]
    fn arp_command_output_parses() {
        let output = "\
Address                  HWtype  HWaddress           Flags Mask            Iface
192.168.0.1              ether   aa:bb:cc:dd:ee:01   C                     eth0
";
        assert_eq!(
            parse_arp_output(output),
            Some("aa:bb:cc:dd:ee:01".to_string())
        );
    }

    #[test]
    fn arp_command_no_entry_yields_none() {
        assert_eq!(parse_arp_output("192.168.0.77 (192.168.0.77) -- no entry\n"), None);
    }
}
