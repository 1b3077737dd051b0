// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// System-wide configuration. Loading from a config file or the environment
// is out of scope (an external collaborator, per the framework's purpose);
// this struct and its defaults are the contract that loader is expected to
// populate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Every tunable named across the core's component design.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Directory holding spooled job bodies, TLS key material, and persisted
    /// system state (`<spooldir>/j<id>.bin`, `<hostname>.key`, `state`).
    pub spool_dir: String,

    /// Maximum events retained per subscription ring before the oldest is
    /// dropped. Surfaced as a config knob rather than a compile-time
    /// constant per the Design Notes' open question.
    pub max_events: usize,

    /// How long `device::read` blocks before returning a timeout.
    pub device_read_timeout: Duration,

    /// How long the printer worker sleeps between retries of a device that
    /// failed to open.
    pub device_retry_interval: Duration,

    /// Total SNMP broadcast discovery window.
    pub snmp_discovery_timeout: Duration,

    /// Per-select timeout during SNMP discovery.
    pub snmp_select_timeout: Duration,

    /// DNS-SD browse window, ended early once the discovered-device count is
    /// stable across `dnssd_stability_window`.
    pub dnssd_discovery_timeout: Duration,
    pub dnssd_stability_window: Duration,

    /// Maximum time `Get-Notifications notify-wait=true` blocks.
    pub notification_wait_timeout: Duration,

    /// Idle timeout for keep-alive HTTP connections.
    pub http_keepalive_idle: Duration,

    /// How long after a printer's last job before its device is closed.
    pub device_idle_close: Duration,

    /// Default listen port for the IPP/HTTP service.
    pub listen_port: u16,

    /// Whether the system may serve admin operations over plain HTTP to
    /// remote (non-localhost) clients when no password/group is configured.
    pub allow_tls_optional: bool,

    /// Group whose members may perform admin operations.
    pub admin_group: String,

    /// Group whose members may submit/manage jobs.
    pub print_group: String,

    /// Session key rotation period, used to derive CSRF tokens.
    pub session_key_rotation: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            spool_dir: "/var/spool/pressd".into(),
            max_events: 100,
            device_read_timeout: Duration::from_secs(10),
            device_retry_interval: Duration::from_secs(5),
            snmp_discovery_timeout: Duration::from_secs(30),
            snmp_select_timeout: Duration::from_secs(2),
            dnssd_discovery_timeout: Duration::from_secs(10),
            dnssd_stability_window: Duration::from_millis(250),
            notification_wait_timeout: Duration::from_secs(30),
            http_keepalive_idle: Duration::from_secs(30),
            device_idle_close: Duration::from_secs(60),
            listen_port: 631,
            allow_tls_optional: false,
            admin_group: "lpadmin".into(),
            print_group: "lp".into(),
            session_key_rotation: Duration::from_secs(24 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SystemConfig::default();
        assert_eq!(cfg.max_events, 100);
        assert_eq!(cfg.listen_port, 631);
        assert_eq!(cfg.device_read_timeout, Duration::from_secs(10));
        assert_eq!(cfg.notification_wait_timeout, Duration::from_secs(30));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = SystemConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_events, cfg.max_events);
        assert_eq!(back.spool_dir, cfg.spool_dir);
    }
}
