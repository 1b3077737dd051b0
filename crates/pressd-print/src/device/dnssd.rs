// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `dnssd://` transport: resolve a single named service instance via
// mDNS-SD and hand off to a raw socket connection. Used when a job
// targets a printer by its advertised instance name rather than a
// fixed host/port.

use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use pressd_core::{CoreError, Result};
use tracing::{debug, info};

use super::socket::SocketTransport;
use super::DeviceTransport;

/// Service type browsed when a device URI names an instance without a
/// fully-qualified service type (`dnssd://Canon-MX-920.local./`
/// resolves against `_pdl-datastream._tcp.local.`, the raw AppSocket
/// service IPP Everywhere devices advertise alongside `_ipp._tcp`).
const PDL_DATASTREAM_SERVICE: &str = "_pdl-datastream._tcp.local.";

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DnsSdTransport {
    inner: SocketTransport,
}

impl DnsSdTransport {
    pub async fn resolve_and_connect(instance_name: &str, read_timeout: Duration) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| CoreError::Discovery(format!("failed to start mDNS daemon: {e}")))?;

        let receiver = daemon
            .browse(PDL_DATASTREAM_SERVICE)
            .map_err(|e| CoreError::Discovery(format!("browse {PDL_DATASTREAM_SERVICE}: {e}")))?;

        let deadline = tokio::time::Instant::now() + RESOLVE_TIMEOUT;
        let target = instance_name.to_ascii_lowercase();

        let resolved = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                let _ = daemon.shutdown();
                return Err(CoreError::Discovery(format!(
                    "timed out resolving dnssd instance {instance_name}"
                )));
            }

            let event = {
                let receiver = receiver.clone();
                tokio::task::spawn_blocking(move || receiver.recv_timeout(remaining))
                    .await
                    .map_err(|e| CoreError::Discovery(format!("mDNS listener task failed: {e}")))?
            };

            match event {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    let fullname = info.get_fullname().to_ascii_lowercase();
                    if fullname.starts_with(&target) {
                        break info;
                    }
                    debug!(fullname, "skipping non-matching resolved service");
                }
                Ok(_) => continue,
                Err(_) => {
                    let _ = daemon.shutdown();
                    return Err(CoreError::Discovery(format!(
                        "mDNS channel closed before resolving {instance_name}"
                    )));
                }
            }
        };

        let ip = resolved
            .get_addresses()
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| resolved.get_addresses().iter().next())
            .copied()
            .ok_or_else(|| CoreError::Discovery(format!("no address for {instance_name}")))?;
        let port = resolved.get_port();

        let _ = daemon.stop_browse(PDL_DATASTREAM_SERVICE);
        let _ = daemon.shutdown();

        info!(instance_name, %ip, port, "resolved dnssd instance");
        let inner = SocketTransport::connect(&ip.to_string(), port, read_timeout).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl DeviceTransport for DnsSdTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.inner.read(buf, timeout).await
    }

    async fn close(&mut self) {
        self.inner.close().await
    }
}
