// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device transport layer. A `Device` is opened fresh for each job and
// owned exclusively by the worker processing that job; it is never
// shared or pooled across jobs.

pub mod dnssd;
pub mod snmp;
pub mod socket;
pub mod usb;

use std::time::Duration;

use async_trait::async_trait;
use pressd_core::{CoreError, DeviceUri, Result};

/// Scheme-agnostic handle a printer worker writes rasterized bytes
/// through. Implementors own whatever scheme-specific state they need
/// (socket fd, USB handle, SNMP session).
#[async_trait]
pub trait DeviceTransport: Send {
    /// Write `data` to the device, returning once it has been accepted
    /// (not necessarily printed).
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes of back-channel data (status query
    /// responses, IEEE-1284 Device ID), bounded by `timeout`.
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Best-effort clean shutdown; errors are logged, not propagated,
    /// since the job has already finished by the time this is called.
    async fn close(&mut self);
}

/// Open a device for the given URI. Never cached — a fresh handle is
/// created for every job.
pub async fn open_device(uri: &DeviceUri, read_timeout: Duration) -> Result<Box<dyn DeviceTransport>> {
    match uri {
        DeviceUri::Socket { host, port } => {
            let transport = socket::SocketTransport::connect(host, *port, read_timeout).await?;
            Ok(Box::new(transport))
        }
        DeviceUri::Usb {
            vendor_id,
            product_id,
            serial,
        } => {
            let opener = usb::UsbTransport::open(*vendor_id, *product_id, serial.as_deref())?;
            let transport = opener.connect().await?;
            Ok(Box::new(transport))
        }
        DeviceUri::DnsSd { instance_name, .. } => {
            let transport = dnssd::DnsSdTransport::resolve_and_connect(instance_name, read_timeout).await?;
            Ok(Box::new(transport))
        }
        DeviceUri::Snmp { host, port } => Err(CoreError::UnsupportedScheme(format!(
            "snmp://{host}:{port}/ carries no print data path; use snmp::get/probe for status only"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snmp_scheme_rejected_for_printing() {
        let uri = DeviceUri::Snmp {
            host: "10.0.0.5".into(),
            port: 161,
        };
        let err = open_device(&uri, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedScheme(_)));
    }
}
