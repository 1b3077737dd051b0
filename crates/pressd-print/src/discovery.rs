// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS service discovery for raw AppSocket printers on the local
// network.
//
// We browse for `_pdl-datastream._tcp.local.`, the service type IPP
// Everywhere devices advertise for their raw print-data socket
// (distinct from `_ipp._tcp`, which fronts the IPP/HTTP endpoint
// itself and is handled by the dispatcher, not the device layer).
// Resolved services are converted into `DiscoveredPrinter` values the
// rest of the application can consume.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use pressd_core::{CoreError, Result};
use tracing::{debug, info, warn};

/// mDNS service type for raw-socket print data.
const PDL_DATASTREAM_SERVICE: &str = "_pdl-datastream._tcp.local.";

/// Default browse duration before the initial snapshot is returned.
const DEFAULT_BROWSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A printer found on the network but not yet registered with this
/// application.
#[derive(Debug, Clone)]
pub struct DiscoveredPrinter {
    pub name: String,
    pub uri: String,
    pub ip: IpAddr,
    pub port: u16,
    pub supports_color: bool,
    pub supports_duplex: bool,
    pub make_and_model: Option<String>,
    pub location: Option<String>,
}

/// Printer discovery engine using mDNS-SD.
///
/// Wraps an `mdns-sd` `ServiceDaemon` that continuously browses for
/// `_pdl-datastream._tcp` services. Discovered printers are
/// accumulated in a thread-safe map keyed by their full service name
/// so duplicate events are deduplicated automatically.
pub struct PrinterDiscovery {
    daemon: ServiceDaemon,
    printers: Arc<Mutex<HashMap<String, DiscoveredPrinter>>>,
    browsing: bool,
}

impl PrinterDiscovery {
    /// Create a new discovery engine. Spawns the mDNS daemon thread but
    /// does **not** start browsing; call [`start`](Self::start) for that.
    pub fn new() -> Result<Self> {
        let daemon =
            ServiceDaemon::new().map_err(|e| CoreError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
        Ok(Self {
            daemon,
            printers: Arc::new(Mutex::new(HashMap::new())),
            browsing: false,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        if self.browsing {
            debug!("printer discovery already running");
            return Ok(());
        }

        let receiver = self
            .daemon
            .browse(PDL_DATASTREAM_SERVICE)
            .map_err(|e| CoreError::Discovery(format!("browse {PDL_DATASTREAM_SERVICE}: {e}")))?;

        Self::spawn_listener(PDL_DATASTREAM_SERVICE, receiver, Arc::clone(&self.printers));

        self.browsing = true;
        info!("mDNS printer discovery started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.browsing {
            return Ok(());
        }
        self.daemon
            .stop_browse(PDL_DATASTREAM_SERVICE)
            .map_err(|e| CoreError::Discovery(format!("stop browse {PDL_DATASTREAM_SERVICE}: {e}")))?;
        self.browsing = false;
        info!("mDNS printer discovery stopped");
        Ok(())
    }

    /// Shut down the mDNS daemon entirely. After this the instance
    /// cannot be reused.
    pub fn shutdown(self) -> Result<()> {
        self.daemon
            .shutdown()
            .map_err(|e| CoreError::Discovery(format!("daemon shutdown: {e}")))?;
        info!("mDNS daemon shut down");
        Ok(())
    }

    pub fn printers(&self) -> Vec<DiscoveredPrinter> {
        self.printers
            .lock()
            .expect("printer map lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Browse the network for printers, wait up to `timeout` for initial
    /// results, then return whatever has been found. Discovery keeps
    /// running in the background after this call returns.
    pub fn discover(&mut self, timeout: Option<Duration>) -> Result<Vec<DiscoveredPrinter>> {
        self.start()?;
        std::thread::sleep(timeout.unwrap_or(DEFAULT_BROWSE_TIMEOUT));
        Ok(self.printers())
    }

    pub fn is_browsing(&self) -> bool {
        self.browsing
    }

    fn spawn_listener(
        service_type: &'static str,
        receiver: mdns_sd::Receiver<ServiceEvent>,
        printers: Arc<Mutex<HashMap<String, DiscoveredPrinter>>>,
    ) {
        std::thread::Builder::new()
            .name(format!("mdns-{service_type}"))
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        ServiceEvent::SearchStarted(stype) => {
                            debug!(service_type = %stype, "mDNS search started");
                        }
                        ServiceEvent::ServiceFound(stype, fullname) => {
                            debug!(service_type = %stype, name = %fullname, "service found");
                        }
                        ServiceEvent::ServiceResolved(info) => {
                            let fullname = info.get_fullname().to_owned();
                            match service_info_to_printer(&info) {
                                Ok(printer) => {
                                    info!(name = %printer.name, uri = %printer.uri, "printer resolved");
                                    printers
                                        .lock()
                                        .expect("printer map lock poisoned")
                                        .insert(fullname, printer);
                                }
                                Err(e) => {
                                    warn!(fullname = %fullname, error = %e, "failed to convert resolved service");
                                }
                            }
                        }
                        ServiceEvent::ServiceRemoved(stype, fullname) => {
                            info!(service_type = %stype, name = %fullname, "printer removed");
                            printers.lock().expect("printer map lock poisoned").remove(&fullname);
                        }
                        ServiceEvent::SearchStopped(stype) => {
                            debug!(service_type = %stype, "mDNS search stopped");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn mDNS listener thread");
    }
}

/// TXT record keys (case-insensitive) commonly found on IPP Everywhere
/// printers advertising their raw socket endpoint:
///   - `printer-make-and-model` — human-readable make/model string
///   - `printer-location`       — physical location
///   - `Color`                  — "T" or "F"
///   - `Duplex`                 — "T" or "F"
fn service_info_to_printer(info: &ServiceInfo) -> Result<DiscoveredPrinter> {
    let name = info.get_fullname().to_owned();
    let port = info.get_port();

    let ip: IpAddr = info
        .get_addresses()
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| info.get_addresses().iter().next())
        .copied()
        .ok_or_else(|| CoreError::Discovery(format!("no address for service {name}")))?;

    let uri = format!("socket://{ip}:{port}/");

    let supports_color = txt_bool(info, "Color");
    let supports_duplex = txt_bool(info, "Duplex");
    let make_and_model = info.get_property_val_str("printer-make-and-model").map(String::from);
    let location = info.get_property_val_str("printer-location").map(String::from);

    Ok(DiscoveredPrinter {
        name,
        uri,
        ip,
        port,
        supports_color,
        supports_duplex,
        make_and_model,
        location,
    })
}

/// Read a boolean TXT record value. IPP Everywhere uses "T"/"F".
fn txt_bool(info: &ServiceInfo, key: &str) -> bool {
    info.get_property_val_str(key)
        .map(|v| v.eq_ignore_ascii_case("t") || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    #[test]
    fn txt_bool_logic_parses_true_variants() {
        let parse = |v: &str| v.eq_ignore_ascii_case("t") || v.eq_ignore_ascii_case("true");
        assert!(parse("T"));
        assert!(parse("t"));
        assert!(parse("true"));
        assert!(parse("TRUE"));
        assert!(!parse("F"));
        assert!(!parse("false"));
        assert!(!parse(""));
    }
}
