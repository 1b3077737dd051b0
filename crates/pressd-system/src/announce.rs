// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DNS-SD self-announcement. A printer application advertises itself so
// IPP Everywhere clients can find it without being told a URL; failure
// to start the mDNS daemon is logged and otherwise ignored, per the
// Design Notes' guidance to treat DNS-SD as a capability flag rather
// than a hard requirement.

use std::collections::HashMap;
use std::sync::Mutex;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

const SYSTEM_SERVICE: &str = "_ipp-system._tcp.local.";
const IPP_SERVICE: &str = "_ipp._tcp.local.";
const PDL_SERVICE: &str = "_pdl-datastream._tcp.local.";
const PRINTER_SERVICE: &str = "_printer._tcp.local.";

/// Wraps one `mdns_sd::ServiceDaemon` for the whole system, tracking the
/// full service names registered per printer so they can be cleanly
/// unregistered when a printer is deleted.
pub(crate) struct Announcer {
    daemon: ServiceDaemon,
    hostname: String,
    registered: Mutex<HashMap<String, Vec<String>>>,
}

impl Announcer {
    /// Attempt to start the mDNS daemon. Returns `None` (with a warning
    /// logged) rather than failing `System::new` outright — a system
    /// with no working mDNS stack on its host still serves IPP over
    /// direct IP.
    pub(crate) fn start(hostname: impl Into<String>) -> Option<Self> {
        match ServiceDaemon::new() {
            Ok(daemon) => Some(Self { daemon, hostname: hostname.into(), registered: Mutex::new(HashMap::new()) }),
            Err(e) => {
                warn!(error = %e, "failed to start mDNS daemon, DNS-SD announcement disabled");
                None
            }
        }
    }

    pub(crate) fn announce_system(&self, system_name: &str, port: u16, uuid: &str) {
        let properties = [("txtvers", "1"), ("UUID", uuid)];
        self.register(SYSTEM_SERVICE, system_name, port, &properties, "system");
    }

    /// Register the four service types IPP Everywhere clients expect for
    /// one logical printer.
    pub(crate) fn announce_printer(&self, printer_name: &str, port: u16, uuid: &str, device_uri: &str, native_format: Option<&str>) {
        let rp = format!("ipp/print/{printer_name}");
        let pdl = native_format.unwrap_or("image/pwg-raster,image/png");
        let properties = [
            ("txtvers", "1"),
            ("rp", rp.as_str()),
            ("ty", printer_name),
            ("product", printer_name),
            ("note", device_uri),
            ("UUID", uuid),
            ("TLS", "1.2"),
            ("Color", "F"),
            ("Duplex", "F"),
            ("pdl", pdl),
            ("kind", "document,photo"),
        ];
        self.register(IPP_SERVICE, printer_name, port, &properties, printer_name);
        self.register(PDL_SERVICE, printer_name, port, &properties, printer_name);
        self.register(PRINTER_SERVICE, printer_name, port, &properties, printer_name);
    }

    fn register(&self, service_type: &str, instance: &str, port: u16, properties: &[(&str, &str)], group_key: &str) {
        match ServiceInfo::new(service_type, instance, &format!("{}.local.", self.hostname), "", port, properties) {
            Ok(service_info) => {
                let fullname = service_info.get_fullname().to_owned();
                match self.daemon.register(service_info) {
                    Ok(_) => {
                        info!(service_type, instance, "mDNS service registered");
                        self.registered.lock().expect("registered map lock poisoned").entry(group_key.to_string()).or_default().push(fullname);
                    }
                    Err(e) => warn!(service_type, instance, error = %e, "failed to register mDNS service"),
                }
            }
            Err(e) => warn!(service_type, instance, error = %e, "failed to build mDNS ServiceInfo"),
        }
    }

    /// Unregister every service name announced under `group_key` (the
    /// printer name passed to [`announce_printer`](Self::announce_printer)).
    pub(crate) fn unannounce(&self, group_key: &str) {
        let fullnames = self.registered.lock().expect("registered map lock poisoned").remove(group_key).unwrap_or_default();
        for fullname in fullnames {
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!(name = %fullname, error = %e, "failed to unregister mDNS service");
            } else {
                info!(name = %fullname, "mDNS service unregistered");
            }
        }
    }
}
