// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device URI parsing. The four schemes a printer's device-uri may use;
// the transports that actually open these are in pressd-print, which
// depends on this crate for the parsed representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceUri {
    /// `usb://VID:PID?serial=...`
    Usb {
        vendor_id: u16,
        product_id: u16,
        serial: Option<String>,
    },
    /// `socket://host[:port]/`
    Socket { host: String, port: u16 },
    /// `dnssd://<instance-name>._<service>._tcp.local/?...`
    DnsSd { instance_name: String, service: String },
    /// `snmp://host[:port]/`
    Snmp { host: String, port: u16 },
}

const DEFAULT_SOCKET_PORT: u16 = 9100;
const DEFAULT_SNMP_PORT: u16 = 161;

impl DeviceUri {
    pub fn scheme(&self) -> &'static str {
        match self {
            DeviceUri::Usb { .. } => "usb",
            DeviceUri::Socket { .. } => "socket",
            DeviceUri::DnsSd { .. } => "dnssd",
            DeviceUri::Snmp { .. } => "snmp",
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| CoreError::MalformedUri(uri.to_string()))?;

        match scheme {
            "usb" => parse_usb(rest, uri),
            "socket" => parse_host_port(rest, DEFAULT_SOCKET_PORT, uri)
                .map(|(host, port)| DeviceUri::Socket { host, port }),
            "snmp" => parse_host_port(rest, DEFAULT_SNMP_PORT, uri)
                .map(|(host, port)| DeviceUri::Snmp { host, port }),
            "dnssd" => parse_dnssd(rest, uri),
            other => Err(CoreError::UnsupportedScheme(other.to_string())),
        }
    }
}

fn parse_usb(rest: &str, original: &str) -> Result<DeviceUri> {
    let (ids, query) = rest.split_once('?').unwrap_or((rest, ""));
    let (vid, pid) = ids
        .split_once(':')
        .ok_or_else(|| CoreError::MalformedUri(original.to_string()))?;
    let vendor_id = u16::from_str_radix(vid.trim_start_matches("0x"), 16)
        .map_err(|_| CoreError::MalformedUri(original.to_string()))?;
    let product_id = u16::from_str_radix(pid.trim_start_matches("0x"), 16)
        .map_err(|_| CoreError::MalformedUri(original.to_string()))?;
    let serial = query
        .split('&')
        .find_map(|kv| kv.strip_prefix("serial=").map(str::to_string));
    Ok(DeviceUri::Usb {
        vendor_id,
        product_id,
        serial,
    })
}

fn parse_host_port(rest: &str, default_port: u16, original: &str) -> Result<(String, u16)> {
    let host_port = rest.trim_end_matches('/');
    if host_port.is_empty() {
        return Err(CoreError::MalformedUri(original.to_string()));
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| CoreError::MalformedUri(original.to_string()))?;
            Ok((host.to_string(), port))
        }
        None => Ok((host_port.to_string(), default_port)),
    }
}

fn parse_dnssd(rest: &str, original: &str) -> Result<DeviceUri> {
    let path = rest.split('?').next().unwrap_or("");
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Err(CoreError::MalformedUri(original.to_string()));
    }
    let service = path
        .split('.')
        .find(|part| part.starts_with('_'))
        .map(|s| s.trim_start_matches('_').to_string())
        .unwrap_or_else(|| "ipp".to_string());
    Ok(DeviceUri::DnsSd {
        instance_name: path.to_string(),
        service,
    })
}

impl fmt::Display for DeviceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceUri::Usb {
                vendor_id,
                product_id,
                serial,
            } => {
                write!(f, "usb://{vendor_id:04x}:{product_id:04x}")?;
                if let Some(serial) = serial {
                    write!(f, "?serial={serial}")?;
                }
                Ok(())
            }
            DeviceUri::Socket { host, port } => write!(f, "socket://{host}:{port}/"),
            DeviceUri::Snmp { host, port } => write!(f, "snmp://{host}:{port}/"),
            DeviceUri::DnsSd { instance_name, .. } => write!(f, "dnssd://{instance_name}/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socket_with_explicit_port() {
        let uri = DeviceUri::parse("socket://10.0.0.5:9100/").unwrap();
        assert_eq!(
            uri,
            DeviceUri::Socket {
                host: "10.0.0.5".into(),
                port: 9100
            }
        );
    }

    #[test]
    fn socket_defaults_to_port_9100() {
        let uri = DeviceUri::parse("socket://printer.local/").unwrap();
        assert_eq!(
            uri,
            DeviceUri::Socket {
                host: "printer.local".into(),
                port: 9100
            }
        );
    }

    #[test]
    fn parses_usb_with_serial() {
        let uri = DeviceUri::parse("usb://04b8:0202?serial=ABC123").unwrap();
        assert_eq!(
            uri,
            DeviceUri::Usb {
                vendor_id: 0x04b8,
                product_id: 0x0202,
                serial: Some("ABC123".into())
            }
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = DeviceUri::parse("ipp://printer.local/").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedScheme(s) if s == "ipp"));
    }

    #[test]
    fn rejects_malformed_uri() {
        assert!(DeviceUri::parse("not-a-uri").is_err());
        assert!(DeviceUri::parse("socket:///").is_err());
    }

    #[test]
    fn display_round_trips_socket() {
        let uri = DeviceUri::Socket {
            host: "10.0.0.5".into(),
            port: 9100,
        };
        assert_eq!(DeviceUri::parse(&uri.to_string()).unwrap(), uri);
    }
}
