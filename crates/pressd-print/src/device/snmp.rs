// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hand-rolled SNMP v1 GET/GETNEXT client over UDP.
//
// Scope is deliberately narrow: v1 only, community string `public`,
// GET and GETNEXT, no SNMPv3 security models, no MIB compiler. Just
// enough BER to round-trip the handful of ASN.1 types Printer-MIB and
// Host-MIB responses actually use: INTEGER, OCTET STRING, OBJECT
// IDENTIFIER, NULL, and the SEQUENCE framing around them.

use std::time::Duration;

use pressd_core::{CoreError, Result};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// `hrDeviceType` value for `hrDeviceTypes.printer` in Host-MIB — used
/// by broadcast discovery to filter non-printer responders.
pub const OID_HR_DEVICE_TYPE: &str = "1.3.6.1.2.1.25.3.2.1.2.1";

/// `hrPrinterDetectedErrorState` (Printer-MIB v2) — a bit string of
/// printer alert conditions.
pub const OID_PRINTER_DETECTED_ERROR_STATE: &str = "1.3.6.1.2.1.25.3.5.1.2.1";

/// `sysName.0` (MIB-II) — used to label broadcast-discovered devices.
pub const OID_SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";

const DEFAULT_COMMUNITY: &str = "public";
const SNMP_VERSION_1: i64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(Vec<u32>),
    Null,
    /// Any BER tag this client does not interpret structurally, kept
    /// raw so callers can still inspect the bytes (e.g. Counter32).
    Unknown(u8, Vec<u8>),
}

impl SnmpValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SnmpValue::OctetString(b) => Some(b),
            _ => None,
        }
    }
}

/// Parse a dotted OID string ("1.3.6.1.2.1.1.5.0") into arc components.
fn parse_oid(s: &str) -> Result<Vec<u32>> {
    s.split('.')
        .map(|part| part.parse::<u32>().map_err(|_| CoreError::Snmp(format!("bad OID component: {part}"))))
        .collect()
}

// ---------------------------------------------------------------------
// BER encoding
// ---------------------------------------------------------------------

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_GET_REQUEST: u8 = 0xA0;
const TAG_GET_NEXT_REQUEST: u8 = 0xA1;
const TAG_GET_RESPONSE: u8 = 0xA2;

fn encode_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        let significant = &bytes[first_nonzero..];
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
}

fn encode_tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_len(content.len(), out);
    out.extend_from_slice(content);
}

fn encode_integer(v: i64, out: &mut Vec<u8>) {
    let mut bytes = v.to_be_bytes().to_vec();
    while bytes.len() > 1 && ((bytes[0] == 0x00 && bytes[1] & 0x80 == 0) || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0))
    {
        bytes.remove(0);
    }
    encode_tlv(TAG_INTEGER, &bytes, out);
}

fn encode_oid(components: &[u32], out: &mut Vec<u8>) {
    let mut body = Vec::new();
    if components.len() >= 2 {
        body.push((components[0] * 40 + components[1]) as u8);
        for &c in &components[2..] {
            encode_base128(c, &mut body);
        }
    }
    encode_tlv(TAG_OID, &body, out);
}

fn encode_base128(mut v: u32, out: &mut Vec<u8>) {
    let mut stack = vec![(v & 0x7F) as u8];
    v >>= 7;
    while v > 0 {
        stack.push(((v & 0x7F) as u8) | 0x80);
        v >>= 7;
    }
    stack.reverse();
    out.extend_from_slice(&stack);
}

/// Build a GetRequest or GetNextRequest PDU for a single OID, wrapped
/// in the v1 message envelope (version, community, PDU).
fn build_request(tag: u8, request_id: i32, oid: &[u32]) -> Vec<u8> {
    let mut varbind_value = Vec::new();
    encode_tlv(TAG_NULL, &[], &mut varbind_value);
    let mut varbind_oid = Vec::new();
    encode_oid(oid, &mut varbind_oid);

    let mut varbind = Vec::new();
    varbind.extend_from_slice(&varbind_oid);
    varbind.extend_from_slice(&varbind_value);
    let mut varbind_seq = Vec::new();
    encode_tlv(TAG_SEQUENCE, &varbind, &mut varbind_seq);

    let mut varbind_list = Vec::new();
    encode_tlv(TAG_SEQUENCE, &varbind_seq, &mut varbind_list);

    let mut pdu_body = Vec::new();
    encode_integer(request_id as i64, &mut pdu_body);
    encode_integer(0, &mut pdu_body); // error-status
    encode_integer(0, &mut pdu_body); // error-index
    pdu_body.extend_from_slice(&varbind_list);

    let mut pdu = Vec::new();
    encode_tlv(tag, &pdu_body, &mut pdu);

    let mut message = Vec::new();
    encode_integer(SNMP_VERSION_1, &mut message);
    encode_tlv(TAG_OCTET_STRING, DEFAULT_COMMUNITY.as_bytes(), &mut message);
    message.extend_from_slice(&pdu);

    let mut envelope = Vec::new();
    encode_tlv(TAG_SEQUENCE, &message, &mut envelope);
    envelope
}

// ---------------------------------------------------------------------
// BER decoding
// ---------------------------------------------------------------------

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(|| CoreError::Snmp("truncated PDU".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_len(&mut self) -> Result<usize> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            Ok(first as usize)
        } else {
            let n = (first & 0x7F) as usize;
            if n == 0 || n > 4 {
                return Err(CoreError::Snmp("unsupported BER length encoding".into()));
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | self.read_u8()? as usize;
            }
            Ok(len)
        }
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = self.read_u8()?;
        let len = self.read_len()?;
        let end = self.pos.checked_add(len).ok_or_else(|| CoreError::Snmp("length overflow".into()))?;
        let content = self.buf.get(self.pos..end).ok_or_else(|| CoreError::Snmp("truncated content".into()))?;
        self.pos = end;
        Ok((tag, content))
    }
}

fn decode_value(tag: u8, content: &[u8]) -> SnmpValue {
    match tag {
        TAG_INTEGER => {
            let mut v: i64 = if content.first().map(|b| b & 0x80 != 0).unwrap_or(false) { -1 } else { 0 };
            for &b in content {
                v = (v << 8) | b as i64;
            }
            SnmpValue::Integer(v)
        }
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_NULL => SnmpValue::Null,
        TAG_OID => SnmpValue::ObjectIdentifier(decode_oid(content)),
        other => SnmpValue::Unknown(other, content.to_vec()),
    }
}

fn decode_oid(content: &[u8]) -> Vec<u32> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut out = vec![(content[0] / 40) as u32, (content[0] % 40) as u32];
    let mut value: u32 = 0;
    for &b in &content[1..] {
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            out.push(value);
            value = 0;
        }
    }
    out
}

/// Parse a GetResponse envelope, returning the first varbind's value.
fn parse_response(bytes: &[u8]) -> Result<(Vec<u32>, SnmpValue)> {
    let mut r = Reader::new(bytes);
    let (seq_tag, seq_body) = r.read_tlv()?;
    if seq_tag != TAG_SEQUENCE {
        return Err(CoreError::Snmp("response is not a SEQUENCE".into()));
    }

    let mut inner = Reader::new(seq_body);
    let (_version_tag, _version) = inner.read_tlv()?; // version INTEGER
    let (_community_tag, _community) = inner.read_tlv()?; // community OCTET STRING
    let (pdu_tag, pdu_body) = inner.read_tlv()?;
    if pdu_tag != TAG_GET_RESPONSE {
        return Err(CoreError::Snmp(format!("unexpected PDU tag 0x{pdu_tag:02x}")));
    }

    let mut pdu = Reader::new(pdu_body);
    let (_rid_tag, _request_id) = pdu.read_tlv()?;
    let (_es_tag, error_status) = pdu.read_tlv()?;
    let (_ei_tag, _error_index) = pdu.read_tlv()?;

    if decode_value(TAG_INTEGER, error_status).as_i64() != Some(0) {
        return Err(CoreError::Snmp("agent returned a non-zero error-status".into()));
    }

    let (vbl_tag, vbl_body) = pdu.read_tlv()?;
    if vbl_tag != TAG_SEQUENCE {
        return Err(CoreError::Snmp("varbind list is not a SEQUENCE".into()));
    }

    let mut vbl = Reader::new(vbl_body);
    let (vb_tag, vb_body) = vbl.read_tlv()?;
    if vb_tag != TAG_SEQUENCE {
        return Err(CoreError::Snmp("varbind is not a SEQUENCE".into()));
    }

    let mut vb = Reader::new(vb_body);
    let (oid_tag, oid_content) = vb.read_tlv()?;
    if oid_tag != TAG_OID {
        return Err(CoreError::Snmp("varbind name is not an OID".into()));
    }
    let (value_tag, value_content) = vb.read_tlv()?;

    Ok((decode_oid(oid_content), decode_value(value_tag, value_content)))
}

const SNMP_PORT: u16 = 161;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn roundtrip(host: &str, port: u16, request: Vec<u8>) -> Result<Vec<u8>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(CoreError::DeviceIo)?;
    socket
        .connect((host, port))
        .await
        .map_err(|e| CoreError::Snmp(format!("connect to {host}:{port}: {e}")))?;
    socket.send(&request).await.map_err(CoreError::DeviceIo)?;

    let mut buf = [0u8; 1500];
    let n = tokio::time::timeout(REQUEST_TIMEOUT, socket.recv(&mut buf))
        .await
        .map_err(|_| CoreError::DeviceTimeout(REQUEST_TIMEOUT))?
        .map_err(CoreError::DeviceIo)?;

    Ok(buf[..n].to_vec())
}

/// SNMP v1 GET against a dotted OID string. `host` defaults to port
/// 161 when `port` is `None`.
pub async fn get(host: &str, port: Option<u16>, oid: &str) -> Result<SnmpValue> {
    let components = parse_oid(oid)?;
    let request = build_request(TAG_GET_REQUEST, 1, &components);
    let response = roundtrip(host, port.unwrap_or(SNMP_PORT), request).await?;
    let (_oid, value) = parse_response(&response)?;
    debug!(host, oid, "SNMP GET completed");
    Ok(value)
}

/// SNMP v1 GETNEXT ("walk" step) against a dotted OID string. Returns
/// the next OID in the MIB tree along with its value.
pub async fn get_next(host: &str, port: Option<u16>, oid: &str) -> Result<(String, SnmpValue)> {
    let components = parse_oid(oid)?;
    let request = build_request(TAG_GET_NEXT_REQUEST, 1, &components);
    let response = roundtrip(host, port.unwrap_or(SNMP_PORT), request).await?;
    let (next_oid, value) = parse_response(&response)?;
    let next_oid_str = next_oid.iter().map(u32::to_string).collect::<Vec<_>>().join(".");
    debug!(host, oid, next = %next_oid_str, "SNMP GETNEXT completed");
    Ok((next_oid_str, value))
}

/// Query `hrPrinterDetectedErrorState` and report whether the device
/// responded at all — used as a lightweight reachability probe when a
/// `snmp://` URI is given for status-only polling.
pub async fn probe(host: &str, port: Option<u16>) -> Result<bool> {
    match get(host, port, OID_PRINTER_DETECTED_ERROR_STATE).await {
        Ok(_) => Ok(true),
        Err(CoreError::Snmp(_)) | Err(CoreError::DeviceTimeout(_)) => {
            warn!(host, "SNMP probe failed");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_round_trips_through_ber() {
        let components = parse_oid(OID_PRINTER_DETECTED_ERROR_STATE).unwrap();
        let mut encoded = Vec::new();
        encode_oid(&components, &mut encoded);
        // Strip the tag+length header, decode the raw body back.
        let mut r = Reader::new(&encoded);
        let (tag, body) = r.read_tlv().unwrap();
        assert_eq!(tag, TAG_OID);
        assert_eq!(decode_oid(body), components);
    }

    #[test]
    fn integer_encoding_avoids_redundant_leading_byte() {
        let mut out = Vec::new();
        encode_integer(127, &mut out);
        assert_eq!(out, vec![TAG_INTEGER, 0x01, 0x7F]);

        let mut out = Vec::new();
        encode_integer(128, &mut out);
        assert_eq!(out, vec![TAG_INTEGER, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn decode_integer_handles_negative_values() {
        assert_eq!(decode_value(TAG_INTEGER, &[0xFF]).as_i64(), Some(-1));
        assert_eq!(decode_value(TAG_INTEGER, &[0x00, 0x80]).as_i64(), Some(128));
    }

    #[test]
    fn request_pdu_is_well_formed_ber() {
        let components = parse_oid(OID_SYS_NAME).unwrap();
        let request = build_request(TAG_GET_REQUEST, 42, &components);

        let mut r = Reader::new(&request);
        let (tag, _body) = r.read_tlv().unwrap();
        assert_eq!(tag, TAG_SEQUENCE);
    }

    #[test]
    fn bad_oid_component_is_rejected() {
        assert!(parse_oid("1.3.not-a-number.1").is_err());
    }
}
