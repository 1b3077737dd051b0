// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP/1.1 binary wire codec (RFC 8010 §3). Pure encode/decode — no I/O,
// no locking, no knowledge of printers or jobs. `parse_request` walks the
// tag stream into attribute groups; `ResponseBuilder` writes the same
// encoding back out.

// ---------------------------------------------------------------------------
// Delimiter tags (RFC 8010 §3.5.1)
// ---------------------------------------------------------------------------

pub const TAG_OPERATION_ATTRIBUTES: u8 = 0x01;
pub const TAG_JOB_ATTRIBUTES: u8 = 0x02;
pub const TAG_END_OF_ATTRIBUTES: u8 = 0x03;
pub const TAG_PRINTER_ATTRIBUTES: u8 = 0x04;
pub const TAG_UNSUPPORTED_ATTRIBUTES: u8 = 0x05;
pub const TAG_SUBSCRIPTION_ATTRIBUTES: u8 = 0x06;
pub const TAG_EVENT_NOTIFICATION_ATTRIBUTES: u8 = 0x07;

// ---------------------------------------------------------------------------
// Value tags (RFC 8010 §3.5.2)
// ---------------------------------------------------------------------------

pub const VALUE_TAG_UNSUPPORTED: u8 = 0x10;
pub const VALUE_TAG_NO_VALUE: u8 = 0x13;
pub const VALUE_TAG_INTEGER: u8 = 0x21;
pub const VALUE_TAG_BOOLEAN: u8 = 0x22;
pub const VALUE_TAG_ENUM: u8 = 0x23;
pub const VALUE_TAG_DATE_TIME: u8 = 0x31;
pub const VALUE_TAG_RESOLUTION: u8 = 0x32;
pub const VALUE_TAG_RANGE_OF_INTEGER: u8 = 0x33;
pub const VALUE_TAG_TEXT_WITH_LANGUAGE: u8 = 0x35;
pub const VALUE_TAG_NAME_WITH_LANGUAGE: u8 = 0x36;
pub const VALUE_TAG_TEXT: u8 = 0x41;
pub const VALUE_TAG_NAME: u8 = 0x42;
pub const VALUE_TAG_KEYWORD: u8 = 0x44;
pub const VALUE_TAG_URI: u8 = 0x45;
pub const VALUE_TAG_URI_SCHEME: u8 = 0x46;
pub const VALUE_TAG_CHARSET: u8 = 0x47;
pub const VALUE_TAG_NATURAL_LANGUAGE: u8 = 0x48;
pub const VALUE_TAG_MIME_MEDIA_TYPE: u8 = 0x49;

// ---------------------------------------------------------------------------
// Operation IDs (RFC 8011 §4, PWG 5100.13 for the subscription family)
// ---------------------------------------------------------------------------

pub const OP_PRINT_JOB: u16 = 0x0002;
pub const OP_VALIDATE_JOB: u16 = 0x0004;
pub const OP_CREATE_JOB: u16 = 0x0005;
pub const OP_CANCEL_JOB: u16 = 0x0008;
pub const OP_GET_JOB_ATTRIBUTES: u16 = 0x0009;
pub const OP_GET_JOBS: u16 = 0x000A;
pub const OP_GET_PRINTER_ATTRIBUTES: u16 = 0x000B;
pub const OP_HOLD_JOB: u16 = 0x000C;
pub const OP_RELEASE_JOB: u16 = 0x000D;
pub const OP_PAUSE_PRINTER: u16 = 0x0010;
pub const OP_RESUME_PRINTER: u16 = 0x0011;
pub const OP_CREATE_PRINTER_SUBSCRIPTIONS: u16 = 0x0016;
pub const OP_CREATE_JOB_SUBSCRIPTIONS: u16 = 0x0017;
pub const OP_GET_SUBSCRIPTION_ATTRIBUTES: u16 = 0x0018;
pub const OP_GET_SUBSCRIPTIONS: u16 = 0x0019;
pub const OP_RENEW_SUBSCRIPTION: u16 = 0x001A;
pub const OP_CANCEL_SUBSCRIPTION: u16 = 0x001B;
pub const OP_GET_NOTIFICATIONS: u16 = 0x001C;

// Non-PWG-standard operation IDs, drawn from CUPS's IPP/1.1 private range
// (0x4001+) the same way the rest of this stack draws its vocabulary from
// real IPP implementations rather than inventing its own numbering.
pub const OP_CREATE_PRINTER: u16 = 0x4001;
pub const OP_DELETE_PRINTER: u16 = 0x4002;
pub const OP_SET_PRINTER_ATTRIBUTES: u16 = 0x4003;
pub const OP_GET_SYSTEM_ATTRIBUTES: u16 = 0x4004;
pub const OP_SET_SYSTEM_ATTRIBUTES: u16 = 0x4005;
pub const OP_SHUTDOWN_ALL_PRINTERS: u16 = 0x4006;
pub const OP_CREATE_SYSTEM_SUBSCRIPTIONS: u16 = 0x4007;

// ---------------------------------------------------------------------------
// Status codes (RFC 8011 §4.1.8)
// ---------------------------------------------------------------------------

pub const STATUS_OK: u16 = 0x0000;
pub const STATUS_OK_IGNORED_SUBSCRIPTIONS: u16 = 0x0003;
pub const STATUS_CLIENT_ERROR_BAD_REQUEST: u16 = 0x0400;
pub const STATUS_CLIENT_ERROR_FORBIDDEN: u16 = 0x0401;
pub const STATUS_CLIENT_ERROR_NOT_AUTHENTICATED: u16 = 0x0402;
pub const STATUS_CLIENT_ERROR_NOT_AUTHORIZED: u16 = 0x0403;
pub const STATUS_CLIENT_ERROR_NOT_FOUND: u16 = 0x0406;
pub const STATUS_CLIENT_ERROR_NOT_POSSIBLE: u16 = 0x0407;
pub const STATUS_CLIENT_ERROR_ATTRIBUTES_NOT_SUPPORTED: u16 = 0x0409;
pub const STATUS_CLIENT_ERROR_DOCUMENT_FORMAT_NOT_SUPPORTED: u16 = 0x040A;
pub const STATUS_CLIENT_ERROR_IGNORED_ALL_SUBSCRIPTIONS: u16 = 0x041A;
pub const STATUS_SERVER_ERROR_INTERNAL: u16 = 0x0500;
pub const STATUS_SERVER_ERROR_OPERATION_NOT_SUPPORTED: u16 = 0x0501;
pub const STATUS_SERVER_ERROR_SERVICE_UNAVAILABLE: u16 = 0x0502;

// ---------------------------------------------------------------------------
// Parsed request
// ---------------------------------------------------------------------------

/// A single parsed IPP attribute.
#[derive(Debug, Clone)]
pub struct IppAttribute {
    pub value_tag: u8,
    /// Empty for additional values in a `1setOf`.
    pub name: String,
    pub value: Vec<u8>,
}

/// A group of attributes delimited by a group tag.
#[derive(Debug, Clone)]
pub struct IppAttributeGroup {
    pub delimiter: u8,
    pub attributes: Vec<IppAttribute>,
}

impl IppAttributeGroup {
    pub fn get(&self, name: &str) -> Option<&IppAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|a| String::from_utf8(a.value.clone()).ok())
    }

    pub fn get_integer(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|a| {
            if a.value.len() == 4 {
                Some(i32::from_be_bytes([a.value[0], a.value[1], a.value[2], a.value[3]]))
            } else {
                None
            }
        })
    }

    pub fn get_boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|a| a.value.first().map(|&b| b != 0x00))
    }

    /// All values (main plus `1setOf` additional values) sharing `name`,
    /// matched by the first occurrence and every immediately-following
    /// attribute whose own name is empty.
    pub fn get_all_strings(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut in_set = false;
        for attr in &self.attributes {
            if attr.name == name {
                in_set = true;
                if let Ok(s) = String::from_utf8(attr.value.clone()) {
                    out.push(s);
                }
            } else if attr.name.is_empty() && in_set {
                if let Ok(s) = String::from_utf8(attr.value.clone()) {
                    out.push(s);
                }
            } else {
                in_set = false;
            }
        }
        out
    }

    /// All `1setOf integer` values sharing `name` — each a 4-byte
    /// big-endian payload per RFC 8010 §3.5.2, not a textual encoding.
    pub fn get_all_integers(&self, name: &str) -> Vec<i32> {
        let mut out = Vec::new();
        let mut in_set = false;
        for attr in &self.attributes {
            if attr.name == name {
                in_set = true;
                if attr.value.len() == 4 {
                    out.push(i32::from_be_bytes([attr.value[0], attr.value[1], attr.value[2], attr.value[3]]));
                }
            } else if attr.name.is_empty() && in_set {
                if attr.value.len() == 4 {
                    out.push(i32::from_be_bytes([attr.value[0], attr.value[1], attr.value[2], attr.value[3]]));
                }
            } else {
                in_set = false;
            }
        }
        out
    }
}

/// A fully parsed IPP request (or response — the binary framing is shared).
#[derive(Debug)]
pub struct IppRequest {
    pub version_major: u8,
    pub version_minor: u8,
    /// The operation-id field; when parsing a *response* this is the
    /// status-code, since the two fields share a wire position.
    pub operation_id: u16,
    pub request_id: u32,
    pub attribute_groups: Vec<IppAttributeGroup>,
    pub document_data: Vec<u8>,
}

impl IppRequest {
    pub fn operation_attributes(&self) -> Option<&IppAttributeGroup> {
        self.attribute_groups.iter().find(|g| g.delimiter == TAG_OPERATION_ATTRIBUTES)
    }

    pub fn job_attributes(&self) -> Option<&IppAttributeGroup> {
        self.attribute_groups.iter().find(|g| g.delimiter == TAG_JOB_ATTRIBUTES)
    }

    pub fn printer_attributes(&self) -> Option<&IppAttributeGroup> {
        self.attribute_groups.iter().find(|g| g.delimiter == TAG_PRINTER_ATTRIBUTES)
    }

    pub fn subscription_attributes(&self) -> Vec<&IppAttributeGroup> {
        self.attribute_groups
            .iter()
            .filter(|g| g.delimiter == TAG_SUBSCRIPTION_ATTRIBUTES)
            .collect()
    }
}

/// Parse a raw IPP message body (request or response — same framing).
///
/// ```text
/// version-number:   2 bytes (major, minor)
/// operation-id:     2 bytes (big-endian u16)
/// request-id:       4 bytes (big-endian u32)
/// attribute-groups:  variable
///   delimiter-tag:   1 byte
///   attributes:      variable
///     value-tag:     1 byte
///     name-length:   2 bytes (big-endian u16)
///     name:          name-length bytes
///     value-length:  2 bytes (big-endian u16)
///     value:         value-length bytes
/// end-of-attributes-tag: 1 byte (0x03)
/// document-data:    remainder
/// ```
pub fn parse_request(data: &[u8]) -> Result<IppRequest, String> {
    if data.len() < 8 {
        return Err(format!("IPP message too short: {} bytes (minimum 8)", data.len()));
    }

    let version_major = data[0];
    let version_minor = data[1];
    let operation_id = u16::from_be_bytes([data[2], data[3]]);
    let request_id = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

    let mut pos = 8;
    let mut attribute_groups: Vec<IppAttributeGroup> = Vec::new();
    let mut current_group: Option<IppAttributeGroup> = None;

    while pos < data.len() {
        let tag = data[pos];

        if tag <= 0x0F {
            if let Some(group) = current_group.take() {
                attribute_groups.push(group);
            }
            if tag == TAG_END_OF_ATTRIBUTES {
                pos += 1;
                break;
            }
            current_group = Some(IppAttributeGroup { delimiter: tag, attributes: Vec::new() });
            pos += 1;
            continue;
        }

        let value_tag = tag;
        pos += 1;

        if pos + 2 > data.len() {
            return Err("truncated name-length field".into());
        }
        let name_length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;

        if pos + name_length > data.len() {
            return Err("truncated attribute name".into());
        }
        let name = String::from_utf8_lossy(&data[pos..pos + name_length]).to_string();
        pos += name_length;

        if pos + 2 > data.len() {
            return Err("truncated value-length field".into());
        }
        let value_length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;

        if pos + value_length > data.len() {
            return Err("truncated attribute value".into());
        }
        let value = data[pos..pos + value_length].to_vec();
        pos += value_length;

        let attr = IppAttribute { value_tag, name, value };
        match current_group {
            Some(ref mut group) => group.attributes.push(attr),
            None => return Err("attribute outside of any group".into()),
        }
    }

    if let Some(group) = current_group.take() {
        attribute_groups.push(group);
    }

    let document_data = if pos < data.len() { data[pos..].to_vec() } else { Vec::new() };

    Ok(IppRequest { version_major, version_minor, operation_id, request_id, attribute_groups, document_data })
}

// ---------------------------------------------------------------------------
// Response builder
// ---------------------------------------------------------------------------

/// Builder for IPP response messages (RFC 8010 §3.4).
pub struct ResponseBuilder {
    buf: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16, request_id: u32) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.push(0x01); // version major
        buf.push(0x01); // version minor
        buf.extend_from_slice(&status_code.to_be_bytes());
        buf.extend_from_slice(&request_id.to_be_bytes());
        Self { buf }
    }

    pub fn begin_group(&mut self, delimiter: u8) -> &mut Self {
        self.buf.push(delimiter);
        self
    }

    pub fn text(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_TEXT, name, value.as_bytes())
    }

    pub fn name_attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_NAME, name, value.as_bytes())
    }

    pub fn keyword(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_KEYWORD, name, value.as_bytes())
    }

    /// Additional value for a `1setOf` keyword (RFC 8010 §3.1.4: name-length 0).
    pub fn keyword_additional(&mut self, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_KEYWORD, "", value.as_bytes())
    }

    pub fn uri(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_URI, name, value.as_bytes())
    }

    pub fn charset(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_CHARSET, name, value.as_bytes())
    }

    pub fn natural_language(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_NATURAL_LANGUAGE, name, value.as_bytes())
    }

    pub fn integer(&mut self, name: &str, value: i32) -> &mut Self {
        self.write_attr(VALUE_TAG_INTEGER, name, &value.to_be_bytes())
    }

    pub fn integer_additional(&mut self, value: i32) -> &mut Self {
        self.write_attr(VALUE_TAG_INTEGER, "", &value.to_be_bytes())
    }

    pub fn enum_attr(&mut self, name: &str, value: i32) -> &mut Self {
        self.write_attr(VALUE_TAG_ENUM, name, &value.to_be_bytes())
    }

    pub fn boolean(&mut self, name: &str, value: bool) -> &mut Self {
        self.write_attr(VALUE_TAG_BOOLEAN, name, &[if value { 0x01 } else { 0x00 }])
    }

    /// IPP `dateTime` per RFC 8010 §3.9: an 11-byte RFC 2579 structure.
    /// We only need UTC so the offset-from-UTC fields are always `+00'00`.
    pub fn date_time(&mut self, name: &str, dt: chrono::DateTime<chrono::Utc>) -> &mut Self {
        use chrono::{Datelike, Timelike};
        let mut v = Vec::with_capacity(11);
        v.extend_from_slice(&(dt.year() as u16).to_be_bytes());
        v.push(dt.month() as u8);
        v.push(dt.day() as u8);
        v.push(dt.hour() as u8);
        v.push(dt.minute() as u8);
        v.push(dt.second() as u8);
        v.push((dt.timestamp_subsec_millis() / 100) as u8);
        v.push(b'+');
        v.push(0);
        v.push(0);
        self.write_attr(VALUE_TAG_DATE_TIME, name, &v)
    }

    fn write_attr(&mut self, value_tag: u8, name: &str, value: &[u8]) -> &mut Self {
        self.buf.push(value_tag);
        let name_bytes = name.as_bytes();
        self.buf.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(name_bytes);
        self.buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.buf.push(TAG_END_OF_ATTRIBUTES);
        self.buf
    }
}

/// A minimal error response carrying only `status-message` in the
/// operation-attributes group, for operations that fail before any
/// printer/job/subscription attributes can be gathered.
pub fn error_response(status: u16, request_id: u32, message: &str) -> Vec<u8> {
    let mut resp = ResponseBuilder::new(status, request_id);
    resp.begin_group(TAG_OPERATION_ATTRIBUTES)
        .charset("attributes-charset", "utf-8")
        .natural_language("attributes-natural-language", "en")
        .text("status-message", message);
    resp.build()
}

/// Every successful response begins with this boilerplate group; handlers
/// call this before appending job/printer/subscription groups of their own.
pub fn ok_operation_group(request_id: u32) -> ResponseBuilder {
    let mut resp = ResponseBuilder::new(STATUS_OK, request_id);
    resp.begin_group(TAG_OPERATION_ATTRIBUTES)
        .charset("attributes-charset", "utf-8")
        .natural_language("attributes-natural-language", "en")
        .text("status-message", "successful-ok");
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_attr(buf: &mut Vec<u8>, value_tag: u8, name: &str, value: &[u8]) {
        buf.push(value_tag);
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        buf.extend_from_slice(value);
    }

    fn build_test_request(operation_id: u16, request_id: u32, attrs: &[(u8, &str, &[u8])], document: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(0x01);
        buf.push(0x01);
        buf.extend_from_slice(&operation_id.to_be_bytes());
        buf.extend_from_slice(&request_id.to_be_bytes());
        buf.push(TAG_OPERATION_ATTRIBUTES);
        write_test_attr(&mut buf, VALUE_TAG_CHARSET, "attributes-charset", b"utf-8");
        write_test_attr(&mut buf, VALUE_TAG_NATURAL_LANGUAGE, "attributes-natural-language", b"en");
        for &(tag, name, value) in attrs {
            write_test_attr(&mut buf, tag, name, value);
        }
        buf.push(TAG_END_OF_ATTRIBUTES);
        buf.extend_from_slice(document);
        buf
    }

    #[test]
    fn parse_minimal_request() {
        let data = build_test_request(OP_GET_PRINTER_ATTRIBUTES, 42, &[], &[]);
        let req = parse_request(&data).unwrap();
        assert_eq!(req.operation_id, OP_GET_PRINTER_ATTRIBUTES);
        assert_eq!(req.request_id, 42);
        assert_eq!(req.attribute_groups.len(), 1);
        assert!(req.document_data.is_empty());
    }

    #[test]
    fn parse_request_with_document_data() {
        let doc = b"raster bytes here";
        let data = build_test_request(OP_PRINT_JOB, 100, &[], doc);
        let req = parse_request(&data).unwrap();
        assert_eq!(req.document_data, doc);
    }

    #[test]
    fn parse_custom_attributes() {
        let attrs = vec![
            (VALUE_TAG_NAME, "job-name", b"Quarterly Report" as &[u8]),
            (VALUE_TAG_KEYWORD, "document-format", b"image/pwg-raster"),
        ];
        let data = build_test_request(OP_PRINT_JOB, 7, &attrs, &[]);
        let req = parse_request(&data).unwrap();
        let op_group = req.operation_attributes().unwrap();
        assert_eq!(op_group.get_string("job-name").as_deref(), Some("Quarterly Report"));
        assert_eq!(op_group.get_string("document-format").as_deref(), Some("image/pwg-raster"));
    }

    #[test]
    fn parse_integer_attribute() {
        let bytes = 42i32.to_be_bytes();
        let attrs = vec![(VALUE_TAG_INTEGER, "job-id", &bytes[..])];
        let data = build_test_request(OP_CANCEL_JOB, 5, &attrs, &[]);
        let req = parse_request(&data).unwrap();
        assert_eq!(req.operation_attributes().unwrap().get_integer("job-id"), Some(42));
    }

    #[test]
    fn parse_1set_of_keyword_values() {
        let attrs = vec![
            (VALUE_TAG_KEYWORD, "notify-events", b"job-created" as &[u8]),
            (VALUE_TAG_KEYWORD, "", b"job-completed"),
        ];
        let data = build_test_request(OP_CREATE_JOB_SUBSCRIPTIONS, 9, &attrs, &[]);
        let req = parse_request(&data).unwrap();
        let values = req.operation_attributes().unwrap().get_all_strings("notify-events");
        assert_eq!(values, vec!["job-created".to_string(), "job-completed".to_string()]);
    }

    #[test]
    fn rejects_too_short_message() {
        assert!(parse_request(&[0x01, 0x01, 0x00]).is_err());
    }

    #[test]
    fn response_builder_header_fields() {
        let bytes = ResponseBuilder::new(STATUS_OK, 99).build();
        assert!(bytes.len() >= 9);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), STATUS_OK);
        assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 99);
        assert_eq!(*bytes.last().unwrap(), TAG_END_OF_ATTRIBUTES);
    }

    #[test]
    fn response_builder_roundtrip_with_groups() {
        let mut builder = ResponseBuilder::new(STATUS_OK, 42);
        builder
            .begin_group(TAG_OPERATION_ATTRIBUTES)
            .charset("attributes-charset", "utf-8")
            .natural_language("attributes-natural-language", "en");
        builder.begin_group(TAG_JOB_ATTRIBUTES).integer("job-id", 7).enum_attr("job-state", 3);

        let bytes = builder.build();
        let parsed = parse_request(&bytes).unwrap();
        assert_eq!(parsed.operation_id, STATUS_OK);
        assert_eq!(parsed.attribute_groups.len(), 2);
        assert_eq!(parsed.attribute_groups[1].get_integer("job-id"), Some(7));
        assert_eq!(parsed.attribute_groups[1].get_integer("job-state"), Some(3));
    }

    #[test]
    fn error_response_carries_status_message() {
        let bytes = error_response(STATUS_CLIENT_ERROR_BAD_REQUEST, 10, "bad request");
        let parsed = parse_request(&bytes).unwrap();
        assert_eq!(parsed.operation_id, STATUS_CLIENT_ERROR_BAD_REQUEST);
        assert_eq!(
            parsed.operation_attributes().unwrap().get_string("status-message").as_deref(),
            Some("bad request")
        );
    }
}
