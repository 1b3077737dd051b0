// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 envelope handling around the IPP payload, plus the
// connection-level authorization decision (RFC 8010 §3 carries IPP over
// HTTP POST; this module speaks only as much HTTP as that requires).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Parsed framing of an HTTP request, enough to locate the body.
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub host: String,
    pub content_length: Option<usize>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body_offset: usize,
}

impl HttpRequest {
    /// A web-surface form POST, as opposed to an IPP-over-HTTP POST —
    /// distinguished by content type, since both share the same method
    /// and (for per-printer URIs) overlapping paths.
    pub fn is_form_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
            && self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.split(';').next().unwrap_or("").trim() == "application/x-www-form-urlencoded")
    }
}

/// Parse the bare minimum of an HTTP/1.1 request needed to find the body
/// and a handful of headers. Returns `None` when the data doesn't look
/// like HTTP at all (a bare IPP client talking raw TCP), in which case
/// the caller treats the whole payload as the IPP body.
pub fn parse_envelope(data: &[u8]) -> Option<HttpRequest> {
    let header_end = find_subsequence(data, b"\r\n\r\n")?;
    let body_offset = header_end + 4;
    let head = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = head.lines();

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut host = String::new();
    let mut content_length = None;
    let mut content_type = None;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "host" => host = value.to_string(),
            "content-length" => content_length = value.parse().ok(),
            "content-type" => content_type = Some(value.to_string()),
            "authorization" => authorization = Some(value.to_string()),
            _ => {}
        }
    }

    Some(HttpRequest { method, path, host, content_length, content_type, authorization, body_offset })
}

/// Decode an `application/x-www-form-urlencoded` body into its fields.
/// Malformed percent-escapes are dropped rather than rejecting the whole
/// body, matching a browser's own leniency.
pub fn parse_form_body(body: &[u8]) -> std::collections::BTreeMap<String, String> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((percent_decode(key), percent_decode(value)))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Wrap an IPP response body in a minimal HTTP/1.1 200 OK. IPP conveys
/// its own success/failure in the payload's status-code, so the HTTP
/// status line here is always 200 regardless of the IPP outcome.
pub fn wrap_response(ipp_body: &[u8]) -> Vec<u8> {
    wrap_http_response(200, "OK", ipp_body)
}

/// Wrap `body` (an encoded IPP message, or empty) behind an arbitrary
/// HTTP status line — used for connection-level rejections (401/403)
/// that never reach the IPP dispatch table at all.
pub fn wrap_http_response(status: u16, reason: &str, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/ipp\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let mut out = Vec::with_capacity(head.len() + body.len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(body);
    out
}

/// Decode `Authorization: Basic base64(user:pass)` into `(user, pass)`.
pub fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    text.split_once(':').map(|(u, p)| (u.to_string(), p.to_string()))
}

/// Whether `addr` is a loopback address, textually — this module never
/// needs a real `IpAddr`, just the peer string already captured on the
/// `ClientSession`.
pub fn is_loopback_addr(peer_addr: &str) -> bool {
    let host = peer_addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(peer_addr);
    host == "127.0.0.1" || host == "::1" || host == "localhost"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Admin,
    Submit,
    Read,
}

/// Authorization decision per SPEC_FULL.md §4.G. `is_tls` reflects whether
/// the connection this request arrived on is using TLS; the caller (the
/// listener) knows this from which socket accepted it.
pub struct AuthContext<'a> {
    pub peer_addr: &'a str,
    pub is_tls: bool,
    pub allow_tls_optional: bool,
    pub authorization_header: Option<&'a str>,
}

pub enum AuthOutcome {
    /// Basic auth was present and well-formed; `password` still needs to
    /// be checked against the backend's accounts before the request may
    /// proceed.
    Allowed { username: String, password: String },
    AllowedAnonymous,
    NeedCredentials,
    Forbidden,
}

/// Pure policy decision: does this connection get to proceed to the
/// credential check at all, or is it resolved outright (localhost, or
/// remote-plaintext-with-no-password-configured)? The actual credential
/// verification (PAM/group lookup) is the backend's job since it alone
/// knows the configured accounts — the caller must still call
/// `IppBackend::check_credentials` on `AuthOutcome::Allowed` before
/// trusting `username`.
pub fn classify_connection(ctx: &AuthContext) -> AuthOutcome {
    if is_loopback_addr(ctx.peer_addr) {
        return AuthOutcome::AllowedAnonymous;
    }
    if !ctx.is_tls {
        if ctx.allow_tls_optional {
            return AuthOutcome::AllowedAnonymous;
        }
        return AuthOutcome::Forbidden;
    }
    match ctx.authorization_header.and_then(decode_basic_auth) {
        Some((username, password)) => AuthOutcome::Allowed { username, password },
        None => AuthOutcome::NeedCredentials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_envelope_finds_body_and_headers() {
        let http = b"POST /ipp/print/office HTTP/1.1\r\n\
                     Host: 192.168.1.5:631\r\n\
                     Content-Type: application/ipp\r\n\
                     Content-Length: 42\r\n\
                     \r\n\
                     <ipp body here>";
        let req = parse_envelope(http).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/ipp/print/office");
        assert_eq!(req.host, "192.168.1.5:631");
        assert_eq!(req.content_length, Some(42));
        assert_eq!(&http[req.body_offset..], b"<ipp body here>");
        assert!(!req.is_form_post());
    }

    #[test]
    fn form_post_detected_by_content_type() {
        let http = b"POST /config HTTP/1.1\r\n\
                     Host: printer.local\r\n\
                     Content-Type: application/x-www-form-urlencoded\r\n\
                     Content-Length: 20\r\n\
                     \r\n\
                     session=abc&name=lab";
        let req = parse_envelope(http).unwrap();
        assert!(req.is_form_post());
        let form = parse_form_body(&http[req.body_offset..]);
        assert_eq!(form.get("session").map(String::as_str), Some("abc"));
        assert_eq!(form.get("name").map(String::as_str), Some("lab"));
    }

    #[test]
    fn form_body_percent_decodes_values() {
        let form = parse_form_body(b"session=a%2Fb+c");
        assert_eq!(form.get("session").map(String::as_str), Some("a/b c"));
    }

    #[test]
    fn parse_envelope_none_for_raw_ipp() {
        let raw = [0x01u8, 0x01, 0x00, 0x0B, 0, 0, 0, 1, 0x03];
        assert!(parse_envelope(&raw).is_none());
    }

    #[test]
    fn basic_auth_decodes() {
        let header = "Basic YWxpY2U6aHVudGVyMg=="; // alice:hunter2
        let (user, pass) = decode_basic_auth(header).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "hunter2");
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_addr("127.0.0.1:54321"));
        assert!(!is_loopback_addr("192.168.1.9:54321"));
    }

    #[test]
    fn localhost_always_allowed_anonymous() {
        let ctx = AuthContext {
            peer_addr: "127.0.0.1:9000",
            is_tls: false,
            allow_tls_optional: false,
            authorization_header: None,
        };
        assert!(matches!(classify_connection(&ctx), AuthOutcome::AllowedAnonymous));
    }

    #[test]
    fn remote_plaintext_forbidden_by_default() {
        let ctx = AuthContext {
            peer_addr: "10.0.0.5:9000",
            is_tls: false,
            allow_tls_optional: false,
            authorization_header: None,
        };
        assert!(matches!(classify_connection(&ctx), AuthOutcome::Forbidden));
    }

    #[test]
    fn remote_plaintext_allowed_when_tls_optional() {
        let ctx = AuthContext {
            peer_addr: "10.0.0.5:9000",
            is_tls: false,
            allow_tls_optional: true,
            authorization_header: None,
        };
        assert!(matches!(classify_connection(&ctx), AuthOutcome::AllowedAnonymous));
    }

    #[test]
    fn remote_tls_without_creds_needs_credentials() {
        let ctx = AuthContext {
            peer_addr: "10.0.0.5:9000",
            is_tls: true,
            allow_tls_optional: false,
            authorization_header: None,
        };
        assert!(matches!(classify_connection(&ctx), AuthOutcome::NeedCredentials));
    }

    #[test]
    fn remote_tls_with_creds_carries_both_username_and_password() {
        let ctx = AuthContext {
            peer_addr: "10.0.0.5:9000",
            is_tls: true,
            allow_tls_optional: false,
            authorization_header: Some("Basic YWxpY2U6aHVudGVyMg=="), // alice:hunter2
        };
        match classify_connection(&ctx) {
            AuthOutcome::Allowed { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, "hunter2");
            }
            _ => panic!("expected Allowed"),
        }
    }
}
