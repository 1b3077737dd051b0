// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-connection transient state. One `ClientSession` is created when an
// HTTP connection is accepted and dropped when it closes; nothing here
// survives past that. The IPP request/response bodies themselves are
// owned by the wire layer, which embeds this session rather than the
// reverse.

use crate::ids::{JobId, PrinterId};

/// Transient state scoped to a single HTTP connection.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub peer_addr: String,
    /// Empty when the request has not (yet) authenticated.
    pub username: String,
    pub host_header: String,
    pub host_port: u16,
    pub request_uri: String,
    pub query_string: String,
    pub operation_id: Option<u16>,
    pub target_printer: Option<PrinterId>,
    pub target_job: Option<JobId>,
    /// Scratch space for the CSRF token under construction/verification.
    pub csrf_scratch: Vec<u8>,
}

impl ClientSession {
    pub fn new(peer_addr: impl Into<String>, host_header: impl Into<String>, host_port: u16) -> Self {
        Self {
            peer_addr: peer_addr.into(),
            username: String::new(),
            host_header: host_header.into(),
            host_port,
            request_uri: String::new(),
            query_string: String::new(),
            operation_id: None,
            target_printer: None,
            target_job: None,
            csrf_scratch: Vec::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn set_request(&mut self, uri: impl Into<String>, query: impl Into<String>, operation_id: u16) {
        self.request_uri = uri.into();
        self.query_string = query.into();
        self.operation_id = Some(operation_id);
    }

    pub fn resolve_printer(&mut self, id: PrinterId) {
        self.target_printer = Some(id);
    }

    pub fn resolve_job(&mut self, id: JobId) {
        self.target_job = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unauthenticated() {
        let session = ClientSession::new("127.0.0.1:52341", "printer.local", 631);
        assert!(!session.is_authenticated());
        assert_eq!(session.host_port, 631);
    }

    #[test]
    fn authenticated_once_username_set() {
        let mut session = ClientSession::new("127.0.0.1:52341", "printer.local", 631);
        session.username = "alice".into();
        assert!(session.is_authenticated());
    }

    #[test]
    fn resolves_target_printer_and_job() {
        let mut session = ClientSession::new("127.0.0.1:1", "h", 631);
        session.resolve_printer(PrinterId(3));
        session.resolve_job(JobId::new());
        assert_eq!(session.target_printer, Some(PrinterId(3)));
        assert!(session.target_job.is_some());
    }
}
