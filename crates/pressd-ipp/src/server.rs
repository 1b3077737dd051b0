// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded IPP/1.1 + HTTP listener. Generalizes the teacher's single-printer
// `IppServer` to front an arbitrary `IppBackend`: any number of printers, the
// system container, and the subscription family all go through the same
// accept loop and the one dispatch table in `dispatch.rs`.
//
// IPP is transported over HTTP POST (RFC 8010 §3), but — like the teacher —
// this listener speaks just enough HTTP/1.1 framing to extract the `/ipp`
// payload and wrap the response, rather than pulling in a full HTTP stack.
// Raw IPP-over-TCP without the envelope is still accepted for clients (and
// test fixtures) that send it directly.
//
// On start the system's printers are advertised via mDNS-SD; see
// `mdns.rs` for the per-printer/system record shapes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use pressd_core::ClientSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::IppBackend;
use crate::dispatch::dispatch;
use crate::http::{self, AuthContext, AuthOutcome};
use crate::wire::{self, parse_request};

/// Default port for the IPP listener (IANA-assigned for IPP).
pub const DEFAULT_PORT: u16 = 631;

/// Maximum bytes accepted from one connection before it is rejected, to
/// bound memory use against a misbehaving or hostile client.
const MAX_REQUEST_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
}

/// Configuration the listener needs beyond the backend itself.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub port: u16,
    pub allow_tls_optional: bool,
    pub is_tls: bool,
    pub system_name: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, allow_tls_optional: false, is_tls: false, system_name: "pressd".into() }
    }
}

struct ListenerState<B: IppBackend> {
    backend: Arc<B>,
    options: ServerOptions,
    active_connections: Arc<AtomicU32>,
}

/// Embedded IPP/HTTP server fronting an `IppBackend`.
pub struct IppServer<B: IppBackend + 'static> {
    options: ServerOptions,
    status: ServerStatus,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
    mdns_daemon: Option<mdns_sd::ServiceDaemon>,
    mdns_fullname: Option<String>,
    backend: Arc<B>,
}

impl<B: IppBackend + 'static> IppServer<B> {
    pub fn new(backend: Arc<B>, options: ServerOptions) -> Self {
        Self {
            options,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            mdns_daemon: None,
            mdns_fullname: None,
            backend,
        }
    }

    pub fn port(&self) -> u16 {
        self.options.port
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop. Registers the system
    /// (and, once printers exist, each printer) via mDNS-SD.
    pub async fn start(&mut self) -> Result<(), std::io::Error> {
        if self.status == ServerStatus::Running {
            debug!(port = self.options.port, "IPP server already running");
            return Ok(());
        }
        self.status = ServerStatus::Starting;

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.options.port).into();
        let listener = TcpListener::bind(bind_addr).await?;
        info!(port = self.options.port, "IPP listener bound");

        self.register_mdns();

        let shutdown = Arc::clone(&self.shutdown_signal);
        let state = Arc::new(ListenerState {
            backend: Arc::clone(&self.backend),
            options: self.options.clone(),
            active_connections: Arc::clone(&self.active_connections),
        });

        let handle = tokio::spawn(async move {
            accept_loop(listener, shutdown, state).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Signal the accept loop to stop and await its exit. In-flight
    /// connections are allowed to finish their current request.
    pub async fn stop(&mut self) -> Result<(), std::io::Error> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        info!(port = self.options.port, "stopping IPP listener");
        self.unregister_mdns();
        self.shutdown_signal.notify_one();
        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|e| std::io::Error::other(e.to_string()))?;
        }
        self.status = ServerStatus::Stopped;
        info!(port = self.options.port, "IPP listener stopped");
        Ok(())
    }

    fn register_mdns(&mut self) {
        let daemon = match mdns_sd::ServiceDaemon::new() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "failed to create mDNS daemon for advertisement");
                return;
            }
        };

        let properties = [("txtvers", "1"), ("qtotal", "1"), ("rp", "ipp/system"), ("ty", self.options.system_name.as_str())];
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| self.options.system_name.clone());

        match mdns_sd::ServiceInfo::new(
            "_ipp-system._tcp.local.",
            &self.options.system_name,
            &format!("{hostname}.local."),
            "",
            self.options.port,
            &properties[..],
        ) {
            Ok(service_info) => {
                let fullname = service_info.get_fullname().to_owned();
                match daemon.register(service_info) {
                    Ok(()) => {
                        info!(name = %self.options.system_name, port = self.options.port, "mDNS system service registered");
                        self.mdns_fullname = Some(fullname);
                    }
                    Err(e) => warn!(error = %e, "failed to register mDNS system service"),
                }
            }
            Err(e) => warn!(error = %e, "failed to create mDNS ServiceInfo"),
        }

        self.mdns_daemon = Some(daemon);
    }

    fn unregister_mdns(&mut self) {
        if let Some(daemon) = self.mdns_daemon.take() {
            if let Some(fullname) = self.mdns_fullname.take() {
                if let Err(e) = daemon.unregister(&fullname) {
                    warn!(error = %e, "failed to unregister mDNS service");
                }
            }
            if let Err(e) = daemon.shutdown() {
                warn!(error = %e, "failed to shut down mDNS daemon");
            }
        }
    }
}

async fn accept_loop<B: IppBackend + 'static>(listener: TcpListener, shutdown: Arc<Notify>, state: Arc<ListenerState<B>>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("accept loop received shutdown signal");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        info!(peer = %peer_addr, "incoming IPP connection");
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            state.active_connections.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = handle_connection(stream, peer_addr, Arc::clone(&state)).await {
                                warn!(peer = %peer_addr, error = %e, "connection handler error");
                            }
                            state.active_connections.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                }
            }
        }
    }
}

async fn handle_connection<B: IppBackend + 'static>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ListenerState<B>>,
) -> Result<(), std::io::Error> {
    let mut buf = Vec::with_capacity(8192);
    let mut limited = (&mut stream).take(MAX_REQUEST_BYTES as u64);
    let bytes_read = limited.read_to_end(&mut buf).await?;

    debug!(peer = %peer_addr, bytes = bytes_read, "received request data");
    if bytes_read == 0 {
        debug!(peer = %peer_addr, "empty request -- closing connection");
        return Ok(());
    }

    let (ipp_body, http_meta) = match http::parse_envelope(&buf) {
        Some(req) => {
            debug!(peer = %peer_addr, path = %req.path, content_length = ?req.content_length, "HTTP envelope detected");
            (&buf[req.body_offset..], Some(req))
        }
        None => {
            debug!(peer = %peer_addr, "no HTTP envelope -- treating as raw IPP");
            (&buf[..], None)
        }
    };

    let auth_header = http_meta.as_ref().and_then(|r| r.authorization.clone());
    let path = http_meta.as_ref().map(|r| r.path.clone()).unwrap_or_else(|| "/ipp/system".into());
    let host_header = http_meta.as_ref().map(|r| r.host.clone()).unwrap_or_default();

    let ctx = AuthContext {
        peer_addr: &peer_addr.to_string(),
        is_tls: state.options.is_tls,
        allow_tls_optional: state.options.allow_tls_optional,
        authorization_header: auth_header.as_deref(),
    };
    let outcome = http::classify_connection(&ctx);
    let username = match &outcome {
        AuthOutcome::Allowed { username, password } => {
            if !state.backend.check_credentials(username, password).await {
                warn!(peer = %peer_addr, username = %username, "rejected invalid credentials");
                let body =
                    wire::error_response(wire::STATUS_CLIENT_ERROR_NOT_AUTHENTICATED, 0, "invalid username or password");
                return send_response(&mut stream, 401, "Unauthorized", &body).await;
            }
            username.clone()
        }
        AuthOutcome::AllowedAnonymous => String::new(),
        AuthOutcome::NeedCredentials => {
            let body = wire::error_response(wire::STATUS_CLIENT_ERROR_NOT_AUTHENTICATED, 0, "authentication required");
            return send_response(&mut stream, 401, "Unauthorized", &body).await;
        }
        AuthOutcome::Forbidden => {
            let body = wire::error_response(wire::STATUS_CLIENT_ERROR_FORBIDDEN, 0, "forbidden");
            return send_response(&mut stream, 403, "Forbidden", &body).await;
        }
    };

    let mut session = ClientSession::new(peer_addr.to_string(), host_header, state.options.port);
    session.username = username;
    session.request_uri = path;

    if http_meta.as_ref().is_some_and(|r| r.is_form_post()) {
        let form = http::parse_form_body(ipp_body);
        let token = form.get("session").map(String::as_str).unwrap_or_default();
        session.csrf_scratch = token.as_bytes().to_vec();
        if !state.backend.verify_csrf(token, &session.host_header).await {
            warn!(peer = %peer_addr, path = %session.request_uri, "rejected form POST with stale or missing CSRF token");
            let body = wire::error_response(wire::STATUS_CLIENT_ERROR_FORBIDDEN, 0, "stale or missing CSRF token");
            return send_response(&mut stream, 403, "Forbidden", &body).await;
        }
    }

    let ipp_request = match parse_request(ipp_body) {
        Ok(req) => req,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "malformed IPP request");
            let body = wire::error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, 0, &format!("malformed IPP request: {e}"));
            return send_response(&mut stream, 200, "OK", &body).await;
        }
    };

    debug!(
        peer = %peer_addr,
        operation_id = format!("0x{:04X}", ipp_request.operation_id),
        request_id = ipp_request.request_id,
        groups = ipp_request.attribute_groups.len(),
        doc_bytes = ipp_request.document_data.len(),
        "parsed IPP request"
    );

    let response_bytes = dispatch(&ipp_request, &session, state.backend.as_ref()).await;

    info!(
        peer = %peer_addr,
        operation = format!("0x{:04X}", ipp_request.operation_id),
        response_bytes = response_bytes.len(),
        "IPP response sent"
    );

    send_response(&mut stream, 200, "OK", &response_bytes).await
}

async fn send_response(stream: &mut TcpStream, status: u16, reason: &str, ipp_body: &[u8]) -> Result<(), std::io::Error> {
    let out = http::wrap_http_response(status, reason, ipp_body);
    stream.write_all(&out).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_standard_ipp_port() {
        let opts = ServerOptions::default();
        assert_eq!(opts.port, DEFAULT_PORT);
        assert!(!opts.allow_tls_optional);
    }
}
