// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error taxonomy for the pressd core. Leaf operations return one of
// these variants; the IPP dispatcher maps them to status codes and the
// printer worker maps them to job state transitions. Nothing here panics.

use std::io;

/// The result type used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("device I/O error: {0}")]
    DeviceIo(#[from] io::Error),

    #[error("device read timed out after {0:?}")]
    DeviceTimeout(std::time::Duration),

    #[error("unsupported device URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("malformed device URI: {0}")]
    MalformedUri(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("SNMP error: {0}")]
    Snmp(String),

    #[error("document format not supported: {0}")]
    DocumentFormat(String),

    #[error("document unprintable: {0}")]
    DocumentUnprintable(String),

    #[error("malformed IPP request: {0}")]
    MalformedIpp(String),

    #[error("unknown IPP operation: 0x{0:04x}")]
    UnknownOperation(u16),

    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("printer name invalid: {0}")]
    InvalidPrinterName(String),

    #[error("printer name already in use: {0}")]
    DuplicatePrinterName(String),

    #[error("unregistered driver: {0}")]
    UnknownDriver(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("service shutting down")]
    ShuttingDown,

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
}

impl CoreError {
    /// Broad retry classification, used by the worker's backoff loop and by
    /// the device layer's transient-I/O handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::DeviceIo(e) => match e.kind() {
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    ErrorClass::Transient
                }
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorClass::UserAction,
                _ => ErrorClass::Transient,
            },
            CoreError::DeviceUnavailable(_) | CoreError::DeviceTimeout(_) | CoreError::Snmp(_) => {
                ErrorClass::Transient
            }
            CoreError::Discovery(_) => ErrorClass::Transient,
            CoreError::Database(_) => ErrorClass::Transient,
            CoreError::ResourceExhausted(_) => ErrorClass::Transient,
            CoreError::DocumentFormat(_)
            | CoreError::DocumentUnprintable(_)
            | CoreError::UnsupportedScheme(_)
            | CoreError::MalformedUri(_)
            | CoreError::MalformedIpp(_)
            | CoreError::UnknownOperation(_)
            | CoreError::InvalidPrinterName(_)
            | CoreError::DuplicatePrinterName(_)
            | CoreError::UnknownDriver(_)
            | CoreError::Certificate(_)
            | CoreError::IntegrityMismatch { .. }
            | CoreError::Serialization(_) => ErrorClass::Permanent,
            CoreError::PrinterNotFound(_)
            | CoreError::JobNotFound(_)
            | CoreError::SubscriptionNotFound(_) => ErrorClass::UserAction,
            CoreError::Forbidden(_) | CoreError::Unauthorized | CoreError::ShuttingDown => {
                ErrorClass::Permanent
            }
        }
    }
}

/// Coarse retry classification shared by the worker's backoff loop and the
/// device layer's health tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying with backoff — the same operation may succeed later.
    Transient,
    /// The user must do something (missing printer, bad auth) before a retry
    /// would help.
    UserAction,
    /// Retrying will never help — wrong format, bad URI, unsupported op.
    Permanent,
}
