// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the web admin surface and CLI hooks.
// Protocol-level code never consults this module — it works exclusively in
// IPP status codes. This is purely an operator-facing layer.

use crate::error::CoreError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip, timeout — may resolve itself.
    Transient,
    /// An administrator must do something (add paper, fix a URI, set a password).
    ActionRequired,
    /// Cannot be fixed by retrying or a config change.
    Permanent,
}

/// A human-readable error with plain-English message and suggested fix.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `CoreError` into an operator-facing message.
pub fn humanize_error(err: &CoreError) -> HumanError {
    match err {
        CoreError::DeviceUnavailable(detail) => HumanError {
            message: "The printer could not be reached.".into(),
            suggestion: format!(
                "Check the printer is powered on and reachable at its configured device URI. ({detail})"
            ),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::DeviceIo(e) => HumanError {
            message: "A device I/O error occurred.".into(),
            suggestion: format!("The connection to the printer was interrupted: {e}"),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::DeviceTimeout(d) => HumanError {
            message: "The printer did not respond in time.".into(),
            suggestion: format!("No response within {d:?}. The printer may be busy or off."),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::UnsupportedScheme(scheme) => HumanError {
            message: "Unsupported device URI scheme.".into(),
            suggestion: format!("\"{scheme}\" is not one of usb, socket, dnssd, snmp."),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::MalformedUri(detail) => HumanError {
            message: "The device URI could not be parsed.".into(),
            suggestion: format!("Check the URI syntax. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::Discovery(detail) => HumanError {
            message: "Printer discovery failed.".into(),
            suggestion: format!("Check that mDNS/DNS-SD traffic is not blocked. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::Snmp(detail) => HumanError {
            message: "SNMP query failed.".into(),
            suggestion: format!("The device may not support SNMP, or it is unreachable. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::DocumentFormat(detail) => HumanError {
            message: "This document format is not supported.".into(),
            suggestion: format!("Submit image/pwg-raster, image/urf, or the printer's native format. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::DocumentUnprintable(detail) => HumanError {
            message: "The document could not be rendered.".into(),
            suggestion: format!("The file may be corrupt or use unsupported features. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::MalformedIpp(detail) => HumanError {
            message: "The client sent a malformed IPP request.".into(),
            suggestion: format!("Detail: {detail}"),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::UnknownOperation(op) => HumanError {
            message: "The client requested an unsupported IPP operation.".into(),
            suggestion: format!("Operation id 0x{op:04x} is not implemented."),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::PrinterNotFound(id) => HumanError {
            message: "No such printer.".into(),
            suggestion: format!("Printer \"{id}\" does not exist or was deleted."),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::JobNotFound(id) => HumanError {
            message: "No such job.".into(),
            suggestion: format!("Job \"{id}\" does not exist or has been purged."),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::SubscriptionNotFound(id) => HumanError {
            message: "No such subscription.".into(),
            suggestion: format!("Subscription \"{id}\" does not exist or expired."),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::InvalidPrinterName(name) => HumanError {
            message: "Invalid printer name.".into(),
            suggestion: format!(
                "\"{name}\" must match [A-Za-z_][-._A-Za-z0-9]* and be 127 characters or fewer."
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::DuplicatePrinterName(name) => HumanError {
            message: "Printer name already in use.".into(),
            suggestion: format!("Choose a different name than \"{name}\"."),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::UnknownDriver(name) => HumanError {
            message: "Unknown printer driver.".into(),
            suggestion: format!("\"{name}\" is not registered. Use \"auto\" or register the driver first."),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::Forbidden(detail) => HumanError {
            message: "Request forbidden.".into(),
            suggestion: format!("Authorization failed: {detail}"),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::Unauthorized => HumanError {
            message: "Authentication required.".into(),
            suggestion: "Provide valid credentials for this operation.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        CoreError::ResourceExhausted(detail) => HumanError {
            message: "The server is out of resources.".into(),
            suggestion: format!("Free up spool space or memory and retry. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::ShuttingDown => HumanError {
            message: "The server is shutting down.".into(),
            suggestion: "New jobs are refused while in-flight jobs finish. Try again shortly.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::Database(detail) => HumanError {
            message: "A storage error occurred.".into(),
            suggestion: format!("Persistent state may be temporarily unavailable. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::Serialization(detail) => HumanError {
            message: "An internal data error occurred.".into(),
            suggestion: format!("Please report this. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },
        CoreError::Certificate(detail) => HumanError {
            message: "TLS certificate setup failed.".into(),
            suggestion: format!("Regenerate the server's TLS key pair. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
        CoreError::IntegrityMismatch { expected, actual } => HumanError {
            message: "Stored data does not match its recorded hash.".into(),
            suggestion: format!("Expected {expected}, computed {actual}. The spool file may be corrupt."),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_unavailable_is_transient() {
        let err = CoreError::DeviceUnavailable("connection refused".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn bad_printer_name_is_action_required() {
        let human = humanize_error(&CoreError::InvalidPrinterName("bad name!".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn unknown_operation_is_permanent() {
        let human = humanize_error(&CoreError::UnknownOperation(0x9999));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }
}
