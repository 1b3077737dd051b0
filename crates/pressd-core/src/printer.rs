// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, PrinterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
}

impl PrinterState {
    pub fn to_ipp(self) -> i32 {
        match self {
            PrinterState::Idle => 3,
            PrinterState::Processing => 4,
            PrinterState::Stopped => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrinterStateReason {
    MediaEmpty,
    DoorOpen,
    InputTrayMissing,
    MediaJam,
    TonerEmpty,
    MarkerSupplyEmpty,
    ConnectingToDevice,
    Offline,
}

impl PrinterStateReason {
    pub fn keyword(self) -> &'static str {
        match self {
            PrinterStateReason::MediaEmpty => "media-empty",
            PrinterStateReason::DoorOpen => "door-open",
            PrinterStateReason::InputTrayMissing => "input-tray-missing",
            PrinterStateReason::MediaJam => "media-jam",
            PrinterStateReason::TonerEmpty => "toner-empty",
            PrinterStateReason::MarkerSupplyEmpty => "marker-supply-empty",
            PrinterStateReason::ConnectingToDevice => "connecting-to-device",
            PrinterStateReason::Offline => "offline",
        }
    }
}

/// Driver-declared capabilities, exposed verbatim as printer attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverCapabilities {
    pub media_supported: Vec<String>,
    pub media_ready: Vec<String>,
    pub print_color_mode_supported: Vec<String>,
    pub print_quality_supported: Vec<String>,
    pub printer_resolution_supported: Vec<String>,
    pub sides_supported: Vec<String>,
    pub document_format_supported: Vec<String>,
    /// MIME type the driver consumes directly via the `print()` callback,
    /// bypassing the raster/PNG pipeline.
    pub native_format: Option<String>,
    pub driver_name: String,
}

/// A logical printer. Invariant identity is `(id, name)`; the resource path
/// is always `/ipp/print/<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Printer {
    pub id: PrinterId,
    pub name: String,
    pub device_uri: String,
    pub state: PrinterState,
    pub state_reasons: BTreeSet<PrinterStateReason>,
    pub active: VecDeque<JobId>,
    pub completed: Vec<JobId>,
    pub processing_job: Option<JobId>,
    pub capabilities: DriverCapabilities,
    pub is_deleted: bool,
}

impl Printer {
    pub fn new(id: PrinterId, name: String, device_uri: String, capabilities: DriverCapabilities) -> Self {
        Self {
            id,
            name,
            device_uri,
            state: PrinterState::Idle,
            state_reasons: BTreeSet::new(),
            active: VecDeque::new(),
            completed: Vec::new(),
            processing_job: None,
            capabilities,
            is_deleted: false,
        }
    }

    pub fn resource_path(&self) -> String {
        format!("/ipp/print/{}", self.name)
    }

    /// No job queued or in flight, and the printer has been marked deleted.
    pub fn is_reapable(&self) -> bool {
        self.is_deleted && self.processing_job.is_none() && self.active.is_empty()
    }
}

/// Validate a printer name against `[A-Za-z_][-._A-Za-z0-9]*`, length <= 127.
pub fn validate_printer_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 127 {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        assert!(validate_printer_name("office_laser"));
        assert!(validate_printer_name("Printer-1.main"));
        assert!(validate_printer_name("_hidden"));
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(!validate_printer_name(""));
        assert!(!validate_printer_name("1printer"));
        assert!(!validate_printer_name("has space"));
        assert!(!validate_printer_name("has/slash"));
        assert!(!validate_printer_name(&"a".repeat(128)));
    }

    #[test]
    fn resource_path_matches_convention() {
        let p = Printer::new(
            PrinterId(1),
            "office".into(),
            "socket://10.0.0.5:9100/".into(),
            DriverCapabilities::default(),
        );
        assert_eq!(p.resource_path(), "/ipp/print/office");
    }

    #[test]
    fn reapable_only_when_deleted_and_idle() {
        let mut p = Printer::new(
            PrinterId(1),
            "office".into(),
            "socket://10.0.0.5:9100/".into(),
            DriverCapabilities::default(),
        );
        assert!(!p.is_reapable());
        p.is_deleted = true;
        assert!(p.is_reapable());
        p.processing_job = Some(JobId::new());
        assert!(!p.is_reapable());
    }
}
