// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Save-state persistence. Every printer/system-definition mutation
// triggers a rewrite of the single `system_state` row in the audit
// log's own database — one `rusqlite` connection per spool directory,
// WAL-mode, shared with the audit trail, so a crash mid-write leaves
// the database consistent and the next startup can replay printer
// state. Job bodies and the job queue survive independently (see
// `pressd_print::queue::JobQueue`); this file only carries what
// `Create-Printer`/`Set-System-Attributes` would otherwise lose.

use pressd_core::CoreError;
use pressd_security::AuditLog;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedPrinter {
    pub(crate) name: String,
    pub(crate) device_uri: String,
    pub(crate) driver_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SavedState {
    pub(crate) system_name: String,
    pub(crate) default_printer: Option<String>,
    pub(crate) printers: Vec<PersistedPrinter>,
}

/// Serialize `state` and overwrite the persisted row.
pub(crate) fn save_state(audit: &AuditLog, state: &SavedState) -> Result<(), CoreError> {
    let payload = serde_json::to_string(state)?;
    audit.save_state(&payload)?;
    debug!(printers = state.printers.len(), "system state persisted");
    Ok(())
}

/// Load the persisted row, if any. A missing row is a clean first-run
/// case, not an error; a corrupt payload is logged and treated the
/// same way rather than blocking startup.
pub(crate) fn load_state(audit: &AuditLog) -> Option<SavedState> {
    let payload = match audit.load_state() {
        Ok(Some(payload)) => payload,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "failed to read persisted state, starting empty");
            return None;
        }
    };
    match serde_json::from_str(&payload) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "failed to parse persisted state, starting empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_audit_log() {
        let audit = AuditLog::open_in_memory().unwrap();
        let state = SavedState {
            system_name: "office-system".into(),
            default_printer: Some("office".into()),
            printers: vec![PersistedPrinter {
                name: "office".into(),
                device_uri: "socket://10.0.0.5:9100/".into(),
                driver_name: "generic".into(),
            }],
        };
        save_state(&audit, &state).unwrap();
        let loaded = load_state(&audit).unwrap();
        assert_eq!(loaded.system_name, "office-system");
        assert_eq!(loaded.printers.len(), 1);
        assert_eq!(loaded.printers[0].name, "office");
    }

    #[test]
    fn missing_state_row_returns_none() {
        let audit = AuditLog::open_in_memory().unwrap();
        assert!(load_state(&audit).is_none());
    }

    #[test]
    fn corrupt_state_payload_returns_none_instead_of_panicking() {
        let audit = AuditLog::open_in_memory().unwrap();
        audit.save_state("not json").unwrap();
        assert!(load_state(&audit).is_none());
    }
}
