// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job state machine:
//
//   (new) --create--> HELD --data-received--> PENDING --worker-picks--> PROCESSING
//                                                                         |
//                       +--cancel by user--> CANCELED <-------------------+
//                       +--error----------> ABORTED  <-------------------+
//                       +--success--------> COMPLETED <-------------------+
//
// A job is mutated only by the owning printer's worker, or by the request
// handler under the job write lock — never both at once, and never by
// acquiring that lock twice for one logical mutation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, PrinterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Held,
    Pending,
    Processing,
    Canceled,
    Aborted,
    Completed,
    Stopped,
}

impl JobState {
    /// `true` once the job can never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Canceled | JobState::Aborted | JobState::Completed
        )
    }

    /// The IPP `job-state` integer (RFC 8011 §5.3.7).
    pub fn to_ipp(self) -> i32 {
        match self {
            JobState::Pending => 3,
            JobState::Held => 4,
            JobState::Processing => 5,
            JobState::Stopped => 6,
            JobState::Canceled => 7,
            JobState::Aborted => 8,
            JobState::Completed => 9,
        }
    }

    pub fn from_ipp(v: i32) -> Option<Self> {
        Some(match v {
            3 => JobState::Pending,
            4 => JobState::Held,
            5 => JobState::Processing,
            6 => JobState::Stopped,
            7 => JobState::Canceled,
            8 => JobState::Aborted,
            9 => JobState::Completed,
            _ => return None,
        })
    }
}

/// `job-state-reasons` keyword values this core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobStateReason {
    JobIncoming,
    JobDataInsufficient,
    JobPrinting,
    JobCanceledByUser,
    DocumentFormatError,
    DocumentUnprintableError,
    JobCompletedWithErrors,
    JobCompletedWithWarnings,
    ErrorsDetected,
    WarningsDetected,
    PrinterStopped,
}

impl JobStateReason {
    pub fn keyword(self) -> &'static str {
        match self {
            JobStateReason::JobIncoming => "job-incoming",
            JobStateReason::JobDataInsufficient => "job-data-insufficient",
            JobStateReason::JobPrinting => "job-printing",
            JobStateReason::JobCanceledByUser => "job-canceled-by-user",
            JobStateReason::DocumentFormatError => "document-format-error",
            JobStateReason::DocumentUnprintableError => "document-unprintable-error",
            JobStateReason::JobCompletedWithErrors => "job-completed-with-errors",
            JobStateReason::JobCompletedWithWarnings => "job-completed-with-warnings",
            JobStateReason::ErrorsDetected => "errors-detected",
            JobStateReason::WarningsDetected => "warnings-detected",
            JobStateReason::PrinterStopped => "printer-stopped",
        }
    }
}

/// A single print job, owned exclusively by the printer it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub printer_id: PrinterId,
    pub state: JobState,
    pub state_reasons: BTreeSet<JobStateReason>,

    /// Spool filename, relative to `SystemConfig::spool_dir` (`j<id>.bin`).
    pub spool_file: String,
    /// MIME document format (`image/pwg-raster`, `image/png`, …).
    pub format: String,
    pub job_name: String,
    pub username: String,

    pub impressions: u32,
    pub impressions_completed: u32,

    pub created_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Advisory flag set by `Cancel-Job`; checked by the worker between
    /// raster rows, between copies, and between sub-operations. The
    /// terminal transition is performed only by the worker.
    pub is_canceled: bool,

    /// Human-readable status message (capped at 1023 bytes per RFC 8011).
    pub message: String,

    /// Flattened job attributes submitted with the job (copies, media,
    /// orientation-requested, print-color-mode, …).
    pub job_attributes: BTreeMap<String, String>,
}

const MAX_MESSAGE_BYTES: usize = 1023;

impl Job {
    pub fn new(
        id: JobId,
        printer_id: PrinterId,
        format: impl Into<String>,
        job_name: impl Into<String>,
        username: impl Into<String>,
        job_attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id,
            printer_id,
            state: JobState::Held,
            state_reasons: BTreeSet::from([JobStateReason::JobIncoming]),
            spool_file: format!("j{id}.bin"),
            format: format.into(),
            job_name: job_name.into(),
            username: username.into(),
            impressions: 0,
            impressions_completed: 0,
            created_at: Utc::now(),
            processing_at: None,
            completed_at: None,
            is_canceled: false,
            message: String::new(),
            job_attributes,
        }
    }

    /// HELD -> PENDING once the document body has been fully spooled.
    pub fn mark_pending(&mut self) {
        self.state = JobState::Pending;
        self.state_reasons.remove(&JobStateReason::JobIncoming);
    }

    /// PENDING -> PROCESSING, entered only by the owning printer's worker.
    pub fn mark_processing(&mut self) {
        self.state = JobState::Processing;
        self.processing_at = Some(Utc::now());
        self.state_reasons.insert(JobStateReason::JobPrinting);
    }

    /// Move to a terminal state, clearing `job-printing` and deriving the
    /// `-with-errors`/`-with-warnings` reasons from what is already set.
    pub fn mark_terminal(&mut self, state: JobState) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.completed_at = Some(Utc::now());
        self.state_reasons.remove(&JobStateReason::JobPrinting);
        if self.state_reasons.contains(&JobStateReason::ErrorsDetected) {
            self.state_reasons
                .insert(JobStateReason::JobCompletedWithErrors);
        }
        if self.state_reasons.contains(&JobStateReason::WarningsDetected) {
            self.state_reasons
                .insert(JobStateReason::JobCompletedWithWarnings);
        }
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_BYTES {
            message.truncate(MAX_MESSAGE_BYTES);
        }
        self.message = message;
    }

    pub fn request_cancel(&mut self) {
        self.is_canceled = true;
        self.state_reasons.insert(JobStateReason::JobCanceledByUser);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> Job {
        Job::new(
            JobId::new(),
            PrinterId(1),
            "image/pwg-raster",
            "test.raster",
            "alice",
            BTreeMap::new(),
        )
    }

    #[test]
    fn starts_held() {
        let job = test_job();
        assert_eq!(job.state, JobState::Held);
        assert!(job.state_reasons.contains(&JobStateReason::JobIncoming));
    }

    #[test]
    fn pending_to_processing_sets_timestamp_and_reason() {
        let mut job = test_job();
        job.mark_pending();
        assert_eq!(job.state, JobState::Pending);
        job.mark_processing();
        assert_eq!(job.state, JobState::Processing);
        assert!(job.processing_at.is_some());
        assert!(job.state_reasons.contains(&JobStateReason::JobPrinting));
    }

    #[test]
    fn terminal_clears_printing_reason() {
        let mut job = test_job();
        job.mark_pending();
        job.mark_processing();
        job.mark_terminal(JobState::Completed);
        assert!(job.state.is_terminal());
        assert!(!job.state_reasons.contains(&JobStateReason::JobPrinting));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn errors_detected_becomes_completed_with_errors() {
        let mut job = test_job();
        job.state_reasons.insert(JobStateReason::ErrorsDetected);
        job.mark_terminal(JobState::Aborted);
        assert!(job
            .state_reasons
            .contains(&JobStateReason::JobCompletedWithErrors));
    }

    #[test]
    fn message_is_truncated_to_1023_bytes() {
        let mut job = test_job();
        job.set_message("x".repeat(2000));
        assert_eq!(job.message.len(), 1023);
    }

    #[test]
    fn ipp_state_round_trips() {
        for state in [
            JobState::Pending,
            JobState::Held,
            JobState::Processing,
            JobState::Stopped,
            JobState::Canceled,
            JobState::Aborted,
            JobState::Completed,
        ] {
            assert_eq!(JobState::from_ipp(state.to_ipp()), Some(state));
        }
    }

    #[test]
    fn cancel_is_advisory_until_worker_acts() {
        let mut job = test_job();
        job.request_cancel();
        assert!(job.is_canceled);
        assert_ne!(job.state, JobState::Canceled);
    }
}
