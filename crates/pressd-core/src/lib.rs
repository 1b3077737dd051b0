// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Domain model and error taxonomy shared by every other pressd crate:
// printers, jobs, subscriptions, configuration, and the `CoreError`
// enum they all return. Contains no I/O, no locking policy, and no wire
// format — those live in pressd-print, pressd-ipp, and pressd-raster,
// which depend on this crate rather than the reverse.

pub mod config;
pub mod device;
pub mod error;
pub mod human_errors;
pub mod ids;
pub mod job;
pub mod printer;
pub mod session;
pub mod subscription;

pub use config::SystemConfig;
pub use device::DeviceUri;
pub use error::{CoreError, ErrorClass, Result};
pub use human_errors::{humanize_error, HumanError, Severity};
pub use ids::{JobId, PrinterId, SubscriptionId};
pub use job::{Job, JobState, JobStateReason};
pub use printer::{validate_printer_name, DriverCapabilities, Printer, PrinterState, PrinterStateReason};
pub use session::ClientSession;
pub use subscription::{Event, EventKind, Subscription, SubscriptionOwner};
