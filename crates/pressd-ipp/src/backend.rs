// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The interface the dispatch table is written against. pressd-ipp only
// knows the wire format and the operation table; it has no printer
// registry, job queue, or subscription rings of its own — those live in
// pressd-system's `System`, which implements this trait. Keeping the
// dependency this direction (pressd-system depends on pressd-ipp, never
// the reverse) is what lets the protocol layer be exercised with a fake
// backend in tests without pulling in the worker/device stack.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use pressd_core::{
    ClientSession, CoreError, Job, JobId, Printer, PrinterId, Result, Subscription, SubscriptionId,
};

use crate::subscriptions::SubscriptionRequest;

/// Snapshot of system-wide (not per-printer) attributes, for
/// Get-System-Attributes / Set-System-Attributes.
#[derive(Debug, Clone)]
pub struct SystemAttributes {
    pub uuid: String,
    pub name: String,
    pub default_printer: Option<String>,
    pub printer_names: Vec<String>,
    pub firmware_version: String,
}

/// A patch over `SystemAttributes`: only the fields a Set-System-Attributes
/// request actually named are `Some`.
#[derive(Debug, Clone, Default)]
pub struct SystemAttributesPatch {
    pub name: Option<String>,
    pub default_printer: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PrinterAttributesPatch {
    pub state: Option<pressd_core::PrinterState>,
}

/// What the dispatch table needs from the system it is fronting. Every
/// method takes the already-authorized `ClientSession` so a backend can
/// make username-scoped decisions (e.g. "my-subscriptions") without the
/// dispatch layer re-deriving identity.
#[async_trait]
pub trait IppBackend: Send + Sync {
    /// Verify `session` may perform `operation_id` against `printer_name`
    /// (`None` for system-scoped operations). Admin/submit/read class is
    /// derived by the backend from the operation id.
    async fn authorize(&self, session: &ClientSession, operation_id: u16, printer_name: Option<&str>) -> Result<()>;

    async fn check_credentials(&self, username: &str, password: &str) -> bool;
    async fn is_group_member(&self, username: &str, group: &str) -> bool;

    /// Mint the CSRF token a web-surface form for `client_hostname` should
    /// embed as its hidden `session` field.
    async fn csrf_token(&self, client_hostname: &str) -> String;
    /// Whether `token` is the current CSRF token for `client_hostname`.
    async fn verify_csrf(&self, token: &str, client_hostname: &str) -> bool;

    // -- Jobs -----------------------------------------------------------
    async fn create_job(
        &self,
        printer_name: &str,
        job_name: &str,
        format: &str,
        username: &str,
        job_attributes: std::collections::BTreeMap<String, String>,
        document: Vec<u8>,
    ) -> Result<(i32, Job)>;

    async fn cancel_job(&self, printer_name: &str, ipp_job_id: i32) -> Result<()>;
    async fn get_job(&self, printer_name: &str, ipp_job_id: i32) -> Result<(i32, Job)>;
    async fn get_jobs(&self, printer_name: &str) -> Result<Vec<(i32, Job)>>;

    // -- Printers ---------------------------------------------------------
    async fn create_printer(&self, name: &str, device_uri: &str, driver_name: &str) -> Result<PrinterId>;
    async fn delete_printer(&self, name: &str) -> Result<()>;
    async fn set_printer_attributes(&self, name: &str, patch: PrinterAttributesPatch) -> Result<()>;
    async fn get_printer(&self, name: &str) -> Result<Printer>;
    async fn list_printer_names(&self) -> Vec<String>;

    // -- System -------------------------------------------------------------
    async fn get_system_attributes(&self) -> SystemAttributes;
    async fn set_system_attributes(&self, patch: SystemAttributesPatch) -> Result<()>;
    async fn shutdown_all_printers(&self) -> Result<()>;

    // -- Subscriptions --------------------------------------------------
    /// One result per request, in order — a partial failure returns
    /// `Err` entries alongside `Ok` ones rather than failing the whole
    /// batch, per RFC 3995's per-subscription status semantics.
    async fn create_subscriptions(
        &self,
        owner_printer: Option<&str>,
        owner_job: Option<(&str, i32)>,
        requests: Vec<SubscriptionRequest>,
    ) -> Vec<Result<SubscriptionId>>;

    async fn get_subscriptions(&self, username: &str, job_filter: Option<JobId>) -> Vec<Subscription>;
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription>;
    async fn renew_subscription(&self, id: SubscriptionId, lease: Option<Duration>) -> Result<()>;
    async fn cancel_subscription(&self, id: SubscriptionId) -> Result<()>;

    /// Block (up to `wait_timeout`) until at least one event is available
    /// across `subs`, or the timeout elapses. `since[i]` is the requested
    /// starting sequence for `subs[i]`. Each returned event is tagged with
    /// the subscription it was drawn from, since `Event` itself carries no
    /// subscription id (it is implicit in which ring it lives in).
    async fn get_notifications(
        &self,
        subs: &[SubscriptionId],
        since: &[u64],
        wait: bool,
        wait_timeout: Duration,
    ) -> Result<Vec<(SubscriptionId, pressd_core::Event)>>;
}

/// A per-subscription validation failure, carrying the exact RFC
/// 8011/3995 status code to report in `notify-status-code` rather than
/// collapsing every rejection reason onto one generic code.
#[derive(Debug, Clone)]
pub struct SubscriptionRejection {
    pub status_code: u16,
    pub message: String,
}

impl std::fmt::Display for SubscriptionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Validate the common subscription-creation attributes shared by all
/// three `Create-*-Subscriptions` operations, returning the parsed
/// request or the RFC 8011 status code to reject with.
pub fn validate_subscription_attrs(
    group: &crate::wire::IppAttributeGroup,
    username: &str,
) -> std::result::Result<SubscriptionRequest, SubscriptionRejection> {
    let pull_method = group.get_string("notify-pull-method");
    if pull_method.as_deref() != Some("ippget") {
        // Only the pull method is supported; push requests are rejected
        // with attributes-or-values-not-supported, distinct from every
        // other validation failure below.
        return Err(SubscriptionRejection {
            status_code: crate::wire::STATUS_CLIENT_ERROR_ATTRIBUTES_NOT_SUPPORTED,
            message: "only notify-pull-method=ippget is supported".into(),
        });
    }
    let charset = group.get_string("notify-charset").unwrap_or_else(|| "utf-8".into());
    if charset != "utf-8" && charset != "us-ascii" {
        return Err(not_possible(format!("unsupported notify-charset: {charset}")));
    }
    let event_keywords = group.get_all_strings("notify-events");
    if event_keywords.is_empty() {
        return Err(not_possible("notify-events must be non-empty"));
    }
    let mut events = BTreeSet::new();
    for kw in &event_keywords {
        match pressd_core::EventKind::from_keyword(kw) {
            Some(k) => {
                events.insert(k);
            }
            None => return Err(not_possible(format!("unknown notify-events value: {kw}"))),
        }
    }
    let user_data = group.get("notify-user-data").map(|a| a.value.clone()).unwrap_or_default();
    if !Subscription::validate_user_data(&user_data) {
        return Err(not_possible("notify-user-data exceeds 63 octets"));
    }
    let lease_seconds = group.get_integer("notify-lease-duration").unwrap_or(86_400);
    if lease_seconds < 0 {
        return Err(not_possible("notify-lease-duration must be >= 0"));
    }
    let lease_duration = if lease_seconds == 0 { None } else { Some(Duration::from_secs(lease_seconds as u64)) };

    Ok(SubscriptionRequest { events, notify_user_data: user_data, lease_duration, username: username.to_string() })
}

fn not_possible(message: impl Into<String>) -> SubscriptionRejection {
    SubscriptionRejection { status_code: crate::wire::STATUS_CLIENT_ERROR_NOT_POSSIBLE, message: message.into() }
}
