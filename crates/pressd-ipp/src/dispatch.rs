// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation dispatch: one arm per IPP operation id, matching the table in
// the teacher's `ipp_server.rs::dispatch_operation` extended to the full
// surface this framework exposes (printer/system management, the
// subscription family).

use pressd_core::{ClientSession, CoreError, ErrorClass};
use tracing::{debug, warn};

use crate::backend::{validate_subscription_attrs, IppBackend, PrinterAttributesPatch, SystemAttributesPatch};
use crate::subscriptions::{parse_notification_request, write_notification_groups, write_subscription_group};
use crate::wire::{self, error_response, ok_operation_group, IppRequest};

/// Resource path convention: `/ipp/print/<name>` (system-scoped requests
/// use `/ipp/system` and carry no printer in the path).
pub fn printer_name_from_path(path: &str) -> Option<&str> {
    path.strip_prefix("/ipp/print/").map(|rest| rest.trim_end_matches('/'))
}

/// Route a parsed request to its handler and return the encoded response.
pub async fn dispatch(request: &IppRequest, session: &ClientSession, backend: &dyn IppBackend) -> Vec<u8> {
    let printer_name = session.request_uri.as_str();
    let printer_name = printer_name_from_path(printer_name);

    if let Err(e) = backend.authorize(session, request.operation_id, printer_name).await {
        return error_for(&e, request.request_id);
    }

    match request.operation_id {
        wire::OP_PRINT_JOB => handle_print_job(request, printer_name, session, backend).await,
        wire::OP_VALIDATE_JOB => handle_validate_job(request),
        wire::OP_CANCEL_JOB => handle_cancel_job(request, printer_name, backend).await,
        wire::OP_GET_JOB_ATTRIBUTES => handle_get_job_attributes(request, printer_name, backend).await,
        wire::OP_GET_JOBS => handle_get_jobs(request, printer_name, backend).await,
        wire::OP_CREATE_PRINTER => handle_create_printer(request, backend).await,
        wire::OP_DELETE_PRINTER => handle_delete_printer(request, printer_name, backend).await,
        wire::OP_SET_PRINTER_ATTRIBUTES => handle_set_printer_attributes(request, printer_name, backend).await,
        wire::OP_GET_PRINTER_ATTRIBUTES => handle_get_printer_attributes(request, printer_name, backend).await,
        wire::OP_GET_SYSTEM_ATTRIBUTES => handle_get_system_attributes(request, backend).await,
        wire::OP_SET_SYSTEM_ATTRIBUTES => handle_set_system_attributes(request, backend).await,
        wire::OP_SHUTDOWN_ALL_PRINTERS => handle_shutdown_all_printers(request, backend).await,
        wire::OP_CREATE_JOB_SUBSCRIPTIONS => {
            handle_create_subscriptions(request, printer_name, session, backend, SubscriptionScope::Job).await
        }
        wire::OP_CREATE_PRINTER_SUBSCRIPTIONS => {
            handle_create_subscriptions(request, printer_name, session, backend, SubscriptionScope::Printer).await
        }
        wire::OP_CREATE_SYSTEM_SUBSCRIPTIONS => {
            handle_create_subscriptions(request, printer_name, session, backend, SubscriptionScope::System).await
        }
        wire::OP_GET_SUBSCRIPTIONS => handle_get_subscriptions(request, session, backend).await,
        wire::OP_GET_SUBSCRIPTION_ATTRIBUTES => handle_get_subscription_attributes(request, backend).await,
        wire::OP_RENEW_SUBSCRIPTION => handle_renew_subscription(request, backend).await,
        wire::OP_CANCEL_SUBSCRIPTION => handle_cancel_subscription(request, backend).await,
        wire::OP_GET_NOTIFICATIONS => handle_get_notifications(request, backend).await,
        other => {
            warn!(operation = format!("0x{other:04X}"), "unsupported IPP operation");
            error_response(
                wire::STATUS_SERVER_ERROR_OPERATION_NOT_SUPPORTED,
                request.request_id,
                &format!("operation 0x{other:04X} is not supported"),
            )
        }
    }
}

/// Map a `CoreError` to the IPP status code an RFC 8011 client expects,
/// using the same broad classification the retry/health layer uses.
fn error_for(err: &CoreError, request_id: u32) -> Vec<u8> {
    let status = match err {
        CoreError::Unauthorized => wire::STATUS_CLIENT_ERROR_NOT_AUTHENTICATED,
        CoreError::Forbidden(_) => wire::STATUS_CLIENT_ERROR_FORBIDDEN,
        CoreError::PrinterNotFound(_) | CoreError::JobNotFound(_) | CoreError::SubscriptionNotFound(_) => {
            wire::STATUS_CLIENT_ERROR_NOT_FOUND
        }
        CoreError::DocumentFormat(_) => wire::STATUS_CLIENT_ERROR_DOCUMENT_FORMAT_NOT_SUPPORTED,
        CoreError::InvalidPrinterName(_) | CoreError::DuplicatePrinterName(_) | CoreError::MalformedUri(_) => {
            wire::STATUS_CLIENT_ERROR_BAD_REQUEST
        }
        CoreError::ShuttingDown => wire::STATUS_SERVER_ERROR_SERVICE_UNAVAILABLE,
        _ => match err.class() {
            ErrorClass::UserAction => wire::STATUS_CLIENT_ERROR_NOT_POSSIBLE,
            ErrorClass::Permanent => wire::STATUS_CLIENT_ERROR_BAD_REQUEST,
            ErrorClass::Transient => wire::STATUS_SERVER_ERROR_INTERNAL,
        },
    };
    error_response(status, request_id, &err.to_string())
}

fn missing_printer(request_id: u32) -> Vec<u8> {
    error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request_id, "request URI does not name a printer")
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

async fn handle_print_job(
    request: &IppRequest,
    printer_name: Option<&str>,
    session: &ClientSession,
    backend: &dyn IppBackend,
) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    let op_attrs = request.operation_attributes();

    let job_name = op_attrs
        .and_then(|g| g.get_string("job-name"))
        .unwrap_or_else(|| "Untitled Document".into());
    let format = op_attrs.and_then(|g| g.get_string("document-format")).unwrap_or_else(|| "application/octet-stream".into());

    let mut job_attributes = std::collections::BTreeMap::new();
    if let Some(group) = request.job_attributes() {
        for attr in &group.attributes {
            if attr.name.is_empty() {
                continue;
            }
            if let Ok(value) = String::from_utf8(attr.value.clone()) {
                job_attributes.insert(attr.name.clone(), value);
            }
        }
    }

    let username = if session.username.is_empty() { "anonymous".to_string() } else { session.username.clone() };

    match backend
        .create_job(printer_name, &job_name, &format, &username, job_attributes, request.document_data.clone())
        .await
    {
        Ok((ipp_job_id, job)) => {
            let job_uri = format!("{}/jobs/{}", session.request_uri, ipp_job_id);
            let mut resp = ok_operation_group(request.request_id);
            resp.begin_group(wire::TAG_JOB_ATTRIBUTES)
                .integer("job-id", ipp_job_id)
                .uri("job-uri", &job_uri)
                .enum_attr("job-state", job.state.to_ipp())
                .keyword("job-state-reasons", state_reasons_keyword(&job));
            debug!(ipp_job_id, printer = printer_name, "Print-Job accepted");
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}

fn handle_validate_job(request: &IppRequest) -> Vec<u8> {
    ok_operation_group(request.request_id).build()
}

async fn handle_cancel_job(request: &IppRequest, printer_name: Option<&str>, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    let Some(ipp_job_id) = request.operation_attributes().and_then(|g| g.get_integer("job-id")) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing job-id");
    };
    match backend.cancel_job(printer_name, ipp_job_id).await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_get_job_attributes(request: &IppRequest, printer_name: Option<&str>, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    let Some(ipp_job_id) = request.operation_attributes().and_then(|g| g.get_integer("job-id")) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing job-id");
    };
    match backend.get_job(printer_name, ipp_job_id).await {
        Ok((id, job)) => {
            let mut resp = ok_operation_group(request.request_id);
            write_job_group(&mut resp, id, &job);
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_get_jobs(request: &IppRequest, printer_name: Option<&str>, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    match backend.get_jobs(printer_name).await {
        Ok(jobs) => {
            let mut resp = ok_operation_group(request.request_id);
            for (ipp_id, job) in &jobs {
                write_job_group(&mut resp, *ipp_id, job);
            }
            debug!(count = jobs.len(), printer = printer_name, "Get-Jobs");
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}

fn write_job_group(resp: &mut wire::ResponseBuilder, ipp_id: i32, job: &pressd_core::Job) {
    resp.begin_group(wire::TAG_JOB_ATTRIBUTES)
        .integer("job-id", ipp_id)
        .name_attr("job-name", &job.job_name)
        .enum_attr("job-state", job.state.to_ipp())
        .keyword("job-state-reasons", state_reasons_keyword(job))
        .integer("job-impressions-completed", job.impressions_completed as i32);
    if !job.message.is_empty() {
        resp.text("job-state-message", &job.message);
    }
}

fn state_reasons_keyword(job: &pressd_core::Job) -> &'static str {
    job.state_reasons.iter().next().map(|r| r.keyword()).unwrap_or("none")
}

// ---------------------------------------------------------------------------
// Printers
// ---------------------------------------------------------------------------

async fn handle_create_printer(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(op) = request.operation_attributes() else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing operation attributes");
    };
    let (Some(name), Some(device_uri)) = (op.get_string("printer-name"), op.get_string("device-uri")) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing printer-name/device-uri");
    };
    let driver_name = op.get_string("printer-driver-name").unwrap_or_else(|| "auto".into());

    match backend.create_printer(&name, &device_uri, &driver_name).await {
        Ok(id) => {
            let mut resp = ok_operation_group(request.request_id);
            resp.begin_group(wire::TAG_PRINTER_ATTRIBUTES).integer("printer-id", id.0 as i32);
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_delete_printer(request: &IppRequest, printer_name: Option<&str>, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    match backend.delete_printer(printer_name).await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_set_printer_attributes(request: &IppRequest, printer_name: Option<&str>, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    let op = request.operation_attributes();
    let state = op
        .and_then(|g| g.get_string("printer-state"))
        .and_then(|s| match s.as_str() {
            "idle" => Some(pressd_core::PrinterState::Idle),
            "processing" => Some(pressd_core::PrinterState::Processing),
            "stopped" => Some(pressd_core::PrinterState::Stopped),
            _ => None,
        });
    let patch = PrinterAttributesPatch { state };
    match backend.set_printer_attributes(printer_name, patch).await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_get_printer_attributes(request: &IppRequest, printer_name: Option<&str>, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(printer_name) = printer_name else { return missing_printer(request.request_id) };
    match backend.get_printer(printer_name).await {
        Ok(printer) => {
            let mut resp = ok_operation_group(request.request_id);
            resp.begin_group(wire::TAG_PRINTER_ATTRIBUTES)
                .integer("printer-id", printer.id.0 as i32)
                .name_attr("printer-name", &printer.name)
                .uri("printer-uri-supported", &format!("ipp://localhost{}", printer.resource_path()))
                .uri("device-uri", &printer.device_uri)
                .enum_attr("printer-state", printer.state.to_ipp())
                .keyword("printer-state-reasons", printer.state_reasons.iter().next().map(|r| r.keyword()).unwrap_or("none"))
                .boolean("printer-is-accepting-jobs", !printer.is_deleted)
                .keyword("ipp-versions-supported", "1.1");
            if let Some(native) = &printer.capabilities.native_format {
                resp.keyword("document-format-supported", native);
            }
            let mut media_iter = printer.capabilities.media_supported.iter();
            if let Some(first) = media_iter.next() {
                resp.keyword("media-supported", first);
                for m in media_iter {
                    resp.keyword_additional(m);
                }
            }
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

async fn handle_get_system_attributes(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let attrs = backend.get_system_attributes().await;
    let mut resp = ok_operation_group(request.request_id);
    resp.begin_group(wire::TAG_PRINTER_ATTRIBUTES)
        .text("system-uuid", &attrs.uuid)
        .name_attr("system-name", &attrs.name)
        .text("system-firmware-version", &attrs.firmware_version);
    if let Some(default_printer) = &attrs.default_printer {
        resp.name_attr("system-default-printer-id", default_printer);
    }
    let mut names = attrs.printer_names.iter();
    if let Some(first) = names.next() {
        resp.name_attr("printer-names", first);
        for n in names {
            resp.keyword_additional(n);
        }
    }
    resp.build()
}

async fn handle_set_system_attributes(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let op = request.operation_attributes();
    let patch = SystemAttributesPatch {
        name: op.and_then(|g| g.get_string("system-name")),
        default_printer: op.and_then(|g| g.get_string("system-default-printer-id")),
    };
    match backend.set_system_attributes(patch).await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_shutdown_all_printers(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    match backend.shutdown_all_printers().await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

enum SubscriptionScope {
    Job,
    Printer,
    System,
}

async fn handle_create_subscriptions(
    request: &IppRequest,
    printer_name: Option<&str>,
    session: &ClientSession,
    backend: &dyn IppBackend,
    scope: SubscriptionScope,
) -> Vec<u8> {
    if matches!(scope, SubscriptionScope::Printer | SubscriptionScope::Job) && printer_name.is_none() {
        return missing_printer(request.request_id);
    }

    let groups = request.subscription_attributes();
    if groups.is_empty() {
        return error_response(
            wire::STATUS_CLIENT_ERROR_BAD_REQUEST,
            request.request_id,
            "no subscription-attributes groups present",
        );
    }

    let username = if session.username.is_empty() { "anonymous".to_string() } else { session.username.clone() };

    let mut requests = Vec::with_capacity(groups.len());
    let mut precheck_errors = Vec::with_capacity(groups.len());
    for group in &groups {
        match validate_subscription_attrs(group, &username) {
            Ok(req) => {
                requests.push(req);
                precheck_errors.push(None);
            }
            Err(rejection) => precheck_errors.push(Some(rejection)),
        }
    }

    let owner_job = match scope {
        SubscriptionScope::Job => {
            let job_id = request.operation_attributes().and_then(|g| g.get_integer("notify-job-id"));
            job_id.map(|id| (printer_name.unwrap(), id))
        }
        _ => None,
    };
    let owner_printer = match scope {
        SubscriptionScope::Printer => printer_name,
        _ => None,
    };

    let results = if requests.is_empty() {
        Vec::new()
    } else {
        backend.create_subscriptions(owner_printer, owner_job, requests).await
    };

    // Re-interleave precheck failures with backend results in request order,
    // deferring to a typed outcome list so the overall status code can be
    // decided before anything is written to the wire.
    enum Outcome {
        Created(pressd_core::SubscriptionId),
        Rejected { message: String, status_code: u16 },
    }
    let mut results_iter = results.into_iter();
    let outcomes: Vec<Outcome> = precheck_errors
        .iter()
        .map(|precheck| match precheck {
            Some(rejection) => Outcome::Rejected { message: rejection.to_string(), status_code: rejection.status_code },
            None => match results_iter.next() {
                Some(Ok(id)) => Outcome::Created(id),
                Some(Err(e)) => {
                    Outcome::Rejected { message: e.to_string(), status_code: wire::STATUS_CLIENT_ERROR_NOT_POSSIBLE }
                }
                None => Outcome::Rejected {
                    message: "subscription was not created".into(),
                    status_code: wire::STATUS_CLIENT_ERROR_NOT_POSSIBLE,
                },
            },
        })
        .collect();

    let ok_count = outcomes.iter().filter(|o| matches!(o, Outcome::Created(_))).count();
    if ok_count == 0 {
        return error_response(
            wire::STATUS_CLIENT_ERROR_IGNORED_ALL_SUBSCRIPTIONS,
            request.request_id,
            "all subscriptions were rejected",
        );
    }
    let status = if ok_count < outcomes.len() { wire::STATUS_OK_IGNORED_SUBSCRIPTIONS } else { wire::STATUS_OK };

    let mut resp = wire::ResponseBuilder::new(status, request.request_id);
    resp.begin_group(wire::TAG_OPERATION_ATTRIBUTES)
        .charset("attributes-charset", "utf-8")
        .natural_language("attributes-natural-language", "en");
    for outcome in &outcomes {
        match outcome {
            Outcome::Created(id) => {
                resp.begin_group(wire::TAG_SUBSCRIPTION_ATTRIBUTES).integer("notify-subscription-id", id.0 as i32);
            }
            Outcome::Rejected { message, status_code } => {
                resp.begin_group(wire::TAG_SUBSCRIPTION_ATTRIBUTES)
                    .integer("notify-status-code", *status_code as i32)
                    .text("notify-status-message", message);
            }
        }
    }
    resp.build()
}

async fn handle_get_subscriptions(request: &IppRequest, session: &ClientSession, backend: &dyn IppBackend) -> Vec<u8> {
    // A job-scoped query would need the printer context to translate the
    // wire `notify-job-id` integer into the backend's UUID job id; callers
    // wanting that scope use the per-job subscription list embedded in
    // Get-Job-Attributes instead, so this always lists by owner only.
    let username = if session.username.is_empty() { "anonymous" } else { &session.username };
    let subs = backend.get_subscriptions(username, None).await;
    let mut resp = ok_operation_group(request.request_id);
    for sub in &subs {
        write_subscription_group(&mut resp, sub);
    }
    resp.build()
}

async fn handle_get_subscription_attributes(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(id) = request.operation_attributes().and_then(|g| g.get_integer("notify-subscription-id")) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing notify-subscription-id");
    };
    match backend.get_subscription(pressd_core::SubscriptionId(id as u32)).await {
        Ok(sub) => {
            let mut resp = ok_operation_group(request.request_id);
            write_subscription_group(&mut resp, &sub);
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_renew_subscription(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(id) = request.operation_attributes().and_then(|g| g.get_integer("notify-subscription-id")) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing notify-subscription-id");
    };
    let lease_seconds = request.operation_attributes().and_then(|g| g.get_integer("notify-lease-duration")).unwrap_or(86_400);
    let lease = if lease_seconds <= 0 { None } else { Some(std::time::Duration::from_secs(lease_seconds as u64)) };
    match backend.renew_subscription(pressd_core::SubscriptionId(id as u32), lease).await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_cancel_subscription(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(id) = request.operation_attributes().and_then(|g| g.get_integer("notify-subscription-id")) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing notify-subscription-id");
    };
    match backend.cancel_subscription(pressd_core::SubscriptionId(id as u32)).await {
        Ok(()) => ok_operation_group(request.request_id).build(),
        Err(e) => error_for(&e, request.request_id),
    }
}

async fn handle_get_notifications(request: &IppRequest, backend: &dyn IppBackend) -> Vec<u8> {
    let Some(op) = request.operation_attributes() else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing operation attributes");
    };
    let Some((ids, since, wait)) = parse_notification_request(op) else {
        return error_response(wire::STATUS_CLIENT_ERROR_BAD_REQUEST, request.request_id, "missing notify-subscription-ids");
    };

    match backend.get_notifications(&ids, &since, wait, std::time::Duration::from_secs(30)).await {
        Ok(tagged_events) => {
            let mut resp = ok_operation_group(request.request_id);
            resp.integer("notify-get-interval", 30);
            for id in &ids {
                let mine: Vec<_> = tagged_events.iter().filter(|(sub, _)| sub == id).map(|(_, e)| e.clone()).collect();
                write_notification_groups(&mut resp, *id, &mine);
            }
            resp.build()
        }
        Err(e) => error_for(&e, request.request_id),
    }
}
