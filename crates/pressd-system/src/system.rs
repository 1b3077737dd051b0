// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The System container: the single source of truth for every printer,
// job, and subscription this process hosts, and the `IppBackend`
// `pressd-ipp`'s dispatch table is written against.
//
// Lock nesting discipline: `System -> Printer -> Job` and
// `System -> Subscription`, never the reverse, and never both chains
// held across an `.await` at once. In practice this means every method
// below takes the single `state` lock for the span of one logical
// mutation, builds whatever it needs to hand off (a cloned `Job`, an
// `Arc<JobQueue>`), and drops the guard before doing anything that
// itself awaits (SQLite checkpoints, event delivery, worker wakeups).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pressd_core::{
    validate_printer_name, ClientSession, CoreError, DeviceUri, DriverCapabilities, Event, EventKind, Job, JobId,
    JobState, Printer, PrinterId, PrinterState, Result, Subscription, SubscriptionId, SubscriptionOwner, SystemConfig,
};
use pressd_ipp::backend::{IppBackend, PrinterAttributesPatch, SystemAttributes, SystemAttributesPatch};
use pressd_ipp::subscriptions::SubscriptionRequest;
use pressd_print::health::HealthTracker;
use pressd_print::queue::JobQueue;
use pressd_security::AuditLog;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::announce::Announcer;
use crate::state::{self, PersistedPrinter, SavedState};
use crate::worker;

/// Everything the worker needs to pick up and report on one printer's
/// jobs, plus the jobs themselves.
pub(crate) struct PrinterRecord {
    pub(crate) printer: Printer,
    pub(crate) jobs: BTreeMap<JobId, Job>,
    ipp_job_ids: BTreeMap<i32, JobId>,
    next_ipp_job_id: i32,
    pub(crate) queue: Arc<JobQueue>,
    job_tx: mpsc::UnboundedSender<JobId>,
}

struct SystemState {
    printers: BTreeMap<PrinterId, PrinterRecord>,
    printer_names: HashMap<String, PrinterId>,
    next_printer_id: u32,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_subscription_id: u32,
    name: String,
    default_printer: Option<String>,
    shutting_down: bool,
}

/// Local operation classification used by [`System::authorize`]. Distinct
/// from `pressd_ipp::http::OperationClass`, which gates the *connection*
/// rather than a specific operation against a specific backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationClass {
    Admin,
    Submit,
    Read,
}

fn classify_operation(operation_id: u16) -> OperationClass {
    use pressd_ipp::wire::*;
    match operation_id {
        OP_PRINT_JOB | OP_CREATE_JOB | OP_VALIDATE_JOB | OP_CANCEL_JOB | OP_HOLD_JOB | OP_RELEASE_JOB
        | OP_CREATE_JOB_SUBSCRIPTIONS | OP_CREATE_PRINTER_SUBSCRIPTIONS | OP_CREATE_SYSTEM_SUBSCRIPTIONS
        | OP_RENEW_SUBSCRIPTION | OP_CANCEL_SUBSCRIPTION | OP_GET_NOTIFICATIONS => OperationClass::Submit,
        OP_CREATE_PRINTER | OP_DELETE_PRINTER | OP_SET_PRINTER_ATTRIBUTES | OP_SET_SYSTEM_ATTRIBUTES
        | OP_SHUTDOWN_ALL_PRINTERS | OP_PAUSE_PRINTER | OP_RESUME_PRINTER => OperationClass::Admin,
        _ => OperationClass::Read,
    }
}

/// The headless printer application's top-level container: printer and
/// subscription registries, id counters, and the account/group tables
/// `authorize` consults. One `System` serves one `pressd-ipp` listener.
pub struct System {
    state: RwLock<SystemState>,
    config: SystemConfig,
    audit: Arc<AuditLog>,
    uuid: String,
    notify: Notify,
    accounts: HashMap<String, String>,
    admin_members: BTreeSet<String>,
    print_members: BTreeSet<String>,
    cancel_flags: std::sync::Mutex<HashMap<JobId, Arc<AtomicBool>>>,
    /// Per-device circuit breaker, keyed by device URI rather than
    /// printer id so two printers sharing one flaky device share a
    /// cooldown too.
    health: std::sync::Mutex<HealthTracker>,
    announcer: Option<Announcer>,
    self_weak: OnceLock<Weak<System>>,
    /// CSRF signing key for web-surface form POSTs, rotated lazily
    /// (`SystemConfig::session_key_rotation`) the next time it's read.
    session_key: std::sync::Mutex<SessionKeyState>,
}

struct SessionKeyState {
    key: Vec<u8>,
    issued_at: std::time::Instant,
}

fn fresh_session_key() -> Vec<u8> {
    let mut key = Uuid::new_v4().as_bytes().to_vec();
    key.extend_from_slice(Uuid::new_v4().as_bytes());
    key
}

impl System {
    /// Build a fresh system with no printers and the given account/group
    /// tables (loading these from PAM or an external directory is outside
    /// this crate's concern; it is handed a resolved table).
    pub fn new(
        config: SystemConfig,
        audit: AuditLog,
        system_name: impl Into<String>,
        accounts: HashMap<String, String>,
        admin_members: BTreeSet<String>,
        print_members: BTreeSet<String>,
    ) -> Arc<Self> {
        let system_name = system_name.into();
        let audit = Arc::new(audit);
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "pressd".into());
        let announcer = Announcer::start(hostname);
        let uuid = Uuid::new_v4().to_string();
        let listen_port = config.listen_port;
        if let Some(a) = &announcer {
            a.announce_system(&system_name, listen_port, &uuid);
        }

        let system = Arc::new(Self {
            state: RwLock::new(SystemState {
                printers: BTreeMap::new(),
                printer_names: HashMap::new(),
                next_printer_id: 1,
                subscriptions: BTreeMap::new(),
                next_subscription_id: 1,
                name: system_name,
                default_printer: None,
                shutting_down: false,
            }),
            config,
            audit,
            uuid,
            notify: Notify::new(),
            accounts,
            admin_members,
            print_members,
            cancel_flags: std::sync::Mutex::new(HashMap::new()),
            health: std::sync::Mutex::new(HealthTracker::new()),
            announcer,
            self_weak: OnceLock::new(),
            session_key: std::sync::Mutex::new(SessionKeyState { key: fresh_session_key(), issued_at: std::time::Instant::now() }),
        });
        let _ = system.self_weak.set(Arc::downgrade(&system));
        system
    }

    /// Build a system, then recreate every printer recorded in the
    /// audit log's `system_state` row from a previous run. A missing or
    /// corrupt row is treated as a clean first boot.
    pub async fn restore(
        config: SystemConfig,
        audit: AuditLog,
        fallback_system_name: impl Into<String>,
        accounts: HashMap<String, String>,
        admin_members: BTreeSet<String>,
        print_members: BTreeSet<String>,
    ) -> Arc<Self> {
        let saved = state::load_state(&audit);

        let system_name = saved.as_ref().map(|s| s.system_name.clone()).unwrap_or_else(|| fallback_system_name.into());
        let system = Self::new(config, audit, system_name, accounts, admin_members, print_members);

        if let Some(saved) = saved {
            for printer in saved.printers {
                if let Err(e) = system.create_printer(&printer.name, &printer.device_uri, &printer.driver_name).await {
                    warn!(printer = %printer.name, error = %e, "failed to restore persisted printer");
                }
            }
            if let Some(default_printer) = saved.default_printer {
                let mut state = system.state.write().await;
                if state.printer_names.contains_key(&default_printer) {
                    state.default_printer = Some(default_printer);
                }
            }
        }
        system
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Rebuild `SavedState` from the current registry and write it to
    /// the audit log's `system_state` row. Called after every
    /// printer/system-definition mutation; cheap relative to the
    /// mutation itself since the printer count is small and the row is
    /// one small JSON payload.
    async fn persist_state(&self) {
        let saved = {
            let state = self.state.read().await;
            SavedState {
                system_name: state.name.clone(),
                default_printer: state.default_printer.clone(),
                printers: state
                    .printers
                    .values()
                    .filter(|r| !r.printer.is_deleted)
                    .map(|r| PersistedPrinter {
                        name: r.printer.name.clone(),
                        device_uri: r.printer.device_uri.clone(),
                        driver_name: r.printer.capabilities.driver_name.clone(),
                    })
                    .collect(),
            }
        };
        let audit = Arc::clone(&self.audit);
        let result = tokio::task::spawn_blocking(move || state::save_state(&audit, &saved))
            .await
            .unwrap_or_else(|e| Err(CoreError::Database(format!("persist_state task panicked: {e}"))));
        if let Err(e) = result {
            warn!(error = %e, "failed to persist system state");
        }
    }

    /// Append one entry to the audit trail. Audit failures are logged,
    /// never propagated -- a full audit disk should not block printing.
    async fn audit(&self, actor: &str, action: &str, object_kind: &str, object_id: &str, success: bool, detail: Option<String>) {
        let audit = Arc::clone(&self.audit);
        let actor = actor.to_string();
        let action = action.to_string();
        let object_kind = object_kind.to_string();
        let object_id = object_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            audit.record(&actor, &action, &object_kind, &object_id, success, detail.as_deref())
        })
        .await
        .unwrap_or_else(|e| Err(CoreError::Database(format!("audit task panicked: {e}"))));
        if let Err(e) = result {
            warn!(error = %e, "failed to write audit entry");
        }
    }

    /// The current CSRF signing key, rotating it first if it's older than
    /// `session_key_rotation`. Every form token minted or checked in the
    /// same rotation window derives from the same bytes.
    fn session_key_now(&self) -> Vec<u8> {
        let mut state = self.session_key.lock().expect("session key mutex poisoned");
        if state.issued_at.elapsed() >= self.config.session_key_rotation {
            state.key = fresh_session_key();
            state.issued_at = std::time::Instant::now();
        }
        state.key.clone()
    }

    /// Reconstruct the `Arc` this system lives behind, for handing to
    /// spawned worker tasks. Panics only if called before `new` finishes
    /// constructing the `Arc` (impossible from outside this module) or
    /// after every other `Arc<System>` has already been dropped.
    fn arc(self: &Self) -> Arc<System> {
        self.self_weak
            .get()
            .expect("System::new always sets self_weak before returning")
            .upgrade()
            .expect("an IppBackend method is running, so at least one Arc<System> is alive")
    }

    pub(crate) fn cancel_flag_for(&self, job_id: JobId) -> Arc<AtomicBool> {
        Arc::clone(
            self.cancel_flags
                .lock()
                .expect("cancel flag map lock poisoned")
                .entry(job_id)
                .or_insert_with(|| Arc::new(AtomicBool::new(false))),
        )
    }

    fn mark_canceled(&self, job_id: JobId) {
        if let Some(flag) = self.cancel_flags.lock().expect("cancel flag map lock poisoned").get(&job_id) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    fn forget_cancel_flag(&self, job_id: JobId) {
        self.cancel_flags.lock().expect("cancel flag map lock poisoned").remove(&job_id);
    }

    /// Whether the worker should even attempt to reach `device_uri` right
    /// now, per the circuit breaker's current state for that device.
    pub(crate) fn health_allow(&self, device_uri: &str) -> bool {
        self.health.lock().expect("health tracker lock poisoned").allow_request(device_uri)
    }

    pub(crate) fn health_record_success(&self, device_uri: &str) {
        self.health.lock().expect("health tracker lock poisoned").record_success(device_uri);
    }

    pub(crate) fn health_record_failure(&self, device_uri: &str, error: &str) {
        self.health.lock().expect("health tracker lock poisoned").record_failure(device_uri, error);
    }

    /// A human-readable explanation of why a device is currently
    /// circuit-broken, or `None` if it is healthy.
    pub(crate) fn health_status_message(&self, device_uri: &str) -> Option<String> {
        self.health.lock().expect("health tracker lock poisoned").status_message(device_uri)
    }

    /// Append `event` to every subscription whose owner matches `owner`
    /// (or which is system-scoped, since system subscriptions observe
    /// every event) and which asked for this `kind`. Wakes any blocked
    /// `Get-Notifications` callers afterward.
    async fn publish(&self, owner: SubscriptionOwner, kind: EventKind, attributes: BTreeMap<String, String>) {
        {
            let mut state = self.state.write().await;
            let now = Utc::now();
            for sub in state.subscriptions.values_mut() {
                if !sub.events.contains(&kind) {
                    continue;
                }
                if sub.owner != owner && sub.owner != SubscriptionOwner::System {
                    continue;
                }
                sub.publish(Event { sequence: 0, kind, owner, occurred_at: now, attributes: attributes.clone() });
            }
        }
        self.notify.notify_waiters();
    }

    /// Move a job from Held/Pending to Processing under the write lock,
    /// checkpoint it, and hand the worker what it needs to actually print.
    pub(crate) async fn begin_processing(
        &self,
        printer_id: PrinterId,
        job_id: JobId,
    ) -> Option<(Job, Arc<JobQueue>, String)> {
        let (job, queue, device_uri) = {
            let mut state = self.state.write().await;
            let record = state.printers.get_mut(&printer_id)?;
            let job = record.jobs.get_mut(&job_id)?;
            if job.state.is_terminal() {
                return None;
            }
            job.mark_processing();
            record.printer.state = PrinterState::Processing;
            record.printer.processing_job = Some(job_id);
            (job.clone(), Arc::clone(&record.queue), record.printer.device_uri.clone())
        };
        checkpoint(Arc::clone(&queue), job.clone()).await.ok();
        self.publish(SubscriptionOwner::Job(job_id), EventKind::JobStateChanged, BTreeMap::new()).await;
        Some((job, queue, device_uri))
    }

    /// Flip a printer between `Processing` and `Stopped` while its worker
    /// is blocked retrying a device that won't open. The job underneath
    /// stays `Processing` throughout -- it is the printer, not the job,
    /// that is down.
    pub(crate) async fn set_printer_stopped(&self, printer_id: PrinterId, stopped: bool) {
        {
            let mut state = self.state.write().await;
            let Some(record) = state.printers.get_mut(&printer_id) else { return };
            record.printer.state = if stopped { PrinterState::Stopped } else { PrinterState::Processing };
        }
        self.publish(SubscriptionOwner::Printer(printer_id), EventKind::PrinterStateChanged, BTreeMap::new()).await;
    }

    /// Record the outcome of a print attempt, transition the job to its
    /// terminal state, and return the printer to idle if nothing else is
    /// queued.
    pub(crate) async fn finish_processing(
        &self,
        printer_id: PrinterId,
        job_id: JobId,
        outcome: Result<()>,
        queue: Arc<JobQueue>,
    ) {
        let job = {
            let mut state = self.state.write().await;
            let Some(record) = state.printers.get_mut(&printer_id) else { return };
            let Some(job) = record.jobs.get_mut(&job_id) else { return };

            let final_state = if job.is_canceled {
                JobState::Canceled
            } else if let Err(e) = &outcome {
                job.set_message(e.to_string());
                job.state_reasons.insert(pressd_core::JobStateReason::ErrorsDetected);
                JobState::Aborted
            } else {
                job.impressions_completed = job.impressions.max(1);
                JobState::Completed
            };
            job.mark_terminal(final_state);

            record.printer.active.retain(|id| *id != job_id);
            record.printer.completed.push(job_id);
            record.printer.processing_job = None;
            if record.printer.active.is_empty() {
                record.printer.state = PrinterState::Idle;
            }
            job.clone()
        };

        self.forget_cancel_flag(job_id);
        checkpoint(queue, job.clone()).await.ok();
        if let Err(e) = &outcome {
            warn!(job = %job_id, printer = %printer_id, error = %e, "job did not complete");
        } else {
            info!(job = %job_id, printer = %printer_id, "job completed");
        }
        self.publish(SubscriptionOwner::Job(job_id), EventKind::JobCompleted, BTreeMap::new()).await;
    }
}

async fn insert_job(queue: Arc<JobQueue>, job: Job) -> Result<()> {
    tokio::task::spawn_blocking(move || queue.insert_job(&job))
        .await
        .map_err(|e| CoreError::Database(format!("insert_job task panicked: {e}")))?
}

async fn checkpoint(queue: Arc<JobQueue>, job: Job) -> Result<()> {
    tokio::task::spawn_blocking(move || queue.checkpoint(&job))
        .await
        .map_err(|e| CoreError::Database(format!("checkpoint task panicked: {e}")))?
}

#[async_trait]
impl IppBackend for System {
    #[instrument(skip(self, session))]
    async fn authorize(&self, session: &ClientSession, operation_id: u16, _printer_name: Option<&str>) -> Result<()> {
        // Anonymous sessions already passed the connection-level gate in
        // `pressd-ipp::http::classify_connection` (localhost, or explicit
        // allow-tls-optional with no accounts configured) -- that gate is
        // the real authorization decision for them.
        if session.username.is_empty() {
            return Ok(());
        }
        match classify_operation(operation_id) {
            OperationClass::Read => Ok(()),
            OperationClass::Submit => {
                if self.is_group_member(&session.username, &self.config.print_group).await
                    || self.is_group_member(&session.username, &self.config.admin_group).await
                {
                    Ok(())
                } else {
                    self.audit(&session.username, "authorize", "system", "-", false, Some(format!("op 0x{operation_id:04x}"))).await;
                    Err(CoreError::Forbidden(format!(
                        "{} is not a member of {}",
                        session.username, self.config.print_group
                    )))
                }
            }
            OperationClass::Admin => {
                if self.is_group_member(&session.username, &self.config.admin_group).await {
                    Ok(())
                } else {
                    self.audit(&session.username, "authorize", "system", "-", false, Some(format!("op 0x{operation_id:04x}"))).await;
                    Err(CoreError::Forbidden(format!(
                        "{} is not a member of {}",
                        session.username, self.config.admin_group
                    )))
                }
            }
        }
    }

    async fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.accounts.get(username).is_some_and(|p| p == password)
    }

    async fn is_group_member(&self, username: &str, group: &str) -> bool {
        if group == self.config.admin_group {
            self.admin_members.contains(username)
        } else if group == self.config.print_group {
            self.print_members.contains(username) || self.admin_members.contains(username)
        } else {
            false
        }
    }

    async fn csrf_token(&self, client_hostname: &str) -> String {
        pressd_security::derive_csrf_token(&self.session_key_now(), client_hostname)
    }

    async fn verify_csrf(&self, token: &str, client_hostname: &str) -> bool {
        !token.is_empty() && self.csrf_token(client_hostname).await == token
    }

    #[instrument(skip(self, job_attributes, document))]
    async fn create_job(
        &self,
        printer_name: &str,
        job_name: &str,
        format: &str,
        username: &str,
        job_attributes: BTreeMap<String, String>,
        document: Vec<u8>,
    ) -> Result<(i32, Job)> {
        let (job, queue, ipp_id) = {
            let mut state = self.state.write().await;
            if state.shutting_down {
                return Err(CoreError::ShuttingDown);
            }
            let printer_id =
                *state.printer_names.get(printer_name).ok_or_else(|| CoreError::PrinterNotFound(printer_name.into()))?;
            let record = state.printers.get_mut(&printer_id).expect("printer_names/printers inconsistent");
            if record.printer.is_deleted {
                return Err(CoreError::PrinterNotFound(printer_name.into()));
            }

            let job_id = JobId::new();
            let mut job = Job::new(job_id, printer_id, format, job_name, username, job_attributes);

            let spool_path = Path::new(&self.config.spool_dir).join(&job.spool_file);
            if let Some(parent) = spool_path.parent() {
                std::fs::create_dir_all(parent).map_err(CoreError::DeviceIo)?;
            }
            std::fs::write(&spool_path, &document).map_err(CoreError::DeviceIo)?;
            job.impressions = 1;
            job.mark_pending();

            let ipp_id = record.next_ipp_job_id;
            record.next_ipp_job_id += 1;
            record.ipp_job_ids.insert(ipp_id, job_id);
            record.printer.active.push_back(job_id);
            record.jobs.insert(job_id, job.clone());
            let _ = record.job_tx.send(job_id);

            (job, Arc::clone(&record.queue), ipp_id)
        };

        insert_job(queue, job.clone()).await?;
        self.publish(SubscriptionOwner::Printer(job.printer_id), EventKind::JobCreated, BTreeMap::new()).await;
        self.audit(username, "create-job", "job", &job.id.to_string(), true, Some(job.job_name.clone())).await;
        debug!(job = %job.id, printer = printer_name, "job created");
        Ok((ipp_id, job))
    }

    async fn cancel_job(&self, printer_name: &str, ipp_job_id: i32) -> Result<()> {
        let (job, queue) = {
            let mut state = self.state.write().await;
            let printer_id =
                *state.printer_names.get(printer_name).ok_or_else(|| CoreError::PrinterNotFound(printer_name.into()))?;
            let record = state.printers.get_mut(&printer_id).expect("printer_names/printers inconsistent");
            let job_id = *record
                .ipp_job_ids
                .get(&ipp_job_id)
                .ok_or_else(|| CoreError::JobNotFound(ipp_job_id.to_string()))?;
            let job = record.jobs.get_mut(&job_id).ok_or_else(|| CoreError::JobNotFound(ipp_job_id.to_string()))?;

            if job.state.is_terminal() {
                return Ok(());
            }
            job.request_cancel();
            if job.state != JobState::Processing {
                job.mark_terminal(JobState::Canceled);
                record.printer.active.retain(|id| *id != job_id);
                record.printer.completed.push(job_id);
            }
            (job.clone(), Arc::clone(&record.queue))
        };

        self.mark_canceled(job.id);
        checkpoint(queue, job.clone()).await?;
        self.publish(SubscriptionOwner::Job(job.id), EventKind::JobStateChanged, BTreeMap::new()).await;
        self.audit(&job.username, "cancel-job", "job", &job.id.to_string(), true, None).await;
        Ok(())
    }

    async fn get_job(&self, printer_name: &str, ipp_job_id: i32) -> Result<(i32, Job)> {
        let state = self.state.read().await;
        let printer_id =
            *state.printer_names.get(printer_name).ok_or_else(|| CoreError::PrinterNotFound(printer_name.into()))?;
        let record = state.printers.get(&printer_id).expect("printer_names/printers inconsistent");
        let job_id = *record.ipp_job_ids.get(&ipp_job_id).ok_or_else(|| CoreError::JobNotFound(ipp_job_id.to_string()))?;
        let job = record.jobs.get(&job_id).ok_or_else(|| CoreError::JobNotFound(ipp_job_id.to_string()))?;
        Ok((ipp_job_id, job.clone()))
    }

    async fn get_jobs(&self, printer_name: &str) -> Result<Vec<(i32, Job)>> {
        let state = self.state.read().await;
        let printer_id =
            *state.printer_names.get(printer_name).ok_or_else(|| CoreError::PrinterNotFound(printer_name.into()))?;
        let record = state.printers.get(&printer_id).expect("printer_names/printers inconsistent");
        Ok(record
            .ipp_job_ids
            .iter()
            .filter_map(|(ipp_id, job_id)| record.jobs.get(job_id).map(|j| (*ipp_id, j.clone())))
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_printer(&self, name: &str, device_uri: &str, driver_name: &str) -> Result<PrinterId> {
        if !validate_printer_name(name) {
            return Err(CoreError::InvalidPrinterName(name.to_string()));
        }
        DeviceUri::parse(device_uri)?;

        let id = {
            let mut state = self.state.write().await;
            if state.printer_names.contains_key(name) {
                return Err(CoreError::DuplicatePrinterName(name.to_string()));
            }
            let id = PrinterId(state.next_printer_id);
            state.next_printer_id += 1;

            let capabilities = DriverCapabilities {
                driver_name: driver_name.to_string(),
                document_format_supported: vec!["image/pwg-raster".into(), "image/png".into()],
                ..Default::default()
            };
            let printer = Printer::new(id, name.to_string(), device_uri.to_string(), capabilities);

            let queue_path = Path::new(&self.config.spool_dir).join(format!("{name}.jobs.db"));
            if let Some(parent) = queue_path.parent() {
                std::fs::create_dir_all(parent).map_err(CoreError::DeviceIo)?;
            }
            let queue = Arc::new(JobQueue::open(&queue_path)?);
            let (job_tx, job_rx) = mpsc::unbounded_channel();

            state.printers.insert(
                id,
                PrinterRecord { printer, jobs: BTreeMap::new(), ipp_job_ids: BTreeMap::new(), next_ipp_job_id: 1, queue, job_tx },
            );
            state.printer_names.insert(name.to_string(), id);
            if state.default_printer.is_none() {
                state.default_printer = Some(name.to_string());
            }

            worker::spawn_worker(self.arc(), id, job_rx);
            id
        };

        if let Some(a) = &self.announcer {
            a.announce_printer(name, self.config.listen_port, &self.uuid, device_uri, None);
        }
        self.publish(SubscriptionOwner::Printer(id), EventKind::PrinterCreated, BTreeMap::new()).await;
        self.persist_state().await;
        self.audit("-", "create-printer", "printer", name, true, Some(device_uri.to_string())).await;
        info!(printer = name, id = id.0, "printer created");
        Ok(id)
    }

    async fn delete_printer(&self, name: &str) -> Result<()> {
        let id = {
            let mut state = self.state.write().await;
            let id = *state.printer_names.get(name).ok_or_else(|| CoreError::PrinterNotFound(name.into()))?;
            let record = state.printers.get_mut(&id).expect("printer_names/printers inconsistent");
            record.printer.is_deleted = true;
            if record.printer.is_reapable() {
                state.printers.remove(&id);
                state.printer_names.remove(name);
                if state.default_printer.as_deref() == Some(name) {
                    state.default_printer = None;
                }
            }
            id
        };
        if let Some(a) = &self.announcer {
            a.unannounce(name);
        }
        self.publish(SubscriptionOwner::Printer(id), EventKind::PrinterDeleted, BTreeMap::new()).await;
        self.persist_state().await;
        self.audit("-", "delete-printer", "printer", name, true, None).await;
        Ok(())
    }

    async fn set_printer_attributes(&self, name: &str, patch: PrinterAttributesPatch) -> Result<()> {
        let id = {
            let mut state = self.state.write().await;
            let id = *state.printer_names.get(name).ok_or_else(|| CoreError::PrinterNotFound(name.into()))?;
            let record = state.printers.get_mut(&id).expect("printer_names/printers inconsistent");
            if record.printer.is_deleted {
                return Err(CoreError::PrinterNotFound(name.into()));
            }
            if let Some(new_state) = patch.state {
                record.printer.state = new_state;
            }
            id
        };
        self.publish(SubscriptionOwner::Printer(id), EventKind::PrinterStateChanged, BTreeMap::new()).await;
        Ok(())
    }

    async fn get_printer(&self, name: &str) -> Result<Printer> {
        let state = self.state.read().await;
        let id = *state.printer_names.get(name).ok_or_else(|| CoreError::PrinterNotFound(name.into()))?;
        let record = state.printers.get(&id).expect("printer_names/printers inconsistent");
        if record.printer.is_deleted {
            return Err(CoreError::PrinterNotFound(name.into()));
        }
        Ok(record.printer.clone())
    }

    async fn list_printer_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.printers.values().filter(|r| !r.printer.is_deleted).map(|r| r.printer.name.clone()).collect()
    }

    async fn get_system_attributes(&self) -> SystemAttributes {
        let state = self.state.read().await;
        SystemAttributes {
            uuid: self.uuid.clone(),
            name: state.name.clone(),
            default_printer: state.default_printer.clone(),
            printer_names: state.printers.values().filter(|r| !r.printer.is_deleted).map(|r| r.printer.name.clone()).collect(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn set_system_attributes(&self, patch: SystemAttributesPatch) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if let Some(name) = patch.name {
                state.name = name;
            }
            if let Some(default_printer) = patch.default_printer {
                if !state.printer_names.contains_key(&default_printer) {
                    return Err(CoreError::PrinterNotFound(default_printer));
                }
                state.default_printer = Some(default_printer);
            }
        }
        self.persist_state().await;
        Ok(())
    }

    async fn shutdown_all_printers(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.shutting_down = true;
        for record in state.printers.values_mut() {
            record.printer.state = PrinterState::Stopped;
        }
        info!("all printers marked stopped for shutdown");
        Ok(())
    }

    async fn create_subscriptions(
        &self,
        owner_printer: Option<&str>,
        owner_job: Option<(&str, i32)>,
        requests: Vec<SubscriptionRequest>,
    ) -> Vec<Result<SubscriptionId>> {
        let mut state = self.state.write().await;

        let owner = if let Some((printer_name, ipp_job_id)) = owner_job {
            let Some(&printer_id) = state.printer_names.get(printer_name) else {
                return requests.iter().map(|_| Err(CoreError::PrinterNotFound(printer_name.to_string()))).collect();
            };
            let job_id = state.printers.get(&printer_id).and_then(|r| r.ipp_job_ids.get(&ipp_job_id).copied());
            match job_id {
                Some(job_id) => SubscriptionOwner::Job(job_id),
                None => return requests.iter().map(|_| Err(CoreError::JobNotFound(ipp_job_id.to_string()))).collect(),
            }
        } else if let Some(printer_name) = owner_printer {
            match state.printer_names.get(printer_name) {
                Some(&printer_id) => SubscriptionOwner::Printer(printer_id),
                None => return requests.iter().map(|_| Err(CoreError::PrinterNotFound(printer_name.to_string()))).collect(),
            }
        } else {
            SubscriptionOwner::System
        };

        let max_events = self.config.max_events;
        requests
            .into_iter()
            .map(|req| {
                let id = SubscriptionId(state.next_subscription_id);
                state.next_subscription_id += 1;
                let lease_expiry = req.lease_duration.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
                let sub = Subscription::new(id, owner, req.events, req.notify_user_data, lease_expiry, req.username, max_events);
                state.subscriptions.insert(id, sub);
                Ok(id)
            })
            .collect()
    }

    async fn get_subscriptions(&self, username: &str, job_filter: Option<JobId>) -> Vec<Subscription> {
        let state = self.state.read().await;
        state
            .subscriptions
            .values()
            .filter(|s| s.username == username)
            .filter(|s| match job_filter {
                Some(job_id) => s.owner == SubscriptionOwner::Job(job_id),
                None => true,
            })
            .cloned()
            .collect()
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        let state = self.state.read().await;
        state.subscriptions.get(&id).cloned().ok_or_else(|| CoreError::SubscriptionNotFound(id.to_string()))
    }

    async fn renew_subscription(&self, id: SubscriptionId, lease: Option<Duration>) -> Result<()> {
        let mut state = self.state.write().await;
        let sub = state.subscriptions.get_mut(&id).ok_or_else(|| CoreError::SubscriptionNotFound(id.to_string()))?;
        sub.lease_expiry = lease.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        Ok(())
    }

    async fn cancel_subscription(&self, id: SubscriptionId) -> Result<()> {
        let mut state = self.state.write().await;
        state.subscriptions.remove(&id).ok_or_else(|| CoreError::SubscriptionNotFound(id.to_string()))?;
        Ok(())
    }

    async fn get_notifications(
        &self,
        subs: &[SubscriptionId],
        since: &[u64],
        wait: bool,
        wait_timeout: Duration,
    ) -> Result<Vec<(SubscriptionId, Event)>> {
        let deadline = tokio::time::Instant::now() + wait_timeout;
        loop {
            {
                let state = self.state.read().await;
                let mut out = Vec::new();
                for (i, id) in subs.iter().enumerate() {
                    let Some(sub) = state.subscriptions.get(id) else { continue };
                    let threshold = since.get(i).copied().unwrap_or(0);
                    out.extend(sub.events_since(threshold).into_iter().map(|e| (*id, e)));
                }
                if !out.is_empty() || !wait {
                    return Ok(out);
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressd_core::SystemConfig;

    fn test_system(spool_dir: &std::path::Path) -> Arc<System> {
        let mut config = SystemConfig::default();
        config.spool_dir = spool_dir.to_string_lossy().into_owned();
        System::new(
            config,
            AuditLog::open_in_memory().unwrap(),
            "test-system",
            HashMap::from([("alice".to_string(), "hunter2".to_string())]),
            BTreeSet::from(["alice".to_string()]),
            BTreeSet::new(),
        )
    }

    #[tokio::test]
    async fn create_and_list_printer() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        system.create_printer("office", "socket://10.0.0.5:9100/", "generic").await.unwrap();
        assert_eq!(system.list_printer_names().await, vec!["office".to_string()]);
        let attrs = system.get_system_attributes().await;
        assert_eq!(attrs.default_printer.as_deref(), Some("office"));
    }

    #[tokio::test]
    async fn duplicate_printer_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        system.create_printer("office", "socket://10.0.0.5:9100/", "generic").await.unwrap();
        let err = system.create_printer("office", "socket://10.0.0.6:9100/", "generic").await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicatePrinterName(_)));
    }

    #[tokio::test]
    async fn anonymous_session_is_always_authorized() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        let session = ClientSession::new("127.0.0.1:1", "localhost", 631);
        system.authorize(&session, pressd_ipp::wire::OP_SHUTDOWN_ALL_PRINTERS, None).await.unwrap();
    }

    #[tokio::test]
    async fn non_admin_rejected_from_admin_operation() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        let mut session = ClientSession::new("10.0.0.9:1", "printer.local", 631);
        session.username = "mallory".into();
        let err = system.authorize(&session, pressd_ipp::wire::OP_CREATE_PRINTER, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_member_authorized_for_admin_operation() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        let mut session = ClientSession::new("10.0.0.9:1", "printer.local", 631);
        session.username = "alice".into();
        system.authorize(&session, pressd_ipp::wire::OP_CREATE_PRINTER, None).await.unwrap();
    }

    #[tokio::test]
    async fn check_credentials_matches_password_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        assert!(system.check_credentials("alice", "hunter2").await);
        assert!(!system.check_credentials("alice", "wrong").await);
        assert!(!system.check_credentials("nobody", "hunter2").await);
    }

    #[tokio::test]
    async fn csrf_token_round_trips_and_rejects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        let token = system.csrf_token("printer.local").await;
        assert!(system.verify_csrf(&token, "printer.local").await);
        assert!(!system.verify_csrf(&token, "other.local").await);
        assert!(!system.verify_csrf("", "printer.local").await);
        assert!(!system.verify_csrf("garbage", "printer.local").await);
    }

    #[tokio::test]
    async fn create_job_then_cancel_held_job_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        system.create_printer("office", "socket://10.0.0.5:9100/", "generic").await.unwrap();
        let (ipp_id, job) =
            system.create_job("office", "test.raster", "image/pwg-raster", "alice", BTreeMap::new(), b"RaS2".to_vec()).await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        system.cancel_job("office", ipp_id).await.unwrap();
        let (_, job) = system.get_job("office", ipp_id).await.unwrap();
        assert_eq!(job.state, JobState::Canceled);
    }

    #[tokio::test]
    async fn subscription_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let system = test_system(dir.path());
        let req = SubscriptionRequest {
            events: BTreeSet::from([EventKind::PrinterCreated]),
            notify_user_data: vec![],
            lease_duration: None,
            username: "alice".into(),
        };
        let results = system.create_subscriptions(None, None, vec![req]).await;
        assert_eq!(results.len(), 1);
        let id = results[0].as_ref().unwrap();

        system.create_printer("office", "socket://10.0.0.5:9100/", "generic").await.unwrap();
        let notifications = system.get_notifications(&[*id], &[0], false, Duration::from_millis(10)).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].1.kind, EventKind::PrinterCreated);

        system.cancel_subscription(*id).await.unwrap();
        assert!(system.get_subscription(*id).await.is_err());
    }
}
