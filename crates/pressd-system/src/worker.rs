// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer worker loop. One task per printer, spawned by
// `System::create_printer`, draining that printer's job-ready channel one
// job at a time. The device I/O and raster pipeline run on a blocking
// thread so a dead or slow device never stalls the tokio reactor; the
// blocking closure reaches back into async land only to read/write the
// device itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pressd_core::{CoreError, DeviceUri, Job, JobId, PrinterId, Result};
use pressd_print::device::{open_device, DeviceTransport};
use pressd_print::retry::{should_retry, RetryConfig, RetryDecision};
use pressd_raster::driver::{Driver, Orientation, PrintOptions};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::system::System;

/// Drains `job_rx` for the lifetime of the printer, processing one job
/// fully before picking up the next. Exits once every sender is dropped
/// (the printer was deleted and reaped).
pub(crate) fn spawn_worker(system: Arc<System>, printer_id: PrinterId, mut job_rx: mpsc::UnboundedReceiver<JobId>) {
    tokio::spawn(async move {
        info!(printer = %printer_id, "worker started");
        while let Some(job_id) = job_rx.recv().await {
            process_job(&system, printer_id, job_id).await;
        }
        info!(printer = %printer_id, "worker exiting, printer removed");
    });
}

async fn process_job(system: &Arc<System>, printer_id: PrinterId, job_id: JobId) {
    let Some((job, queue, device_uri)) = system.begin_processing(printer_id, job_id).await else {
        return;
    };

    let uri = match DeviceUri::parse(&device_uri) {
        Ok(uri) => uri,
        Err(e) => {
            system.finish_processing(printer_id, job_id, Err(e), queue).await;
            return;
        }
    };

    let cancel_flag = system.cancel_flag_for(job_id);
    let read_timeout = system.config().device_read_timeout;
    let spool_dir = system.config().spool_dir.clone();
    let retry_interval = system.config().device_retry_interval;
    let retry_config = RetryConfig::default();

    let mut attempt = 0u32;
    let outcome = loop {
        let Some(transport) =
            acquire_device(system, printer_id, &device_uri, &uri, read_timeout, retry_interval, &cancel_flag).await
        else {
            // Canceled while waiting for the device; job.is_canceled is
            // already set so finish_processing derives `Canceled` regardless
            // of the error value passed here.
            break Err(CoreError::DeviceUnavailable("job canceled while waiting for device".into()));
        };

        let outcome = tokio::task::spawn_blocking({
            let job = job.clone();
            let spool_dir = spool_dir.clone();
            let cancel_flag = Arc::clone(&cancel_flag);
            move || run_print_job(transport, &job, &spool_dir, cancel_flag)
        })
        .await
        .unwrap_or_else(|e| Err(CoreError::Database(format!("print worker task panicked: {e}"))));

        let Err(ref e) = outcome else {
            system.health_record_success(&device_uri);
            break outcome;
        };
        system.health_record_failure(&device_uri, &e.to_string());
        if cancel_flag.load(Ordering::Relaxed) {
            break outcome;
        }
        match should_retry(e, attempt, &retry_config) {
            RetryDecision::RetryAfter(delay) => {
                warn!(job = %job_id, attempt, error = %e, "retrying print job after transient write failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::GiveUp(_) | RetryDecision::Exhausted => break outcome,
        }
    };

    system.finish_processing(printer_id, job_id, outcome, queue).await;
}

/// Open the device, retrying indefinitely on a flat interval while the
/// printer is shown `Stopped` -- a device that won't open never aborts
/// the job behind it, it just blocks the printer. Returns `None` only if
/// the job is canceled while waiting.
async fn acquire_device(
    system: &Arc<System>,
    printer_id: PrinterId,
    device_uri: &str,
    uri: &DeviceUri,
    read_timeout: Duration,
    retry_interval: Duration,
    cancel_flag: &Arc<AtomicBool>,
) -> Option<Box<dyn DeviceTransport>> {
    let mut stopped = false;
    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            if stopped {
                system.set_printer_stopped(printer_id, false).await;
            }
            return None;
        }

        if system.health_allow(device_uri) {
            match open_device(uri, read_timeout).await {
                Ok(transport) => {
                    system.health_record_success(device_uri);
                    if stopped {
                        system.set_printer_stopped(printer_id, false).await;
                    }
                    return Some(transport);
                }
                Err(e) => {
                    system.health_record_failure(device_uri, &e.to_string());
                    warn!(printer = %printer_id, error = %e, "device open failed, retrying indefinitely");
                }
            }
        } else {
            let message = system.health_status_message(device_uri).unwrap_or_else(|| "device unavailable".into());
            warn!(printer = %printer_id, status = %message, "device circuit open, waiting before retry");
        }

        if !stopped {
            system.set_printer_stopped(printer_id, true).await;
            stopped = true;
        }
        tokio::time::sleep(retry_interval).await;
    }
}

/// Runs entirely on a blocking-pool thread: builds the print options from
/// the job's attributes and hands the spooled bytes to the appropriate
/// raster pipeline through the already-opened `transport`.
fn run_print_job(transport: Box<dyn DeviceTransport>, job: &Job, spool_dir: &str, cancel_flag: Arc<AtomicBool>) -> Result<()> {
    let handle = tokio::runtime::Handle::current();

    let spool_path = std::path::Path::new(spool_dir).join(&job.spool_file);
    let bytes = std::fs::read(&spool_path).map_err(CoreError::DeviceIo)?;

    let options = build_print_options(&job.job_attributes);
    let mut driver = DeviceDriver { transport, handle, cancel_flag };

    match job.format.as_str() {
        "image/png" => pressd_raster::png::process_png(&bytes, &options, &mut driver),
        _ => pressd_raster::pwg::process_raster(&bytes, &options, &mut driver),
    }
}

/// Adapts a `DeviceTransport` (async) to the raster pipeline's `Driver`
/// trait (sync), running on the blocking-pool thread that owns it.
struct DeviceDriver {
    transport: Box<dyn DeviceTransport>,
    handle: tokio::runtime::Handle,
    cancel_flag: Arc<AtomicBool>,
}

impl DeviceDriver {
    fn write(&mut self, data: &[u8]) -> bool {
        if self.cancel_flag.load(Ordering::Relaxed) {
            return false;
        }
        self.handle.block_on(self.transport.write(data)).is_ok()
    }
}

impl Driver for DeviceDriver {
    fn rstartjob(&mut self, _options: &PrintOptions) -> bool {
        !self.cancel_flag.load(Ordering::Relaxed)
    }

    fn rendjob(&mut self, _options: &PrintOptions) -> bool {
        true
    }

    fn rstartpage(&mut self, _options: &PrintOptions, _page_no: u32) -> bool {
        !self.cancel_flag.load(Ordering::Relaxed)
    }

    fn rendpage(&mut self, _options: &PrintOptions, _page_no: u32) -> bool {
        !self.cancel_flag.load(Ordering::Relaxed)
    }

    fn rwrite(&mut self, _options: &PrintOptions, _row: u32, row_bytes: &[u8]) -> bool {
        self.write(row_bytes)
    }

    fn print(&mut self, _options: &PrintOptions, raw: &[u8]) -> bool {
        self.write(raw)
    }
}

const LETTER_WIDTH_HUNDREDTHS_MM: u32 = 21590;
const LETTER_HEIGHT_HUNDREDTHS_MM: u32 = 27940;
const DEFAULT_MARGIN_HUNDREDTHS_MM: u32 = 423;
const DEFAULT_RESOLUTION_DPI: u32 = 300;

fn build_print_options(attrs: &std::collections::BTreeMap<String, String>) -> PrintOptions {
    let orientation = attrs
        .get("orientation-requested")
        .and_then(|v| v.parse::<i32>().ok())
        .map(Orientation::from_ipp)
        .unwrap_or(Orientation::Portrait);
    let copies = attrs.get("copies").and_then(|v| v.parse::<u32>().ok()).unwrap_or(1).max(1);

    PrintOptions {
        media_width_hundredths_mm: LETTER_WIDTH_HUNDREDTHS_MM,
        media_height_hundredths_mm: LETTER_HEIGHT_HUNDREDTHS_MM,
        margin_hundredths_mm: DEFAULT_MARGIN_HUNDREDTHS_MM,
        resolution_dpi: DEFAULT_RESOLUTION_DPI,
        orientation,
        copies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_print_options_are_us_letter_at_300dpi() {
        let options = build_print_options(&std::collections::BTreeMap::new());
        assert_eq!(options.media_width_hundredths_mm, LETTER_WIDTH_HUNDREDTHS_MM);
        assert_eq!(options.resolution_dpi, 300);
        assert_eq!(options.copies, 1);
        assert_eq!(options.orientation, Orientation::Portrait);
    }

    #[test]
    fn orientation_and_copies_parsed_from_attributes() {
        let mut attrs = std::collections::BTreeMap::new();
        attrs.insert("orientation-requested".to_string(), "4".to_string());
        attrs.insert("copies".to_string(), "3".to_string());
        let options = build_print_options(&attrs);
        assert_eq!(options.orientation, Orientation::Landscape);
        assert_eq!(options.copies, 3);
    }

    #[test]
    fn zero_copies_clamped_to_one() {
        let mut attrs = std::collections::BTreeMap::new();
        attrs.insert("copies".to_string(), "0".to_string());
        let options = build_print_options(&attrs);
        assert_eq!(options.copies, 1);
    }
}
