// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry engine with exponential backoff + jitter for resilient printing.
//
// Classifies errors into Transient (auto-retry), UserAction (wait for
// user), and Permanent (give up). Only transient errors trigger
// automatic retries.

use std::time::Duration;

use pressd_core::{CoreError, ErrorClass};
use tracing::{debug, info, warn};

/// Retry configuration.
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }
}

/// Result of evaluating whether to retry.
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(ErrorClass),
    Exhausted,
}

/// Classify a device/core error into a retry class. Delegates to
/// [`CoreError::class`] for the structured variants and falls back to
/// [`classify_ipp_detail`] for raw printer-status strings surfaced
/// through `Snmp`/`DeviceUnavailable` detail text.
pub fn classify_error(err: &CoreError) -> ErrorClass {
    match err {
        CoreError::DeviceUnavailable(detail) | CoreError::Snmp(detail) => classify_ipp_detail(detail),
        other => other.class(),
    }
}

/// Classify a raw printer-status detail string (IPP `printer-state-reasons`
/// keyword or SNMP error text).
fn classify_ipp_detail(detail: &str) -> ErrorClass {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("server-error")
    {
        return ErrorClass::Transient;
    }

    if lower.contains("media-empty")
        || lower.contains("toner-empty")
        || lower.contains("ink")
        || lower.contains("door-open")
        || lower.contains("cover-open")
        || lower.contains("paper-jam")
        || lower.contains("media-jam")
        || lower.contains("marker-supply")
    {
        return ErrorClass::UserAction;
    }

    if lower.contains("client-error-document-format")
        || lower.contains("client-error-not-possible")
        || lower.contains("invalid uri")
    {
        return ErrorClass::Permanent;
    }

    // Default to transient (optimistic — retry first, give up later).
    ErrorClass::Transient
}

/// Decide whether to retry based on the error class and attempt count.
pub fn should_retry(err: &CoreError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    let class = classify_error(err);

    match class {
        ErrorClass::Permanent => {
            info!("permanent error — not retrying");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::UserAction => {
            info!("user action required — not auto-retrying");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Transient => {
            if attempt >= config.max_retries {
                warn!(attempt, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt, config);
                debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Compute exponential backoff delay with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay)
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));

    let jitter_ms = jitter(base_ms, attempt);
    let total_ms = exp_ms.saturating_add(jitter_ms);
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);

    Duration::from_millis(capped_ms)
}

/// Spread-out jitter derived from the attempt number, avoiding a `rand`
/// dependency the teacher never carried.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = CoreError::DeviceUnavailable("timed out after 60s".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn paper_jam_is_user_action() {
        let err = CoreError::DeviceUnavailable("printer stopped: paper-jam".into());
        assert_eq!(classify_error(&err), ErrorClass::UserAction);
    }

    #[test]
    fn bad_format_is_permanent() {
        let err = CoreError::DocumentFormat("docx".into());
        assert_eq!(classify_error(&err), ErrorClass::Permanent);
    }

    #[test]
    fn retry_respects_max() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let err = CoreError::DeviceUnavailable("connection refused".into());
        assert!(matches!(should_retry(&err, 0, &config), RetryDecision::RetryAfter(_)));
        assert!(matches!(should_retry(&err, 3, &config), RetryDecision::Exhausted));
    }

    #[test]
    fn permanent_error_never_retries() {
        let config = RetryConfig::default();
        let err = CoreError::DocumentFormat("docx".into());
        assert!(matches!(
            should_retry(&err, 0, &config),
            RetryDecision::GiveUp(ErrorClass::Permanent)
        ));
    }

    #[test]
    fn delay_increases_with_attempts() {
        let config = RetryConfig::default();
        let d0 = compute_delay(0, &config);
        let d1 = compute_delay(1, &config);
        let d2 = compute_delay(2, &config);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = compute_delay(20, &config);
        assert!(d <= Duration::from_secs(10));
    }
}
