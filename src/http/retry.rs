//! Retry Policy Module
//!
//! Declarative retry parameters and the classification of a single attempt.
//!
//! Each attempt ends in one of three states:
//! `Success`, `RetryableFailure` (sleep `backoff_factor * 2^(n-1)` seconds,
//! then try again) or `TerminalFailure`. A retryable failure on the last
//! allowed attempt becomes terminal.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use reqwest::{Method, StatusCode};

use crate::error::{FailureCause, TransportError};

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUS: [u16; 4] = [500, 502, 503, 504];

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

// == Retry Config ==
/// Immutable retry parameters, set once per client or overridden per request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts made before giving up, including the first one
    pub total_attempts: u32,
    /// Base delay in seconds, doubled after every failed attempt
    pub backoff_factor: f64,
    /// Response statuses that trigger a retry
    pub retryable_status_codes: BTreeSet<u16>,
    /// Methods that may be retried, `None` meaning all of them
    pub retryable_methods: Option<HashSet<Method>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            total_attempts: 3,
            backoff_factor: 0.3,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS.into_iter().collect(),
            retryable_methods: None,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::default().with_total_attempts(1)
    }

    pub fn with_total_attempts(mut self, total_attempts: u32) -> Self {
        self.total_attempts = total_attempts;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Restricts retries to `methods`.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.retryable_methods = Some(methods.into_iter().collect());
        self
    }

    /// Allows every method to be retried.
    pub fn with_all_methods(mut self) -> Self {
        self.retryable_methods = None;
        self
    }

    /// Effective attempt budget; zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.total_attempts.max(1)
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    pub fn method_allowed(&self, method: &Method) -> bool {
        self.retryable_methods
            .as_ref()
            .map_or(true, |methods| methods.contains(method))
    }

    pub fn status_retryable(&self, status: StatusCode) -> bool {
        self.retryable_status_codes.contains(&status.as_u16())
    }

    // == Classify ==
    /// Classifies the result of one attempt.
    ///
    /// 2xx and 3xx statuses succeed. Other statuses and transport errors are
    /// retryable only when both the failure kind and the method allow it.
    pub fn classify<T>(
        &self,
        method: &Method,
        result: Result<(StatusCode, T), TransportError>,
    ) -> Attempt<T> {
        let (cause, retryable_kind) = match result {
            Ok((status, response)) => {
                if status.is_success() || status.is_redirection() {
                    return Attempt::Success(response);
                }
                (FailureCause::Status(status), self.status_retryable(status))
            }
            Err(err) => {
                let retryable = err.is_retryable();
                (FailureCause::Transport(err), retryable)
            }
        };

        if retryable_kind && self.method_allowed(method) {
            Attempt::RetryableFailure(cause)
        } else {
            Attempt::TerminalFailure(cause)
        }
    }
}

// == Attempt ==
/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    RetryableFailure(FailureCause),
    TerminalFailure(FailureCause),
}
