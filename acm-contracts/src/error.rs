//! Domain error taxonomy (spec.md §7).
//!
//! `ErrorKind` is the closed set of failure classes every adapter, judge
//! call, and subprocess boundary must classify into. `AcmError` is the
//! typed, non-raising result carried across those boundaries: adapter and
//! judge failures are returned as values, never propagated by unwinding
//! (see the executor's propagation policy).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed taxonomy of failure kinds (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    NetworkError,
    AuthError,
    InvalidConfig,
    InvalidOutput,
    ContentEmpty,
    GroundingMissing,
    ReasoningMissing,
    ProcessError,
    Cancelled,
    ParseError,
    Unknown,
}

impl ErrorKind {
    /// Whether this kind belongs to the retry class described in spec.md §7.
    ///
    /// `Timeout`, `GroundingMissing`, `ReasoningMissing`, and `ProcessError`
    /// are retried at most once by the generator adapters themselves (on top
    /// of whatever the subprocess runner already retried); `RateLimited` and
    /// `NetworkError` retry up to the runner's `max_retries`. `InvalidOutput`
    /// is included because it covers FPF exit code 4 ("validation failures
    /// flagged by the adapter (e.g., FPF exit codes 1-4)" per spec.md §4.7
    /// are all transient). All other kinds are terminal for the task that
    /// produced them.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
                | ErrorKind::GroundingMissing
                | ErrorKind::ReasoningMissing
                | ErrorKind::ProcessError
                | ErrorKind::InvalidOutput
        )
    }

    /// Single-shot retries (as opposed to the runner's backoff budget).
    pub fn single_shot_retry(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::ProcessError
                | ErrorKind::GroundingMissing
                | ErrorKind::ReasoningMissing
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InvalidOutput => "invalid_output",
            ErrorKind::ContentEmpty => "content_empty",
            ErrorKind::GroundingMissing => "grounding_missing",
            ErrorKind::ReasoningMissing => "reasoning_missing",
            ErrorKind::ProcessError => "process_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// User-visible error shape propagated to the task surface (spec.md §7).
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AcmError {
    pub code: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub retry_after_seconds: Option<u64>,
}

impl AcmError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = code.is_retryable();
        Self {
            code,
            message: message.into(),
            retryable,
            retry_after_seconds: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    pub fn content_empty() -> Self {
        Self::new(
            ErrorKind::ContentEmpty,
            "generator returned success with empty or whitespace-only content",
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }
}
