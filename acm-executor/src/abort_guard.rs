//! The run-level early-abort rule (spec.md §7): "a 50% failure rate over the
//! first 10 documents aborts the run as failed." Distinct from
//! `acm_resilience::ProviderGuard` (per-provider consecutive-failure pause)
//! and `acm_resilience::CircuitBreaker` (generic aggregate-failure trip) —
//! this one counts whole-document outcomes against a fixed leading window.

use std::sync::atomic::{AtomicU32, Ordering};

const WINDOW: u32 = 10;
/// No ratio is evaluated below this many processed documents, so a single
/// early failure can't trip the guard on its own (spec.md §7 is a rate over
/// the window, not a verdict on document one).
const MIN_SAMPLES: u32 = 2;

/// Tracks document completions against the leading-window failure ratio.
/// Safe to call from multiple concurrently-finishing documents.
pub struct EarlyAbortGuard {
    processed: AtomicU32,
    failed: AtomicU32,
}

impl EarlyAbortGuard {
    pub fn new() -> Self {
        Self {
            processed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    /// Records one finished document's outcome. Returns `true` the moment
    /// the failure ratio over the first `WINDOW` documents exceeds 50% —
    /// callers should abort the run as soon as this returns `true`.
    pub fn record(&self, document_failed: bool) -> bool {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let failed = if document_failed {
            self.failed.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.failed.load(Ordering::SeqCst)
        };

        if processed > WINDOW || processed < MIN_SAMPLES {
            return false;
        }
        (failed as f64 / processed as f64) > 0.5
    }
}

impl Default for EarlyAbortGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_trip_below_fifty_percent() {
        let guard = EarlyAbortGuard::new();
        assert!(!guard.record(true));
        assert!(!guard.record(false));
        assert!(!guard.record(false));
    }

    #[test]
    fn trips_once_failures_exceed_half_within_window() {
        let guard = EarlyAbortGuard::new();
        assert!(!guard.record(true));
        assert!(guard.record(true));
    }

    #[test]
    fn never_trips_past_the_leading_window() {
        let guard = EarlyAbortGuard::new();
        for _ in 0..10 {
            guard.record(true);
        }
        assert!(!guard.record(true));
    }
}
