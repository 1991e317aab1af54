//! Per-provider failure guard (spec.md §7): "three consecutive `AuthError`
//! or five consecutive `RateLimited` on the same provider pauses that
//! provider for a fixed backoff window."
//!
//! This is deliberately distinct from [`crate::CircuitBreaker`], which trips
//! on an aggregate failure count regardless of kind. The guard here counts
//! *consecutive* occurrences of one specific `ErrorKind` and resets on any
//! success or any differently-kinded failure.

use acm_contracts::ErrorKind;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const AUTH_ERROR_THRESHOLD: u32 = 3;
const RATE_LIMITED_THRESHOLD: u32 = 5;

/// Tracks consecutive `AuthError`/`RateLimited` failures for one provider
/// and exposes whether the provider is currently paused.
pub struct ProviderGuard {
    pause_window: Duration,
    consecutive_auth_errors: AtomicU32,
    consecutive_rate_limited: AtomicU32,
    paused_until: RwLock<Option<Instant>>,
    // Stored as millis-since-epoch-ish monotonic marker purely for Debug/tests.
    trip_count: AtomicU64,
}

impl ProviderGuard {
    pub fn new(pause_window: Duration) -> Self {
        Self {
            pause_window,
            consecutive_auth_errors: AtomicU32::new(0),
            consecutive_rate_limited: AtomicU32::new(0),
            paused_until: RwLock::new(None),
            trip_count: AtomicU64::new(0),
        }
    }

    /// Whether new work should be withheld from this provider right now.
    pub async fn is_paused(&self) -> bool {
        match *self.paused_until.read().await {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    pub fn trip_count(&self) -> u64 {
        self.trip_count.load(Ordering::Relaxed)
    }

    /// Record an outcome. Call after every provider-bound attempt.
    pub async fn record(&self, outcome: Option<ErrorKind>) {
        match outcome {
            Some(ErrorKind::AuthError) => {
                self.consecutive_rate_limited.store(0, Ordering::SeqCst);
                let count = self.consecutive_auth_errors.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= AUTH_ERROR_THRESHOLD {
                    self.trip().await;
                }
            }
            Some(ErrorKind::RateLimited) => {
                self.consecutive_auth_errors.store(0, Ordering::SeqCst);
                let count = self.consecutive_rate_limited.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= RATE_LIMITED_THRESHOLD {
                    self.trip().await;
                }
            }
            Some(_) => {
                // A different failure kind breaks both streaks.
                self.consecutive_auth_errors.store(0, Ordering::SeqCst);
                self.consecutive_rate_limited.store(0, Ordering::SeqCst);
            }
            None => {
                self.consecutive_auth_errors.store(0, Ordering::SeqCst);
                self.consecutive_rate_limited.store(0, Ordering::SeqCst);
            }
        }
    }

    async fn trip(&self) {
        self.trip_count.fetch_add(1, Ordering::SeqCst);
        *self.paused_until.write().await = Some(Instant::now() + self.pause_window);
        self.consecutive_auth_errors.store(0, Ordering::SeqCst);
        self.consecutive_rate_limited.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn three_auth_errors_trip_the_guard() {
        let guard = ProviderGuard::new(Duration::from_secs(60));
        for _ in 0..2 {
            guard.record(Some(ErrorKind::AuthError)).await;
            assert!(!guard.is_paused().await);
        }
        guard.record(Some(ErrorKind::AuthError)).await;
        assert!(guard.is_paused().await);
        assert_eq!(guard.trip_count(), 1);
    }

    #[tokio::test]
    async fn five_rate_limited_trip_the_guard() {
        let guard = ProviderGuard::new(Duration::from_secs(60));
        for _ in 0..4 {
            guard.record(Some(ErrorKind::RateLimited)).await;
            assert!(!guard.is_paused().await);
        }
        guard.record(Some(ErrorKind::RateLimited)).await;
        assert!(guard.is_paused().await);
    }

    #[tokio::test]
    async fn success_resets_the_streak() {
        let guard = ProviderGuard::new(Duration::from_secs(60));
        guard.record(Some(ErrorKind::AuthError)).await;
        guard.record(Some(ErrorKind::AuthError)).await;
        guard.record(None).await;
        guard.record(Some(ErrorKind::AuthError)).await;
        guard.record(Some(ErrorKind::AuthError)).await;
        assert!(!guard.is_paused().await);
    }

    #[tokio::test]
    async fn mixed_kinds_do_not_accumulate() {
        let guard = ProviderGuard::new(Duration::from_secs(60));
        guard.record(Some(ErrorKind::AuthError)).await;
        guard.record(Some(ErrorKind::RateLimited)).await;
        guard.record(Some(ErrorKind::AuthError)).await;
        assert!(!guard.is_paused().await);
    }
}
