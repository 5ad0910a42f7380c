//! Request pacing for the async API client.
//!
//! The limiter hands out send slots spaced `1 / requests_per_second` apart,
//! so the aggregate request rate stays below the configured cap no matter
//! how many fetch tasks are in flight. The first acquisition is immediate.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Global request pacer.
///
/// Designed to be owned by the client and shared by all of its fetch tasks.
/// Each `acquire` reserves the next free send slot under a short-lived lock
/// and then sleeps until that slot outside the lock, so waiters don't
/// serialize behind each other's sleeps.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between two send slots.
    min_gap: Duration,

    /// Whether pacing is disabled (`requests_per_second == 0`).
    disabled: bool,

    /// The next unreserved send slot. `None` until the first acquisition.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` sends per second.
    ///
    /// A rate of 0 disables pacing entirely.
    #[must_use]
    #[instrument]
    pub fn per_second(requests_per_second: u32) -> Self {
        if requests_per_second == 0 {
            return Self::disabled();
        }
        debug!(requests_per_second, "creating rate limiter");
        Self {
            min_gap: Duration::from_secs_f64(1.0 / f64::from(requests_per_second)),
            disabled: false,
            next_slot: Mutex::new(None),
        }
    }

    /// Creates a disabled limiter that applies no delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_gap: Duration::ZERO,
            disabled: true,
            next_slot: Mutex::new(None),
        }
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum spacing between sends.
    #[must_use]
    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// Waits until this caller's send slot arrives.
    pub async fn acquire(&self) {
        if self.disabled {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.min_gap);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
