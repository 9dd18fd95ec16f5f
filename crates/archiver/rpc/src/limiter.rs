//! Request rate limiting.

use std::{num::NonZeroU32, time::Duration};
use tokio::{sync::Mutex, time::Instant};

/// Spaces acquisitions at least `1 / rps` apart.
///
/// One limiter is shared by every client that talks to the same endpoint. Waiters are
/// served in the order they called [`RateLimiter::acquire`].
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `rps` acquisitions per second.
    pub fn new(rps: NonZeroU32) -> Self {
        Self::with_interval(Duration::from_secs(1) / rps.get())
    }

    /// Creates a limiter that never waits.
    pub fn unlimited() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    /// Creates a limiter from an optional rate, unlimited when `None`.
    pub fn from_rps(rps: Option<NonZeroU32>) -> Self {
        rps.map_or_else(Self::unlimited, Self::new)
    }

    fn with_interval(interval: Duration) -> Self {
        Self { interval, next_slot: Mutex::new(None) }
    }

    /// Returns the minimum spacing between two acquisitions.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for the next free slot.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot.map_or(now, |next| next.max(now));
            *next_slot = Some(slot + self.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
