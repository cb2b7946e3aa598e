//! Periodic callbacks polled by node spinning.
//!
//! A timer never runs on its own thread. It becomes ready once a full period
//! has passed since it last fired; missed periods are not back-filled, so the
//! phase drifts by however late the poll was.

use crate::error::{CapyError, CapyResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Boxed timer callback
pub type TimerCallback = Box<dyn FnMut() + Send>;

/// Periodic callback owned by a [`Node`](crate::core::Node)
pub struct Timer {
    period: Duration,
    callback: Mutex<TimerCallback>,
    last_fire: Mutex<Instant>,
    fire_count: AtomicU64,
    active: AtomicBool,
}

impl Timer {
    /// Create an active timer whose first period starts now
    pub fn new<F>(period: Duration, callback: F) -> CapyResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(CapyError::invalid_input("timer period must be positive"));
        }
        Ok(Self {
            period,
            callback: Mutex::new(Box::new(callback)),
            last_fire: Mutex::new(Instant::now()),
            fire_count: AtomicU64::new(0),
            active: AtomicBool::new(true),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Instant::now())
    }

    pub fn is_ready_at(&self, now: Instant) -> bool {
        self.is_active() && now.saturating_duration_since(*self.last_fire.lock()) >= self.period
    }

    /// Run the callback now. Returns `false` if the timer is cancelled.
    pub fn fire(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        *self.last_fire.lock() = Instant::now();
        self.fire_count.fetch_add(1, Ordering::Relaxed);
        let mut callback = self.callback.lock();
        (*callback)();
        true
    }

    /// Restart the current period from now
    pub fn reset(&self) {
        *self.last_fire.lock() = Instant::now();
    }

    /// Stop firing. A callback already running completes.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn destroy(&self) {
        self.cancel();
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Time until the next fire, zero when already due
    pub fn time_until_ready(&self) -> Duration {
        self.period.saturating_sub(self.last_fire.lock().elapsed())
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("period", &self.period)
            .field("fire_count", &self.fire_count())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
