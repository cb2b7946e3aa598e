//! Fixed-rate loop throttling.

use crate::error::{CapyError, CapyResult};
use std::time::{Duration, Instant};

/// Sleeps away the remainder of each period.
///
/// The period is measured from the previous `sleep()` return, so an
/// overrunning iteration does not cause a burst of catch-up iterations.
#[derive(Debug, Clone)]
pub struct Rate {
    period: Duration,
    last: Instant,
}

impl Rate {
    pub fn new(hz: f64) -> CapyResult<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(CapyError::invalid_input(format!(
                "rate must be a positive frequency, got {} Hz",
                hz
            )));
        }
        Ok(Self {
            period: Duration::from_secs_f64(1.0 / hz),
            last: Instant::now(),
        })
    }

    /// Sleep until one period has passed since the last call returned
    pub fn sleep(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.period {
            std::thread::sleep(self.period - elapsed);
        }
        self.last = Instant::now();
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn reset(&mut self) {
        self.last = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rates() {
        assert!(Rate::new(0.0).is_err());
        assert!(Rate::new(-5.0).is_err());
        assert!(Rate::new(f64::NAN).is_err());
    }

    #[test]
    fn test_period_from_hz() {
        let rate = Rate::new(50.0).unwrap();
        assert_eq!(rate.period(), Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_paces_loop() {
        let mut rate = Rate::new(100.0).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            rate.sleep();
        }
        assert!(start.elapsed() >= Duration::from_millis(29));
    }

    #[test]
    fn test_overrun_does_not_sleep() {
        let mut rate = Rate::new(1000.0).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let start = Instant::now();
        rate.sleep();
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
