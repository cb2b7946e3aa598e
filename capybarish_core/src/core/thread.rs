//! Cooperative background threads with bounded teardown.
//!
//! Threads are stopped by flag, never killed. If a thread ignores the flag past
//! the join timeout it is detached and keeps running until it notices; the leak
//! is logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Wait up to `timeout` for `handle` to finish.
///
/// Returns `true` if the thread was joined. A thread that panicked counts as
/// joined; the panic is logged rather than re-raised.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, what: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!(
                "{} did not stop within {:?}; abandoning thread",
                what,
                timeout
            );
            return false;
        }
        std::thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        log::error!("{} panicked", what);
    }
    true
}

/// A named background loop plus its stop flag
#[derive(Debug)]
pub struct StoppableThread {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StoppableThread {
    /// Spawn `body`, handing it the shared stop flag
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Raise the stop flag and join with a bound. Safe to call repeatedly.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => join_with_timeout(handle, timeout, &self.name),
            None => true,
        }
    }
}

impl Drop for StoppableThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_joins_cooperative_thread() {
        let mut thread = StoppableThread::spawn("test-coop", |stop| {
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        assert!(thread.is_running());
        assert!(thread.stop(Duration::from_secs(1)));
        assert!(!thread.is_running());
        // Second stop is a no-op
        assert!(thread.stop(Duration::from_secs(1)));
    }

    #[test]
    fn test_unresponsive_thread_is_abandoned() {
        let mut thread = StoppableThread::spawn("test-stuck", |_stop| {
            std::thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
        assert!(!thread.stop(Duration::from_millis(20)));
    }

    #[test]
    fn test_panicking_thread_counts_as_joined() {
        let handle = std::thread::spawn(|| panic!("boom"));
        assert!(join_with_timeout(handle, Duration::from_secs(1), "test-panic"));
    }
}
