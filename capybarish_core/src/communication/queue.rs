//! Per-subscription delivery queue.
//!
//! Shared between the topic (which enqueues on publish), the subscription
//! (which drains it) and an optional network receive thread. Enqueue never
//! blocks: under keep-last the oldest entry is evicted to make room.

use crate::communication::qos::{History, QoSProfile};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// FIFO of messages waiting for a subscription callback
#[derive(Debug)]
pub struct DeliveryQueue<M> {
    tx: Sender<M>,
    rx: Receiver<M>,
    history: History,
    receive_count: AtomicU64,
    drop_count: AtomicU64,
    last_receive: Mutex<Option<Instant>>,
}

impl<M: Send> DeliveryQueue<M> {
    pub fn new(qos: &QoSProfile) -> Self {
        let (tx, rx) = match qos.history {
            History::KeepLast => channel::bounded(qos.depth.max(1)),
            History::KeepAll => channel::unbounded(),
        };
        Self {
            tx,
            rx,
            history: qos.history,
            receive_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
            last_receive: Mutex::new(None),
        }
    }

    /// Insert without blocking. Returns `false` if the message was dropped.
    pub fn enqueue(&self, msg: M) -> bool {
        if self.history == History::KeepLast && self.tx.is_full() && self.rx.try_recv().is_ok() {
            self.drop_count.fetch_add(1, Ordering::Relaxed);
        }
        match self.tx.try_send(msg) {
            Ok(()) => {
                self.receive_count.fetch_add(1, Ordering::Relaxed);
                *self.last_receive.lock() = Some(Instant::now());
                true
            }
            // A concurrent producer refilled the slot we just freed
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop one message, waiting up to `timeout` when one is given
    pub fn take(&self, timeout: Option<Duration>) -> Option<M> {
        match timeout {
            Some(timeout) if !timeout.is_zero() => match self.rx.recv_timeout(timeout) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            },
            _ => self.rx.try_recv().ok(),
        }
    }

    /// Drain everything currently queued, oldest first
    pub fn take_all(&self) -> Vec<M> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn receive_count(&self) -> u64 {
        self.receive_count.load(Ordering::Relaxed)
    }

    pub fn drop_count(&self) -> u64 {
        self.drop_count.load(Ordering::Relaxed)
    }

    pub fn last_receive(&self) -> Option<Instant> {
        *self.last_receive.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_last_evicts_oldest() {
        let queue = DeliveryQueue::new(&QoSProfile::with_depth(2));
        for value in [1.0f64, 2.0, 3.0] {
            assert!(queue.enqueue(value));
        }
        assert_eq!(queue.take_all(), vec![2.0, 3.0]);
        assert_eq!(queue.receive_count(), 3);
        assert_eq!(queue.drop_count(), 1);
    }

    #[test]
    fn test_keep_all_never_drops() {
        let queue = DeliveryQueue::new(&QoSProfile::keep_all());
        for i in 0..1000u32 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.drop_count(), 0);
    }

    #[test]
    fn test_take_with_timeout_on_empty_queue() {
        let queue: DeliveryQueue<u8> = DeliveryQueue::new(&QoSProfile::default());
        let start = Instant::now();
        assert!(queue.take(Some(Duration::from_millis(20))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(queue.take(None).is_none());
        assert!(queue.last_receive().is_none());
    }
}
