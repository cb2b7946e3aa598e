//! Named message channel with fan-out to every registered subscription.
//!
//! A [`Topic`] does not own its endpoints. Publishers and subscription queues
//! are held weakly and pruned lazily whenever the topic is touched, so dropping
//! an endpoint without calling `destroy()` never leaves a dangling registration.

use crate::communication::message::Message;
use crate::communication::publisher::Publisher;
use crate::communication::qos::QoSProfile;
use crate::communication::queue::DeliveryQueue;
use crate::error::{CapyError, CapyResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

struct TopicState<M> {
    publishers: Vec<Weak<Publisher<M>>>,
    subscribers: Vec<Weak<DeliveryQueue<M>>>,
    retained: Option<M>,
    message_count: u64,
    last_publish: Option<Instant>,
}

impl<M> TopicState<M> {
    fn prune(&mut self) {
        self.publishers.retain(|p| p.strong_count() > 0);
        self.subscribers.retain(|s| s.strong_count() > 0);
    }
}

/// A named channel carrying messages of type `M`
pub struct Topic<M> {
    name: String,
    qos: QoSProfile,
    port: u16,
    state: Mutex<TopicState<M>>,
    closed: AtomicBool,
}

impl<M: Message> Topic<M> {
    pub(crate) fn new(name: &str, qos: QoSProfile, port: u16) -> Self {
        Self {
            name: name.to_string(),
            qos,
            port,
            state: Mutex::new(TopicState {
                publishers: Vec::new(),
                subscribers: Vec::new(),
                retained: None,
                message_count: 0,
                last_publish: None,
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Profile of the endpoint that created the topic
    pub fn qos(&self) -> &QoSProfile {
        &self.qos
    }

    /// Port allocated by the registry for this topic
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    /// Deliver `msg` to every live subscription and return how many accepted it.
    ///
    /// The whole delivery happens under the topic lock, so all subscribers see
    /// publishes in the same order. Enqueueing never blocks.
    pub fn publish(&self, msg: M) -> CapyResult<usize> {
        if self.is_closed() {
            return Err(CapyError::Shutdown(format!("topic '{}' is closed", self.name)));
        }

        let mut state = self.state.lock();
        state.message_count += 1;
        state.last_publish = Some(Instant::now());
        if self.qos.is_transient_local() {
            state.retained = Some(msg.clone());
        }
        state.prune();

        let mut delivered = 0;
        for queue in state.subscribers.iter().filter_map(Weak::upgrade) {
            if queue.enqueue(msg.clone()) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub(crate) fn add_publisher(&self, publisher: &Arc<Publisher<M>>) {
        let mut state = self.state.lock();
        state.prune();
        state.publishers.push(Arc::downgrade(publisher));
    }

    /// Register a subscription queue; a retained message is delivered at once
    pub(crate) fn add_subscriber(&self, queue: &Arc<DeliveryQueue<M>>) {
        let mut state = self.state.lock();
        state.prune();
        state.subscribers.push(Arc::downgrade(queue));
        if let Some(retained) = state.retained.clone() {
            queue.enqueue(retained);
        }
    }

    pub fn publisher_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.publishers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.subscribers.len()
    }

    pub fn message_count(&self) -> u64 {
        self.state.lock().message_count
    }

    pub fn last_publish(&self) -> Option<Instant> {
        self.state.lock().last_publish
    }

    /// Last message kept for late joiners (transient-local topics only)
    pub fn retained(&self) -> Option<M> {
        self.state.lock().retained.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn info(&self) -> TopicInfo {
        let mut state = self.state.lock();
        state.prune();
        TopicInfo {
            name: self.name.clone(),
            type_name: self.type_name().to_string(),
            publishers: state.publishers.len(),
            subscribers: state.subscribers.len(),
            port: self.port,
            qos: self.qos,
            message_count: state.message_count,
            seconds_since_last_publish: state.last_publish.map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

impl<M> Topic<M> {
    pub(crate) fn remove_publisher(&self, publisher: *const Publisher<M>) {
        let mut state = self.state.lock();
        state
            .publishers
            .retain(|p| p.strong_count() > 0 && !std::ptr::eq(p.as_ptr(), publisher));
    }

    pub(crate) fn remove_subscriber(&self, queue: &Arc<DeliveryQueue<M>>) {
        let target = Arc::as_ptr(queue);
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|s| s.strong_count() > 0 && !std::ptr::eq(s.as_ptr(), target));
    }
}

impl<M> std::fmt::Debug for Topic<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<M>())
            .field("port", &self.port)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Point-in-time description of a topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub type_name: String,
    pub publishers: usize,
    pub subscribers: usize,
    pub port: u16,
    pub qos: QoSProfile,
    pub message_count: u64,
    pub seconds_since_last_publish: Option<f64>,
}

/// Type-erased view the registry keeps of each topic
pub(crate) trait AnyTopic: Send + Sync {
    fn message_type(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn qos(&self) -> QoSProfile;
    fn info(&self) -> TopicInfo;
    fn close(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Message> AnyTopic for Topic<M> {
    fn message_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn qos(&self) -> QoSProfile {
        self.qos
    }

    fn info(&self) -> TopicInfo {
        Topic::info(self)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut state = self.state.lock();
        state.publishers.clear();
        state.subscribers.clear();
        state.retained = None;
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::qos::Durability;

    #[test]
    fn test_publish_without_subscribers() {
        let topic: Topic<u32> = Topic::new("/empty", QoSProfile::default(), 7000);
        assert_eq!(topic.publish(1).unwrap(), 0);
        assert_eq!(topic.message_count(), 1);
        assert!(topic.last_publish().is_some());
        assert!(topic.retained().is_none());
    }

    #[test]
    fn test_fan_out_and_pruning() {
        let topic: Topic<u32> = Topic::new("/fan", QoSProfile::default(), 7000);
        let a = Arc::new(DeliveryQueue::new(&QoSProfile::default()));
        let b = Arc::new(DeliveryQueue::new(&QoSProfile::default()));
        topic.add_subscriber(&a);
        topic.add_subscriber(&b);
        assert_eq!(topic.publish(5).unwrap(), 2);

        drop(b);
        assert_eq!(topic.subscriber_count(), 1);
        assert_eq!(topic.publish(6).unwrap(), 1);
        assert_eq!(a.take_all(), vec![5, 6]);

        topic.remove_subscriber(&a);
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn test_transient_local_replays_to_late_joiner() {
        let qos = QoSProfile::default().durability(Durability::TransientLocal);
        let topic: Topic<u8> = Topic::new("/latched", qos, 7001);
        topic.publish(1).unwrap();
        topic.publish(2).unwrap();

        let late = Arc::new(DeliveryQueue::new(&qos));
        topic.add_subscriber(&late);
        assert_eq!(late.take_all(), vec![2]);
    }

    #[test]
    fn test_closed_topic_rejects_publish() {
        let topic: Arc<Topic<u8>> = Arc::new(Topic::new("/gone", QoSProfile::default(), 7002));
        AnyTopic::close(topic.as_ref());
        assert!(topic.publish(1).unwrap_err().is_shutdown());
    }

    #[test]
    fn test_info_snapshot() {
        let topic: Topic<f32> = Topic::new("/info", QoSProfile::sensor_data(), 7003);
        topic.publish(0.5).unwrap();
        let info = topic.info();
        assert_eq!(info.name, "/info");
        assert_eq!(info.type_name, "f32");
        assert_eq!(info.port, 7003);
        assert_eq!(info.message_count, 1);
        assert!(info.seconds_since_last_publish.is_some());
    }
}
