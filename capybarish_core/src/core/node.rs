//! Nodes own every publisher, subscription and timer of one logical component.
//!
//! Entities are only created through a node, so destroying the node tears all
//! of them down in a fixed order: publishers, then subscriptions, then timers.
//! Relative topic names are resolved against the node's namespace.

use crate::communication::message::Message;
use crate::communication::publisher::Publisher;
use crate::communication::qos::QoSProfile;
use crate::communication::registry::TopicManager;
use crate::communication::subscription::Subscription;
use crate::core::logger::NodeLogger;
use crate::core::timer::Timer;
use crate::error::{CapyError, CapyResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SPIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Topic name and message type of an endpoint, for introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicMetadata {
    pub topic_name: String,
    pub type_name: String,
}

/// Type-erased publisher as seen by its owning node
pub(crate) trait PublisherEntity: Send + Sync {
    fn metadata(&self) -> TopicMetadata;
    fn destroy(&self);
}

/// Type-erased subscription as seen by its owning node
pub(crate) trait SubscriptionEntity: Send + Sync {
    fn metadata(&self) -> TopicMetadata;
    fn process_all(&self) -> usize;
    fn destroy(&self);
}

impl<M: Message> PublisherEntity for Publisher<M> {
    fn metadata(&self) -> TopicMetadata {
        TopicMetadata {
            topic_name: self.topic_name().to_string(),
            type_name: self.type_name().to_string(),
        }
    }

    fn destroy(&self) {
        Publisher::destroy(self);
    }
}

impl<M: Message> SubscriptionEntity for Subscription<M> {
    fn metadata(&self) -> TopicMetadata {
        TopicMetadata {
            topic_name: self.topic_name().to_string(),
            type_name: self.type_name().to_string(),
        }
    }

    fn process_all(&self) -> usize {
        Subscription::process_all(self)
    }

    fn destroy(&self) {
        Subscription::destroy(self);
    }
}

#[derive(Default)]
struct NodeEntities {
    publishers: Vec<Arc<dyn PublisherEntity>>,
    subscriptions: Vec<Arc<dyn SubscriptionEntity>>,
    timers: Vec<Arc<Timer>>,
}

/// A named participant in the topic graph
pub struct Node {
    name: String,
    namespace: String,
    full_name: String,
    manager: Arc<TopicManager>,
    registration: u64,
    generation: u64,
    entities: Mutex<NodeEntities>,
    logger: NodeLogger,
    created_at: Instant,
    destroyed: AtomicBool,
}

impl Node {
    pub fn new(manager: &Arc<TopicManager>, name: &str) -> CapyResult<Arc<Self>> {
        Self::with_namespace(manager, name, "")
    }

    /// Create a node whose relative topics live under `/namespace/`
    pub fn with_namespace(
        manager: &Arc<TopicManager>,
        name: &str,
        namespace: &str,
    ) -> CapyResult<Arc<Self>> {
        if name.is_empty() || name.contains('/') {
            return Err(CapyError::invalid_input(format!(
                "invalid node name '{}'",
                name
            )));
        }
        let namespace = namespace.trim_matches('/').to_string();
        let full_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", namespace, name)
        };

        let generation = manager.generation();
        let registration = manager.register_node(&full_name)?;
        log::debug!("Node '{}' created", full_name);

        Ok(Arc::new(Self {
            name: name.to_string(),
            namespace,
            logger: NodeLogger::new(&full_name),
            full_name,
            manager: manager.clone(),
            registration,
            generation,
            entities: Mutex::new(NodeEntities::default()),
            created_at: Instant::now(),
            destroyed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace without surrounding slashes; empty when none was given
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn logger(&self) -> &NodeLogger {
        &self.logger
    }

    pub fn manager(&self) -> &Arc<TopicManager> {
        &self.manager
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Absolute names are kept; relative ones go under the namespace
    pub fn resolve_topic_name(&self, topic: &str) -> String {
        if topic.starts_with('/') {
            topic.to_string()
        } else if self.namespace.is_empty() {
            format!("/{}", topic)
        } else {
            format!("/{}/{}", self.namespace, topic)
        }
    }

    fn ensure_usable(&self) -> CapyResult<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(CapyError::Shutdown(format!(
                "node '{}' was destroyed",
                self.full_name
            )));
        }
        if self.manager.generation() != self.generation {
            return Err(CapyError::Shutdown(format!(
                "registry was reset after node '{}' was created",
                self.full_name
            )));
        }
        Ok(())
    }

    pub fn create_publisher<M: Message>(
        &self,
        topic: &str,
        qos: QoSProfile,
    ) -> CapyResult<Arc<Publisher<M>>> {
        self.ensure_usable()?;
        let topic = self
            .manager
            .get_or_create_topic::<M>(&self.resolve_topic_name(topic), qos)?;
        let publisher = Publisher::new(&self.full_name, topic, qos);
        self.entities.lock().publishers.push(publisher.clone());
        Ok(publisher)
    }

    /// Subscribe to `topic`; `callback` runs on whichever thread spins this node.
    ///
    /// The callback may publish, including to its own topic, but must not
    /// process its own subscription.
    pub fn create_subscription<M, F>(
        &self,
        topic: &str,
        qos: QoSProfile,
        callback: F,
    ) -> CapyResult<Arc<Subscription<M>>>
    where
        M: Message,
        F: FnMut(M) + Send + 'static,
    {
        self.ensure_usable()?;
        let topic = self
            .manager
            .get_or_create_topic::<M>(&self.resolve_topic_name(topic), qos)?;
        let subscription = Subscription::new(
            &self.full_name,
            topic,
            qos,
            Box::new(callback),
            self.manager.config().network.clone(),
        );
        self.entities.lock().subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    pub fn create_timer<F>(&self, period: Duration, callback: F) -> CapyResult<Arc<Timer>>
    where
        F: FnMut() + Send + 'static,
    {
        self.ensure_usable()?;
        let timer = Arc::new(Timer::new(period, callback)?);
        self.entities.lock().timers.push(timer.clone());
        log::debug!("[{}] timer created ({:?})", self.full_name, period);
        Ok(timer)
    }

    /// Run every pending subscription callback and every ready timer once.
    ///
    /// With a timeout, keeps polling until something runs or the timeout
    /// expires. Returns the number of callbacks executed.
    pub fn spin_once(&self, timeout: Option<Duration>) -> usize {
        let start = Instant::now();
        loop {
            let executed = self.execute_pending();
            let Some(timeout) = timeout else {
                return executed;
            };
            if executed > 0 {
                return executed;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout || self.is_destroyed() {
                return 0;
            }
            std::thread::sleep(SPIN_POLL_INTERVAL.min(timeout - elapsed));
        }
    }

    fn execute_pending(&self) -> usize {
        // Callbacks may create entities on this node, so never run them under the lock
        let (subscriptions, timers) = {
            let entities = self.entities.lock();
            (entities.subscriptions.clone(), entities.timers.clone())
        };

        let mut executed = 0;
        for subscription in &subscriptions {
            executed += subscription.process_all();
        }
        let now = Instant::now();
        for timer in &timers {
            if timer.is_ready_at(now) && timer.fire() {
                executed += 1;
            }
        }
        executed
    }

    pub fn publisher_count(&self) -> usize {
        self.entities.lock().publishers.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.entities.lock().subscriptions.len()
    }

    pub fn timer_count(&self) -> usize {
        self.entities.lock().timers.len()
    }

    pub fn published_topics(&self) -> Vec<TopicMetadata> {
        self.entities
            .lock()
            .publishers
            .iter()
            .map(|p| p.metadata())
            .collect()
    }

    pub fn subscribed_topics(&self) -> Vec<TopicMetadata> {
        self.entities
            .lock()
            .subscriptions
            .iter()
            .map(|s| s.metadata())
            .collect()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Destroy publishers, subscriptions and timers, then release the name. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let entities = std::mem::take(&mut *self.entities.lock());
        for publisher in &entities.publishers {
            publisher.destroy();
        }
        for subscription in &entities.subscriptions {
            subscription.destroy();
        }
        for timer in &entities.timers {
            timer.destroy();
        }
        self.manager
            .unregister_node(&self.full_name, self.registration);
        log::debug!(
            "Node '{}' destroyed ({} warnings, {} errors logged)",
            self.full_name,
            self.logger.warnings_count(),
            self.logger.errors_count()
        );
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entities = self.entities.lock();
        f.debug_struct("Node")
            .field("full_name", &self.full_name)
            .field("publishers", &entities.publishers.len())
            .field("subscriptions", &entities.subscriptions.len())
            .field("timers", &entities.timers.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_full_name_and_resolution() {
        let manager = TopicManager::with_defaults();
        let plain = Node::new(&manager, "talker").unwrap();
        let scoped = Node::with_namespace(&manager, "talker", "robot1").unwrap();

        assert_eq!(plain.full_name(), "talker");
        assert_eq!(scoped.full_name(), "robot1/talker");
        assert_eq!(plain.resolve_topic_name("cmd"), "/cmd");
        assert_eq!(scoped.resolve_topic_name("cmd"), "/robot1/cmd");
        assert_eq!(scoped.resolve_topic_name("/cmd"), "/cmd");
    }

    #[test]
    fn test_invalid_names() {
        let manager = TopicManager::with_defaults();
        assert!(Node::new(&manager, "").is_err());
        assert!(Node::new(&manager, "a/b").is_err());
    }

    #[test]
    fn test_spin_once_runs_callbacks_and_timers() {
        let manager = TopicManager::with_defaults();
        let node = Node::new(&manager, "worker").unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        node.create_subscription::<u32, _>("ticks", QoSProfile::default(), move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        let publisher = node
            .create_publisher::<u32>("ticks", QoSProfile::default())
            .unwrap();
        let timer = node
            .create_timer(Duration::from_millis(1), || {})
            .unwrap();

        publisher.publish(1).unwrap();
        publisher.publish(2).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(node.spin_once(None), 3);
        assert_eq!(received.load(Ordering::Relaxed), 2);
        assert_eq!(timer.fire_count(), 1);
    }

    #[test]
    fn test_spin_once_timeout_without_work() {
        let manager = TopicManager::with_defaults();
        let node = Node::new(&manager, "idle").unwrap();
        let start = Instant::now();
        assert_eq!(node.spin_once(Some(Duration::from_millis(20))), 0);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let manager = TopicManager::with_defaults();
        let node = Node::new(&manager, "owner").unwrap();
        let publisher = node.create_publisher::<u8>("out", QoSProfile::default()).unwrap();
        let subscription = node
            .create_subscription::<u8, _>("out", QoSProfile::default(), |_| {})
            .unwrap();
        let timer = node.create_timer(Duration::from_secs(1), || {}).unwrap();
        assert_eq!(node.published_topics()[0].topic_name, "/out");

        node.destroy();
        node.destroy();
        assert!(publisher.is_destroyed());
        assert!(subscription.is_destroyed());
        assert!(!timer.is_active());
        assert_eq!(node.publisher_count(), 0);
        assert!(manager.node_names().is_empty());
        assert!(node.create_timer(Duration::from_secs(1), || {}).unwrap_err().is_shutdown());

        // The name is free again
        Node::new(&manager, "owner").unwrap();
    }
}
