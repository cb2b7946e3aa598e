//! Topic and node registry.
//!
//! One [`TopicManager`] is shared (as `Arc<TopicManager>`) by every node of a
//! process or test. Topics are created on first use and live until
//! [`TopicManager::reset`]; each receives a port from a monotonic counter that
//! starts at `network.base_port`.

use crate::communication::message::Message;
use crate::communication::qos::QoSProfile;
use crate::communication::topic::{AnyTopic, Topic, TopicInfo};
use crate::config::CapyConfig;
use crate::error::{CapyError, CapyResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct TopicTable {
    topics: HashMap<String, Arc<dyn AnyTopic>>,
    port_map: HashMap<String, u16>,
    next_port: u32,
}

/// Registry of topics, their ports and the names of live nodes
pub struct TopicManager {
    config: CapyConfig,
    table: Mutex<TopicTable>,
    nodes: Mutex<HashMap<String, u64>>,
    next_node_id: AtomicU64,
    generation: AtomicU64,
}

impl TopicManager {
    pub fn new(config: CapyConfig) -> Arc<Self> {
        let next_port = u32::from(config.network.base_port);
        Arc::new(Self {
            config,
            table: Mutex::new(TopicTable {
                topics: HashMap::new(),
                port_map: HashMap::new(),
                next_port,
            }),
            nodes: Mutex::new(HashMap::new()),
            next_node_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(CapyConfig::default())
    }

    pub fn config(&self) -> &CapyConfig {
        &self.config
    }

    /// Return the topic called `name`, creating it with `qos` if needed.
    ///
    /// Reopening a topic with another message type or another durability is an
    /// error. History, depth and reliability are per endpoint and may differ.
    pub fn get_or_create_topic<M: Message>(
        &self,
        name: &str,
        qos: QoSProfile,
    ) -> CapyResult<Arc<Topic<M>>> {
        qos.validate()?;
        let mut table = self.table.lock();

        if let Some(existing) = table.topics.get(name) {
            if existing.message_type() != std::any::TypeId::of::<M>() {
                return Err(CapyError::type_mismatch(
                    existing.type_name(),
                    std::any::type_name::<M>(),
                ));
            }
            if existing.qos().durability != qos.durability {
                return Err(CapyError::qos_incompatible(
                    name,
                    format!(
                        "durability {:?} requested, topic uses {:?}",
                        qos.durability,
                        existing.qos().durability
                    ),
                ));
            }
            return existing
                .clone()
                .into_any()
                .downcast::<Topic<M>>()
                .map_err(|_| CapyError::Internal(format!("topic '{}' failed to downcast", name)));
        }

        let known_port = table.port_map.get(name).copied();
        let port = match known_port {
            Some(port) => port,
            None => {
                let port = u16::try_from(table.next_port).map_err(|_| {
                    CapyError::network(format!("no ports left to allocate for topic '{}'", name))
                })?;
                table.next_port += 1;
                table.port_map.insert(name.to_string(), port);
                port
            }
        };

        let topic = Arc::new(Topic::<M>::new(name, qos, port));
        table.topics.insert(name.to_string(), topic.clone());
        log::debug!(
            "Created topic '{}' ({}) on port {}",
            name,
            std::any::type_name::<M>(),
            port
        );
        Ok(topic)
    }

    /// Sorted names of every topic
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, message type)` pairs, sorted by name
    pub fn topic_names_and_types(&self) -> Vec<(String, String)> {
        let table = self.table.lock();
        let mut pairs: Vec<(String, String)> = table
            .topics
            .iter()
            .map(|(name, topic)| (name.clone(), topic.type_name().to_string()))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn topic_info(&self, name: &str) -> Option<TopicInfo> {
        let topic = self.table.lock().topics.get(name).cloned()?;
        Some(topic.info())
    }

    pub fn allocated_port(&self, name: &str) -> Option<u16> {
        self.table.lock().port_map.get(name).copied()
    }

    /// Claim a node's full name. Returns a token required to release it.
    pub fn register_node(&self, full_name: &str) -> CapyResult<u64> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(full_name) {
            return Err(CapyError::AlreadyExists(format!("node '{}'", full_name)));
        }
        let id = self.next_node_id.fetch_add(1, Ordering::Relaxed);
        nodes.insert(full_name.to_string(), id);
        Ok(id)
    }

    /// Release a name claimed with [`register_node`](Self::register_node)
    pub fn unregister_node(&self, full_name: &str, id: u64) -> bool {
        let mut nodes = self.nodes.lock();
        if nodes.get(full_name) == Some(&id) {
            nodes.remove(full_name);
            true
        } else {
            false
        }
    }

    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Bumped by every [`reset`](Self::reset)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Close every topic and forget all topics, ports and nodes
    pub fn reset(&self) {
        let topics: Vec<Arc<dyn AnyTopic>> = {
            let mut table = self.table.lock();
            table.port_map.clear();
            table.next_port = u32::from(self.config.network.base_port);
            table.topics.drain().map(|(_, topic)| topic).collect()
        };
        for topic in &topics {
            topic.close();
        }
        self.nodes.lock().clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        log::debug!("Topic registry reset ({} topics closed)", topics.len());
    }
}

impl std::fmt::Debug for TopicManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicManager")
            .field("topics", &self.topic_names())
            .field("nodes", &self.node_names())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::qos::Durability;

    #[test]
    fn test_ports_are_allocated_in_creation_order() {
        let manager = TopicManager::with_defaults();
        let a = manager.get_or_create_topic::<u32>("/a", QoSProfile::default()).unwrap();
        let b = manager.get_or_create_topic::<u32>("/b", QoSProfile::default()).unwrap();
        let a_again = manager.get_or_create_topic::<u32>("/a", QoSProfile::with_depth(1)).unwrap();

        assert_eq!(a.port(), 7000);
        assert_eq!(b.port(), 7001);
        assert!(Arc::ptr_eq(&a, &a_again));
        assert_eq!(manager.allocated_port("/b"), Some(7001));
        assert_eq!(manager.topic_names(), vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let manager = TopicManager::with_defaults();
        manager.get_or_create_topic::<u32>("/x", QoSProfile::default()).unwrap();
        let err = manager
            .get_or_create_topic::<f64>("/x", QoSProfile::default())
            .unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_durability_mismatch_rejected() {
        let manager = TopicManager::with_defaults();
        manager.get_or_create_topic::<u8>("/p", QoSProfile::parameters()).unwrap();
        let result = manager.get_or_create_topic::<u8>(
            "/p",
            QoSProfile::default().durability(Durability::Volatile),
        );
        assert!(matches!(result, Err(CapyError::QosIncompatible { .. })));
    }

    #[test]
    fn test_duplicate_node_names() {
        let manager = TopicManager::with_defaults();
        let id = manager.register_node("ns/motor").unwrap();
        assert!(matches!(
            manager.register_node("ns/motor"),
            Err(CapyError::AlreadyExists(_))
        ));
        assert!(!manager.unregister_node("ns/motor", id + 100));
        assert!(manager.unregister_node("ns/motor", id));
        assert!(manager.node_names().is_empty());
    }

    #[test]
    fn test_reset_closes_topics_and_restarts_ports() {
        let manager = TopicManager::with_defaults();
        let topic = manager.get_or_create_topic::<u8>("/t", QoSProfile::default()).unwrap();
        manager.register_node("n").unwrap();
        manager.reset();

        assert!(topic.is_closed());
        assert!(manager.topic_names().is_empty());
        assert!(manager.node_names().is_empty());
        assert_eq!(manager.generation(), 1);
        let fresh = manager.get_or_create_topic::<u8>("/other", QoSProfile::default()).unwrap();
        assert_eq!(fresh.port(), 7000);
    }
}
