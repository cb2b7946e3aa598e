//! # Communication layer for Capybarish
//!
//! Topic-based publish/subscribe inside one process, with an optional UDP
//! bridge to remote peers:
//!
//! - **TopicManager**: registry of named topics and their allocated ports
//! - **Publisher / Subscription**: typed endpoints with per-endpoint QoS
//! - **NetworkServer**: reply-to-sender server for field devices
//!
//! ## Usage
//!
//! ```rust
//! use capybarish_core::communication::{QoSProfile, TopicManager};
//!
//! let manager = TopicManager::with_defaults();
//! let topic = manager.get_or_create_topic::<f64>("/cmd", QoSProfile::default()).unwrap();
//! assert_eq!(topic.publish(1.0).unwrap(), 0);
//! ```

pub mod message;
pub mod network;
pub mod pod;
pub mod publisher;
pub mod qos;
pub mod queue;
pub mod registry;
pub mod subscription;
pub mod topic;

pub use message::{Message, WireMessage};
pub use network::{NetworkServer, RemoteDevice};
pub use publisher::Publisher;
pub use qos::{Durability, History, QoSProfile, Reliability};
pub use queue::DeliveryQueue;
pub use registry::TopicManager;
pub use subscription::{Subscription, SubscriptionCallback};
pub use topic::{Topic, TopicInfo};
