//! # Capybarish Core
//!
//! Messaging substrate for robot control software.
//!
//! Capybarish decouples producers (sensors, control loops) from consumers
//! (loggers, dashboards, policies) through named topics, and bridges to field
//! devices over plain UDP datagrams:
//!
//! - **Communication**: topics, publishers, subscriptions and QoS
//! - **Nodes**: owners of endpoints and timers, with per-node logging
//! - **Scheduling**: single- and multi-threaded executors, rate throttling
//! - **NetworkServer**: reply-to-sender discovery for devices on the LAN
//!
//! ## Quick Start
//!
//! ```rust
//! use capybarish_core::{Context, QoSProfile};
//! use std::time::Duration;
//!
//! let context = Context::new();
//! let node = context.create_node("controller").unwrap();
//! let commands = node.create_publisher::<f64>("cmd", QoSProfile::default()).unwrap();
//! let feedback = node
//!     .create_subscription::<f64, _>("cmd", QoSProfile::default(), |value| {
//!         println!("got {}", value);
//!     })
//!     .unwrap();
//!
//! commands.publish(1.0).unwrap();
//! assert_eq!(node.spin_once(Some(Duration::from_millis(10))), 1);
//! assert_eq!(feedback.receive_count(), 1);
//! context.shutdown();
//! ```

pub mod communication;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod scheduling;

// Re-export commonly used types for easy access
pub use communication::{
    Durability, History, Message, NetworkServer, Publisher, QoSProfile, Reliability, RemoteDevice,
    Subscription, Topic, TopicInfo, TopicManager, WireMessage,
};
pub use config::{CapyConfig, ExecutorConfig, NetworkConfig, ServerConfig};
pub use context::Context;
pub use core::{LogLevel, Node, NodeLogger, Timer, TopicMetadata};
pub use error::{CapyError, CapyResult};
pub use scheduling::{MultiThreadedExecutor, Rate, SingleThreadedExecutor};
