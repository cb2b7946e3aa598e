//! # Capybarish
//!
//! Lightweight publish/subscribe and device discovery for robot control.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use capybarish::prelude::*;
//! use std::time::Duration;
//!
//! let context = Context::new();
//! context.install_ctrlc_handler().unwrap();
//!
//! let node = context.create_node("motor_bridge").unwrap();
//! let command = node.create_publisher::<f32>("target", QoSProfile::sensor_data()).unwrap();
//! command.add_remote_endpoint("192.168.1.50", 6667).unwrap();
//!
//! let mut rate = Rate::new(100.0).unwrap();
//! while context.ok() {
//!     command.publish(0.5).unwrap();
//!     node.spin_once(None);
//!     rate.sleep();
//! }
//! ```
//!
//! ## Features
//!
//! - **Typed topics** with per-endpoint QoS (keep-last / keep-all, transient-local)
//! - **UDP bridge**: remote endpoints on publishers, network-bound subscriptions
//! - **NetworkServer**: devices announce themselves; replies go back to the sender
//! - **POD wire records** via `bytemuck`

// Re-export core components
pub use capybarish_core::{self, *};

// Re-export for `pod_wire_message!` users and node logging
pub use bytemuck;
pub use log;
pub use capybarish_core::pod_wire_message;

/// The Capybarish prelude
///
/// `use capybarish::prelude::*;` brings in everything a typical node needs.
pub mod prelude {
    // ============================================
    // Nodes & Context
    // ============================================
    pub use capybarish_core::context::Context;
    pub use capybarish_core::core::{LogLevel, Node, NodeLogger, Timer};

    // ============================================
    // Communication
    // ============================================
    pub use capybarish_core::communication::{
        Durability, History, Message, NetworkServer, Publisher, QoSProfile, Reliability,
        RemoteDevice, Subscription, TopicManager, WireMessage,
    };

    // ============================================
    // Scheduling
    // ============================================
    pub use capybarish_core::scheduling::{MultiThreadedExecutor, Rate, SingleThreadedExecutor};

    // ============================================
    // Configuration & Errors
    // ============================================
    pub use capybarish_core::config::{CapyConfig, ServerConfig};
    pub use capybarish_core::error::{CapyError, CapyResult};

    // Wire records
    pub use bytemuck::{Pod, Zeroable};
    pub use capybarish_core::pod_wire_message;

    pub use std::sync::Arc;
    pub use std::time::Duration;
}
