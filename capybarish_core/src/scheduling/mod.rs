//! # Capybarish Scheduling
//!
//! Executors poll nodes for pending subscription callbacks and ready timers:
//!
//! - **SingleThreadedExecutor**: all nodes on the calling thread
//! - **MultiThreadedExecutor**: one worker thread per node
//! - **Rate**: fixed-frequency loop throttling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use capybarish_core::communication::TopicManager;
//! use capybarish_core::core::Node;
//! use capybarish_core::scheduling::SingleThreadedExecutor;
//!
//! let manager = TopicManager::with_defaults();
//! let node = Node::new(&manager, "controller").unwrap();
//! let executor = SingleThreadedExecutor::new();
//! executor.add_node(&node);
//! executor.spin(); // until executor.shutdown() from elsewhere
//! ```

pub mod executor;
pub mod rate;

pub use executor::{MultiThreadedExecutor, SingleThreadedExecutor};
pub use rate::Rate;
