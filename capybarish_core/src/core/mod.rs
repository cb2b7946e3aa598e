pub mod logger;
pub mod node;
pub mod thread;
pub mod timer;

pub use logger::{LogLevel, NodeLogger, NODE_LOG_TARGET};
pub use node::{Node, TopicMetadata};
pub use thread::{join_with_timeout, StoppableThread};
pub use timer::{Timer, TimerCallback};
