//! Process-level convenience layer.
//!
//! A [`Context`] bundles a topic registry, a default single-threaded executor
//! and an "ok" flag. It is an ordinary value: tests can create as many
//! independent contexts as they like.

use crate::communication::registry::TopicManager;
use crate::config::CapyConfig;
use crate::core::node::Node;
use crate::error::CapyResult;
use crate::scheduling::executor::SingleThreadedExecutor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Registry, default executor and shutdown flag for one application
#[derive(Debug)]
pub struct Context {
    manager: Arc<TopicManager>,
    executor: SingleThreadedExecutor,
    ok: Arc<AtomicBool>,
    config: CapyConfig,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Initialise with default configuration
    pub fn new() -> Self {
        Self::build(CapyConfig::default())
    }

    pub fn with_config(config: CapyConfig) -> CapyResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Initialise from the first config file in the standard search paths
    pub fn from_default_config() -> CapyResult<Self> {
        Self::with_config(CapyConfig::find_and_load()?)
    }

    fn build(config: CapyConfig) -> Self {
        log::debug!("Context initialised (base port {})", config.network.base_port);
        Self {
            manager: TopicManager::new(config.clone()),
            executor: SingleThreadedExecutor::with_config(config.executor.clone()),
            ok: Arc::new(AtomicBool::new(true)),
            config,
        }
    }

    pub fn manager(&self) -> &Arc<TopicManager> {
        &self.manager
    }

    pub fn executor(&self) -> &SingleThreadedExecutor {
        &self.executor
    }

    pub fn config(&self) -> &CapyConfig {
        &self.config
    }

    pub fn create_node(&self, name: &str) -> CapyResult<Arc<Node>> {
        Node::new(&self.manager, name)
    }

    pub fn create_node_with_namespace(&self, name: &str, namespace: &str) -> CapyResult<Arc<Node>> {
        Node::with_namespace(&self.manager, name, namespace)
    }

    /// False once [`shutdown`](Self::shutdown) ran or Ctrl-C was received
    pub fn ok(&self) -> bool {
        self.ok.load(Ordering::SeqCst)
    }

    /// Stop the default executor and reset the registry. Idempotent.
    pub fn shutdown(&self) {
        if !self.ok.swap(false, Ordering::SeqCst) {
            return;
        }
        self.executor.shutdown();
        self.manager.reset();
        log::debug!("Context shut down");
    }

    /// Spin `node` on the default executor until the context stops being ok
    pub fn spin(&self, node: &Arc<Node>) {
        self.executor.add_node(node);
        let idle_sleep = self.config.executor.idle_sleep();
        while self.ok() {
            if self.executor.spin_once(None) == 0 {
                std::thread::sleep(idle_sleep);
            }
        }
        self.executor.remove_node(node);
    }

    pub fn spin_once(&self, node: &Arc<Node>, timeout: Option<Duration>) -> usize {
        node.spin_once(timeout)
    }

    /// Spin `node` until `done` returns true, the timeout expires or the
    /// context shuts down. Returns the final value of `done`.
    pub fn spin_until<F>(&self, node: &Arc<Node>, mut done: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        let poll = self.config.executor.idle_sleep().max(Duration::from_millis(1));
        while self.ok() && !done() {
            if timeout.map_or(false, |t| start.elapsed() >= t) {
                break;
            }
            node.spin_once(Some(poll));
        }
        done()
    }

    pub fn topic_names_and_types(&self) -> Vec<(String, String)> {
        self.manager.topic_names_and_types()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.manager.node_names()
    }

    /// Route Ctrl-C to [`shutdown`](Self::shutdown)'s flags.
    ///
    /// Only one handler can be installed per process.
    pub fn install_ctrlc_handler(&self) -> CapyResult<()> {
        let ok = self.ok.clone();
        let running = self.executor.running_flag();
        ctrlc::set_handler(move || {
            log::info!("Ctrl+C received, shutting down");
            ok.store(false, Ordering::SeqCst);
            running.store(false, Ordering::SeqCst);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::qos::QoSProfile;
    use parking_lot::Mutex;

    #[test]
    fn test_shutdown_resets_registry() {
        let context = Context::new();
        let node = context.create_node("talker").unwrap();
        let publisher = node.create_publisher::<u16>("chatter", QoSProfile::default()).unwrap();
        assert_eq!(context.node_names(), vec!["talker".to_string()]);
        assert_eq!(context.topic_names_and_types()[0].0, "/chatter");

        context.shutdown();
        context.shutdown();
        assert!(!context.ok());
        assert!(context.node_names().is_empty());
        assert!(publisher.publish(1).unwrap_err().is_shutdown());
        assert!(node
            .create_publisher::<u16>("other", QoSProfile::default())
            .unwrap_err()
            .is_shutdown());
    }

    #[test]
    fn test_spin_until_predicate() {
        let context = Context::new();
        let node = context.create_node("listener").unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        node.create_subscription::<u32, _>("answer", QoSProfile::default(), move |v| {
            *sink.lock() = Some(v);
        })
        .unwrap();
        let publisher = node.create_publisher::<u32>("answer", QoSProfile::default()).unwrap();
        publisher.publish(42).unwrap();

        let done = context.spin_until(&node, || seen.lock().is_some(), Some(Duration::from_secs(1)));
        assert!(done);
        assert_eq!(*seen.lock(), Some(42));
    }

    #[test]
    fn test_spin_until_times_out() {
        let context = Context::new();
        let node = context.create_node("waiter").unwrap();
        let start = Instant::now();
        assert!(!context.spin_until(&node, || false, Some(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_spin_returns_after_shutdown_from_other_thread() {
        let context = Arc::new(Context::new());
        let node = context.create_node("spinner").unwrap();
        let stopper = {
            let context = context.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                context.shutdown();
            })
        };
        context.spin(&node);
        stopper.join().unwrap();
        assert!(!context.ok());
    }
}
