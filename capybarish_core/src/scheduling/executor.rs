//! Executors drive node spinning.
//!
//! - [`SingleThreadedExecutor`]: every node is polled in turn on the calling thread
//! - [`MultiThreadedExecutor`]: one worker thread per node
//!
//! Both run until [`shutdown`](SingleThreadedExecutor::shutdown) clears their
//! running flag, which may come from another thread or a Ctrl-C handler.

use crate::config::ExecutorConfig;
use crate::core::node::Node;
use crate::core::thread::StoppableThread;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn add_unique(nodes: &Mutex<Vec<Arc<Node>>>, node: &Arc<Node>) -> bool {
    let mut nodes = nodes.lock();
    if nodes.iter().any(|n| Arc::ptr_eq(n, node)) {
        return false;
    }
    nodes.push(node.clone());
    true
}

fn remove_by_ptr(nodes: &Mutex<Vec<Arc<Node>>>, node: &Arc<Node>) -> bool {
    let mut nodes = nodes.lock();
    let before = nodes.len();
    nodes.retain(|n| !Arc::ptr_eq(n, node));
    nodes.len() != before
}

/// Running flag plus a latch that remembers a stop requested before the run began
#[derive(Debug)]
struct RunState {
    running: Arc<AtomicBool>,
    stop_requested: AtomicBool,
}

impl RunState {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Mark the executor running. Returns false, consuming the request, if a
    /// stop arrived first.
    fn begin(&self) -> bool {
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.running.store(true, Ordering::SeqCst);
        // A stop that raced with the store above
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.running.swap(false, Ordering::SeqCst) {
            // The active run observes the cleared flag
            self.stop_requested.store(false, Ordering::SeqCst);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Poll `nodes` once; with a timeout, keep polling until work is found
fn spin_nodes_once(
    nodes: &Mutex<Vec<Arc<Node>>>,
    timeout: Option<Duration>,
    idle_sleep: Duration,
) -> usize {
    let start = Instant::now();
    loop {
        let snapshot: Vec<Arc<Node>> = nodes.lock().clone();
        let executed: usize = snapshot.iter().map(|node| node.spin_once(None)).sum();
        let Some(timeout) = timeout else {
            return executed;
        };
        if executed > 0 {
            return executed;
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return 0;
        }
        std::thread::sleep(idle_sleep.min(timeout - elapsed));
    }
}

/// Polls all of its nodes on the thread that calls `spin`
#[derive(Debug)]
pub struct SingleThreadedExecutor {
    nodes: Mutex<Vec<Arc<Node>>>,
    state: RunState,
    config: ExecutorConfig,
}

impl Default for SingleThreadedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleThreadedExecutor {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            state: RunState::new(),
            config,
        }
    }

    /// Add a node; adding the same node twice is a no-op
    pub fn add_node(&self, node: &Arc<Node>) -> bool {
        add_unique(&self.nodes, node)
    }

    pub fn remove_node(&self, node: &Arc<Node>) -> bool {
        remove_by_ptr(&self.nodes, node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Poll every node once. Returns the number of callbacks executed.
    pub fn spin_once(&self, timeout: Option<Duration>) -> usize {
        spin_nodes_once(&self.nodes, timeout, self.config.idle_sleep())
    }

    /// Spin until [`shutdown`](Self::shutdown).
    ///
    /// Returns at once if `shutdown` was called before the spin started.
    pub fn spin(&self) {
        if !self.state.begin() {
            return;
        }
        while self.state.is_running() {
            if self.spin_once(None) == 0 {
                std::thread::sleep(self.config.idle_sleep());
            }
        }
    }

    /// Spin until shutdown or until `duration` has elapsed
    pub fn spin_for(&self, duration: Duration) {
        let start = Instant::now();
        if !self.state.begin() {
            return;
        }
        while self.state.is_running() && start.elapsed() < duration {
            if self.spin_once(None) == 0 {
                std::thread::sleep(self.config.idle_sleep());
            }
        }
        self.state.running.store(false, Ordering::SeqCst);
    }

    pub fn shutdown(&self) {
        self.state.stop();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Shared running flag, e.g. for a signal handler
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.state.running.clone()
    }
}

/// Gives every node its own worker thread
#[derive(Debug)]
pub struct MultiThreadedExecutor {
    nodes: Mutex<Vec<Arc<Node>>>,
    workers: Mutex<Vec<StoppableThread>>,
    state: RunState,
    config: ExecutorConfig,
}

impl Default for MultiThreadedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiThreadedExecutor {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            state: RunState::new(),
            config,
        }
    }

    /// Add a node; nodes added while spinning start on the next `spin`
    pub fn add_node(&self, node: &Arc<Node>) -> bool {
        add_unique(&self.nodes, node)
    }

    pub fn remove_node(&self, node: &Arc<Node>) -> bool {
        remove_by_ptr(&self.nodes, node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Poll every node once on the calling thread
    pub fn spin_once(&self, timeout: Option<Duration>) -> usize {
        spin_nodes_once(&self.nodes, timeout, self.config.idle_sleep())
    }

    /// Start one worker per node and block until [`shutdown`](Self::shutdown)
    pub fn spin(&self) -> std::io::Result<()> {
        self.start_workers()?;
        while self.state.is_running() {
            std::thread::sleep(self.config.idle_sleep().max(Duration::from_millis(1)));
        }
        self.join_workers();
        Ok(())
    }

    /// Start workers without blocking the caller.
    ///
    /// Starts nothing if `shutdown` was called first.
    pub fn start_workers(&self) -> std::io::Result<()> {
        if !self.state.begin() {
            log::debug!("Multi-threaded executor shut down before start");
            return Ok(());
        }
        let nodes: Vec<Arc<Node>> = self.nodes.lock().clone();
        let mut workers = self.workers.lock();
        for node in nodes {
            let running = self.state.running.clone();
            let idle_sleep = self.config.idle_sleep();
            let name = format!("capy-exec-{}", node.full_name().replace('/', "-"));
            let worker = StoppableThread::spawn(&name, move |stop| {
                while running.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
                    if node.spin_once(None) == 0 {
                        std::thread::sleep(idle_sleep);
                    }
                }
            });
            match worker {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Stop whatever already started before reporting
                    drop(workers);
                    self.shutdown();
                    return Err(e);
                }
            }
        }
        log::debug!("Multi-threaded executor started {} workers", workers.len());
        Ok(())
    }

    fn join_workers(&self) {
        let workers: Vec<StoppableThread> = self.workers.lock().drain(..).collect();
        let timeout = self.config.join_timeout();
        for mut worker in workers {
            worker.stop(timeout);
        }
    }

    /// Clear the running flag and join every worker with a bounded wait
    pub fn shutdown(&self) {
        self.state.stop();
        self.join_workers();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.state.running.clone()
    }
}

impl Drop for MultiThreadedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::qos::QoSProfile;
    use crate::communication::registry::TopicManager;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_add_node_once() {
        let manager = TopicManager::with_defaults();
        let node = Node::new(&manager, "n").unwrap();
        let executor = SingleThreadedExecutor::new();
        assert!(executor.add_node(&node));
        assert!(!executor.add_node(&node));
        assert_eq!(executor.node_count(), 1);
        assert!(executor.remove_node(&node));
        assert!(!executor.remove_node(&node));
    }

    #[test]
    fn test_single_threaded_spin_once_collects_all_nodes() {
        let manager = TopicManager::with_defaults();
        let a = Node::new(&manager, "a").unwrap();
        let b = Node::new(&manager, "b").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        for node in [&a, &b] {
            let hits = hits.clone();
            node.create_subscription::<u8, _>("/shared", QoSProfile::default(), move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        let publisher = a.create_publisher::<u8>("/shared", QoSProfile::default()).unwrap();
        publisher.publish(1).unwrap();

        let executor = SingleThreadedExecutor::new();
        executor.add_node(&a);
        executor.add_node(&b);
        assert_eq!(executor.spin_once(None), 2);
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(executor.spin_once(Some(Duration::from_millis(5))), 0);
    }

    #[test]
    fn test_spin_for_returns() {
        let executor = SingleThreadedExecutor::new();
        let start = Instant::now();
        executor.spin_for(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!executor.is_running());
    }

    #[test]
    fn test_shutdown_before_spin_is_honoured() {
        let executor = Arc::new(SingleThreadedExecutor::new());
        executor.shutdown();

        let spinner = {
            let executor = executor.clone();
            std::thread::spawn(move || executor.spin())
        };
        let start = Instant::now();
        while !spinner.is_finished() && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(1));
        }
        let finished = spinner.is_finished();
        if !finished {
            executor.shutdown();
        }
        spinner.join().unwrap();
        assert!(finished);
        assert!(!executor.is_running());

        // The request is consumed by the spin it stopped
        let start = Instant::now();
        executor.spin_for(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_multi_threaded_shutdown_before_start() {
        let manager = TopicManager::with_defaults();
        let node = Node::new(&manager, "idle").unwrap();
        let executor = MultiThreadedExecutor::new();
        executor.add_node(&node);

        executor.shutdown();
        executor.spin().unwrap();
        assert_eq!(executor.worker_count(), 0);
        assert!(!executor.is_running());

        executor.start_workers().unwrap();
        assert_eq!(executor.worker_count(), 1);
        executor.shutdown();
        assert_eq!(executor.worker_count(), 0);
    }

    #[test]
    fn test_multi_threaded_shutdown_joins_workers() {
        let manager = TopicManager::with_defaults();
        let node = Node::new(&manager, "worker").unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        node.create_timer(Duration::from_millis(2), move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        let executor = MultiThreadedExecutor::new();
        executor.add_node(&node);
        executor.start_workers().unwrap();
        assert_eq!(executor.worker_count(), 1);
        std::thread::sleep(Duration::from_millis(50));
        executor.shutdown();

        assert!(!executor.is_running());
        assert_eq!(executor.worker_count(), 0);
        assert!(fired.load(Ordering::Relaxed) > 0);
    }
}
