//! Receiving side of a topic.
//!
//! Messages land in the subscription's [`DeliveryQueue`] either from local
//! publishers or from a background UDP receive loop started with
//! [`Subscription::bind_network`]. Callbacks only run when the owner drains the
//! queue via `process_one`/`process_all`, on the caller's thread.

use crate::communication::message::Message;
use crate::communication::network::{bind_reusable, is_idle_error, resolve};
use crate::communication::qos::QoSProfile;
use crate::communication::queue::DeliveryQueue;
use crate::communication::topic::Topic;
use crate::config::NetworkConfig;
use crate::core::thread::StoppableThread;
use crate::error::{CapyError, CapyResult};
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Boxed subscription callback
pub type SubscriptionCallback<M> = Box<dyn FnMut(M) + Send>;

struct NetworkReceiver {
    thread: StoppableThread,
    local_addr: SocketAddr,
}

/// Subscribes to messages of type `M` on one topic
pub struct Subscription<M> {
    node_name: String,
    topic: Arc<Topic<M>>,
    qos: QoSProfile,
    queue: Arc<DeliveryQueue<M>>,
    callback: Mutex<SubscriptionCallback<M>>,
    network_config: NetworkConfig,
    network: Mutex<Option<NetworkReceiver>>,
    destroyed: AtomicBool,
}

impl<M: Message> Subscription<M> {
    /// Create a subscription and attach its queue to `topic`
    pub(crate) fn new(
        node_name: &str,
        topic: Arc<Topic<M>>,
        qos: QoSProfile,
        callback: SubscriptionCallback<M>,
        network_config: NetworkConfig,
    ) -> Arc<Self> {
        let queue = Arc::new(DeliveryQueue::new(&qos));
        topic.add_subscriber(&queue);
        log::debug!("[{}] subscription created on '{}'", node_name, topic.name());
        Arc::new(Self {
            node_name: node_name.to_string(),
            topic,
            qos,
            queue,
            callback: Mutex::new(callback),
            network_config,
            network: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Queue a message as if it had been published. Never fails; overflow is counted.
    pub fn enqueue(&self, msg: M) -> bool {
        self.queue.enqueue(msg)
    }

    /// Pop one message, waiting up to `timeout` when given
    pub fn take(&self, timeout: Option<Duration>) -> Option<M> {
        self.queue.take(timeout)
    }

    /// Drain all queued messages without blocking, oldest first
    pub fn take_all(&self) -> Vec<M> {
        self.queue.take_all()
    }

    /// Run the callback for one queued message. Returns whether one was processed.
    ///
    /// The callback runs under the subscription's callback lock, so it must not
    /// call `process_one` or `process_all` on its own subscription.
    pub fn process_one(&self) -> bool {
        match self.queue.take(None) {
            Some(msg) => {
                let mut callback = self.callback.lock();
                (*callback)(msg);
                true
            }
            None => false,
        }
    }

    /// Run the callback for every message queued at call time. Returns how many ran.
    ///
    /// Messages arriving while the callbacks run wait for the next call.
    pub fn process_all(&self) -> usize {
        let messages = self.queue.take_all();
        if messages.is_empty() {
            return 0;
        }
        let processed = messages.len();
        let mut callback = self.callback.lock();
        for msg in messages {
            (*callback)(msg);
        }
        processed
    }

    /// Start a background loop feeding datagrams from `host:port` into the queue.
    ///
    /// `None` binds `network.bind_host` and the topic's allocated port. Binding
    /// a subscription that already listens is a no-op returning the bound address.
    pub fn bind_network(&self, host: Option<&str>, port: Option<u16>) -> CapyResult<SocketAddr> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(CapyError::Shutdown(format!(
                "subscription on '{}' was destroyed",
                self.topic.name()
            )));
        }
        let mut network = self.network.lock();
        if let Some(receiver) = network.as_ref() {
            return Ok(receiver.local_addr);
        }

        let host = host.unwrap_or(&self.network_config.bind_host);
        let addr = resolve(host, port.unwrap_or_else(|| self.topic.port()))?;
        let socket = bind_reusable(addr)?;
        socket.set_read_timeout(Some(self.network_config.socket_timeout()))?;
        let local_addr = socket.local_addr()?;

        let queue = self.queue.clone();
        let buffer_size = self.network_config.recv_buffer_size;
        let thread_name = format!("capy-recv-{}", self.topic.name().trim_start_matches('/'));
        let thread = StoppableThread::spawn(&thread_name, move |stop| {
            receive_loop(socket, queue, buffer_size, &stop);
        })?;

        log::debug!(
            "[{}] '{}' listening on {}",
            self.node_name,
            self.topic.name(),
            local_addr
        );
        *network = Some(NetworkReceiver { thread, local_addr });
        Ok(local_addr)
    }

    /// Address of the network receive socket, if bound
    pub fn network_addr(&self) -> Option<SocketAddr> {
        self.network.lock().as_ref().map(|r| r.local_addr)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn receive_count(&self) -> u64 {
        self.queue.receive_count()
    }

    pub fn drop_count(&self) -> u64 {
        self.queue.drop_count()
    }

    pub fn last_receive(&self) -> Option<Instant> {
        self.queue.last_receive()
    }

    /// Number of publishers currently attached to the topic
    pub fn publisher_count(&self) -> usize {
        self.topic.publisher_count()
    }

    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }

    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    pub fn topic(&self) -> &Arc<Topic<M>> {
        &self.topic
    }

    pub fn qos(&self) -> &QoSProfile {
        &self.qos
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Stop the receive loop, detach from the topic. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut receiver) = self.network.lock().take() {
            receiver.thread.stop(self.network_config.join_timeout());
        }
        self.topic.remove_subscriber(&self.queue);
        log::debug!(
            "[{}] subscription on '{}' destroyed",
            self.node_name,
            self.topic.name()
        );
    }
}

fn receive_loop<M: Message>(
    socket: UdpSocket,
    queue: Arc<DeliveryQueue<M>>,
    buffer_size: usize,
    stop: &AtomicBool,
) {
    let mut buf = vec![0u8; buffer_size];
    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => match M::decode(&buf[..len]) {
                Ok(msg) => {
                    queue.enqueue(msg);
                }
                Err(e) => log::trace!("dropping datagram from {}: {}", from, e),
            },
            Err(e) if is_idle_error(&e) => {}
            Err(e) => {
                log::trace!("receive error: {}", e);
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        if let Some(mut receiver) = self.network.get_mut().take() {
            receiver.thread.stop(self.network_config.join_timeout());
        }
        self.topic.remove_subscriber(&self.queue);
    }
}

impl<M> std::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node_name)
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .finish_non_exhaustive()
    }
}
