//! Sending side of a topic.
//!
//! Local delivery goes through [`Topic::publish`]. When remote endpoints are
//! configured the message is additionally encoded once and sent as a single UDP
//! datagram to each of them; send failures are traced and otherwise ignored.

use crate::communication::message::Message;
use crate::communication::network::{egress_socket_for, resolve};
use crate::communication::qos::QoSProfile;
use crate::communication::topic::Topic;
use crate::error::{CapyError, CapyResult};
use parking_lot::Mutex;
use std::any::Any;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct Egress {
    socket: Option<UdpSocket>,
    endpoints: Vec<SocketAddr>,
}

/// Publishes messages of type `M` on one topic
pub struct Publisher<M> {
    node_name: String,
    topic: Arc<Topic<M>>,
    qos: QoSProfile,
    egress: Mutex<Egress>,
    publish_count: AtomicU64,
    last_publish: Mutex<Option<Instant>>,
    destroyed: AtomicBool,
}

impl<M: Message> Publisher<M> {
    /// Create a publisher and register it with `topic`
    pub(crate) fn new(node_name: &str, topic: Arc<Topic<M>>, qos: QoSProfile) -> Arc<Self> {
        let publisher = Arc::new(Self {
            node_name: node_name.to_string(),
            topic,
            qos,
            egress: Mutex::new(Egress::default()),
            publish_count: AtomicU64::new(0),
            last_publish: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });
        publisher.topic.add_publisher(&publisher);
        log::debug!(
            "[{}] publisher created on '{}'",
            publisher.node_name,
            publisher.topic.name()
        );
        publisher
    }

    /// Publish to local subscribers and any remote endpoints.
    ///
    /// Returns the number of local subscriptions that accepted the message.
    pub fn publish(&self, msg: M) -> CapyResult<usize> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(CapyError::Shutdown(format!(
                "publisher on '{}' was destroyed",
                self.topic.name()
            )));
        }

        let payload = {
            let egress = self.egress.lock();
            if egress.endpoints.is_empty() {
                None
            } else {
                Some(msg.encode())
            }
        };

        let delivered = self.topic.publish(msg)?;
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        *self.last_publish.lock() = Some(Instant::now());

        if let Some(payload) = payload {
            self.send_remote(&payload);
        }
        Ok(delivered)
    }

    /// Publish a type-erased payload, failing fast if it is not an `M`
    pub fn publish_any(&self, msg: Box<dyn Any + Send>) -> CapyResult<usize> {
        match msg.downcast::<M>() {
            Ok(msg) => self.publish(*msg),
            Err(_) => Err(CapyError::type_mismatch(
                std::any::type_name::<M>(),
                "a payload of another type",
            )),
        }
    }

    fn send_remote(&self, payload: &[u8]) {
        let egress = self.egress.lock();
        let Some(socket) = egress.socket.as_ref() else {
            return;
        };
        for endpoint in &egress.endpoints {
            if let Err(e) = socket.send_to(payload, endpoint) {
                log::trace!(
                    "[{}] send to {} on '{}' failed: {}",
                    self.node_name,
                    endpoint,
                    self.topic.name(),
                    e
                );
            }
        }
    }

    /// Also send every published message to `host:port`
    pub fn add_remote_endpoint(&self, host: &str, port: u16) -> CapyResult<SocketAddr> {
        let addr = resolve(host, port)?;
        let mut egress = self.egress.lock();
        if egress.socket.is_none() {
            egress.socket = Some(egress_socket_for(&addr)?);
        }
        if !egress.endpoints.contains(&addr) {
            egress.endpoints.push(addr);
        }
        log::debug!(
            "[{}] '{}' now also publishes to {}",
            self.node_name,
            self.topic.name(),
            addr
        );
        Ok(addr)
    }

    pub fn remote_endpoints(&self) -> Vec<SocketAddr> {
        self.egress.lock().endpoints.clone()
    }

    /// Number of local subscriptions currently attached to the topic
    pub fn subscription_count(&self) -> usize {
        self.topic.subscriber_count()
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    pub fn last_publish(&self) -> Option<Instant> {
        *self.last_publish.lock()
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

    /// Deregister from the topic and close the egress socket. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.topic.remove_publisher(self as *const Self);
        let mut egress = self.egress.lock();
        egress.socket = None;
        egress.endpoints.clear();
        log::debug!(
            "[{}] publisher on '{}' destroyed",
            self.node_name,
            self.topic.name()
        );
    }
}

impl<M> Drop for Publisher<M> {
    fn drop(&mut self) {
        // Registration is weak and already dead here; the topic prunes it lazily.
        self.destroyed.store(true, Ordering::Release);
    }
}

impl<M> std::fmt::Debug for Publisher<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("node", &self.node_name)
            .field("topic", &self.topic)
            .field("publish_count", &self.publish_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::queue::DeliveryQueue;

    fn topic() -> Arc<Topic<u32>> {
        Arc::new(Topic::new("/pub", QoSProfile::default(), 7000))
    }

    #[test]
    fn test_publish_counts_and_registration() {
        let topic = topic();
        let queue = Arc::new(DeliveryQueue::new(&QoSProfile::default()));
        topic.add_subscriber(&queue);

        let publisher = Publisher::new("talker", topic.clone(), QoSProfile::default());
        assert_eq!(topic.publisher_count(), 1);
        assert_eq!(publisher.subscription_count(), 1);
        assert_eq!(publisher.publish(7).unwrap(), 1);
        assert_eq!(publisher.publish_count(), 1);
        assert!(publisher.last_publish().is_some());
        assert_eq!(queue.take(None), Some(7));
    }

    #[test]
    fn test_publish_any_checks_type() {
        let publisher = Publisher::new("talker", topic(), QoSProfile::default());
        assert!(publisher.publish_any(Box::new(3u32)).is_ok());
        let err = publisher.publish_any(Box::new("three")).unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(publisher.publish_count(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let topic = topic();
        let publisher = Publisher::new("talker", topic.clone(), QoSProfile::default());
        publisher.destroy();
        publisher.destroy();
        assert_eq!(topic.publisher_count(), 0);
        assert!(publisher.publish(1).unwrap_err().is_shutdown());
    }

    #[test]
    fn test_drop_releases_registration() {
        let topic = topic();
        let publisher = Publisher::new("talker", topic.clone(), QoSProfile::default());
        drop(publisher);
        assert_eq!(topic.publisher_count(), 0);
    }

    #[test]
    fn test_remote_endpoint_receives_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let publisher = Publisher::new("talker", topic(), QoSProfile::default());
        publisher.add_remote_endpoint("127.0.0.1", port).unwrap();
        publisher.add_remote_endpoint("127.0.0.1", port).unwrap();
        assert_eq!(publisher.remote_endpoints().len(), 1);

        publisher.publish(0xdead_beef).unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(len, 4);
        assert_eq!(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 0xdead_beef);
    }
}
