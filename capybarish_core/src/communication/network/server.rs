//! Reply-to-sender UDP server.
//!
//! Field devices send fixed-size records to a well-known port. The server keys
//! each device by source IP, remembers when it was last heard from and can
//! reply to one or all of them on a second well-known port. No addresses have
//! to be configured up front.

use crate::communication::message::WireMessage;
use crate::communication::network::bind_reusable;
use crate::config::ServerConfig;
use crate::error::CapyResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Callback run for every decoded datagram with the sender's address
pub type DeviceCallback<R> = Box<dyn FnMut(&R, SocketAddr) + Send>;

/// A peer the server has heard from
#[derive(Debug, Clone)]
pub struct RemoteDevice<R> {
    pub address: IpAddr,
    /// Source port of the most recent datagram
    pub port: u16,
    pub last_seen: Instant,
    pub recv_count: u64,
    pub send_count: u64,
    pub last_message: Option<R>,
}

impl<R> RemoteDevice<R> {
    fn new(from: SocketAddr, now: Instant) -> Self {
        Self {
            address: from.ip(),
            port: from.port(),
            last_seen: now,
            recv_count: 0,
            send_count: 0,
            last_message: None,
        }
    }

    /// Active while the last datagram is strictly younger than `timeout` at `now`
    pub fn is_active_at(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < timeout
    }
}

/// Receives `R` records from devices and sends `S` records back
pub struct NetworkServer<R, S> {
    config: ServerConfig,
    socket: UdpSocket,
    devices: Mutex<HashMap<IpAddr, RemoteDevice<R>>>,
    callback: Mutex<Option<DeviceCallback<R>>>,
    total_received: AtomicU64,
    total_sent: AtomicU64,
    _send: std::marker::PhantomData<fn(&S)>,
}

impl<R, S> NetworkServer<R, S>
where
    R: WireMessage + Clone + Send,
    S: WireMessage,
{
    /// Bind a non-blocking socket on all interfaces at `config.recv_port`
    pub fn bind(config: ServerConfig) -> CapyResult<Self> {
        config.validate()?;
        let socket = bind_reusable(SocketAddr::from(([0, 0, 0, 0], config.recv_port)))?;
        socket.set_nonblocking(true)?;
        log::info!(
            "Network server listening on {} (replies to port {})",
            socket.local_addr()?,
            config.send_port
        );
        Ok(Self {
            config,
            socket,
            devices: Mutex::new(HashMap::new()),
            callback: Mutex::new(None),
            total_received: AtomicU64::new(0),
            total_sent: AtomicU64::new(0),
            _send: std::marker::PhantomData,
        })
    }

    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: FnMut(&R, SocketAddr) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(callback));
        self
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&R, SocketAddr) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Process every datagram already waiting. Never blocks.
    pub fn spin_once(&self) -> usize {
        let mut buf = vec![0u8; self.config.recv_buffer_size.max(R::WIRE_SIZE)];
        let mut processed = 0;
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if self.handle_datagram(&buf[..len], from, Instant::now()) {
                        processed += 1;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                // Windows reports ICMP port unreachable from an earlier send here
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::Interrupted) => {
                    continue
                }
                Err(e) => {
                    log::trace!("network server receive error: {}", e);
                    break;
                }
            }
        }
        processed
    }

    /// Decode one datagram, update its device and run the callback
    pub(crate) fn handle_datagram(&self, data: &[u8], from: SocketAddr, now: Instant) -> bool {
        if data.len() < R::WIRE_SIZE {
            log::trace!(
                "ignoring {}-byte datagram from {} (need {})",
                data.len(),
                from,
                R::WIRE_SIZE
            );
            return false;
        }
        let msg = match R::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::trace!("ignoring undecodable datagram from {}: {}", from, e);
                return false;
            }
        };

        {
            let mut devices = self.devices.lock();
            let device = devices.entry(from.ip()).or_insert_with(|| {
                log::debug!("New device {}", from);
                RemoteDevice::new(from, now)
            });
            device.port = from.port();
            device.last_seen = now;
            device.recv_count += 1;
            device.last_message = Some(msg.clone());
        }
        self.total_received.fetch_add(1, Ordering::Relaxed);

        if let Some(callback) = self.callback.lock().as_mut() {
            callback(&msg, from);
        }
        true
    }

    /// Snapshot of every device ever heard from
    pub fn devices(&self) -> HashMap<IpAddr, RemoteDevice<R>> {
        self.devices.lock().clone()
    }

    pub fn device(&self, address: IpAddr) -> Option<RemoteDevice<R>> {
        self.devices.lock().get(&address).cloned()
    }

    pub fn active_devices(&self) -> HashMap<IpAddr, RemoteDevice<R>> {
        self.active_devices_at(Instant::now())
    }

    /// Devices whose last datagram is younger than the configured timeout at `now`
    pub fn active_devices_at(&self, now: Instant) -> HashMap<IpAddr, RemoteDevice<R>> {
        let timeout = self.config.timeout();
        self.devices
            .lock()
            .iter()
            .filter(|(_, device)| device.is_active_at(now, timeout))
            .map(|(ip, device)| (*ip, device.clone()))
            .collect()
    }

    /// Send `msg` to `(address, send_port)`. Returns whether the send succeeded.
    pub fn send_to(&self, address: IpAddr, msg: &S) -> bool {
        self.send_encoded(address, &msg.encode())
    }

    fn send_encoded(&self, address: IpAddr, payload: &[u8]) -> bool {
        let target = SocketAddr::new(address, self.config.send_port);
        match self.socket.send_to(payload, target) {
            Ok(_) => {
                if let Some(device) = self.devices.lock().get_mut(&address) {
                    device.send_count += 1;
                }
                self.total_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                log::trace!("send to {} failed: {}", target, e);
                false
            }
        }
    }

    /// Send `msg` to every (active) device. Returns the number of successful sends.
    pub fn send_to_all(&self, msg: &S, active_only: bool) -> usize {
        self.send_to_all_at(msg, active_only, Instant::now())
    }

    /// [`send_to_all`](Self::send_to_all) with activity judged at `now`
    pub fn send_to_all_at(&self, msg: &S, active_only: bool, now: Instant) -> usize {
        let targets: Vec<IpAddr> = if active_only {
            self.active_devices_at(now).into_keys().collect()
        } else {
            self.devices.lock().keys().copied().collect()
        };
        let payload = msg.encode();
        targets
            .into_iter()
            .filter(|address| self.send_encoded(*address, &payload))
            .count()
    }

    pub fn total_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> CapyResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<R, S> std::fmt::Debug for NetworkServer<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkServer")
            .field("config", &self.config)
            .field("devices", &self.devices.lock().len())
            .field("total_received", &self.total_received.load(Ordering::Relaxed))
            .field("total_sent", &self.total_sent.load(Ordering::Relaxed))
            .finish()
    }
}
