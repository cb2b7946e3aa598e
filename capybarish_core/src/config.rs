//! Runtime configuration for Capybarish
//!
//! Settings can be loaded from TOML or YAML. Every field has a default, so a
//! config file only needs to name the values it changes.
//!
//! TOML example:
//! ```toml
//! [network]
//! base_port = 7100
//! socket_timeout_ms = 50
//!
//! [executor]
//! idle_sleep_ms = 2
//!
//! [server]
//! recv_port = 6666
//! send_port = 6667
//! timeout_ms = 2000
//! ```
//!
//! # Config File Search Paths
//! 1. `./capybarish.toml` or `./capybarish.yaml`
//! 2. `~/.capybarish/config.toml` or `~/.capybarish/config.yaml`
//! 3. `/etc/capybarish/config.toml` or `/etc/capybarish/config.yaml`

use crate::error::{CapyError, CapyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for topic port bookkeeping and subscription receive sockets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// First port handed out by the topic registry
    pub base_port: u16,
    /// Interface a subscription binds when no host is given
    pub bind_host: String,
    /// Largest datagram a receive thread accepts
    pub recv_buffer_size: usize,
    /// Read timeout of background receive sockets (bounds stop latency)
    pub socket_timeout_ms: u64,
    /// How long `destroy()` waits for a receive thread before abandoning it
    pub join_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_port: 7000,
            bind_host: "0.0.0.0".to_string(),
            recv_buffer_size: 4096,
            socket_timeout_ms: 100,
            join_timeout_ms: 1000,
        }
    }
}

impl NetworkConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Settings for executor polling loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Sleep between polling passes
    pub idle_sleep_ms: u64,
    /// Finer-grained override of `idle_sleep_ms`
    pub idle_sleep_us: Option<u64>,
    /// How long `shutdown()` waits for each worker thread
    pub join_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: 1,
            idle_sleep_us: None,
            join_timeout_ms: 1000,
        }
    }
}

impl ExecutorConfig {
    pub fn idle_sleep(&self) -> Duration {
        match self.idle_sleep_us {
            Some(us) => Duration::from_micros(us),
            None => Duration::from_millis(self.idle_sleep_ms),
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Settings for the reply-to-sender [`NetworkServer`](crate::communication::network::NetworkServer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the server listens on (all interfaces)
    pub recv_port: u16,
    /// Port replies are addressed to on each peer
    pub send_port: u16,
    /// A device is active while its last datagram is younger than this
    pub timeout_ms: u64,
    pub recv_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            recv_port: 6666,
            send_port: 6667,
            timeout_ms: 2000,
            recv_buffer_size: 4096,
        }
    }
}

impl ServerConfig {
    pub fn new(recv_port: u16, send_port: u16) -> Self {
        Self {
            recv_port,
            send_port,
            ..Self::default()
        }
    }

    /// Set the activity timeout, rounded up to whole milliseconds
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
        self.timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> CapyResult<()> {
        if self.timeout_ms == 0 {
            return Err(CapyError::config("server.timeout_ms must be positive"));
        }
        if self.recv_buffer_size == 0 {
            return Err(CapyError::config("server.recv_buffer_size must be positive"));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapyConfig {
    pub network: NetworkConfig,
    pub executor: ExecutorConfig,
    pub server: ServerConfig,
}

impl CapyConfig {
    /// Load from a specific file; the format follows the extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> CapyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            other => {
                return Err(CapyError::config(format!(
                    "Unsupported config extension {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CapyResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> CapyResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CapyResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CapyError::config(format!("TOML serialization error: {}", e)))
    }

    /// Load the first config file found in the standard search paths, or defaults
    pub fn find_and_load() -> CapyResult<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }
        log::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("capybarish.toml"),
            PathBuf::from("capybarish.yaml"),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".capybarish").join("config.toml"));
            paths.push(home.join(".capybarish").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/capybarish/config.toml"));
        paths.push(PathBuf::from("/etc/capybarish/config.yaml"));
        paths
    }

    pub fn validate(&self) -> CapyResult<()> {
        if self.network.recv_buffer_size == 0 {
            return Err(CapyError::config("network.recv_buffer_size must be positive"));
        }
        if self.network.socket_timeout_ms == 0 {
            // A zero read timeout would make receive sockets block forever
            return Err(CapyError::config("network.socket_timeout_ms must be positive"));
        }
        self.server.validate()
    }
}
