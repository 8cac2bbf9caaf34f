//! Configuration structs with sensible defaults and RON persistence.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use nebula_net::{ConnectorConfig, ListenerConfig, SessionConfig, SocketConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration shared by the server and the dummy client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listening side.
    pub server: ServerSection,
    /// Dialing side (dummy client).
    pub client: ClientSection,
    /// Game room scheduling.
    pub room: RoomSection,
    /// Debug/development settings.
    pub debug: DebugSection,
}

/// Server endpoint and per-session limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    /// Interface to bind, as an IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Kernel accept backlog.
    pub backlog: u32,
    /// Accept operations kept outstanding at once.
    pub accept_pool: usize,
    /// Receive buffer capacity per session, in bytes.
    pub recv_buffer_size: usize,
    /// Largest frame accepted from a client, in bytes.
    pub max_frame_size: usize,
    /// Disable Nagle's algorithm on accepted sockets.
    pub tcp_nodelay: bool,
}

/// Dummy client target and load shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSection {
    /// Server host name or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Number of concurrent sessions to open.
    pub sessions: usize,
    /// Delay between packets sent by each session, in milliseconds.
    pub send_interval_ms: u64,
    /// Receive buffer capacity per session, in bytes.
    pub recv_buffer_size: usize,
}

/// Game room scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoomSection {
    /// Ticks between two flushes of pending broadcasts.
    pub flush_interval_ticks: u64,
    /// Period of the timer driver loop, in milliseconds.
    pub timer_tick_ms: u64,
    /// Size of each send chunk, in bytes.
    pub send_chunk_size: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugSection {
    /// Log filter (e.g., "debug", "info,nebula_net=trace").
    pub log_level: String,
    /// Also write JSON logs under the config directory.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for ServerSection {
    fn default() -> Self {
        let listener = ListenerConfig::default();
        let session = SessionConfig::default();
        Self {
            host: listener.bind_addr.ip().to_string(),
            port: listener.bind_addr.port(),
            backlog: listener.backlog,
            accept_pool: listener.accept_pool,
            recv_buffer_size: session.recv_buffer_size,
            max_frame_size: session.max_frame_size,
            tcp_nodelay: session.socket.tcp_nodelay,
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
            sessions: 10,
            send_interval_ms: 250,
            recv_buffer_size: SessionConfig::default().recv_buffer_size,
        }
    }
}

impl Default for RoomSection {
    fn default() -> Self {
        Self {
            flush_interval_ticks: 250,
            timer_tick_ms: 10,
            send_chunk_size: nebula_net::SendBufferAllocator::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for DebugSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

// --- Conversions into engine configuration ---

impl ServerSection {
    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Listener configuration for this section.
    pub fn listener_config(&self) -> Result<ListenerConfig, ConfigError> {
        Ok(ListenerConfig {
            bind_addr: self.bind_addr()?,
            backlog: self.backlog,
            accept_pool: self.accept_pool,
            session: SessionConfig {
                recv_buffer_size: self.recv_buffer_size,
                max_frame_size: self.max_frame_size,
                socket: SocketConfig {
                    tcp_nodelay: self.tcp_nodelay,
                    ..SocketConfig::default()
                },
            },
        })
    }
}

impl ClientSection {
    /// Connector configuration for this section.
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            session: SessionConfig {
                recv_buffer_size: self.recv_buffer_size,
                ..SessionConfig::default()
            },
        }
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms.max(1))
    }
}

impl RoomSection {
    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms.max(1))
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Returns `Some(new_config)` if the file on disk differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
