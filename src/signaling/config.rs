//! Server configuration
//!
//! Everything externally supplied: listening port, the public-facing
//! address advertised in ICE candidates, allowed origins and the worker
//! pool size. Values come from the environment in production and from
//! builder calls in tests.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::error::Error;

/// Default number of pooled media engines
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Signaling server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the signaling WebSocket listens on
    pub bind_addr: SocketAddr,

    /// Origins allowed to open signaling connections (empty = allow all)
    pub allowed_origins: Vec<String>,

    /// Maximum concurrent signaling connections (0 = unlimited)
    pub max_connections: usize,

    /// Number of pooled media engines
    pub worker_pool_size: usize,

    /// Settings shared by every engine
    pub engine: EngineSettings,

    /// How long to keep running after a fatal engine failure, so logs
    /// flush before the process exits
    pub fatal_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4443".parse().unwrap(),
            allowed_origins: Vec::new(),
            max_connections: 0,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            engine: EngineSettings::default(),
            fatal_grace: Duration::from_secs(3),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment.
    ///
    /// Recognized variables: `AULA_PORT`, `AULA_ANNOUNCED_IP`,
    /// `AULA_ALLOWED_ORIGINS` (comma separated), `AULA_WORKERS`.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("AULA_PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::Config(format!("AULA_PORT: invalid port {:?}", port)))?;
            config.bind_addr.set_port(port);
        }
        if let Ok(ip) = std::env::var("AULA_ANNOUNCED_IP") {
            let ip: IpAddr = ip
                .parse()
                .map_err(|_| Error::Config(format!("AULA_ANNOUNCED_IP: invalid address {:?}", ip)))?;
            config.engine.announced_ip = ip;
        }
        if let Ok(origins) = std::env::var("AULA_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(workers) = std::env::var("AULA_WORKERS") {
            config.worker_pool_size = workers
                .parse()
                .map_err(|_| Error::Config(format!("AULA_WORKERS: invalid count {:?}", workers)))?;
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the announced address for ICE candidates
    pub fn announced_ip(mut self, ip: IpAddr) -> Self {
        self.engine.announced_ip = ip;
        self
    }

    /// Set allowed origins
    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the worker pool size
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Whether a handshake `Origin` header passes the allow-list
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
            None => false,
        }
    }
}
