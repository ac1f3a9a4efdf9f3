//! Client session configuration

use std::time::Duration;

/// How many reconnection attempts before the viewer gives up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Configuration shared by broadcaster and viewer sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Signaling server URL, e.g. `ws://lectures.example:4443`
    pub server_url: String,

    /// Reconnection attempts before entering the terminal failure state
    pub max_reconnect_attempts: u32,

    /// Base delay between reconnection attempts; grows linearly with the
    /// attempt number
    pub reconnect_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:4443".into(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_backoff: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    /// Create a config pointing at a server
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Set the reconnect backoff base delay
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Set the reconnection attempt cap
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}
