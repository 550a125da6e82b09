//! Settings types. Serialized as camelCase JSON; every field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatpushSettings {
    /// HTTP / WebSocket server.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ChatpushSettings {
    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Outbound queue length per connection. A full queue counts as a failed send.
    pub send_queue_capacity: usize,
    /// Protocol ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without any client activity.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.send_queue_capacity == 0 {
            return Err(SettingsError::invalid("sendQueueCapacity", "must be at least 1"));
        }
        if self.max_message_size == 0 {
            return Err(SettingsError::invalid(
                "maxMessageSize",
                "must be at least 1 byte or every inbound frame is refused",
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SettingsError::invalid(
                "heartbeatIntervalSecs",
                "must be at least 1",
            ));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(SettingsError::invalid(
                "heartbeatTimeoutSecs",
                format!(
                    "{} is shorter than heartbeatIntervalSecs ({})",
                    self.heartbeat_timeout_secs, self.heartbeat_interval_secs
                ),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` still wins when set).
    pub level: String,
    /// JSON lines on stdout; `false` gives human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
        }
    }
}
