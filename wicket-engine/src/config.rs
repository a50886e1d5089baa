//! Configuration types for the tunnel engine

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
///
/// # Example Configuration
///
/// ```toml
/// [tunnel]
/// server = "198.51.100.1"
/// port = 8000
/// secret = "test"
/// allow = true
/// applications = []
///
/// [timing]
/// keepalive_interval_secs = 15
/// receive_timeout_secs = 20
///
/// [socket]
/// fwmark = 51820
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway and tunnel settings
    pub tunnel: TunnelConfig,

    /// Timers and retry limits
    #[serde(default)]
    pub timing: TimingConfig,

    /// Tunnel socket options
    #[serde(default)]
    pub socket: SocketConfig,
}

impl Config {
    /// Create a configuration with default timing and socket settings
    pub fn new(tunnel: TunnelConfig) -> Self {
        Self {
            tunnel,
            timing: TimingConfig::default(),
            socket: SocketConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tunnel.validate()?;
        self.timing.validate()
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# Wicket tunnel configuration

[tunnel]
# Gateway host name or IP address (required)
server = "198.51.100.1"

# Gateway UDP port (required)
port = 8000

# Shared secret sent in the handshake (required)
secret = "test"

# HTTP proxy announced to the host with the interface (optional)
# Host and port must be set together.
# proxy_host = "127.0.0.1"
# proxy_port = 3128

# Application identifiers routed through (allow = true) or around
# (allow = false) the tunnel
allow = true
applications = []

# Timers and retry limits (optional, defaults shown)
[timing]
idle_interval_ms = 100
keepalive_interval_secs = 15
receive_timeout_secs = 20
handshake_attempts = 50
handshake_sends = 3
reconnect_delay_secs = 3
max_attempts = 10

# Tunnel socket options (optional)
[socket]
# Linux only: SO_MARK applied to the tunnel socket so policy routing can
# keep tunnel traffic off the tunnel
# fwmark = 51820
"#
        .to_string()
    }
}

/// Gateway and tunnel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Gateway host name or address
    pub server: String,

    /// Gateway UDP port
    pub port: u16,

    /// Shared secret presented in the handshake
    pub secret: SharedSecret,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,

    /// Whether `applications` lists the apps allowed into the tunnel (true)
    /// or the apps kept out of it (false)
    #[serde(default = "default_true")]
    pub allow: bool,

    #[serde(default)]
    pub applications: BTreeSet<String>,
}

impl TunnelConfig {
    pub fn new(server: impl Into<String>, port: u16, secret: impl Into<SharedSecret>) -> Self {
        Self {
            server: server.into(),
            port,
            secret: secret.into(),
            proxy_host: None,
            proxy_port: None,
            allow: true,
            applications: BTreeSet::new(),
        }
    }

    /// Announce an HTTP proxy with the interface
    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy_host = Some(host.into());
        self.proxy_port = Some(port);
        self
    }

    /// Restrict the tunnel to (allow) or exclude it from (deny) the given apps
    pub fn with_applications<I, S>(mut self, allow: bool, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = allow;
        self.applications = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the tunnel section
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(Error::Config("tunnel.server is required".into()));
        }

        if self.port == 0 {
            return Err(Error::Config("tunnel.port must be non-zero".into()));
        }

        if self.secret.is_empty() {
            return Err(Error::Config("tunnel.secret is required".into()));
        }

        let has_host = self.proxy_host.as_deref().is_some_and(|h| !h.is_empty());
        let has_port = self.proxy_port.is_some_and(|p| p != 0);
        if has_host != has_port {
            return Err(Error::Config(
                "tunnel.proxy_host and tunnel.proxy_port must be set together".into(),
            ));
        }

        Ok(())
    }
}

/// Shared secret bytes. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SharedSecret {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SharedSecret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Timers and retry limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Handshake wait slice and relay check period
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Send a keepalive burst after this long without sending
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Fail the relay after this long without receiving
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,

    #[serde(default = "default_handshake_attempts")]
    pub handshake_attempts: u32,

    /// Copies of each control message put on the wire
    #[serde(default = "default_handshake_sends")]
    pub handshake_sends: u32,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Consecutive failed cycles before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: default_idle_interval_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            receive_timeout_secs: default_receive_timeout_secs(),
            handshake_attempts: default_handshake_attempts(),
            handshake_sends: default_handshake_sends(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl TimingConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Validate the timing section
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("idle_interval_ms", self.idle_interval_ms),
            ("keepalive_interval_secs", self.keepalive_interval_secs),
            ("receive_timeout_secs", self.receive_timeout_secs),
            ("handshake_attempts", u64::from(self.handshake_attempts)),
            ("handshake_sends", u64::from(self.handshake_sends)),
            ("reconnect_delay_secs", self.reconnect_delay_secs),
            ("max_attempts", u64::from(self.max_attempts)),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("timing.{} must be non-zero", name)));
        }

        if self.keepalive_interval_secs >= self.receive_timeout_secs {
            return Err(Error::Config(format!(
                "timing.keepalive_interval_secs ({}) must be less than timing.receive_timeout_secs ({})",
                self.keepalive_interval_secs, self.receive_timeout_secs
            )));
        }

        Ok(())
    }
}

/// Tunnel socket options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// `SO_MARK` for the tunnel socket (Linux only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwmark: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_idle_interval_ms() -> u64 {
    100
}

fn default_keepalive_interval_secs() -> u64 {
    15
}

fn default_receive_timeout_secs() -> u64 {
    20
}

fn default_handshake_attempts() -> u32 {
    50
}

fn default_handshake_sends() -> u32 {
    3
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_max_attempts() -> u32 {
    10
}
