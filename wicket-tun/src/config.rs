//! TUN device configuration

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use wicket_protocol::InterfaceParameters;

use crate::error::{Error, Result};
use crate::DEFAULT_MTU;

/// Smallest MTU an IPv4 host must accept
const MIN_MTU: u16 = 68;

/// IPv4 address configuration for a TUN device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Config {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

/// IPv6 address configuration for a TUN device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Config {
    pub address: Ipv6Addr,
    pub prefix_len: u8,
}

/// Configuration for creating a TUN device
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Interface name (auto-generated by the OS if not specified)
    pub name: Option<String>,
    /// IPv4 configuration
    pub ipv4: Option<Ipv4Config>,
    /// IPv6 configurations (can have multiple)
    pub ipv6: Vec<Ipv6Config>,
    /// Maximum transmission unit
    pub mtu: u16,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            name: None,
            ipv4: None,
            ipv6: Vec::new(),
            mtu: DEFAULT_MTU,
        }
    }
}

impl TunConfig {
    /// Create a new configuration builder
    pub fn builder() -> TunConfigBuilder {
        TunConfigBuilder::new()
    }

    /// Build a configuration from negotiated interface parameters.
    ///
    /// A TUN device carries a single IPv4 address, so only the first one is
    /// used; every IPv6 address is assigned.
    pub fn from_parameters(params: &InterfaceParameters) -> Result<Self> {
        let mut builder = TunConfigBuilder::new().mtu(params.mtu.unwrap_or(DEFAULT_MTU));

        for net in &params.addresses {
            builder = match net.addr() {
                IpAddr::V4(addr) if builder.config.ipv4.is_none() => {
                    builder.ipv4(addr, net.prefix_len())
                }
                IpAddr::V4(addr) => {
                    log::warn!("Ignoring extra IPv4 address {}/{}", addr, net.prefix_len());
                    builder
                }
                IpAddr::V6(addr) => builder.ipv6(addr, net.prefix_len()),
            };
        }

        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ipv4.is_none() && self.ipv6.is_empty() {
            return Err(Error::Config(
                "at least one IPv4 or IPv6 address must be configured".into(),
            ));
        }

        if let Some(ref ipv4) = self.ipv4 {
            if ipv4.prefix_len > 32 {
                return Err(Error::InvalidPrefix(format!(
                    "IPv4 prefix length {} is invalid (max 32)",
                    ipv4.prefix_len
                )));
            }
        }

        for ipv6 in &self.ipv6 {
            if ipv6.prefix_len > 128 {
                return Err(Error::InvalidPrefix(format!(
                    "IPv6 prefix length {} is invalid (max 128)",
                    ipv6.prefix_len
                )));
            }
        }

        if self.mtu < MIN_MTU {
            return Err(Error::Config(format!(
                "MTU {} is too small (minimum {})",
                self.mtu, MIN_MTU
            )));
        }

        Ok(())
    }
}

/// Builder for TunConfig
#[derive(Debug, Default)]
pub struct TunConfigBuilder {
    config: TunConfig,
}

impl TunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Set the IPv4 address and prefix length
    pub fn ipv4(mut self, address: impl Into<Ipv4Addr>, prefix_len: u8) -> Self {
        self.config.ipv4 = Some(Ipv4Config {
            address: address.into(),
            prefix_len,
        });
        self
    }

    /// Add an IPv6 address and prefix length
    pub fn ipv6(mut self, address: impl Into<Ipv6Addr>, prefix_len: u8) -> Self {
        self.config.ipv6.push(Ipv6Config {
            address: address.into(),
            prefix_len,
        });
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<TunConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
