//! TUN device wrapper
//!
//! A thin layer over `tun-rs` that exposes the device as a
//! [`VirtualInterface`] for the relay.
//!
//! ```rust,ignore
//! let config = TunConfig::builder()
//!     .ipv4(Ipv4Addr::new(10, 0, 0, 2), 24)
//!     .mtu(1400)
//!     .build()?;
//!
//! let device = TunDevice::create(config).await?;
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wicket_protocol::VirtualInterface;

use crate::config::TunConfig;
use crate::error::{Error, Result};

/// TUN device backed by `tun_rs::AsyncDevice`
///
/// Closing the device releases the descriptor, which removes the kernel
/// interface once in-flight reads and writes return. Reads and writes fail
/// from then on.
pub struct TunDevice {
    inner: Mutex<Option<Arc<tun_rs::AsyncDevice>>>,
    name: String,
    mtu: u16,
}

impl TunDevice {
    /// Create a new TUN device with the given configuration
    ///
    /// `tun-rs` assigns the addresses, sets the MTU and brings the interface up.
    ///
    /// # Platform Requirements
    ///
    /// - **Linux**: Requires root or `CAP_NET_ADMIN` capability
    /// - **macOS**: Requires root privileges
    pub async fn create(config: TunConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = tun_rs::DeviceBuilder::new();

        if let Some(ref name) = config.name {
            builder = builder.name(name);
        }

        if let Some(ref ipv4) = config.ipv4 {
            builder = builder.ipv4(ipv4.address, ipv4.prefix_len, None::<std::net::Ipv4Addr>);
        }

        for ipv6 in &config.ipv6 {
            builder = builder.ipv6(ipv6.address, ipv6.prefix_len);
        }

        builder = builder.mtu(config.mtu);

        let device = builder
            .build_async()
            .map_err(|e| Error::DeviceCreation(e.to_string()))?;

        let name = device
            .name()
            .map_err(|e| Error::DeviceCreation(e.to_string()))?;

        log::info!("Created TUN device: {} (MTU: {})", name, config.mtu);

        Ok(Self {
            inner: Mutex::new(Some(Arc::new(device))),
            name,
            mtu: config.mtu,
        })
    }

    /// Get the device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the MTU
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Check whether the device has been closed
    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<tun_rs::AsyncDevice>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn device(&self) -> wicket_protocol::Result<Arc<tun_rs::AsyncDevice>> {
        self.slot()
            .clone()
            .ok_or(wicket_protocol::Error::Closed("interface"))
    }
}

#[async_trait]
impl VirtualInterface for TunDevice {
    async fn recv(&self, buf: &mut [u8]) -> wicket_protocol::Result<usize> {
        let device = self.device()?;
        Ok(device.recv(buf).await?)
    }

    async fn send(&self, buf: &[u8]) -> wicket_protocol::Result<usize> {
        let device = self.device()?;
        Ok(device.send(buf).await?)
    }

    fn close(&self) -> wicket_protocol::Result<()> {
        if self.slot().take().is_some() {
            log::info!("Closed TUN device: {}", self.name);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for TunDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunDevice")
            .field("name", &self.name)
            .field("mtu", &self.mtu)
            .field("closed", &self.is_closed())
            .finish()
    }
}
