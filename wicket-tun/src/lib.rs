//! Host TUN device management for the wicket tunnel
//!
//! This crate turns negotiated [`InterfaceParameters`] into a real virtual
//! interface on the host:
//!
//! - **TUN Device**: created through `tun-rs`, exposed to the engine as a
//!   [`VirtualInterface`]
//! - **Route Management**: negotiated routes installed through `net-route` and
//!   removed again when the tunnel goes away
//!
//! # Platform Requirements
//!
//! ## Linux
//! - Root privileges or `CAP_NET_ADMIN` capability
//! - TUN kernel module loaded (`modprobe tun`)
//!
//! ## macOS
//! - Root privileges
//!
//! # Example
//!
//! ```ignore
//! use wicket_protocol::InterfaceParameters;
//! use wicket_tun::{TunConfig, TunDevice};
//!
//! async fn example() -> wicket_tun::Result<()> {
//!     let params = InterfaceParameters::parse("m,1400 a,10.0.0.2,24").unwrap();
//!     let config = TunConfig::from_parameters(&params)?;
//!
//!     let device = TunDevice::create(config).await?;
//!     println!("created {}", device.name());
//!     Ok(())
//! }
//! ```
//!
//! [`InterfaceParameters`]: wicket_protocol::InterfaceParameters
//! [`VirtualInterface`]: wicket_protocol::VirtualInterface

pub mod config;
pub mod device;
pub mod error;
pub mod route;

pub use config::{TunConfig, TunConfigBuilder};
pub use device::TunDevice;
pub use error::{Error, Result};
pub use route::{AppliedRoutes, Route, RouteManager};

/// MTU used when the gateway does not push one
pub const DEFAULT_MTU: u16 = 1400;
