//! Wicket Engine
//!
//! The client side of the wicket tunnel: handshake with the gateway,
//! negotiation of the virtual interface, packet relay with keepalive and
//! liveness policy, and the supervisor that starts, replaces and tears down
//! connections.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Supervisor                            │
//! │   connect() / disconnect()        events ──► EventHandler    │
//! │   ┌──────────────────┐            ┌──────────────────────┐   │
//! │   │ connecting slot  │──────────► │ established slot     │   │
//! │   └────────┬─────────┘ establish  └──────────────────────┘   │
//! └────────────┼─────────────────────────────────────────────────┘
//!              ▼ one tokio task per connection
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Connection: resolve ─► [socket ─► handshake ─► negotiate ─►  │
//! │             relay] ─► delay ─► retry                         │
//! └──────────────────────────────────────────────────────────────┘
//!              │                                │
//!              ▼                                ▼
//!   DatagramTransport (UDP)        VirtualInterface (host provider)
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod handshake;
pub mod negotiator;
pub mod provider;
pub mod relay;
pub mod socket;
pub mod stop;
pub mod supervisor;

pub use config::{Config, SharedSecret, SocketConfig, TimingConfig, TunnelConfig};
pub use error::{Error, Result};
pub use event::{ChannelEventHandler, EventHandler, LoggingEventHandler, VpnEvent, VpnState};
pub use provider::{AppPolicy, ConfigureHandle, InterfaceProvider, InterfaceRequest, ProxyDescriptor};
pub use relay::RelayStats;
pub use socket::{protector_for, NoProtection, SocketProtector};
pub use supervisor::{Supervisor, SupervisorBuilder};

#[cfg(target_os = "linux")]
pub use socket::FwmarkProtector;
