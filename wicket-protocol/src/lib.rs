//! Wicket Protocol
//!
//! The wire format of the wicket tunnel: a minimal plaintext control protocol
//! carried over UDP next to raw IP packets.
//!
//! # Datagrams
//!
//! ```text
//! handshake request   [0x00][shared secret bytes]        sent 3x
//! handshake response  [0x00][ASCII parameter string]
//! keepalive           [0x00]                             sent 3x
//! data                [first byte != 0][IP packet ...]
//! ```
//!
//! Control and data datagrams are told apart by the leading byte alone. A live
//! IPv4 or IPv6 packet never starts with zero, so no further framing exists.
//!
//! # Parameter string
//!
//! The handshake response carries the interface parameters as space-separated
//! fields, each `key,value[,value]`:
//!
//! ```text
//! m,1400 a,10.0.0.2,24 r,0.0.0.0,0 d,8.8.8.8 s,corp.example
//! ```
//!
//! See [`InterfaceParameters`] for the grammar.

mod error;
mod params;
pub mod transport;
pub mod wire;

pub use error::{Error, Result};
pub use params::InterfaceParameters;
pub use transport::{DatagramTransport, VirtualInterface};
pub use wire::Datagram;

/// Leading byte of every control message
pub const CONTROL_MARKER: u8 = 0x00;

/// Largest packet relayed in either direction.
///
/// The interface MTU is exchanged as a signed 16-bit value, which caps the
/// packet size.
pub const MAX_PACKET_SIZE: usize = i16::MAX as usize;

/// Receive buffer size used while waiting for the handshake response
pub const HANDSHAKE_BUFFER_SIZE: usize = 1024;
