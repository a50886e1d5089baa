//! Transport traits for the two ends of the relay
//!
//! The relay moves packets between two endpoints:
//! - [`VirtualInterface`]: the local virtual network interface (raw IP packets
//!   to and from the OS)
//! - [`DatagramTransport`]: the UDP channel to the gateway, connected to a
//!   single remote address
//!
//! Both are async and awaited side by side with `tokio::select!`, so their
//! receive methods must be cancel-safe.
//!
//! # Mock Implementations
//!
//! The [`mock`] module provides channel-backed implementations for tests:
//! - [`mock::MockInterface`]: a virtual interface with packet injection and capture
//! - [`mock::MockDatagram`]: one end of an in-memory datagram pipe

pub mod mock;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::Result;

/// Handle to the local virtual network interface
///
/// Handles are produced by the host environment, never by the engine. The
/// engine only reads, writes and eventually closes them.
#[async_trait]
pub trait VirtualInterface: Send + Sync {
    /// Receive one outgoing IP packet from the OS
    ///
    /// # Cancel Safety
    ///
    /// Must be cancel-safe: if the future is dropped, no packet is lost.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Deliver one incoming IP packet to the OS
    async fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Release the interface. Subsequent reads and writes fail.
    fn close(&self) -> Result<()>;

    /// Interface name for logging
    fn name(&self) -> &str;
}

/// Connectionless datagram channel bound to one remote address
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Receive one datagram from the remote peer
    ///
    /// # Cancel Safety
    ///
    /// Must be cancel-safe: if the future is dropped, no datagram is lost.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Send one datagram to the remote peer
    async fn send(&self, buf: &[u8]) -> Result<usize>;
}

#[async_trait]
impl DatagramTransport for UdpSocket {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(UdpSocket::recv(self, buf).await?)
    }

    async fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(UdpSocket::send(self, buf).await?)
    }
}
