//! Mock transport implementations for testing
//!
//! Channel-backed stand-ins for the virtual interface and the UDP transport.
//! They behave like the real thing where the engine can tell the difference:
//! receives park until data arrives, a closed interface fails its reads, and a
//! datagram peer that went away simply stops answering.
//!
//! # Example
//!
//! ```ignore
//! use wicket_protocol::transport::mock::{MockDatagram, MockInterface};
//! use wicket_protocol::transport::{DatagramTransport, VirtualInterface};
//!
//! async fn example() {
//!     let (iface, mut host) = MockInterface::new("tun0");
//!     let (client, gateway) = MockDatagram::pair();
//!
//!     // The OS emits a packet into the tunnel
//!     host.inject(vec![0x45, 0x00, 0x00, 0x14]);
//!
//!     let mut buf = vec![0u8; 2000];
//!     let n = iface.recv(&mut buf).await.unwrap();
//!     client.send(&buf[..n]).await.unwrap();
//!
//!     // The gateway sees exactly that datagram
//!     let n = gateway.recv(&mut buf).await.unwrap();
//!     assert_eq!(&buf[..n], &[0x45, 0x00, 0x00, 0x14]);
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{DatagramTransport, VirtualInterface};
use crate::error::{Error, Result};

/// Mock virtual interface
///
/// Packets injected through the paired [`MockInterfaceHandle`] are returned by
/// [`VirtualInterface::recv`]; packets written with [`VirtualInterface::send`]
/// are delivered to the handle.
pub struct MockInterface {
    name: String,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    delivered: mpsc::UnboundedSender<Vec<u8>>,
    closed: watch::Sender<bool>,
    close_calls: Arc<AtomicUsize>,
}

/// Host side of a [`MockInterface`]
pub struct MockInterfaceHandle {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    delivered: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: watch::Receiver<bool>,
    close_calls: Arc<AtomicUsize>,
}

impl MockInterface {
    /// Create an interface together with its host-side handle
    pub fn new(name: impl Into<String>) -> (Self, MockInterfaceHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let close_calls = Arc::new(AtomicUsize::new(0));

        let iface = Self {
            name: name.into(),
            outbound: tokio::sync::Mutex::new(outbound_rx),
            delivered: delivered_tx,
            closed: closed_tx,
            close_calls: close_calls.clone(),
        };
        let handle = MockInterfaceHandle {
            outbound: outbound_tx,
            delivered: delivered_rx,
            closed: closed_rx,
            close_calls,
        };

        (iface, handle)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl VirtualInterface for MockInterface {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::Closed("interface"));
        }

        let mut outbound = self.outbound.lock().await;
        tokio::select! {
            packet = outbound.recv() => match packet {
                Some(packet) => {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    Ok(len)
                }
                // Host handle dropped: the interface is gone
                None => Err(Error::Closed("interface")),
            },
            _ = closed.wait_for(|c| *c) => Err(Error::Closed("interface")),
        }
    }

    async fn send(&self, buf: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed("interface"));
        }
        // A dropped host handle discards packets, like a device nobody reads
        let _ = self.delivered.send(buf.to_vec());
        Ok(buf.len())
    }

    fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.send_replace(true);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl MockInterfaceHandle {
    /// Queue a packet as if the OS routed it into the interface
    pub fn inject(&self, packet: Vec<u8>) {
        let _ = self.outbound.send(packet);
    }

    /// Wait for the next packet the engine wrote to the interface
    pub async fn next_delivered(&mut self) -> Option<Vec<u8>> {
        self.delivered.recv().await
    }

    /// Drain every packet delivered so far without waiting
    pub fn drain_delivered(&mut self) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        while let Ok(packet) = self.delivered.try_recv() {
            packets.push(packet);
        }
        packets
    }

    /// Check whether the interface has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Check whether the engine side has been dropped
    pub fn is_released(&self) -> bool {
        self.closed.has_changed().is_err()
    }

    /// Wait until the interface is closed
    pub async fn wait_closed(&mut self) {
        let _ = self.closed.wait_for(|c| *c).await;
    }

    /// Number of times `close` was called on the interface
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

/// One end of an in-memory datagram pipe
///
/// Datagrams sent on one end arrive at the other. Every sent datagram is also
/// recorded so tests can inspect the exact bytes put on the wire. When the
/// peer end is dropped, sends are silently discarded and receives park
/// forever, which is how an unreachable UDP gateway looks.
pub struct MockDatagram {
    peer: mpsc::UnboundedSender<Vec<u8>>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockDatagram {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = Self {
            peer: b_tx,
            inbox: tokio::sync::Mutex::new(a_rx),
            sent: Mutex::new(Vec::new()),
        };
        let b = Self {
            peer: a_tx,
            inbox: tokio::sync::Mutex::new(b_rx),
            sent: Mutex::new(Vec::new()),
        };

        (a, b)
    }

    /// All datagrams sent from this end so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Receive without waiting
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.inbox.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl DatagramTransport for MockDatagram {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => std::future::pending().await,
        }
    }

    async fn send(&self, buf: &[u8]) -> Result<usize> {
        self.sent.lock().unwrap().push(buf.to_vec());
        let _ = self.peer.send(buf.to_vec());
        Ok(buf.len())
    }
}
