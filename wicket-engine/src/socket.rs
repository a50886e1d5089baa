//! Tunnel socket creation and protection
//!
//! Once the virtual interface is up, the host may route everything through it,
//! including the datagrams of the tunnel itself. A [`SocketProtector`] marks
//! the tunnel socket so the host keeps it on the physical network.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;

use crate::config::SocketConfig;
use crate::error::{Error, Result};

/// Excludes a socket from the tunnel
pub trait SocketProtector: Send + Sync {
    fn protect(&self, socket: &Socket) -> io::Result<()>;
}

/// Leaves sockets untouched
///
/// Suitable when the tunnel routes never cover the gateway address.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProtection;

impl SocketProtector for NoProtection {
    fn protect(&self, _socket: &Socket) -> io::Result<()> {
        Ok(())
    }
}

/// Sets `SO_MARK` so policy routing can steer tunnel traffic around the tunnel
///
/// Needs `CAP_NET_ADMIN`.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy)]
pub struct FwmarkProtector {
    mark: u32,
}

#[cfg(target_os = "linux")]
impl FwmarkProtector {
    pub fn new(mark: u32) -> Self {
        Self { mark }
    }

    pub fn mark(&self) -> u32 {
        self.mark
    }
}

#[cfg(target_os = "linux")]
impl SocketProtector for FwmarkProtector {
    fn protect(&self, socket: &Socket) -> io::Result<()> {
        socket.set_mark(self.mark)
    }
}

/// Pick the protector described by the socket configuration
pub fn protector_for(config: &SocketConfig) -> Result<Arc<dyn SocketProtector>> {
    match config.fwmark {
        None => Ok(Arc::new(NoProtection)),
        #[cfg(target_os = "linux")]
        Some(mark) => Ok(Arc::new(FwmarkProtector::new(mark))),
        #[cfg(not(target_os = "linux"))]
        Some(_) => Err(Error::Config(
            "socket.fwmark is only supported on Linux".into(),
        )),
    }
}

/// Open a UDP socket, protect it and connect it to the gateway
///
/// Must be called from within a tokio runtime.
pub fn open_transport(server: SocketAddr, protector: &dyn SocketProtector) -> Result<UdpSocket> {
    let domain = if server.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    protector.protect(&socket).map_err(Error::Protect)?;

    socket.set_nonblocking(true)?;
    socket.connect(&SockAddr::from(server))?;

    // Convert to tokio UdpSocket
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}
