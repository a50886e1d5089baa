//! Handshake with the gateway
//!
//! The client presents the shared secret as a control message, repeated since
//! UDP may drop it, then waits in short slices for the gateway's answer. The
//! first control datagram that comes back carries the interface parameter
//! string; data datagrams arriving in the meantime are discarded.

use tokio::time::timeout;
use wicket_protocol::{wire, DatagramTransport, HANDSHAKE_BUFFER_SIZE};

use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::stop::{stopped, StopSignal};

/// Run the handshake and return the trimmed parameter string
///
/// Fails with [`Error::Timeout`] when no control datagram arrives within
/// `handshake_attempts` idle intervals, and with [`Error::Cancelled`] as soon
/// as `stop` fires.
pub async fn perform<T>(
    transport: &T,
    secret: &[u8],
    timing: &TimingConfig,
    stop: &mut StopSignal,
) -> Result<String>
where
    T: DatagramTransport + ?Sized,
{
    let request = wire::handshake_request(secret);
    for _ in 0..timing.handshake_sends {
        transport.send(&request).await?;
    }

    let mut buf = vec![0u8; HANDSHAKE_BUFFER_SIZE];
    let idle = timing.idle_interval();

    for attempt in 1..=timing.handshake_attempts {
        tokio::select! {
            biased;

            _ = stopped(stop) => return Err(Error::Cancelled),

            received = timeout(idle, transport.recv(&mut buf)) => match received {
                Err(_) => continue,
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(n)) => match wire::parse_handshake_response(&buf[..n]) {
                    Some(params) => {
                        log::debug!("Handshake answered on attempt {}", attempt);
                        return Ok(params);
                    }
                    None => log::trace!("Discarding {} byte datagram during handshake", n),
                },
            },
        }
    }

    Err(Error::Timeout(format!(
        "no handshake response after {} attempts",
        timing.handshake_attempts
    )))
}
