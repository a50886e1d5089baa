//! Datagram construction and classification

use crate::CONTROL_MARKER;

/// Number of copies sent for every control message.
///
/// UDP gives no delivery guarantee and control messages are never
/// acknowledged, so each one goes out several times.
pub const CONTROL_REPEAT: usize = 3;

/// The keepalive datagram: a bare control marker
pub const KEEPALIVE: [u8; 1] = [CONTROL_MARKER];

/// A datagram received from the tunnel, split by its leading byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram<'a> {
    /// Control message; the slice excludes the marker byte
    Control(&'a [u8]),
    /// IP packet destined for the virtual interface
    Data(&'a [u8]),
}

impl<'a> Datagram<'a> {
    /// Classify a received datagram. Empty datagrams carry nothing and yield `None`.
    pub fn classify(buf: &'a [u8]) -> Option<Self> {
        match buf.first() {
            None => None,
            Some(&CONTROL_MARKER) => Some(Datagram::Control(&buf[1..])),
            Some(_) => Some(Datagram::Data(buf)),
        }
    }

    /// Check if this is a control message
    pub fn is_control(&self) -> bool {
        matches!(self, Datagram::Control(_))
    }
}

/// Build the handshake request carrying the shared secret
pub fn handshake_request(secret: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(1 + secret.len());
    msg.push(CONTROL_MARKER);
    msg.extend_from_slice(secret);
    msg
}

/// Build a handshake response around a parameter string
pub fn handshake_response(parameters: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(1 + parameters.len());
    msg.push(CONTROL_MARKER);
    msg.extend_from_slice(parameters.as_bytes());
    msg
}

/// Extract the parameter string from a handshake response.
///
/// Returns `None` when the datagram is not a control message. The payload is
/// decoded leniently and trimmed of surrounding whitespace.
pub fn parse_handshake_response(buf: &[u8]) -> Option<String> {
    match Datagram::classify(buf)? {
        Datagram::Control(payload) => Some(String::from_utf8_lossy(payload).trim().to_string()),
        Datagram::Data(_) => None,
    }
}
