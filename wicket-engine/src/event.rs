//! Tunnel events and state

use tokio::sync::mpsc;

/// Tunnel state as seen by presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpnState {
    /// No connection and no attempt in flight
    Disconnected,
    /// A connection attempt is running but no interface is up yet
    Connecting,
    /// An interface has been established
    Connected,
}

impl VpnState {
    /// Check if a connection is running in any form
    pub fn is_active(&self) -> bool {
        matches!(self, VpnState::Connecting | VpnState::Connected)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, VpnState::Connected)
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            VpnState::Disconnected => "Disconnected",
            VpnState::Connecting => "Connecting...",
            VpnState::Connected => "Connected",
        }
    }
}

impl std::fmt::Display for VpnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Events emitted by the supervisor, in transition order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VpnEvent {
    /// A connection attempt was started
    Connecting {
        /// Connection id
        id: u32,
        /// Gateway host
        server: String,
    },

    /// A connection established its interface
    Connected {
        id: u32,
        /// Interface name reported by the host
        interface: String,
    },

    /// The tunnel went away
    Disconnected {
        /// Reason for disconnection
        reason: String,
    },
}

impl VpnEvent {
    /// State entered by this event
    pub fn state(&self) -> VpnState {
        match self {
            VpnEvent::Connecting { .. } => VpnState::Connecting,
            VpnEvent::Connected { .. } => VpnState::Connected,
            VpnEvent::Disconnected { .. } => VpnState::Disconnected,
        }
    }
}

/// Event handler trait for receiving tunnel events
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a tunnel event
    async fn on_event(&self, event: VpnEvent);
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_event(&self, event: VpnEvent) {
        match event {
            VpnEvent::Connecting { id, server } => {
                log::info!("[conn {}] Connecting to {}", id, server);
            }
            VpnEvent::Connected { id, interface } => {
                log::info!("[conn {}] Connected: interface={}", id, interface);
            }
            VpnEvent::Disconnected { reason } => {
                log::info!("Disconnected: {}", reason);
            }
        }
    }
}

/// Event handler that forwards events into a channel
///
/// The channel is unbounded so that emitting never waits on the consumer.
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<VpnEvent>,
}

impl ChannelEventHandler {
    /// Create a handler together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<VpnEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl EventHandler for ChannelEventHandler {
    async fn on_event(&self, event: VpnEvent) {
        // Receiver dropped: nobody is listening any more
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_helpers() {
        assert!(!VpnState::Disconnected.is_active());
        assert!(VpnState::Connecting.is_active());
        assert!(VpnState::Connected.is_connected());
        assert_eq!(VpnState::Connecting.to_string(), "Connecting...");
    }

    #[test]
    fn test_event_state() {
        let event = VpnEvent::Connected {
            id: 1,
            interface: "tun0".into(),
        };
        assert_eq!(event.state(), VpnState::Connected);
    }

    #[tokio::test]
    async fn test_channel_handler_preserves_order() {
        let (handler, mut rx) = ChannelEventHandler::channel();

        handler
            .on_event(VpnEvent::Connecting {
                id: 1,
                server: "gw".into(),
            })
            .await;
        handler
            .on_event(VpnEvent::Disconnected {
                reason: "stopped".into(),
            })
            .await;

        assert_eq!(rx.recv().await.unwrap().state(), VpnState::Connecting);
        assert_eq!(rx.recv().await.unwrap().state(), VpnState::Disconnected);
    }

    #[tokio::test]
    async fn test_channel_handler_survives_dropped_receiver() {
        let (handler, rx) = ChannelEventHandler::channel();
        drop(rx);
        handler
            .on_event(VpnEvent::Disconnected {
                reason: "stopped".into(),
            })
            .await;
    }
}
