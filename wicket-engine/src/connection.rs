//! One tunnel connection and its reconnect loop
//!
//! A connection resolves the gateway once, then runs cycles of
//! socket → handshake → negotiation → relay. Recoverable failures lead to a
//! short delay and a new cycle; a cycle that reached the relay resets the
//! failure count. Fatal errors and exhausted retries end the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use wicket_protocol::VirtualInterface;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handshake;
use crate::negotiator::Negotiator;
use crate::provider::{ConfigureHandle, InterfaceProvider, InterfaceRequest};
use crate::relay::Relay;
use crate::socket::{self, SocketProtector};
use crate::stop::{is_stopped, stopped, StopSignal};

/// Where a connection registers the interfaces it brings up
#[async_trait]
pub trait TunnelRegistry: Send + Sync {
    /// Create the interface for connection `id` and record it as the
    /// established tunnel. Refused with [`Error::Cancelled`] when the
    /// connection has been superseded.
    async fn establish(&self, id: u32, request: InterfaceRequest) -> Result<Arc<dyn VirtualInterface>>;

    /// Forget connection `id` after it ended on its own
    async fn retire(&self, id: u32, reason: String);
}

/// Collaborators shared by all connections of a supervisor
#[derive(Clone)]
pub struct ConnectionContext {
    pub provider: Arc<dyn InterfaceProvider>,
    pub protector: Arc<dyn SocketProtector>,
    pub registry: Arc<dyn TunnelRegistry>,
    pub configure: Option<ConfigureHandle>,
}

/// How a cycle ended
struct CycleEnd {
    /// The relay was reached
    relayed: bool,
    error: Error,
}

impl CycleEnd {
    fn early(error: Error) -> Self {
        Self {
            relayed: false,
            error,
        }
    }
}

/// A single tunnel connection
pub struct Connection {
    id: u32,
    config: Config,
    ctx: ConnectionContext,
    stop: StopSignal,
}

impl Connection {
    pub fn new(id: u32, config: Config, ctx: ConnectionContext, stop: StopSignal) -> Self {
        Self {
            id,
            config,
            ctx,
            stop,
        }
    }

    /// Run until stopped, a fatal error, or too many failed attempts
    ///
    /// Returns [`Error::Cancelled`] when stopped, [`Error::GaveUp`] when the
    /// retry budget ran out, and the fatal error otherwise.
    pub async fn run(mut self) -> Error {
        let server = match self.resolve().await {
            Ok(addr) => addr,
            Err(e) => return e,
        };
        log::info!("[conn {}] Gateway {} resolved to {}", self.id, self.config.tunnel.server, server);

        let max_attempts = self.config.timing.max_attempts;
        let mut failures: u32 = 0;

        loop {
            let end = self.cycle(server).await;

            if end.error.is_cancelled() {
                log::debug!("[conn {}] Stopped", self.id);
                return end.error;
            }
            if !end.error.is_recoverable() {
                log::error!("[conn {}] Connection failed: {}", self.id, end.error);
                return end.error;
            }

            failures = if end.relayed { 0 } else { failures + 1 };
            log::warn!(
                "[conn {}] Connection lost: {} (failed attempts: {}/{})",
                self.id,
                end.error,
                failures,
                max_attempts
            );
            if failures >= max_attempts {
                log::error!("[conn {}] Giving up", self.id);
                return Error::GaveUp(failures);
            }

            if let Err(e) = self.pause().await {
                return e;
            }
        }
    }

    async fn resolve(&mut self) -> Result<SocketAddr> {
        let host = self.config.tunnel.server.as_str();
        let port = self.config.tunnel.port;

        let lookup = tokio::select! {
            biased;
            _ = stopped(&mut self.stop) => return Err(Error::Cancelled),
            lookup = tokio::net::lookup_host((host, port)) => lookup,
        };

        lookup
            .map_err(|e| Error::Resolve(format!("{}: {}", host, e)))?
            .next()
            .ok_or_else(|| Error::Resolve(format!("{}: no addresses", host)))
    }

    async fn pause(&mut self) -> Result<()> {
        let delay = self.config.timing.reconnect_delay();
        tokio::select! {
            biased;
            _ = stopped(&mut self.stop) => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// One socket → handshake → negotiation → relay cycle. The transport is
    /// dropped and the interface closed and released before returning.
    async fn cycle(&mut self, server: SocketAddr) -> CycleEnd {
        if is_stopped(&self.stop) {
            return CycleEnd::early(Error::Cancelled);
        }

        let transport = match socket::open_transport(server, self.ctx.protector.as_ref()) {
            Ok(t) => t,
            Err(e) => return CycleEnd::early(e),
        };

        let tunnel = &self.config.tunnel;
        let timing = &self.config.timing;

        let params =
            match handshake::perform(&transport, tunnel.secret.as_bytes(), timing, &mut self.stop).await {
                Ok(p) => p,
                Err(e) => return CycleEnd::early(e),
            };
        log::info!("[conn {}] Handshake complete: {}", self.id, params);

        let negotiator = Negotiator::new(tunnel, self.ctx.provider.as_ref(), self.ctx.configure.as_ref());
        let request = match negotiator.request(&params) {
            Ok(r) => r,
            Err(e) => return CycleEnd::early(e),
        };

        let iface = match self.ctx.registry.establish(self.id, request).await {
            Ok(i) => i,
            Err(e) => return CycleEnd::early(e),
        };
        log::info!("[conn {}] Relaying through {}", self.id, iface.name());

        let mut relay = Relay::new(&transport, iface.as_ref(), timing);
        let error = relay.run(&mut self.stop).await;
        log::info!("[conn {}] Relay ended: {}", self.id, relay.stats());

        if let Err(e) = iface.close() {
            log::warn!("[conn {}] Failed to close interface: {}", self.id, e);
        }

        CycleEnd {
            relayed: true,
            error,
        }
    }
}
