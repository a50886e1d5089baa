//! Connection supervisor
//!
//! Owns the two connection slots and is the only place that starts, replaces
//! and tears down connections:
//!
//! ```text
//!   connect() ──► connecting slot ──establish()──► established slot
//!                    │  superseded by the next connect()     │  superseded by the next establish()
//!                    ▼                                       ▼
//!                  stop                               stop + close interface
//! ```
//!
//! Every slot mutation happens under one async mutex, following
//! take-old / install-new / act-on-old. Events are emitted while the lock is
//! held, so handlers observe them in transition order.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use wicket_protocol::VirtualInterface;

use crate::config::Config;
use crate::connection::{Connection, ConnectionContext, TunnelRegistry};
use crate::error::{Error, Result};
use crate::event::{EventHandler, LoggingEventHandler, VpnEvent, VpnState};
use crate::provider::{ConfigureHandle, InterfaceProvider, InterfaceRequest};
use crate::socket::{NoProtection, SocketProtector};
use crate::stop::stop_channel;

/// How long `shutdown` waits for connection tasks to unwind
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A connection that has not established an interface yet
struct Attempt {
    id: u32,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The connection whose interface is current
///
/// The connection's cycle owns the interface. The slot only keeps a weak
/// reference to close it on teardown, so the host device is released as soon
/// as a cycle ends.
struct Established {
    id: u32,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    iface: Weak<dyn VirtualInterface>,
}

#[derive(Default)]
struct Slots {
    connecting: Option<Attempt>,
    established: Option<Established>,
}

impl Slots {
    fn state(&self) -> VpnState {
        if self.established.is_some() {
            VpnState::Connected
        } else if self.connecting.is_some() {
            VpnState::Connecting
        } else {
            VpnState::Disconnected
        }
    }

    /// Whether connection `id` still owns a slot and has not been told to stop
    fn is_live(&self, id: u32) -> bool {
        let connecting = self
            .connecting
            .as_ref()
            .is_some_and(|a| a.id == id && !*a.stop.borrow());
        let established = self
            .established
            .as_ref()
            .is_some_and(|e| e.id == id && !*e.stop.borrow());
        connecting || established
    }
}

struct Shared {
    provider: Arc<dyn InterfaceProvider>,
    protector: Arc<dyn SocketProtector>,
    events: Arc<dyn EventHandler>,
    configure: Option<ConfigureHandle>,
    next_id: AtomicU32,
    slots: Mutex<Slots>,
}

impl Shared {
    async fn emit(&self, event: VpnEvent) {
        self.events.on_event(event).await;
    }
}

fn close_quietly(id: u32, iface: &dyn VirtualInterface) {
    if let Err(e) = iface.close() {
        log::warn!("[conn {}] Failed to close interface {}: {}", id, iface.name(), e);
    }
}

/// Close the interface if its cycle still holds it
fn close_weak(id: u32, iface: &Weak<dyn VirtualInterface>) {
    if let Some(iface) = iface.upgrade() {
        close_quietly(id, iface.as_ref());
    }
}

#[async_trait]
impl TunnelRegistry for Shared {
    async fn establish(&self, id: u32, request: InterfaceRequest) -> Result<Arc<dyn VirtualInterface>> {
        let mut slots = self.slots.lock().await;

        if !slots.is_live(id) {
            log::debug!("[conn {}] Superseded before establishing", id);
            return Err(Error::Cancelled);
        }

        let iface: Arc<dyn VirtualInterface> = Arc::from(self.provider.establish(request).await?);

        // Stopped while the provider was working
        if !slots.is_live(id) {
            close_quietly(id, iface.as_ref());
            return Err(Error::Cancelled);
        }

        match slots.established.take() {
            Some(mut current) if current.id == id => {
                // Re-established after a reconnect: swap the interface only
                let old = std::mem::replace(&mut current.iface, Arc::downgrade(&iface));
                close_weak(id, &old);
                slots.established = Some(current);
            }
            previous => {
                let attempt = match slots.connecting.take() {
                    Some(attempt) if attempt.id == id => attempt,
                    other => {
                        // is_live guarantees the attempt is in one of the slots
                        slots.connecting = other;
                        slots.established = previous;
                        close_quietly(id, iface.as_ref());
                        return Err(Error::Cancelled);
                    }
                };

                if let Some(old) = previous {
                    log::info!("[conn {}] Superseded by connection {}", old.id, id);
                    old.stop.send_replace(true);
                    close_weak(old.id, &old.iface);
                }

                slots.established = Some(Established {
                    id,
                    stop: attempt.stop,
                    task: attempt.task,
                    iface: Arc::downgrade(&iface),
                });
            }
        }

        self.emit(VpnEvent::Connected {
            id,
            interface: iface.name().to_string(),
        })
        .await;

        Ok(iface)
    }

    async fn retire(&self, id: u32, reason: String) {
        let mut slots = self.slots.lock().await;
        let mut retired = false;

        if slots.connecting.as_ref().is_some_and(|a| a.id == id) {
            slots.connecting = None;
            retired = true;
        }
        if slots.established.as_ref().is_some_and(|e| e.id == id) {
            if let Some(established) = slots.established.take() {
                close_weak(id, &established.iface);
            }
            retired = true;
        }

        if retired {
            self.emit(VpnEvent::Disconnected { reason }).await;
        }
    }
}

/// Builder for [`Supervisor`]
pub struct SupervisorBuilder {
    provider: Arc<dyn InterfaceProvider>,
    protector: Arc<dyn SocketProtector>,
    events: Arc<dyn EventHandler>,
    configure: Option<ConfigureHandle>,
}

impl SupervisorBuilder {
    /// Protector applied to every tunnel socket (default: none)
    pub fn protector(mut self, protector: Arc<dyn SocketProtector>) -> Self {
        self.protector = protector;
        self
    }

    /// Receiver of state events (default: log them)
    pub fn event_handler(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Handle attached to every interface request
    pub fn configure_handle(mut self, handle: ConfigureHandle) -> Self {
        self.configure = Some(handle);
        self
    }

    pub fn build(self) -> Supervisor {
        Supervisor {
            shared: Arc::new(Shared {
                provider: self.provider,
                protector: self.protector,
                events: self.events,
                configure: self.configure,
                next_id: AtomicU32::new(1),
                slots: Mutex::new(Slots::default()),
            }),
        }
    }
}

/// Starts, replaces and tears down tunnel connections
///
/// At most one connection is connecting and at most one is established at
/// any time. Starting a connection supersedes the previous attempt;
/// establishing an interface supersedes the previous tunnel.
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn builder(provider: Arc<dyn InterfaceProvider>) -> SupervisorBuilder {
        SupervisorBuilder {
            provider,
            protector: Arc::new(NoProtection),
            events: Arc::new(LoggingEventHandler),
            configure: None,
        }
    }

    /// Start a new connection and return its id
    ///
    /// Any attempt still connecting is stopped. The established tunnel, if
    /// any, keeps running until the new connection brings up its interface.
    pub async fn connect(&self, config: Config) -> Result<u32> {
        config.validate()?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let server = config.tunnel.server.clone();
        let (stop_tx, stop_rx) = stop_channel();

        let ctx = ConnectionContext {
            provider: self.shared.provider.clone(),
            protector: self.shared.protector.clone(),
            registry: self.shared.clone(),
            configure: self.shared.configure.clone(),
        };
        let connection = Connection::new(id, config, ctx, stop_rx);

        let mut slots = self.shared.slots.lock().await;

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let error = connection.run().await;
            if !error.is_cancelled() {
                shared.retire(id, error.to_string()).await;
            }
        });

        if let Some(previous) = slots.connecting.replace(Attempt {
            id,
            stop: stop_tx,
            task,
        }) {
            log::info!("[conn {}] Superseded by connection {}", previous.id, id);
            previous.stop.send_replace(true);
        }

        self.shared.emit(VpnEvent::Connecting { id, server }).await;

        Ok(id)
    }

    /// Tear down the connecting attempt and the established tunnel
    ///
    /// Emits [`VpnEvent::Disconnected`] only when something was running.
    pub async fn disconnect(&self) {
        self.take_all().await;
    }

    /// Disconnect and wait for the connection tasks to finish
    pub async fn shutdown(&self) {
        let tasks = self.take_all().await;
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                log::warn!("Connection task did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }
    }

    /// Current state derived from the slots
    pub async fn status(&self) -> VpnState {
        self.shared.slots.lock().await.state()
    }

    /// Id of the connection whose interface is current
    pub async fn established_id(&self) -> Option<u32> {
        self.shared.slots.lock().await.established.as_ref().map(|e| e.id)
    }

    async fn take_all(&self) -> Vec<JoinHandle<()>> {
        let mut slots = self.shared.slots.lock().await;
        let mut tasks = Vec::new();

        if let Some(attempt) = slots.connecting.take() {
            attempt.stop.send_replace(true);
            tasks.push(attempt.task);
        }
        if let Some(established) = slots.established.take() {
            established.stop.send_replace(true);
            close_weak(established.id, &established.iface);
            tasks.push(established.task);
        }

        if !tasks.is_empty() {
            self.shared
                .emit(VpnEvent::Disconnected {
                    reason: "disconnected by request".into(),
                })
                .await;
        }

        tasks
    }
}
