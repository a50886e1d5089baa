//! Host interface provider
//!
//! Brings up a TUN device for each negotiated interface and installs the
//! negotiated routes through it. Routes are removed again when the engine
//! closes the interface.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

use wicket_engine::{Error, InterfaceProvider, InterfaceRequest, Result};
use wicket_protocol::VirtualInterface;
use wicket_tun::{AppliedRoutes, RouteManager, TunConfig, TunDevice};

/// Creates TUN devices on the local host
pub struct HostInterfaceProvider {
    interface_name: Option<String>,
}

impl HostInterfaceProvider {
    pub fn new(interface_name: Option<String>) -> Self {
        Self { interface_name }
    }
}

#[async_trait]
impl InterfaceProvider for HostInterfaceProvider {
    fn check_application(&self, id: &str) -> bool {
        // Desktop hosts cannot route per application
        info!("Per-application routing is unavailable, skipping {}", id);
        false
    }

    async fn establish(&self, request: InterfaceRequest) -> Result<Box<dyn VirtualInterface>> {
        let params = &request.params;

        let mut config = TunConfig::from_parameters(params).map_err(provider_error)?;
        config.name = self.interface_name.clone();

        let device = TunDevice::create(config).await.map_err(|e| {
            if e.is_permission_denied() {
                Error::Provider(format!("{} (root or CAP_NET_ADMIN required)", e))
            } else {
                provider_error(e)
            }
        })?;
        info!(
            "Interface {} up for session {} (mtu {})",
            device.name(),
            request.session,
            device.mtu()
        );

        let routes = if params.routes.is_empty() {
            None
        } else {
            let manager = RouteManager::new().await.map_err(provider_error)?;
            let applied = match manager.install(device.name(), &params.routes).await {
                Ok(applied) => applied,
                Err(e) => {
                    let _ = device.close();
                    return Err(provider_error(e));
                }
            };
            Some((manager, applied))
        };

        if !params.dns_servers.is_empty() {
            info!(
                "Gateway DNS servers: {} (configure the host resolver to use them)",
                params
                    .dns_servers
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if !params.search_domains.is_empty() {
            info!("Gateway search domains: {}", params.search_domains.join(", "));
        }
        if let Some(proxy) = &request.proxy {
            info!("HTTP proxy for this tunnel: {}:{}", proxy.host, proxy.port);
        }

        Ok(Box::new(HostInterface {
            device,
            routes: Mutex::new(routes),
        }))
    }
}

fn provider_error(e: wicket_tun::Error) -> Error {
    Error::Provider(e.to_string())
}

/// A TUN device together with the routes installed through it
struct HostInterface {
    device: TunDevice,
    routes: Mutex<Option<(RouteManager, AppliedRoutes)>>,
}

impl HostInterface {
    fn remove_routes(&self) {
        let taken = self
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some((manager, mut applied)) = taken else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    applied.cleanup(&manager).await;
                });
            }
            Err(_) => warn!(
                "No runtime to remove {} routes from {}",
                applied.routes().len(),
                self.device.name()
            ),
        }
    }
}

#[async_trait]
impl VirtualInterface for HostInterface {
    async fn recv(&self, buf: &mut [u8]) -> wicket_protocol::Result<usize> {
        self.device.recv(buf).await
    }

    async fn send(&self, buf: &[u8]) -> wicket_protocol::Result<usize> {
        self.device.send(buf).await
    }

    fn close(&self) -> wicket_protocol::Result<()> {
        self.remove_routes();
        self.device.close()
    }

    fn name(&self) -> &str {
        self.device.name()
    }
}
