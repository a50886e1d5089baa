//! Route management for TUN devices
//!
//! Negotiated routes are installed as interface routes pointing at the tunnel
//! device and removed again, in reverse order, when the tunnel goes away.

#[cfg(unix)]
use std::ffi::CString;
use ipnet::IpNet;

use crate::error::{Error, Result};

/// Convert an interface name to its index
#[cfg(unix)]
fn get_interface_index(name: &str) -> Result<u32> {
    let c_name = CString::new(name).map_err(|_| Error::Config("invalid interface name".into()))?;

    // SAFETY: if_nametoindex is safe to call with a valid C string
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };

    if index == 0 {
        return Err(Error::Route(format!(
            "interface '{}' not found (os error {})",
            name,
            std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
        )));
    }

    Ok(index)
}

#[cfg(not(unix))]
fn get_interface_index(name: &str) -> Result<u32> {
    Err(Error::NotSupported(format!(
        "interface routing by name: {}",
        name
    )))
}

/// An interface route through the tunnel device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network
    pub destination: IpNet,
    /// Interface the route points at
    pub interface: String,
}

impl Route {
    /// Create an interface route (no gateway, traffic goes directly to interface)
    pub fn interface_route(destination: IpNet, interface: impl Into<String>) -> Self {
        Self {
            destination,
            interface: interface.into(),
        }
    }

    /// Check if this is a default route
    pub fn is_default(&self) -> bool {
        self.destination.prefix_len() == 0
    }

    fn to_net_route(&self, strict: bool) -> Result<net_route::Route> {
        let mut route =
            net_route::Route::new(self.destination.addr(), self.destination.prefix_len());

        match get_interface_index(&self.interface) {
            Ok(ifindex) => route = route.with_ifindex(ifindex),
            Err(e) if strict => return Err(e),
            // The interface may already be gone during removal
            Err(_) => {}
        }

        Ok(route)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} dev {}", self.destination, self.interface)
    }
}

/// Route manager for adding/removing routes
///
/// Uses the `net-route` crate for cross-platform route manipulation.
pub struct RouteManager {
    handle: net_route::Handle,
}

impl RouteManager {
    /// Create a new route manager
    ///
    /// Requires root or `CAP_NET_ADMIN` on Linux, root on macOS.
    pub async fn new() -> Result<Self> {
        let handle = net_route::Handle::new()
            .map_err(|e| Error::Route(format!("failed to create route handle: {}", e)))?;

        Ok(Self { handle })
    }

    /// Add a route to the routing table
    pub async fn add(&self, route: &Route) -> Result<()> {
        let net_route = route.to_net_route(true)?;

        match self.handle.add(&net_route).await {
            Ok(()) => {
                log::info!("Added route: {}", route);
            }
            Err(e) => {
                let err_str = e.to_string();
                // EEXIST: route already present
                if err_str.contains("File exists") || err_str.contains("os error 17") {
                    log::debug!("Route already exists: {}", route);
                } else {
                    return Err(Error::Route(format!("failed to add route {}: {}", route, e)));
                }
            }
        }

        Ok(())
    }

    /// Remove a route from the routing table
    pub async fn delete(&self, route: &Route) -> Result<()> {
        let net_route = route.to_net_route(false)?;

        self.handle
            .delete(&net_route)
            .await
            .map_err(|e| Error::Route(format!("failed to delete route {}: {}", route, e)))?;

        log::info!("Deleted route: {}", route);
        Ok(())
    }

    /// Install interface routes for every network.
    ///
    /// On failure the routes added so far are removed before the error is
    /// returned.
    pub async fn install(&self, interface: &str, networks: &[IpNet]) -> Result<AppliedRoutes> {
        let mut applied = AppliedRoutes::default();

        for network in networks {
            let route = Route::interface_route(*network, interface);
            if route.is_default() {
                log::info!("Sending all traffic for {} through {}", network, interface);
            }
            if let Err(e) = self.add(&route).await {
                applied.cleanup(self).await;
                return Err(e);
            }
            applied.routes.push(route);
        }

        Ok(applied)
    }
}

/// Tracks applied routes for cleanup
#[derive(Debug, Default)]
pub struct AppliedRoutes {
    routes: Vec<Route>,
}

impl AppliedRoutes {
    /// Get the applied routes
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Remove all applied routes, newest first. Failures are logged.
    pub async fn cleanup(&mut self, manager: &RouteManager) {
        while let Some(route) = self.routes.pop() {
            if let Err(e) = manager.delete(&route).await {
                log::warn!("{}", e);
            }
        }
    }
}
