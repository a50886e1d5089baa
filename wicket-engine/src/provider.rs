//! Host collaborator that creates the virtual interface
//!
//! The engine never creates interfaces itself. It describes what it needs in
//! an [`InterfaceRequest`] and the host hands back a [`VirtualInterface`].

use async_trait::async_trait;
use wicket_protocol::{InterfaceParameters, VirtualInterface};

use crate::error::Result;

/// Opaque host token that lets the user reach the tunnel configuration from
/// wherever the host presents the interface (a settings URI, a command line)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureHandle(pub String);

/// HTTP proxy to announce with the interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDescriptor {
    pub host: String,
    pub port: u16,
}

/// Which applications use the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPolicy {
    /// `true`: only `applications` use the tunnel. `false`: everything except
    /// `applications` does.
    pub allow: bool,
    /// Identifiers the provider recognized
    pub applications: Vec<String>,
}

impl Default for AppPolicy {
    fn default() -> Self {
        Self {
            allow: true,
            applications: Vec::new(),
        }
    }
}

/// Everything the host needs to bring up the interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRequest {
    /// Negotiated addresses, routes, DNS and MTU
    pub params: InterfaceParameters,
    /// Human-readable session label (the gateway host)
    pub session: String,
    pub applications: AppPolicy,
    pub configure: Option<ConfigureHandle>,
    pub proxy: Option<ProxyDescriptor>,
}

/// Creates virtual interfaces on behalf of the engine
#[async_trait]
pub trait InterfaceProvider: Send + Sync {
    /// Check whether an application identifier exists on this host
    fn check_application(&self, id: &str) -> bool;

    /// Bring up an interface described by `request`
    ///
    /// Failures should be reported as [`Error::Provider`](crate::Error::Provider).
    async fn establish(&self, request: InterfaceRequest) -> Result<Box<dyn VirtualInterface>>;
}
