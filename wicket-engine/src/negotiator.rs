//! Turns the handshake answer into an interface request

use wicket_protocol::InterfaceParameters;

use crate::config::TunnelConfig;
use crate::error::Result;
use crate::provider::{AppPolicy, ConfigureHandle, InterfaceProvider, InterfaceRequest, ProxyDescriptor};

/// Builds [`InterfaceRequest`]s for one tunnel configuration
pub struct Negotiator<'a> {
    tunnel: &'a TunnelConfig,
    provider: &'a dyn InterfaceProvider,
    configure: Option<&'a ConfigureHandle>,
}

impl<'a> Negotiator<'a> {
    pub fn new(
        tunnel: &'a TunnelConfig,
        provider: &'a dyn InterfaceProvider,
        configure: Option<&'a ConfigureHandle>,
    ) -> Self {
        Self {
            tunnel,
            provider,
            configure,
        }
    }

    /// Parse the gateway's parameter string and describe the interface to build
    ///
    /// A malformed parameter string is reported as
    /// [`Error::MalformedParameters`](crate::Error::MalformedParameters).
    pub fn request(&self, parameters: &str) -> Result<InterfaceRequest> {
        let params = InterfaceParameters::parse(parameters)?;

        Ok(InterfaceRequest {
            params,
            session: self.tunnel.server.clone(),
            applications: self.app_policy(),
            configure: self.configure.cloned(),
            proxy: self.proxy(),
        })
    }

    fn app_policy(&self) -> AppPolicy {
        let applications = self
            .tunnel
            .applications
            .iter()
            .filter(|id| {
                let known = self.provider.check_application(id);
                if !known {
                    log::warn!("Application not available: {}", id);
                }
                known
            })
            .cloned()
            .collect();

        AppPolicy {
            allow: self.tunnel.allow,
            applications,
        }
    }

    fn proxy(&self) -> Option<ProxyDescriptor> {
        match self.tunnel.proxy_host.as_deref() {
            Some(host) if !host.is_empty() => Some(ProxyDescriptor {
                host: host.to_string(),
                port: self.tunnel.proxy_port.unwrap_or(0),
            }),
            _ => None,
        }
    }
}
