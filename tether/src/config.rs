//! Server configuration.

use std::net::SocketAddr;
use tether_std::{binder::BindLimits, hub::HubConfig, registry::DEFAULT_BASE};

/// Everything [`App`](crate::App) needs to know before it starts.
///
/// # Example
///
/// ```rust,ignore
/// let config = ServerConfig::default()
///     .with_addr(([0, 0, 0, 0], 3000).into())
///     .with_cookie_name("sid");
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Prefix for derived action paths.
    pub action_base: String,
    /// Path of the patch socket.
    pub socket_path: String,
    /// Path the bundled client script is served at.
    pub script_path: String,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Input binder ceilings.
    pub limits: BindLimits,
    /// Heartbeat and sweep policy.
    pub hub: HubConfig,
    /// Replaces the default `Content-Security-Policy`.
    pub content_security_policy: Option<String>,
    /// Treat `X-Forwarded-Proto: https` as a secure connection.
    pub trust_forwarded_proto: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            action_base: DEFAULT_BASE.to_string(),
            socket_path: format!("{DEFAULT_BASE}/ws"),
            script_path: format!("{DEFAULT_BASE}/client.js"),
            cookie_name: "tether_sid".to_string(),
            limits: BindLimits::default(),
            hub: HubConfig::default(),
            content_security_policy: None,
            trust_forwarded_proto: true,
        }
    }
}

impl ServerConfig {
    /// Set the listen address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Set the prefix for derived action paths.
    pub fn with_action_base(mut self, base: impl Into<String>) -> Self {
        self.action_base = base.into();
        self
    }

    /// Set the socket path.
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Set the client script path.
    pub fn with_script_path(mut self, path: impl Into<String>) -> Self {
        self.script_path = path.into();
        self
    }

    /// Set the session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the binder ceilings.
    pub fn with_limits(mut self, limits: BindLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the hub policy.
    pub fn with_hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    /// Override the default content security policy.
    pub fn with_content_security_policy(mut self, policy: impl Into<String>) -> Self {
        self.content_security_policy = Some(policy.into());
        self
    }

    /// Whether to honour `X-Forwarded-Proto`.
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }
}
