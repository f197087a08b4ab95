//! Maintainer address resolution.
//!
//! A static address is used as is (with `ws://` prepended when it has no
//! scheme). A `srv://<name>` address is looked up through DNS SRV before
//! every connection attempt.

use std::net::SocketAddr;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use rsm_protocol::ProtocolError;

use crate::AgentError;

const SRV_SCHEME: &str = "srv://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// A WebSocket URL.
    Static(String),
    /// An SRV record name, resolved on each connect.
    Srv(String),
}

impl ServerAddress {
    pub fn parse(server: &str) -> Result<Self, AgentError> {
        let server = server.trim();
        if let Some(name) = server.strip_prefix(SRV_SCHEME) {
            if name.is_empty() {
                return Err(ProtocolError::InvalidAddress(server.to_string()).into());
            }
            return Ok(Self::Srv(name.to_string()));
        }
        if server.is_empty() {
            return Err(ProtocolError::InvalidAddress(server.to_string()).into());
        }
        Ok(Self::Static(ws_url(server)))
    }
}

/// Prefix `ws://` unless the address already carries a scheme.
pub fn ws_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("ws://{address}")
    }
}

/// Turns a service-discovery name into a connectable URL.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String, AgentError>;
}

/// DNS SRV resolution through hickory.
pub struct SrvResolver {
    resolver: TokioAsyncResolver,
}

impl SrvResolver {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for SrvResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolve for SrvResolver {
    async fn resolve(&self, name: &str) -> Result<String, AgentError> {
        let failed = |reason: String| AgentError::Resolve {
            name: name.to_string(),
            reason,
        };

        tracing::debug!(hostname = %name, "Resolving srv address");
        let records = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|e| failed(e.to_string()))?;
        // Lowest priority wins, then highest weight.
        let target = records
            .iter()
            .min_by_key(|srv| (srv.priority(), std::cmp::Reverse(srv.weight())))
            .ok_or_else(|| failed("no srv records".into()))?;

        tracing::debug!(hostname = %name, target = %target.target(), port = target.port(), "Resolving srv target");
        let ips = self
            .resolver
            .lookup_ip(target.target().to_utf8())
            .await
            .map_err(|e| failed(format!("target {}: {e}", target.target())))?;
        let ip = ips
            .iter()
            .next()
            .ok_or_else(|| failed(format!("target {} has no address", target.target())))?;

        Ok(format!("ws://{}", SocketAddr::new(ip, target.port())))
    }
}
