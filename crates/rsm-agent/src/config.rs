//! Agent configuration, loaded from TOML and overridden by flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rsm_protocol::{Registration, MIN_PING_INTERVAL, MIN_RECONNECT_DELAY};
use serde::{Deserialize, Serialize};

use crate::{AgentError, MachineOptions, ServerAddress};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maintainer address: `ws://host:port`, `host:port` or `srv://name`.
    pub server: String,
    /// Host to register. Empty lets the maintainer use our peer address.
    pub host: String,
    pub hidden: bool,
    pub priority: f64,
    pub votes: u32,
    /// Milliseconds between pings; two missed pings drop the session.
    /// 0 disables pinging.
    pub ping_ms: u64,
    /// Milliseconds before reconnecting. 0 disables reconnection.
    pub reconnect_ms: u64,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            host: String::new(),
            hidden: false,
            priority: 0.0,
            votes: 0,
            ping_ms: 15_000,
            reconnect_ms: 5_000,
            log_level: "info".into(),
        }
    }
}

impl AgentConfig {
    /// `<config dir>/replset-maintainer/agent.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("replset-maintainer").join("agent.toml"))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_ms > 0).then(|| Duration::from_millis(self.ping_ms).max(MIN_PING_INTERVAL))
    }

    pub fn reconnect_delay(&self) -> Option<Duration> {
        (self.reconnect_ms > 0)
            .then(|| Duration::from_millis(self.reconnect_ms).max(MIN_RECONNECT_DELAY))
    }

    pub fn resolve_retry(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms).max(MIN_RECONNECT_DELAY)
    }

    pub fn registration(&self) -> Registration {
        Registration {
            host: (!self.host.is_empty()).then(|| self.host.clone()),
            hidden: self.hidden,
            priority: self.priority,
            votes: self.votes,
        }
    }

    pub fn machine_options(&self) -> Result<MachineOptions, AgentError> {
        Ok(MachineOptions {
            server: ServerAddress::parse(&self.server)?,
            registration: self.registration(),
            ping_interval: self.ping_interval(),
            reconnect_delay: self.reconnect_delay(),
            resolve_retry: self.resolve_retry(),
        })
    }
}
