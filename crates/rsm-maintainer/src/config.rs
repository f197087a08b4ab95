//! Maintainer configuration, loaded from TOML and overridden by flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rsm_protocol::{DEFAULT_MAINTAINER_PORT, SWEEP_PERIOD};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintainerConfig {
    /// Listen address.
    pub ip: String,
    pub port: u16,
    /// Base URL of the data store administration API.
    pub admin: String,
    pub admin_timeout_secs: u64,
    /// Evict dead members.
    pub clean: bool,
    pub clean_period_secs: u64,
    /// How often the data store topology is checked. Two consecutive
    /// polls without a primary are fatal, so this must outlast an election.
    pub health_interval_secs: u64,
    /// Service registry to advertise to. Empty disables advertisement.
    pub skyapi: String,
    pub log_level: String,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".into(),
            port: DEFAULT_MAINTAINER_PORT,
            admin: "http://127.0.0.1:28017".into(),
            admin_timeout_secs: 10,
            clean: true,
            clean_period_secs: SWEEP_PERIOD.as_secs(),
            health_interval_secs: 10,
            skyapi: String::new(),
            log_level: "info".into(),
        }
    }
}

impl MaintainerConfig {
    /// `<config dir>/replset-maintainer/maintainer.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("replset-maintainer").join("maintainer.toml"))
    }

    /// Load from `path`, or from the default path when it exists, or fall
    /// back to defaults.
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

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn clean_period(&self) -> Duration {
        Duration::from_secs(self.clean_period_secs.max(1))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_timeout_secs.max(1))
    }
}
