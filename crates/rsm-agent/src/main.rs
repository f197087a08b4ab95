//! rsm-agent - registers the local replica member with the maintainer and
//! keeps it registered.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rsm_agent::{Agent, AgentConfig, SrvResolver};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rsm-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Maintainer endpoint (ws://host:port, host:port or srv://name)
    #[arg(long)]
    server: Option<String>,
    /// Host to register, empty to let the maintainer decide
    #[arg(long)]
    host: Option<String>,
    /// Register as a hidden member
    #[arg(long)]
    hidden: Option<bool>,
    /// Member priority
    #[arg(long)]
    priority: Option<f64>,
    /// Member votes
    #[arg(long)]
    votes: Option<u32>,
    /// Milliseconds between pings (two missed pings drop the session)
    #[arg(long)]
    ping: Option<u64>,
    /// Milliseconds before reconnecting, 0 to never reconnect
    #[arg(long)]
    reconnect: Option<u64>,
    /// Log filter, e.g. "info" or "rsm_agent=debug"
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, cfg: &mut AgentConfig) {
        if let Some(v) = self.server {
            cfg.server = v;
        }
        if let Some(v) = self.host {
            cfg.host = v;
        }
        if let Some(v) = self.hidden {
            cfg.hidden = v;
        }
        if let Some(v) = self.priority {
            cfg.priority = v;
        }
        if let Some(v) = self.votes {
            cfg.votes = v;
        }
        if let Some(v) = self.ping {
            cfg.ping_ms = v;
        }
        if let Some(v) = self.reconnect {
            cfg.reconnect_ms = v;
        }
        if let Some(v) = self.log_level {
            cfg.log_level = v;
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AgentConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    init_tracing(&config.log_level);

    let options = config
        .machine_options()
        .with_context(|| format!("invalid server address '{}'", config.server))?;
    tracing::info!(server = %config.server, "Starting agent");

    Agent::new(options, Arc::new(SrvResolver::new()))
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}
