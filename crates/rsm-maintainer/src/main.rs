//! rsm-maintainer - keeps a replica set's membership in sync with its live
//! nodes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rsm_maintainer::maintainer::is_data_store_lost;
use rsm_maintainer::{HttpAdmin, Maintainer, MaintainerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rsm-maintainer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen ip
    #[arg(long)]
    ip: Option<String>,
    /// Listen port
    #[arg(long)]
    port: Option<u16>,
    /// Base URL of the data store administration API
    #[arg(long)]
    admin: Option<String>,
    /// Clean up dead replica members
    #[arg(long)]
    clean: Option<bool>,
    /// Seconds between eviction sweeps
    #[arg(long)]
    clean_period_secs: Option<u64>,
    /// Service registry address to advertise to
    #[arg(long)]
    skyapi: Option<String>,
    /// Log filter, e.g. "info" or "rsm_maintainer=debug"
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, cfg: &mut MaintainerConfig) {
        if let Some(v) = self.ip {
            cfg.ip = v;
        }
        if let Some(v) = self.port {
            cfg.port = v;
        }
        if let Some(v) = self.admin {
            cfg.admin = v;
        }
        if let Some(v) = self.clean {
            cfg.clean = v;
        }
        if let Some(v) = self.clean_period_secs {
            cfg.clean_period_secs = v;
        }
        if let Some(v) = self.skyapi {
            cfg.skyapi = v;
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
    let mut config = MaintainerConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    init_tracing(&config.log_level);

    let admin = HttpAdmin::new(&config.admin, config.admin_timeout())
        .context("creating administration API client")?;
    tracing::info!(admin = %config.admin, "Using data store administration API");

    let maintainer = Maintainer::new(config, Arc::new(admin));
    let result = maintainer
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    if let Err(e) = &result {
        if is_data_store_lost(e) {
            tracing::error!("Lost connection to all data store instances, exiting");
        }
    }
    result
}
