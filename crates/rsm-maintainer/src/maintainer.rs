//! The maintainer process: server, eviction sweep and topology watch.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rsm_protocol::{GRACE_PERIOD, SERVICE_NAME, STALENESS_THRESHOLD};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::server::{self, ServerState};
use crate::{
    advertise, AdminApi, ConnectionRegistry, EvictionSweep, JustAddedRegistry, MaintainerConfig,
    MaintainerError, Reconciler, TopologyMonitor,
};

/// Owns the process-wide state: the grace-period registry and the
/// connection registry live exactly as long as this value runs.
pub struct Maintainer {
    config: MaintainerConfig,
    admin: Arc<dyn AdminApi>,
    clients: ConnectionRegistry,
    reconciler: Arc<Reconciler>,
    sweep: EvictionSweep,
}

impl Maintainer {
    pub fn new(config: MaintainerConfig, admin: Arc<dyn AdminApi>) -> Self {
        let just_added = Arc::new(Mutex::new(JustAddedRegistry::new(GRACE_PERIOD)));
        let clients = ConnectionRegistry::new();
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&admin), Arc::clone(&just_added)));
        let sweep = EvictionSweep::new(
            Arc::clone(&admin),
            just_added,
            clients.clone(),
            STALENESS_THRESHOLD,
        );
        Self {
            config,
            admin,
            clients,
            reconciler,
            sweep,
        }
    }

    pub fn clients(&self) -> ConnectionRegistry {
        self.clients.clone()
    }

    /// Bind the listener and run until `shutdown` resolves or the data
    /// store is lost.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        self.run_on(listener, shutdown).await
    }

    /// Run on an already bound listener.
    pub async fn run_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let local: SocketAddr = listener.local_addr()?;
        tracing::info!(addr = %local, "Maintainer listening");

        let advertiser = (!self.config.skyapi.is_empty())
            .then(|| advertise::advertise(&self.config.skyapi, SERVICE_NAME, local.port()));

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = ServerState {
            reconciler: Arc::clone(&self.reconciler),
            clients: self.clients.clone(),
        };
        let mut server = tokio::spawn(server::serve(listener, state, async move {
            let _ = stop_rx.changed().await;
        }));

        let period = self.config.clean_period();
        let mut sweep_tick = interval_at(Instant::now() + period, period);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let health = self.config.health_interval();
        let mut health_tick = interval_at(Instant::now() + health, health);
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut topology = TopologyMonitor::new();

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutting down maintainer");
                    break Ok(());
                }
                res = &mut server => {
                    break match res {
                        Ok(Ok(())) => Err(anyhow::anyhow!("server stopped unexpectedly")),
                        Ok(Err(e)) => Err(anyhow::Error::new(e).context("server failed")),
                        Err(e) => Err(anyhow::Error::new(e).context("server task panicked")),
                    };
                }
                _ = sweep_tick.tick(), if self.config.clean => {
                    match self.sweep.run_once().await {
                        Ok(report) if !report.removed.is_empty() => {
                            tracing::info!(removed = ?report.removed, version = ?report.version, "Evicted dead replica members");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Eviction sweep failed"),
                    }
                }
                _ = health_tick.tick() => {
                    let status = self.admin.query_cluster_status().await;
                    if let Err(e) = topology.observe(status.as_ref()) {
                        if !e.is_recoverable() {
                            break Err(anyhow::Error::new(e));
                        }
                    }
                }
            }
        };

        let _ = stop_tx.send(true);
        if let Some(handle) = advertiser {
            handle.abort();
        }
        if !server.is_finished() {
            let _ = server.await;
        }
        result
    }
}

/// True when `err` is the fatal loss of the data store.
pub fn is_data_store_lost(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<MaintainerError>(), Some(MaintainerError::DataStoreLost))
}
