//! Periodic eviction of members that have been dead for too long.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rsm_protocol::{MembershipDocument, Reply};
use tokio::sync::Mutex;

use crate::{AdminApi, ConnectionRegistry, JustAddedRegistry, MaintainerError};

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Ids selected from the status snapshot.
    pub candidates: Vec<u32>,
    /// Hosts removed from the membership document.
    pub removed: Vec<String>,
    /// Version of the submitted document, when one was submitted.
    pub version: Option<u64>,
}

pub struct EvictionSweep {
    admin: Arc<dyn AdminApi>,
    just_added: Arc<Mutex<JustAddedRegistry>>,
    clients: ConnectionRegistry,
    staleness: Duration,
}

impl EvictionSweep {
    pub fn new(
        admin: Arc<dyn AdminApi>,
        just_added: Arc<Mutex<JustAddedRegistry>>,
        clients: ConnectionRegistry,
        staleness: Duration,
    ) -> Self {
        Self {
            admin,
            just_added,
            clients,
            staleness,
        }
    }

    /// Run one sweep.
    ///
    /// Nothing is mutated when the status snapshot is unusable. Members are
    /// removed by id from a freshly read document, since a member selected
    /// from the snapshot may already be gone.
    pub async fn run_once(&self) -> Result<SweepReport, MaintainerError> {
        let status = self.admin.query_cluster_status().await?;
        let Some(members) = status.usable_members() else {
            tracing::error!(ok = status.ok, "Unusable replica set status");
            return Err(MaintainerError::UpstreamUnavailable(
                "cluster status is not ok or lists no members".into(),
            ));
        };
        let snapshot = status.date.unwrap_or_else(Utc::now);

        let mut report = SweepReport::default();
        {
            let mut just_added = self.just_added.lock().await;
            for member in members {
                if !member.looks_dead(snapshot, self.staleness) {
                    continue;
                }
                if just_added.is_within_grace(&member.name, snapshot) {
                    tracing::debug!(host = %member.name, "Dead member still within grace period");
                    continue;
                }
                report.candidates.push(member.id);
            }
            just_added.prune(snapshot);
        }

        tracing::debug!(count = report.candidates.len(), "Removing dead replica members");
        if report.candidates.is_empty() {
            return Ok(report);
        }

        let raw = self.admin.read_membership_document().await?;
        let mut doc = MembershipDocument::from_value(raw)?;
        for &id in &report.candidates {
            if let Some(member) = doc.remove_id(id) {
                tracing::info!(host = %member.host, id, "Removing dead replica member");
                self.clients.broadcast(&Reply::removed(&member.host).to_text()).await;
                report.removed.push(member.host);
            }
        }
        if report.removed.is_empty() {
            return Ok(report);
        }

        doc.bump_version();
        if let Err(e) = self.admin.submit_membership_document(&doc).await {
            tracing::error!(error = %e, "Error removing dead replica members");
            return Err(e.into());
        }
        report.version = Some(doc.version);
        Ok(report)
    }
}
