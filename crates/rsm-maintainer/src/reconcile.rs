//! Membership reconciliation: turn a registration into the smallest
//! change to the membership document.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rsm_protocol::{normalize_host, MemberChange, MembershipDocument};
use tokio::sync::Mutex;

use crate::{AdminApi, JustAddedRegistry, MaintainerError};

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Normalized host the member is registered under.
    pub host: String,
    pub change: MemberChange,
    /// Document version after the call.
    pub version: u64,
}

impl Reconciled {
    pub fn changed(&self) -> bool {
        self.change.changed()
    }
}

pub struct Reconciler {
    admin: Arc<dyn AdminApi>,
    just_added: Arc<Mutex<JustAddedRegistry>>,
    /// Highest member id this engine has assigned. New ids start above it
    /// so an evicted member's id is never handed out again.
    highest_issued: AtomicU32,
}

impl Reconciler {
    pub fn new(admin: Arc<dyn AdminApi>, just_added: Arc<Mutex<JustAddedRegistry>>) -> Self {
        Self {
            admin,
            just_added,
            highest_issued: AtomicU32::new(0),
        }
    }

    /// Register `host` with the given attributes.
    ///
    /// Reads the document fresh on every call. A call that changes nothing
    /// succeeds without writing. A stale-version rejection from the data
    /// store comes back as [`MaintainerError::Conflict`]; retrying re-reads
    /// the current version.
    pub async fn reconcile(
        &self,
        host: &str,
        hidden: bool,
        priority: f64,
        votes: u32,
    ) -> Result<Reconciled, MaintainerError> {
        let raw = self.admin.read_membership_document().await?;
        let host = normalize_host(host);
        let mut doc = MembershipDocument::from_value(raw).inspect_err(|e| {
            tracing::error!(error = %e, "Invalid membership document");
        })?;

        let floor = self.highest_issued.load(Ordering::SeqCst);
        let change = doc.apply_registration(&host, hidden, priority, votes, floor)?;
        match change {
            MemberChange::Added { id } => {
                tracing::debug!(host = %host, id, "Adding new replica member");
            }
            MemberChange::Updated { id } => {
                tracing::debug!(host = %host, id, "Updating existing replica member");
            }
            MemberChange::Unchanged { .. } => {
                return Ok(Reconciled {
                    host,
                    change,
                    version: doc.version,
                });
            }
        }

        doc.bump_version();
        self.admin.submit_membership_document(&doc).await?;

        if let MemberChange::Added { id } = change {
            self.highest_issued.fetch_max(id, Ordering::SeqCst);
        }
        self.just_added.lock().await.record(&host, Utc::now());

        Ok(Reconciled {
            host,
            change,
            version: doc.version,
        })
    }
}
