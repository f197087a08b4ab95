//! Administration API of the underlying data store.
//!
//! The maintainer never talks to the data store's consensus machinery
//! directly. It reads the membership document, submits a replacement, and
//! queries cluster status through this trait.

use std::sync::Mutex;

use async_trait::async_trait;
use rsm_protocol::{ClusterStatus, MembershipDocument};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AdminError {
    /// The submitted document was not based on the current version.
    #[error("stale membership version: submitted {submitted}, current {current}")]
    Conflict { submitted: u64, current: u64 },

    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Read the current membership document. `None` when there is none.
    async fn read_membership_document(&self) -> Result<Option<serde_json::Value>, AdminError>;

    /// Replace the membership document. Accepted only when `doc.version`
    /// is exactly one past the stored version.
    async fn submit_membership_document(&self, doc: &MembershipDocument) -> Result<(), AdminError>;

    async fn query_cluster_status(&self) -> Result<ClusterStatus, AdminError>;
}

struct MemoryState {
    document: Option<serde_json::Value>,
    status: Result<ClusterStatus, AdminError>,
    submissions: u64,
    fail_submit: Option<AdminError>,
}

/// In-process administration API holding a single document, for tests.
///
/// Enforces the same compare-on-version rule as a real data store. It has
/// no cluster behind it, so its status is whatever [`set_status`] last
/// stored.
///
/// [`set_status`]: MemoryAdmin::set_status
pub struct MemoryAdmin {
    state: Mutex<MemoryState>,
}

impl MemoryAdmin {
    pub fn new(document: Option<serde_json::Value>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                document,
                status: Ok(ClusterStatus::default()),
                submissions: 0,
                fail_submit: None,
            }),
        }
    }

    /// An admin holding an empty document at `version`.
    pub fn with_empty_document(version: u64) -> Self {
        Self::new(Some(MembershipDocument::new(version).to_value()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored document, decoded.
    pub fn document(&self) -> Option<MembershipDocument> {
        let doc = self.lock().document.clone();
        MembershipDocument::from_value(doc).ok()
    }

    /// Replace the stored document, bypassing the version check.
    pub fn set_document(&self, document: Option<serde_json::Value>) {
        self.lock().document = document;
    }

    pub fn set_status(&self, status: Result<ClusterStatus, AdminError>) {
        self.lock().status = status;
    }

    /// Make the next submission fail with `err`.
    pub fn fail_next_submit(&self, err: AdminError) {
        self.lock().fail_submit = Some(err);
    }

    /// Number of accepted submissions.
    pub fn submissions(&self) -> u64 {
        self.lock().submissions
    }
}

#[async_trait]
impl AdminApi for MemoryAdmin {
    async fn read_membership_document(&self) -> Result<Option<serde_json::Value>, AdminError> {
        Ok(self.lock().document.clone())
    }

    async fn submit_membership_document(&self, doc: &MembershipDocument) -> Result<(), AdminError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_submit.take() {
            return Err(err);
        }
        let current = state
            .document
            .as_ref()
            .and_then(|d| d.get("version"))
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if doc.version != current + 1 {
            return Err(AdminError::Conflict {
                submitted: doc.version,
                current,
            });
        }
        state.document = Some(doc.to_value());
        state.submissions += 1;
        Ok(())
    }

    async fn query_cluster_status(&self) -> Result<ClusterStatus, AdminError> {
        self.lock().status.clone()
    }
}
