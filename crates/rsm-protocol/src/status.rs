//! Cluster status snapshot as reported by the data store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PRIMARY_STATE, SECONDARY_STATE};

/// One member's entry in a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStatus {
    #[serde(rename = "_id")]
    pub id: u32,
    /// The member's host, as in the membership document.
    pub name: String,
    #[serde(default)]
    pub state: i32,
    /// 1 when the reporting node can reach the member, 0 otherwise.
    #[serde(default)]
    pub health: f64,
    /// Absent for the reporting node itself.
    #[serde(
        rename = "lastHeartbeatRecv",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_heartbeat_recv: Option<DateTime<Utc>>,
}

impl MemberStatus {
    pub fn is_primary(&self) -> bool {
        self.state == PRIMARY_STATE
    }

    pub fn is_healthy(&self) -> bool {
        self.health > 0.0
    }

    /// Age of the last heartbeat relative to the snapshot time.
    pub fn heartbeat_age(&self, snapshot: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_heartbeat_recv?;
        (snapshot - last).to_std().ok()
    }

    /// Not primary, unhealthy, and silent for longer than `threshold`.
    /// A member with no recorded heartbeat is never considered dead.
    pub fn looks_dead(&self, snapshot: DateTime<Utc>, threshold: Duration) -> bool {
        !self.is_primary()
            && !self.is_healthy()
            && self
                .heartbeat_age(snapshot)
                .is_some_and(|age| age > threshold)
    }
}

/// Result of a cluster status query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub ok: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberStatus>>,
}

impl ClusterStatus {
    pub fn is_ok(&self) -> bool {
        self.ok > 0.0
    }

    /// The member listing, only when the snapshot is usable.
    pub fn usable_members(&self) -> Option<&[MemberStatus]> {
        if !self.is_ok() {
            return None;
        }
        self.members.as_deref()
    }

    pub fn has_primary(&self) -> bool {
        self.usable_members()
            .is_some_and(|ms| ms.iter().any(MemberStatus::is_primary))
    }

    pub fn healthy_secondaries(&self) -> usize {
        self.usable_members().map_or(0, |ms| {
            ms.iter()
                .filter(|m| m.state == SECONDARY_STATE && m.is_healthy())
                .count()
        })
    }
}
