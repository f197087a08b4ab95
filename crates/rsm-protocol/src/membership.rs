//! The replica set membership document.
//!
//! The document is owned by the data store and read fresh before every
//! mutation. Fields this crate does not interpret (the set name, settings,
//! per-member tags, ...) are kept in `extra` so a read-modify-write cycle
//! hands them back untouched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{DocumentError, DEFAULT_MEMBER_PORT};

/// One member of the replica set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEntry {
    #[serde(rename = "_id")]
    pub id: u32,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// 0 means the member never becomes primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MemberEntry {
    pub fn new(id: u32, host: impl Into<String>, hidden: bool, priority: f64, votes: u32) -> Self {
        Self {
            id,
            host: host.into(),
            hidden: Some(hidden),
            priority: Some(priority),
            votes: Some(votes),
            extra: serde_json::Map::new(),
        }
    }
}

/// Versioned membership configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipDocument {
    pub version: u64,
    pub members: Vec<MemberEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of applying a registration to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberChange {
    Added { id: u32 },
    Updated { id: u32 },
    Unchanged { id: u32 },
}

impl MemberChange {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }

    pub fn id(&self) -> u32 {
        match *self {
            Self::Added { id } | Self::Updated { id } | Self::Unchanged { id } => id,
        }
    }
}

impl MembershipDocument {
    /// An empty document at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            members: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Validate and decode a document read from the data store.
    pub fn from_value(value: Option<serde_json::Value>) -> Result<Self, DocumentError> {
        let value = match value {
            None | Some(serde_json::Value::Null) => return Err(DocumentError::Missing),
            Some(v) => v,
        };
        let obj = value
            .as_object()
            .ok_or_else(|| DocumentError::Malformed("document is not an object".into()))?;
        if !obj.get("members").is_some_and(serde_json::Value::is_array) {
            return Err(DocumentError::InvalidMembers);
        }
        let doc: Self =
            serde_json::from_value(value).map_err(|e| DocumentError::Malformed(e.to_string()))?;
        doc.check_unique()?;
        Ok(doc)
    }

    fn check_unique(&self) -> Result<(), DocumentError> {
        let mut ids = HashSet::new();
        let mut hosts = HashSet::new();
        for m in &self.members {
            if !ids.insert(m.id) {
                return Err(DocumentError::Malformed(format!("duplicate member _id {}", m.id)));
            }
            if !hosts.insert(m.host.as_str()) {
                return Err(DocumentError::Malformed(format!("duplicate member host {}", m.host)));
            }
        }
        Ok(())
    }

    pub fn member_by_host(&self, host: &str) -> Option<&MemberEntry> {
        self.members.iter().find(|m| m.host == host)
    }

    pub fn contains_id(&self, id: u32) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn highest_id(&self) -> u32 {
        self.members.iter().map(|m| m.id).max().unwrap_or(0)
    }

    /// Add `host` or bring its attributes up to date.
    ///
    /// A new member gets `max(highest_id, id_floor) + 1`. Only attributes
    /// that differ are written, so re-registering with identical
    /// attributes reports [`MemberChange::Unchanged`]. Fails when the id
    /// space is exhausted.
    pub fn apply_registration(
        &mut self,
        host: &str,
        hidden: bool,
        priority: f64,
        votes: u32,
        id_floor: u32,
    ) -> Result<MemberChange, DocumentError> {
        if let Some(member) = self.members.iter_mut().find(|m| m.host == host) {
            let mut changed = false;
            if member.hidden != Some(hidden) {
                member.hidden = Some(hidden);
                changed = true;
            }
            if member.priority != Some(priority) {
                member.priority = Some(priority);
                changed = true;
            }
            if member.votes != Some(votes) {
                member.votes = Some(votes);
                changed = true;
            }
            return Ok(if changed {
                MemberChange::Updated { id: member.id }
            } else {
                MemberChange::Unchanged { id: member.id }
            });
        }

        let id = self
            .highest_id()
            .max(id_floor)
            .checked_add(1)
            .ok_or_else(|| DocumentError::Malformed(format!("no member id left for {host}")))?;
        self.members
            .push(MemberEntry::new(id, host, hidden, priority, votes));
        Ok(MemberChange::Added { id })
    }

    /// Remove the member with `id`, returning it.
    pub fn remove_id(&mut self, id: u32) -> Option<MemberEntry> {
        let pos = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(pos))
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Append the default member port to `host` when it has none.
///
/// Bare IPv6 addresses (as reported for a peer) are bracketed first.
pub fn normalize_host(host: &str) -> String {
    if host.starts_with('[') {
        return if host.contains("]:") {
            host.to_string()
        } else {
            format!("{host}:{DEFAULT_MEMBER_PORT}")
        };
    }
    match host.matches(':').count() {
        0 => format!("{host}:{DEFAULT_MEMBER_PORT}"),
        1 => host.to_string(),
        _ => format!("[{host}]:{DEFAULT_MEMBER_PORT}"),
    }
}
