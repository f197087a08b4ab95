//! Hosts added recently enough to be exempt from eviction.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Host → time it was last added or updated by the maintainer.
///
/// Written only by the reconciliation engine, read only by the eviction
/// sweep. An entry lives until a check finds its grace period elapsed.
pub struct JustAddedRegistry {
    entries: HashMap<String, DateTime<Utc>>,
    grace: Duration,
}

impl JustAddedRegistry {
    pub fn new(grace: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            grace,
        }
    }

    pub fn record(&mut self, host: &str, at: DateTime<Utc>) {
        self.entries.insert(host.to_string(), at);
    }

    /// Whether `host` is still inside its grace window at `at`.
    ///
    /// An expired entry is dropped, so the host is treated like any other
    /// member from then on.
    pub fn is_within_grace(&mut self, host: &str, at: DateTime<Utc>) -> bool {
        let Some(added) = self.entries.get(host).copied() else {
            return false;
        };
        if within(self.grace, added, at) {
            return true;
        }
        self.entries.remove(host);
        false
    }

    /// Drop every entry whose grace window has elapsed at `at`.
    pub fn prune(&mut self, at: DateTime<Utc>) {
        let grace = self.grace;
        self.entries.retain(|_, added| within(grace, *added, at));
    }

    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// A time before the add is always inside the window.
fn within(grace: Duration, added: DateTime<Utc>, at: DateTime<Utc>) -> bool {
    at.signed_duration_since(added)
        .to_std()
        .map_or(true, |age| age < grace)
}
