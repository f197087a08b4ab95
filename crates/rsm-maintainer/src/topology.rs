//! Watches whether the data store is still reachable at all.
//!
//! Without a primary the maintainer cannot make authoritative membership
//! decisions. One snapshot without a primary is tolerated as long as a
//! secondary is still healthy; a second in a row, or a snapshot where no
//! instance is healthy, is fatal.

use rsm_protocol::ClusterStatus;

use crate::{AdminError, MaintainerError};

/// Consecutive no-primary observations tolerated before giving up.
const MAX_NO_PRIMARY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyHealth {
    Healthy,
    NoPrimary { streak: u32 },
}

#[derive(Debug, Default)]
pub struct TopologyMonitor {
    no_primary_streak: u32,
}

impl TopologyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one status poll.
    pub fn observe(
        &mut self,
        status: Result<&ClusterStatus, &AdminError>,
    ) -> Result<TopologyHealth, MaintainerError> {
        let status = match status {
            Ok(s) if s.usable_members().is_some() => s,
            Ok(_) => {
                tracing::error!("Replica set status is not ok");
                return self.no_primary();
            }
            Err(e) => {
                tracing::error!(error = %e, "Error querying replica set status");
                return self.no_primary();
            }
        };

        if status.has_primary() {
            if self.no_primary_streak > 0 {
                tracing::info!("Primary is reachable again");
            }
            self.no_primary_streak = 0;
            return Ok(TopologyHealth::Healthy);
        }

        let secondaries = status.healthy_secondaries();
        tracing::error!(
            secondaries,
            streak = self.no_primary_streak,
            "Data store lost connection to primary"
        );
        if secondaries == 0 {
            tracing::error!("Lost connection to all data store instances");
            return Err(MaintainerError::DataStoreLost);
        }
        self.no_primary()
    }

    fn no_primary(&mut self) -> Result<TopologyHealth, MaintainerError> {
        if self.no_primary_streak >= MAX_NO_PRIMARY {
            tracing::error!("Lost connection to all data store instances");
            return Err(MaintainerError::DataStoreLost);
        }
        self.no_primary_streak += 1;
        Ok(TopologyHealth::NoPrimary {
            streak: self.no_primary_streak,
        })
    }
}
