//! Replica set maintainer
//!
//! Accepts registrations from node agents over WebSocket sessions,
//! reconciles them into the data store's membership document, and
//! periodically evicts members that have been dead for too long.

pub mod admin;
pub mod advertise;
pub mod config;
pub mod error;
pub mod http_admin;
pub mod just_added;
pub mod maintainer;
pub mod reconcile;
pub mod registry;
pub mod server;
pub mod sweep;
pub mod topology;

pub use admin::{AdminApi, AdminError, MemoryAdmin};
pub use config::MaintainerConfig;
pub use error::MaintainerError;
pub use http_admin::HttpAdmin;
pub use just_added::JustAddedRegistry;
pub use maintainer::Maintainer;
pub use reconcile::{Reconciled, Reconciler};
pub use registry::{ClientId, ConnectionRegistry, SessionMessage};
pub use sweep::{EvictionSweep, SweepReport};
pub use topology::{TopologyHealth, TopologyMonitor};
