//! Replica set maintainer protocol - core types and frame definitions
//!
//! Shared by the node-side agent and the central maintainer: the JSON
//! frames exchanged over a transport session, the membership document the
//! maintainer rewrites, and the cluster status snapshot it sweeps.

pub mod constants;
pub mod error;
pub mod frames;
pub mod membership;
pub mod status;

pub use constants::*;
pub use error::*;
pub use frames::*;
pub use membership::*;
pub use status::*;
