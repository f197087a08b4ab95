//! Replica set agent
//!
//! Runs next to a data store node, holds one WebSocket session to the
//! maintainer and keeps the node registered: it pings to detect dead
//! sessions, retries registrations and reconnects whenever the session is
//! lost.

pub mod config;
pub mod driver;
pub mod error;
pub mod machine;
pub mod resolve;

pub use config::AgentConfig;
pub use driver::Agent;
pub use error::AgentError;
pub use machine::{Action, AgentMachine, AgentState, Event, MachineOptions};
pub use resolve::{Resolve, ServerAddress, SrvResolver};
