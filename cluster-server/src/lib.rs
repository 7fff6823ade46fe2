//! # cluster-server
//!
//! Lifecycle of clustered-server processes under test.
//!
//! - [`ServerInstance`] - One topology member: spawn, observe, stop, and cut
//!   it off from its peers
//! - [`ServerProcessHandle`] - Process ids plus the externally published
//!   [`ServerState`](cluster_types::ServerState)
//! - [`DistributionController`] - The product-specific collaborator that
//!   actually spawns and kills processes
//! - [`ProcessProbe`] - OS process liveness ([`SysinfoProbe`] by default)
//! - [`Config`] - TOML configuration for ports, relays and polling
//!
//! Waiting is synchronous: `wait_for_state` polls on the calling thread and
//! fails as soon as the process is found dead.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod instance;
pub mod process;

pub use config::{Config, ConfigError, LifecycleConfig};
pub use controller::{DistributionController, ProxiedPorts};
pub use error::{PidFailure, ServerError};
pub use handle::{PollSettings, ProcessSpawn, ServerProcessHandle};
pub use instance::{InstanceContext, ServerInstance};
pub use process::{Pid, ProcessProbe, SysinfoProbe};
