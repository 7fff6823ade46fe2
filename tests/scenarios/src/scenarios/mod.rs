//! End-to-end scenarios.
//!
//! - `partition` - one-direction partitions through proxy relays, by hand and
//!   through topology-built instances
//! - `ports` - threads, rival choosers and a child process racing for ports
//! - `lifecycle` - start, crash and stop of local `sleep` servers
//!
//! Scenarios that spawn processes run `#[serial]`; the rest run in parallel,
//! each against its own [`ClusterHarness`](crate::harness::ClusterHarness).

pub mod lifecycle;
pub mod ports;
