//! # cluster-types
//!
//! Cluster membership model for clusterkit.
//!
//! This crate provides the foundational types shared by every other clusterkit crate:
//! - [`Server`], [`ServerPorts`], [`ServerSymbolicName`] - One cluster member and its ports
//! - [`Stripe`] - An ordered replica set (one active, the rest passive)
//! - [`Topology`] - The full cluster under test, including whether network
//!   disruption is enabled and which peers each server must be able to cut off
//! - [`ServerState`] - Observed lifecycle state of a server process
//! - [`TopologyError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod server;
mod state;
mod topology;

pub use error::TopologyError;
pub use server::{Server, ServerPorts, ServerSymbolicName};
pub use state::ServerState;
pub use topology::{Distribution, PeerPolicy, Stripe, Topology};
