//! # cluster-scenarios
//!
//! End-to-end scenarios for clusterkit.
//!
//! This crate wires every clusterkit crate together against real sockets and
//! real OS processes:
//! - Network partitions through proxy relays
//! - Concurrent port reservation races
//! - Server lifecycle including unexpected process death

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
