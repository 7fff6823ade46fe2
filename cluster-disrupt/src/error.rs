//! Error types for cluster-disrupt.

use std::io;

use crate::link::{Endpoint, LinkKey, LinkState};

/// Errors from link creation and state transitions.
#[derive(Debug, thiserror::Error)]
pub enum DisruptionError {
    /// The transition is not legal from the link's current state.
    #[error("cannot {operation} link {key} while {state}")]
    IllegalState {
        /// The link.
        key: LinkKey,
        /// State the link was in.
        state: LinkState,
        /// Attempted operation.
        operation: &'static str,
    },

    /// The link was closed; closed links never come back.
    #[error("link {0} is closed")]
    LinkClosed(LinkKey),

    /// The relay could not listen on the source endpoint.
    #[error("failed to bind relay on {endpoint}: {source}")]
    Bind {
        /// Source endpoint of the link.
        endpoint: Endpoint,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The provider's runtime could not be built.
    #[error("failed to start relay runtime: {0}")]
    Runtime(#[source] io::Error),

    /// An endpoint string was not `host:port`.
    #[error("invalid endpoint {0:?}, expected host:port")]
    InvalidEndpoint(String),
}
