//! Error types for the cluster membership model.

use thiserror::Error;

/// Errors raised while building or reconfiguring a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A stripe must contain at least one server
    #[error("stripe must contain at least one server")]
    EmptyStripe,

    /// Symbolic names identify servers, so they must be unique
    #[error("duplicate server symbolic name: {0}")]
    DuplicateServer(String),

    /// No server with this symbolic name exists
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// Removing this server would leave its stripe empty
    #[error("cannot remove {0}: it is the last server of its stripe")]
    LastServerInStripe(String),

    /// Stripe index out of range
    #[error("stripe index {index} out of range ({count} stripes)")]
    StripeOutOfRange {
        /// Requested index
        index: usize,
        /// Number of stripes in the topology
        count: usize,
    },

    /// A topology needs at least one stripe
    #[error("topology must contain at least one stripe")]
    NoStripes,

    /// Invalid server description
    #[error("invalid server: {0}")]
    InvalidServer(String),

    /// TOML topology description could not be parsed
    #[error("topology parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
