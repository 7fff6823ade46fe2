//! # cluster-disrupt
//!
//! Network partition simulation for cluster tests.
//!
//! A [`Disruptor`] is one unidirectional logical link between two endpoints.
//! The proxy-based implementation ([`ProxyLink`]) is a TCP relay listening on
//! the source endpoint and forwarding to the destination. Disrupting a link
//! *freezes* the relay instead of tearing it down: open connections stall and
//! new ones are accepted but never forwarded, so peers see timeouts rather
//! than resets, which is what a real partition looks like.
//!
//! Links are created and tracked by a [`DisruptionProvider`]. The host
//! application constructs one provider and injects it wherever links are
//! needed; there is no implicit global.
//!
//! ```ignore
//! let provider = ProxyDisruptionProvider::new(DisruptionConfig::default())?;
//! let link = provider.create_link(&"localhost:9510".parse()?, &"localhost:9410".parse()?)?;
//! link.disrupt()?;   // partition
//! link.undisrupt()?; // heal
//! provider.remove_link(link.as_ref());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod link;
pub mod provider;
pub mod proxy;

pub use config::DisruptionConfig;
pub use error::DisruptionError;
pub use link::{Disruptor, Endpoint, LinkKey, LinkState};
pub use provider::{DisruptionProvider, ProxyDisruptionProvider};
pub use proxy::ProxyLink;
