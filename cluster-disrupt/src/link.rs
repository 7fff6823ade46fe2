//! Link identity, state, and the [`Disruptor`] capability.

use std::fmt;
use std::str::FromStr;

use crate::error::DisruptionError;

/// A `host:port` network endpoint.
///
/// Hosts are kept as given (no resolution), so `localhost:9410` and
/// `127.0.0.1:9410` are different endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<(&str, u16)> for Endpoint {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl FromStr for Endpoint {
    type Err = DisruptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DisruptionError::InvalidEndpoint(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        // Bracketed IPv6 literals: [::1]:9410
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Identity of a link: its (source, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    /// Where the relay listens.
    pub source: Endpoint,
    /// Where the relay forwards to.
    pub destination: Endpoint,
}

impl LinkKey {
    /// Create a key.
    pub fn new(source: Endpoint, destination: Endpoint) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// State of a link.
///
/// `Undisrupted` and `Disrupted` alternate any number of times; `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Traffic flows.
    Undisrupted,
    /// Traffic is frozen.
    Disrupted,
    /// The relay is gone.
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Undisrupted => "UNDISRUPTED",
            LinkState::Disrupted => "DISRUPTED",
            LinkState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// One controllable, unidirectional network path.
pub trait Disruptor: Send + Sync + fmt::Debug {
    /// Endpoint traffic enters the link on.
    fn source(&self) -> &Endpoint;

    /// Endpoint traffic leaves the link for.
    fn destination(&self) -> &Endpoint;

    /// Identity of this link.
    fn key(&self) -> LinkKey {
        LinkKey::new(self.source().clone(), self.destination().clone())
    }

    /// Current state.
    fn state(&self) -> LinkState;

    /// Cut the link.
    ///
    /// # Errors
    ///
    /// [`DisruptionError::IllegalState`] if already disrupted,
    /// [`DisruptionError::LinkClosed`] if closed.
    fn disrupt(&self) -> Result<(), DisruptionError>;

    /// Heal the link. A no-op on an undisrupted link.
    ///
    /// # Errors
    ///
    /// [`DisruptionError::LinkClosed`] if closed.
    fn undisrupt(&self) -> Result<(), DisruptionError>;

    /// Tear the link down for good. Idempotent.
    fn close(&self) -> Result<(), DisruptionError>;
}
