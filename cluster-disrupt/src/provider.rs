//! Link factories and registries.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::{Handle, Runtime};

use crate::config::DisruptionConfig;
use crate::error::DisruptionError;
use crate::link::{Disruptor, Endpoint, LinkKey, LinkState};
use crate::proxy::ProxyLink;

/// Creates and tracks the process's disruption links.
///
/// A process uses exactly one provider, constructed by the host application
/// and passed to whatever builds links.
pub trait DisruptionProvider: Send + Sync {
    /// Whether links are relays that peers must be pointed at.
    ///
    /// When true, peers reach a disrupted server through the link's source
    /// endpoint instead of the server's real address.
    fn is_proxy_based(&self) -> bool;

    /// Get or create the link for `(source, destination)`.
    ///
    /// Repeated calls with the same pair return the same link.
    fn create_link(
        &self,
        source: &Endpoint,
        destination: &Endpoint,
    ) -> Result<Arc<dyn Disruptor>, DisruptionError>;

    /// Close `link` and forget it.
    ///
    /// Close failures are logged; the link is unregistered regardless.
    fn remove_link(&self, link: &dyn Disruptor);

    /// Snapshot of the registered links.
    fn links(&self) -> Vec<Arc<dyn Disruptor>>;
}

/// [`DisruptionProvider`] backed by in-process TCP relays.
pub struct ProxyDisruptionProvider {
    config: DisruptionConfig,
    /// Present when the provider built its own runtime.
    runtime: Option<Runtime>,
    handle: Handle,
    links: DashMap<LinkKey, Arc<ProxyLink>>,
}

impl std::fmt::Debug for ProxyDisruptionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDisruptionProvider")
            .field("config", &self.config)
            .field("owns_runtime", &self.runtime.is_some())
            .field("links_count", &self.links.len())
            .finish()
    }
}

impl ProxyDisruptionProvider {
    /// Create a provider running relays on its own multi-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DisruptionError::Runtime`] if the runtime cannot be built.
    pub fn new(config: DisruptionConfig) -> Result<Self, DisruptionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("clusterkit-relay")
            .enable_all()
            .build()
            .map_err(DisruptionError::Runtime)?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            "Started relay runtime with {} worker threads",
            config.worker_threads
        );
        Ok(Self {
            config,
            runtime: Some(runtime),
            handle,
            links: DashMap::new(),
        })
    }

    /// Create a provider spawning relays on an existing runtime.
    pub fn with_handle(config: DisruptionConfig, handle: Handle) -> Self {
        Self {
            config,
            runtime: None,
            handle,
            links: DashMap::new(),
        }
    }

    /// The concrete relay for `(source, destination)`, if registered.
    pub fn proxy_link(&self, source: &Endpoint, destination: &Endpoint) -> Option<Arc<ProxyLink>> {
        self.links
            .get(&LinkKey::new(source.clone(), destination.clone()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn bind(&self, key: LinkKey) -> Result<Arc<ProxyLink>, DisruptionError> {
        ProxyLink::bind(key, &self.handle, self.config.buffer_size).map(Arc::new)
    }
}

impl DisruptionProvider for ProxyDisruptionProvider {
    fn is_proxy_based(&self) -> bool {
        true
    }

    fn create_link(
        &self,
        source: &Endpoint,
        destination: &Endpoint,
    ) -> Result<Arc<dyn Disruptor>, DisruptionError> {
        let key = LinkKey::new(source.clone(), destination.clone());

        let link = match self.links.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().state() != LinkState::Closed {
                    return Ok(Arc::clone(entry.get()) as Arc<dyn Disruptor>);
                }
                tracing::debug!("Replacing closed link {}", key);
                let link = self.bind(key)?;
                entry.insert(Arc::clone(&link));
                link
            }
            Entry::Vacant(entry) => {
                let link = self.bind(key)?;
                entry.insert(Arc::clone(&link));
                link
            }
        };

        Ok(link as Arc<dyn Disruptor>)
    }

    fn remove_link(&self, link: &dyn Disruptor) {
        let key = link.key();
        if let Err(e) = link.close() {
            tracing::warn!("Failed to close link {}: {}", key, e);
        }

        // Only forget the registered link if it is this very object
        let removed = self
            .links
            .remove_if(&key, |_, registered| {
                std::ptr::addr_eq(Arc::as_ptr(registered), std::ptr::from_ref(link))
            })
            .is_some();
        if removed {
            tracing::info!("Removed link {}", key);
        } else {
            tracing::debug!("Link {} was not registered", key);
        }
    }

    fn links(&self) -> Vec<Arc<dyn Disruptor>> {
        self.links
            .iter()
            .map(|entry| Arc::clone(entry.value()) as Arc<dyn Disruptor>)
            .collect()
    }
}

impl Drop for ProxyDisruptionProvider {
    fn drop(&mut self) {
        for entry in self.links.iter() {
            if let Err(e) = entry.value().close() {
                tracing::warn!("Failed to close link {} on shutdown: {}", entry.key(), e);
            }
        }
        self.links.clear();

        // Dropping a runtime from inside async code panics; never block here
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
