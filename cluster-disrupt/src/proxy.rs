//! TCP relay realizing one [`Disruptor`] link.
//!
//! Each link owns one accept task on the tokio runtime. The accept task owns
//! the listener and a `JoinSet` of per-connection relay tasks, so aborting it
//! on close drops the listener and every relayed connection at once.
//!
//! Disruption is a `watch<bool>` gate shared with every pump. While frozen a
//! pump neither reads nor writes, and a freshly accepted connection waits
//! before dialing the destination. Bytes already read when the gate closes are
//! held until it opens again.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::DisruptionError;
use crate::link::{Disruptor, Endpoint, LinkKey, LinkState};

/// A proxy-based link: relay listening on `source`, forwarding to `destination`.
#[derive(Debug)]
pub struct ProxyLink {
    key: LinkKey,
    local_addr: SocketAddr,
    state: Mutex<LinkState>,
    frozen: watch::Sender<bool>,
    connections: Arc<AtomicUsize>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyLink {
    /// Bind the relay on `key.source` and start accepting on `runtime`.
    ///
    /// Binding happens synchronously, so a taken source port fails here.
    ///
    /// # Errors
    ///
    /// Returns [`DisruptionError::Bind`] if the source endpoint cannot be bound.
    pub fn bind(key: LinkKey, runtime: &Handle, buffer_size: usize) -> Result<Self, DisruptionError> {
        let bind_error = |source| DisruptionError::Bind {
            endpoint: key.source.clone(),
            source,
        };

        let listener = std::net::TcpListener::bind((key.source.host(), key.source.port()))
            .map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let (frozen, gate) = watch::channel(false);
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_task = runtime.spawn(accept_loop(
            listener,
            key.clone(),
            gate,
            Arc::clone(&connections),
            buffer_size.max(1),
        ));

        tracing::info!("Link {} listening on {}", key, local_addr);
        Ok(Self {
            key,
            local_addr,
            state: Mutex::new(LinkState::Undisrupted),
            frozen,
            connections,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    /// Address the relay actually listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently relayed (including frozen ones).
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_relay(&self) {
        let task = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Disruptor for ProxyLink {
    fn source(&self) -> &Endpoint {
        &self.key.source
    }

    fn destination(&self) -> &Endpoint {
        &self.key.destination
    }

    fn key(&self) -> LinkKey {
        self.key.clone()
    }

    fn state(&self) -> LinkState {
        *self.lock_state()
    }

    fn disrupt(&self) -> Result<(), DisruptionError> {
        let mut state = self.lock_state();
        match *state {
            LinkState::Undisrupted => {
                self.frozen.send_replace(true);
                *state = LinkState::Disrupted;
                tracing::info!("Disrupted link {}", self.key);
                Ok(())
            }
            LinkState::Disrupted => Err(DisruptionError::IllegalState {
                key: self.key.clone(),
                state: *state,
                operation: "disrupt",
            }),
            LinkState::Closed => Err(DisruptionError::LinkClosed(self.key.clone())),
        }
    }

    fn undisrupt(&self) -> Result<(), DisruptionError> {
        let mut state = self.lock_state();
        match *state {
            LinkState::Undisrupted => Ok(()),
            LinkState::Disrupted => {
                self.frozen.send_replace(false);
                *state = LinkState::Undisrupted;
                tracing::info!("Restored link {}", self.key);
                Ok(())
            }
            LinkState::Closed => Err(DisruptionError::LinkClosed(self.key.clone())),
        }
    }

    fn close(&self) -> Result<(), DisruptionError> {
        let mut state = self.lock_state();
        if *state == LinkState::Closed {
            return Ok(());
        }
        self.stop_relay();
        *state = LinkState::Closed;
        tracing::info!("Closed link {}", self.key);
        Ok(())
    }
}

impl Drop for ProxyLink {
    fn drop(&mut self) {
        self.stop_relay();
    }
}

// ============================================================================
// Relay tasks
// ============================================================================

/// Counts one live relayed connection for as long as it exists.
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn accept_loop(
    listener: std::net::TcpListener,
    key: LinkKey,
    gate: watch::Receiver<bool>,
    connections: Arc<AtomicUsize>,
    buffer_size: usize,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Link {} could not register its listener: {}", key, e);
            return;
        }
    };

    let mut relays = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((inbound, peer)) => {
                    tracing::debug!("Link {} accepted {}", key, peer);
                    relays.spawn(relay(
                        inbound,
                        ConnectionGuard::new(&connections),
                        key.destination.clone(),
                        gate.clone(),
                        buffer_size,
                    ));
                }
                Err(e) => tracing::debug!("Link {} accept failed: {}", key, e),
            },
            Some(_) = relays.join_next(), if !relays.is_empty() => {}
        }
    }
}

async fn relay(
    inbound: TcpStream,
    _guard: ConnectionGuard,
    destination: Endpoint,
    mut gate: watch::Receiver<bool>,
    buffer_size: usize,
) {
    // Accepted while frozen: hold the client without dialing
    if wait_open(&mut gate).await.is_err() {
        return;
    }

    let outbound = match TcpStream::connect((destination.host(), destination.port())).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!("Relay to {} failed to connect: {}", destination, e);
            return;
        }
    };

    let (inbound_read, inbound_write) = inbound.into_split();
    let (outbound_read, outbound_write) = outbound.into_split();

    let (upstream, downstream) = tokio::join!(
        pump(inbound_read, outbound_write, gate.clone(), buffer_size),
        pump(outbound_read, inbound_write, gate, buffer_size),
    );
    tracing::debug!(
        "Relay to {} finished: upstream {:?}, downstream {:?}",
        destination,
        upstream,
        downstream
    );
}

/// Copy one direction until EOF, honouring the freeze gate.
async fn pump(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut gate: watch::Receiver<bool>,
    buffer_size: usize,
) -> io::Result<u64> {
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        wait_open(&mut gate).await?;

        let n = tokio::select! {
            read = reader.read(&mut buf) => read?,
            _ = wait_frozen(&mut gate) => continue,
        };
        if n == 0 {
            // A FIN is traffic too
            wait_open(&mut gate).await?;
            writer.shutdown().await?;
            return Ok(total);
        }

        // Frozen between the read and the write: hold the bytes
        wait_open(&mut gate).await?;
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

async fn wait_frozen(gate: &mut watch::Receiver<bool>) {
    let _ = gate.wait_for(|frozen| *frozen).await;
}

async fn wait_open(gate: &mut watch::Receiver<bool>) -> io::Result<()> {
    gate.wait_for(|frozen| !*frozen)
        .await
        .map(|_| ())
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "link dropped"))
}
