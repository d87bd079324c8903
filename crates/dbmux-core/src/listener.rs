//! TCP front door for one logical database.
//!
//! Binds the database to a port from the reserved range, records it in the
//! host registry, and arbitrates every accepted socket through the pool before
//! handing it to the transport adapter together with the engine.
//!
//! # Thread Safety
//!
//! The accept loop runs in its own task and each connection runs in its own
//! spawned task. The socket that loses arbitration (`Busy`, capacity,
//! provisioning, boot failure) is dropped without reaching the adapter.
//!
//! Registering on start and unregistering on shutdown or drop are blocking
//! registry writes performed on the calling task.

use crate::config::{PoolConfig, PortConfig};
use crate::instance::{Engine, HolderId};
use crate::pool::InstancePool;
use crate::ports::PortAllocator;
use crate::registry::InstanceRegistry;
use crate::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Speaks the wire protocol on a granted connection.
///
/// `serve` owns the socket for the lifetime of the connection. Access to the
/// engine is exclusive until it returns, whether with `Ok` or `Err`.
#[async_trait::async_trait]
pub trait TransportAdapter: Send + Sync + 'static {
    async fn serve(&self, stream: TcpStream, engine: Arc<dyn Engine>) -> Result<()>;
}

/// Handle to a running listener. Dropping shuts it down.
pub struct ListenerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    name: String,
    registry_key: String,
    registry: Arc<InstanceRegistry>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    active_connections: Arc<AtomicUsize>,
}

impl ListenerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Database name this listener serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of this listener's registry entry.
    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }

    /// Connections currently being arbitrated or served.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Stop accepting, signal connection tasks, and unregister.
    ///
    /// Safe to call more than once; only the first call touches the registry.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        let _ = tx.send(());
        let _ = self.conn_shutdown_tx.send(true);

        info!("Listener for {} on port {} shutting down", self.name, self.port);
        self.registry.unregister(&self.registry_key)?;
        Ok(())
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to unregister {}: {}", self.registry_key, e);
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Accepts connections for one database.
pub struct InstanceListener;

impl InstanceListener {
    /// Allocate a port for `name`, bind it, register it, and start accepting.
    ///
    /// The registry entry is written only after the bind succeeds, so a
    /// failed start leaves no trace in the registry.
    pub async fn start<A: TransportAdapter>(
        pool: Arc<InstancePool>,
        allocator: &PortAllocator,
        name: &str,
        preferred: Option<u16>,
        adapter: Arc<A>,
    ) -> Result<ListenerHandle> {
        let registry_key = pool.registry_key(name);
        let port = allocator.allocate(&registry_key, preferred).await?;

        let listener = TcpListener::bind((PortConfig::PROBE_HOST, port)).await?;
        let addr = listener.local_addr()?;

        let registry = allocator.registry().clone();
        registry.register(&registry_key, port, std::process::id())?;
        info!("Serving {} on {}", name, addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            pool,
            name.to_string(),
            adapter,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections.clone(),
        ));

        Ok(ListenerHandle {
            addr,
            port,
            name: name.to_string(),
            registry_key,
            registry,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
            active_connections,
        })
    }

    async fn accept_loop<A: TransportAdapter>(
        listener: TcpListener,
        pool: Arc<InstancePool>,
        name: String,
        adapter: Arc<A>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Accept loop for {} stopped", name);
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= PoolConfig::MAX_LISTENER_CONNECTIONS {
                                warn!(
                                    "Rejecting connection from {} to {}: at max capacity ({})",
                                    peer_addr,
                                    name,
                                    PoolConfig::MAX_LISTENER_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let pool = pool.clone();
                            let adapter = adapter.clone();
                            let name = name.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Connection from {} for {}", peer_addr, name);
                                Self::handle_connection(stream, peer_addr, &pool, &name, &*adapter, &mut conn_shutdown).await;
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error on {}: {}", name, e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection<A: TransportAdapter>(
        stream: TcpStream,
        peer_addr: SocketAddr,
        pool: &InstancePool,
        name: &str,
        adapter: &A,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let holder = HolderId::next();
        let lease = match pool.acquire(name, holder, None).await {
            Ok(lease) => lease,
            Err(e) => {
                // Dropping the stream closes the socket
                warn!("Dropping connection from {} to {}: {}", peer_addr, name, e);
                return;
            }
        };

        let Some(engine) = lease.engine() else {
            warn!("Dropping connection from {}: {} has no engine", peer_addr, name);
            return;
        };

        debug!("{} granted {} for {}", holder, name, peer_addr);
        tokio::select! {
            result = adapter.serve(stream, engine) => {
                if let Err(e) = result {
                    debug!("Connection {} to {} ended: {}", peer_addr, name, e);
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("Connection {} to {} closed by shutdown", peer_addr, name);
            }
        }

        lease.release();
    }
}
