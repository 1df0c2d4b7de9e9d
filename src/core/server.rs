//! The watch server handle and listener binding.

use crate::core::handler::{Handler, HandlerCell};
use crate::error::{Result, ServerError};
use crate::notify::FileWatcher;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};

/// Address used when the caller passes an empty bind address.
const DEFAULT_ADDR: &str = "0.0.0.0:80";

/// A server whose connection handler is rebuilt whenever a watched file
/// changes, on the same listening socket for the life of the process.
///
/// The handle is cheap to clone; all clones share the watch subscription,
/// the pending-change channel, and the handler cell. A clone is passed to
/// the rebuild callback on every reload cycle so it can await
/// [`next_change`](Self::next_change) and call
/// [`set_handler`](Self::set_handler).
///
/// # Examples
///
/// ```rust,no_run
/// use std::net::SocketAddr;
/// use tokio::net::TcpStream;
/// use watchserve::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let server = WatchServer::new("handlers.conf")?;
/// server
///     .listen_and_serve("127.0.0.1:4000", |server: WatchServer| async move {
///         let Some(_path) = server.next_change().await else { return };
///         server.set_handler(|_stream: TcpStream, _peer: SocketAddr| async {});
///     })
///     .await
/// # }
/// ```
pub struct WatchServer {
    pub(crate) handlers: Arc<HandlerCell>,
    changes: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    watcher: Arc<FileWatcher>,
}

impl WatchServer {
    /// Create a server watching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::WatchRegistration`] if the path cannot be
    /// subscribed to. Fatal: a server must not start without a working
    /// watch.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let (watcher, changes) = FileWatcher::watch(path)?;
        Ok(Self {
            handlers: Arc::new(HandlerCell::new()),
            changes: Arc::new(Mutex::new(changes)),
            watcher: Arc::new(watcher),
        })
    }

    /// The canonicalized path under observation.
    pub fn watched_path(&self) -> &Path {
        self.watcher.path()
    }

    /// Install a new connection handler.
    ///
    /// Meant to be called from within the rebuild callback. Serve cycles
    /// spawned after the current reload completes pick the new handler up;
    /// cycles already running keep the one they started with.
    pub fn set_handler<H: Handler>(&self, handler: H) {
        self.handlers.install(handler);
    }

    /// Await the next pending change to the watched file.
    ///
    /// This is the rebuild callback's designated blocking point. The channel
    /// is primed at construction, so the very first call returns immediately
    /// with the watched path. At most one change is pending at a time;
    /// changes arriving faster than rebuilds consume them are coalesced.
    ///
    /// Returns `None` only if the watch subscription has gone away.
    pub async fn next_change(&self) -> Option<PathBuf> {
        self.changes.lock().await.recv().await
    }

    /// Bind the listening socket. This happens exactly once; every reload
    /// cycle reuses the same listener.
    ///
    /// An empty `addr` falls back to `0.0.0.0:80`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound. Fatal;
    /// there is no retry.
    pub async fn bind(&self, addr: &str) -> Result<BoundServer> {
        let addr = if addr.is_empty() { DEFAULT_ADDR } else { addr };
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: addr.to_string(),
                    source,
                })?;
        tracing::info!(addr = %listener.local_addr()?, "listening socket bound");
        Ok(BoundServer {
            server: self.clone(),
            listener,
        })
    }

    /// Bind `addr` and serve forever, rebuilding the handler on each change
    /// to the watched file.
    ///
    /// Convenience for [`bind`](Self::bind) followed by
    /// [`serve`](BoundServer::serve). Returns only on a fatal bind error.
    pub async fn listen_and_serve<F, Fut>(&self, addr: &str, rebuild: F) -> Result<()>
    where
        F: Fn(WatchServer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bind(addr).await?.serve(rebuild).await
    }
}

impl Clone for WatchServer {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            changes: Arc::clone(&self.changes),
            watcher: Arc::clone(&self.watcher),
        }
    }
}

/// A [`WatchServer`] with its listening socket bound.
///
/// Splitting bind from serve lets callers learn the bound address (useful
/// with port 0) before serving starts.
pub struct BoundServer {
    pub(crate) server: WatchServer,
    pub(crate) listener: TcpListener,
}

impl BoundServer {
    /// The locally bound address. Stable across reload cycles.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
