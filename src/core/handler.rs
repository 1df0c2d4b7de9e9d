//! The connection handler seam and the cell holding the active handler.

use arc_swap::ArcSwapOption;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;

/// Boxed future returned by [`Handler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A connection handler: the unit of logic that hot-reloads.
///
/// The server dispatches each accepted connection to the handler on its own
/// task. What protocol runs on the stream is entirely up to the handler.
///
/// Implemented automatically for async closures, which is the common case:
///
/// ```rust
/// use std::net::SocketAddr;
/// use tokio::io::AsyncWriteExt;
/// use tokio::net::TcpStream;
/// use watchserve::prelude::*;
///
/// fn greeter(greeting: String) -> impl Handler {
///     move |mut stream: TcpStream, _peer: SocketAddr| {
///         let greeting = greeting.clone();
///         async move {
///             let _ = stream.write_all(greeting.as_bytes()).await;
///         }
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handle one accepted connection.
    fn handle(&self, stream: TcpStream, peer: SocketAddr) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, stream: TcpStream, peer: SocketAddr) -> HandlerFuture {
        Box::pin(self(stream, peer))
    }
}

/// Shared, reference-counted handler as seen by serve cycles.
pub(crate) type HandlerRef = Arc<Box<dyn Handler>>;

/// Single-writer cell holding the active handler.
///
/// The reload coordinator is the only writer; serve cycles take lock-free
/// snapshots at spawn time and keep them for their whole run. `None` means
/// no handler is installed (mid-rebuild, or a rebuild that never called
/// install): connections are accepted and closed immediately.
pub(crate) struct HandlerCell {
    current: ArcSwapOption<Box<dyn Handler>>,
}

impl HandlerCell {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwapOption::const_empty(),
        }
    }

    /// Atomically replace the active handler.
    pub(crate) fn install<H: Handler>(&self, handler: H) {
        let boxed: Box<dyn Handler> = Box::new(handler);
        self.current.store(Some(Arc::new(boxed)));
    }

    /// Drop the active handler; the next snapshot sees `None`.
    pub(crate) fn clear(&self) {
        self.current.store(None);
    }

    /// Lock-free snapshot of the current handler.
    pub(crate) fn snapshot(&self) -> Option<HandlerRef> {
        self.current.load_full()
    }
}
