//! The reload coordinator and the accept loop.
//!
//! Two tasks drive every reload cycle. The coordinator clears the handler
//! cell, runs the rebuild callback (which blocks inside
//! [`WatchServer::next_change`] until the file changes), then hands the
//! freshly installed handler to the accept loop through the single-slot
//! rendezvous channel. The accept loop retires the previous serve cycle and
//! spawns a new one on the same listener with the handler it received.
//!
//! Because the handler snapshot travels with the rendezvous signal, a serve
//! cycle can never observe a handler mid-construction: clear happens-before
//! rebuild, rebuild happens-before the rendezvous send, and the accept loop
//! only spawns after the receive completes.

use crate::core::handler::HandlerRef;
use crate::core::server::{BoundServer, WatchServer};
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

impl BoundServer {
    /// Serve forever on the bound listener, rebuilding the handler on every
    /// change to the watched file.
    ///
    /// The rebuild callback is invoked once before the first serve cycle
    /// (the change channel is primed, so a callback that always awaits
    /// [`WatchServer::next_change`] runs through immediately), then once per
    /// change event. Before each subsequent invocation the active handler is
    /// cleared; the callback must call [`WatchServer::set_handler`] before
    /// returning, otherwise newly accepted connections are closed without
    /// dispatch until the next successful rebuild. Rebuild failures are the
    /// callback's own concern; the server neither inspects nor catches them.
    ///
    /// Each serve cycle runs against the handler snapshot taken when it was
    /// spawned. On reload the previous cycle stops accepting, but
    /// connections it already dispatched finish against the handler they
    /// started with.
    ///
    /// Runs until the process exits. Returns early only if the reload
    /// coordinator stops, which happens when the rebuild callback panics.
    pub async fn serve<F, Fut>(self, rebuild: F) -> Result<()>
    where
        F: Fn(WatchServer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let BoundServer { server, listener } = self;
        let listener = Arc::new(listener);
        let rebuild = Arc::new(rebuild);

        // Initial handler construction, before any serving.
        rebuild(server.clone()).await;
        let mut handler = server.handlers.snapshot();

        let (resume_tx, mut resume_rx) = mpsc::channel(1);
        spawn_reload_loop(server, Arc::clone(&rebuild), resume_tx);

        let mut cycle: Option<JoinHandle<()>> = None;
        loop {
            // Retire the previous cycle's accept task; connections it has
            // already dispatched keep running.
            if let Some(previous) = cycle.take() {
                previous.abort();
            }
            cycle = Some(tokio::spawn(serve_cycle(Arc::clone(&listener), handler)));

            match resume_rx.recv().await {
                Some(rebuilt) => handler = rebuilt,
                // Coordinator gone; nothing will ever signal a reload again.
                None => return Ok(()),
            }
        }
    }
}

/// Spawn the reload coordinator task.
///
/// Sends one rendezvous signal per completed rebuild, carrying the handler
/// snapshot taken after the callback returned. The cell is cleared before
/// each rebuild so a callback that fails to install leaves the next cycle
/// with no handler rather than a stale one.
fn spawn_reload_loop<F, Fut>(
    server: WatchServer,
    rebuild: Arc<F>,
    resume_tx: mpsc::Sender<Option<HandlerRef>>,
) where
    F: Fn(WatchServer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            server.handlers.clear();
            rebuild(server.clone()).await;
            tracing::info!("handler rebuilt, resuming accept loop");
            if resume_tx.send(server.handlers.snapshot()).await.is_err() {
                break;
            }
        }
    });
}

/// One run of the accept-and-dispatch loop, bound to a fixed handler value
/// and the shared listener. Runs until aborted by the next reload.
async fn serve_cycle(listener: Arc<TcpListener>, handler: Option<HandlerRef>) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "serve cycle started");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => match &handler {
                Some(handler) => {
                    let handler = Arc::clone(handler);
                    tokio::spawn(async move {
                        handler.handle(stream, peer).await;
                    });
                }
                None => {
                    // Rebuild pending or failed: close immediately.
                    tracing::debug!(%peer, "no handler installed, closing connection");
                    drop(stream);
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
