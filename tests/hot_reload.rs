//! End-to-end reload tests over real sockets.
//!
//! The rebuild callback used throughout installs a handler that writes the
//! watched file's current content to every connection, so the response body
//! tells which handler version a connection was served by.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use watchserve::prelude::*;

/// Bind on an ephemeral port and serve in the background. Each reload reads
/// the watched file and installs a handler echoing its content.
async fn start(path: &Path) -> (SocketAddr, Arc<AtomicUsize>) {
    let server = WatchServer::new(path).unwrap();
    let bound = server.bind("127.0.0.1:0").await.unwrap();
    let addr = bound.local_addr().unwrap();

    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reloads);
    tokio::spawn(async move {
        bound
            .serve(move |server: WatchServer| {
                let counter = Arc::clone(&counter);
                async move {
                    let Some(path) = server.next_change().await else {
                        return;
                    };
                    let tag = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                    counter.fetch_add(1, Ordering::SeqCst);
                    server.set_handler(move |mut stream: TcpStream, _peer: SocketAddr| {
                        let tag = tag.clone();
                        async move {
                            let _ = stream.write_all(tag.as_bytes()).await;
                        }
                    });
                }
            })
            .await
            .unwrap();
    });

    (addr, reloads)
}

/// Connect once and read the full response.
async fn fetch(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut body = String::new();
    stream.read_to_string(&mut body).await.unwrap();
    body
}

/// Poll until a connection to `addr` returns `expected`, bounded by a
/// timeout. Covers the watcher-to-reload propagation delay.
async fn fetch_until(addr: SocketAddr, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let body = timeout(Duration::from_secs(5), fetch(addr)).await.unwrap();
        if body == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for response {expected:?}, last saw {body:?}"
        );
        sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn test_initial_handler_serves_before_any_change() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("h.conf");
    fs::write(&path, "A").unwrap();

    let (addr, reloads) = start(&path).await;

    // The primed change channel drives the initial rebuild; no edit needed.
    let body = timeout(Duration::from_secs(10), fetch(addr)).await.unwrap();
    assert_eq!(body, "A");
    assert!(reloads.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_reload_on_change_keeps_port() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("h.conf");
    fs::write(&path, "A").unwrap();

    let (addr, reloads) = start(&path).await;
    fetch_until(addr, "A").await;

    fs::write(&path, "B").unwrap();
    // Same address before and after: the listener is never re-bound.
    fetch_until(addr, "B").await;
    assert!(reloads.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_rapid_changes_coalesce_to_latest_content() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("h.conf");
    fs::write(&path, "A").unwrap();

    let (addr, _reloads) = start(&path).await;
    fetch_until(addr, "A").await;

    // Two writes before the coordinator can consume the first. The signal
    // channel holds at most one pending change, so the second event may be
    // dropped; the rebuild still reads the latest content.
    fs::write(&path, "B").unwrap();
    fs::write(&path, "C").unwrap();

    fetch_until(addr, "C").await;

    // The server neither deadlocked nor crashed; it still answers.
    let body = timeout(Duration::from_secs(5), fetch(addr)).await.unwrap();
    assert_eq!(body, "C");
}

#[tokio::test]
async fn test_repeated_reload_cycles_on_one_listener() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("h.conf");
    fs::write(&path, "v0").unwrap();

    let (addr, _reloads) = start(&path).await;
    fetch_until(addr, "v0").await;

    for version in 1..=3 {
        let tag = format!("v{version}");
        fs::write(&path, &tag).unwrap();
        // Every cycle answers on the address bound once at startup.
        fetch_until(addr, &tag).await;
    }
}

#[tokio::test]
async fn test_rebuild_without_install_closes_connections() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("h.conf");
    fs::write(&path, "A").unwrap();

    let server = WatchServer::new(&path).unwrap();
    let bound = server.bind("127.0.0.1:0").await.unwrap();
    let addr = bound.local_addr().unwrap();

    // A rebuild that consumes the change but never installs a handler.
    tokio::spawn(bound.serve(|server: WatchServer| async move {
        let _ = server.next_change().await;
    }));

    let body = timeout(Duration::from_secs(10), fetch(addr)).await.unwrap();
    assert_eq!(body, "");
}

#[tokio::test]
async fn test_bind_occupied_address_fails_before_serving() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("h.conf");
    fs::write(&path, "A").unwrap();

    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let occupied = holder.local_addr().unwrap();

    let server = WatchServer::new(&path).unwrap();
    let result = server.bind(&occupied.to_string()).await;
    assert!(matches!(result, Err(ServerError::Bind { .. })));
}
