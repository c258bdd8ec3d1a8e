//! Shared utilities for integration testing.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use url::Url;

use dev_refresh::config::{Mode, Settings};
use dev_refresh::http::HttpServer;
use dev_refresh::reload::Coordinator;

/// Start a mock upstream that answers every request with a fixed body.
pub async fn start_mock_upstream(content_type: &'static str, body: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                read_head(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    content_type,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a mock upstream that records each request head it receives.
#[allow(dead_code)]
pub async fn start_recording_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let head_tx = head_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = head_tx.send(head);
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, head_rx)
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                collected.extend_from_slice(&buf[..n]);
                if collected.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}

fn settings(mode: Mode, watching: bool) -> Settings {
    Settings {
        command: None,
        mode: Some(mode),
        host: "127.0.0.1".into(),
        port: 0,
        open_browser: false,
        watch_paths: if watching {
            vec![PathBuf::from(".")]
        } else {
            vec![]
        },
        quiet_window: Duration::from_millis(100),
    }
}

/// Start the server in proxy mode against `upstream`. Returns the bound
/// address and the shared coordinator for driving publishes in tests.
pub async fn start_proxy(upstream: SocketAddr, watching: bool) -> (SocketAddr, Arc<Coordinator>) {
    let url = Url::parse(&format!("http://{upstream}")).unwrap();
    start_server(Mode::Proxy(url), watching).await
}

/// Start the server in static mode rooted at `root`.
#[allow(dead_code)]
pub async fn start_static(root: PathBuf, watching: bool) -> (SocketAddr, Arc<Coordinator>) {
    start_server(Mode::Serve(root), watching).await
}

async fn start_server(mode: Mode, watching: bool) -> (SocketAddr, Arc<Coordinator>) {
    let settings = settings(mode.clone(), watching);
    let coordinator = Arc::new(Coordinator::new(None));
    let server = HttpServer::new(&settings, mode, coordinator.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    (addr, coordinator)
}
