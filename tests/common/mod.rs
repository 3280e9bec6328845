//! Shared utilities for integration and load testing.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rest_resilience::config::{ClientConfig, GuardConfig};

/// Start a simple mock backend that returns a fixed response.
#[allow(dead_code)]
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { Some((200, response.to_string())) }).await
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` runs once per request. `Some((status, body))` is sent back; `None` closes the
/// connection without answering.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<(u16, String)>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let Some((status, body)) = f().await else {
                            return;
                        };
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    let mut head = Vec::new();
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                head.extend_from_slice(&buf[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") {
                    return;
                }
            }
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Guard config with one client named `backend` pointing at `addr` and short delays.
pub fn guard_config(addr: SocketAddr) -> GuardConfig {
    let mut config = GuardConfig::default();
    config.clients = BTreeMap::from([(
        "backend".to_string(),
        ClientConfig {
            base_url: format!("http://{}", addr),
            enable_logging: false,
            ..ClientConfig::default()
        },
    )]);
    config.retries.initial_interval_ms = 20;
    config.retries.max_interval_ms = 100;
    config.rate_limit.permits_per_second = 1_000;
    config
}
