//! A raw TCP server that sends its response body in timed pieces.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::socket_guard::should_skip_socket_bound_test;

/// How the server answers every connection.
#[derive(Debug, Clone)]
pub struct Trickle {
    /// Body pieces, written one at a time.
    pub chunks: Vec<Vec<u8>>,
    /// Pause before each piece.
    pub interval: Duration,
    /// Keep the connection open this long after the last piece.
    pub hold_open: Duration,
    /// `Content-Length` announced; more than the pieces add up to makes the
    /// body stall.
    pub declared_length: Option<usize>,
}

impl Trickle {
    /// Sends `chunks` with `interval` between them and closes.
    pub fn steady(chunks: Vec<Vec<u8>>, interval: Duration) -> Self {
        Self {
            chunks,
            interval,
            hold_open: Duration::ZERO,
            declared_length: None,
        }
    }

    /// Sends `first`, then stalls with the body unfinished.
    pub fn stall_after(first: &[u8], hold_open: Duration) -> Self {
        Self {
            chunks: vec![first.to_vec()],
            interval: Duration::ZERO,
            hold_open,
            declared_length: Some(first.len() + 1024),
        }
    }
}

/// Starts the server and returns its base URL, or `None` when sockets are
/// unavailable.
pub async fn start_trickle_server_or_skip(trickle: Trickle) -> Option<String> {
    if should_skip_socket_bound_test() {
        return None;
    }
    let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
    let addr = listener.local_addr().ok()?;

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let trickle = trickle.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0_u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let total: usize = trickle.chunks.iter().map(Vec::len).sum();
                let length = trickle.declared_length.unwrap_or(total);
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n"
                );
                if stream.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in &trickle.chunks {
                    tokio::time::sleep(trickle.interval).await;
                    if stream.write_all(chunk).await.is_err() || stream.flush().await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(trickle.hold_open).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    Some(format!("http://{addr}/"))
}
