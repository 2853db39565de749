//! Minimal HTTP/1.1 server for tests that need behaviour a mock server cannot
//! express: truncated bodies and counting requests in flight.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Canned response for one request.
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Content-Length to advertise; larger than `body` simulates a
    /// connection dropped mid-transfer.
    pub declared_len: Option<usize>,
    /// Time spent "processing" before answering.
    pub delay: Duration,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_len: None,
            delay: Duration::ZERO,
        }
    }

    pub fn truncated(body: impl Into<Vec<u8>>, declared_len: usize) -> Self {
        Self {
            declared_len: Some(declared_len),
            ..Self::ok(body)
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = dyn Fn(&str) -> RawResponse + Send + Sync;

pub(crate) struct RawHttpServer {
    addr: SocketAddr,
    max_in_flight: Arc<AtomicUsize>,
    accept_loop: JoinHandle<()>,
}

impl RawHttpServer {
    /// Starts serving on an ephemeral localhost port. `handler` receives the
    /// request target (path and query).
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> RawResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let accept_loop = {
            let max_in_flight = max_in_flight.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let handler = handler.clone();
                    let in_flight = in_flight.clone();
                    let max_in_flight = max_in_flight.clone();
                    tokio::spawn(async move {
                        serve(stream, handler, in_flight, max_in_flight).await;
                    });
                }
            })
        };

        Self {
            addr,
            max_in_flight,
            accept_loop,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Highest number of requests observed being processed at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for RawHttpServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
) {
    let Some(target) = read_request_target(&mut stream).await else {
        return;
    };

    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    max_in_flight.fetch_max(now, Ordering::SeqCst);

    let response = handler(&target);
    tokio::time::sleep(response.delay).await;

    // Leave the in-flight set before the client can observe the response.
    in_flight.fetch_sub(1, Ordering::SeqCst);

    let declared = response.declared_len.unwrap_or(response.body.len());
    let head = format!(
        "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        response.status, declared
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&response.body).await;
    let _ = stream.shutdown().await;
}

async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    request_line.split_whitespace().nth(1).map(str::to_string)
}
