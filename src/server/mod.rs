//! Minimal async HTTP/1.1 transport using Tokio.
//!
//! Each accepted socket becomes a connection task that cuts requests out of its read
//! buffer by `Content-Length` and hands them, one at a time, to a [`Dispatcher`] (or any
//! async `Request -> Response` function). Connections are persistent unless the request
//! says otherwise, and pipelined requests are answered in order.
//!
//! A panic that escapes the handler (no [`RecoveryMiddleware`] in the chain) ends only
//! the task serving that connection; other connections keep going.
//!
//! [`RecoveryMiddleware`]: crate::middleware::RecoveryMiddleware

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Dispatcher;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Upper bound on one request, head plus body (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// A TCP listener feeding HTTP/1.1 requests to a handler.
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::{Router, Server, StatusCode};
/// use pathway::context::Context;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/hello", |ctx: Context| async move {
///         ctx.write_text(StatusCode::Ok, "Hello!")
///     });
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(router.build()).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address. Port `0` picks a free port; see
    /// [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Routes every request through `dispatcher` until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), ServerError> {
        info!(routes = dispatcher.len(), "serving router");
        self.run(move |request| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(request).await }
        })
        .await
    }

    /// Accepts connections and answers each request with `handler`.
    ///
    /// The handler is shared across every spawned connection task, so it must be
    /// `Send + Sync + 'static`. Accept failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(%peer, "connection accepted");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let connection = Connection::new(stream, peer);
                if let Err(e) = connection.serve(&*handler).await {
                    warn!(%peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// What the read buffer currently holds.
#[derive(Debug)]
enum Frame {
    /// One whole request, already removed from the buffer.
    Complete(Request),
    /// Not enough bytes yet.
    Partial,
    /// The peer sent something we will not serve; answer and hang up.
    Reject(StatusCode, String),
}

/// Cuts the next request out of `buf`.
///
/// Bytes are only consumed for a complete request; anything after it stays put for the
/// next call.
fn next_frame(buf: &mut BytesMut) -> Frame {
    let (request, body_offset) = match Request::parse(&buf[..]) {
        Ok(parsed) => parsed,
        Err(RequestError::Incomplete) if buf.len() > MAX_REQUEST_SIZE => {
            return Frame::Reject(StatusCode::PayloadTooLarge, "Request entity too large".into());
        }
        Err(RequestError::Incomplete) => return Frame::Partial,
        Err(e) => return Frame::Reject(StatusCode::BadRequest, format!("Bad Request: {e}")),
    };

    // Bodies are only framed by Content-Length; a chunked body would be read as the
    // next request.
    if request.headers().contains("transfer-encoding") {
        return Frame::Reject(
            StatusCode::BadRequest,
            "Bad Request: Transfer-Encoding is not supported, send Content-Length".into(),
        );
    }

    let frame_len = match body_offset.checked_add(request.content_length().unwrap_or(0)) {
        Some(len) if len <= MAX_REQUEST_SIZE => len,
        _ => return Frame::Reject(StatusCode::PayloadTooLarge, "Request entity too large".into()),
    };
    if buf.len() < frame_len {
        return Frame::Partial;
    }

    let frame = buf.split_to(frame_len).freeze();
    Frame::Complete(request.with_body(frame.slice(body_offset..)))
}

/// One client socket and the bytes read from it but not yet served.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
        }
    }

    /// Serves requests until the peer hangs up, asks to close, or sends garbage.
    async fn serve<H, F>(mut self, handler: &H) -> io::Result<()>
    where
        H: Fn(Request) -> F,
        F: Future<Output = Response>,
    {
        loop {
            let request = match next_frame(&mut self.buf) {
                Frame::Complete(request) => request,
                Frame::Partial => {
                    if self.stream.read_buf(&mut self.buf).await? == 0 {
                        if !self.buf.is_empty() {
                            debug!(peer = %self.peer, pending = self.buf.len(), "peer closed mid-request");
                        }
                        return Ok(());
                    }
                    continue;
                }
                Frame::Reject(status, reason) => {
                    warn!(peer = %self.peer, %status, %reason, "rejecting request");
                    let response = Response::new(status).body(reason).keep_alive(false);
                    return self.write(response).await;
                }
            };

            let keep_alive = request.is_keep_alive();
            debug!(
                peer = %self.peer,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let response = handler(request).await;
            if !keep_alive {
                debug!(peer = %self.peer, "Connection: close, shutting down");
                return self.write(response.keep_alive(false)).await;
            }
            self.write(response).await?;
        }
    }

    async fn write(&mut self, response: Response) -> io::Result<()> {
        self.stream.write_all(&response.into_bytes()).await?;
        self.stream.flush().await
    }
}
