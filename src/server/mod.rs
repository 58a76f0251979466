//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and feeds each HTTP/1.1 request through a
//! [`Container`]. Connections are persistent unless the client asks otherwise.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{Request, Response, StatusCode, request::RequestError};
use crate::router::Container;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// An HTTP/1.1 listener serving one [`Container`].
///
/// # Examples
///
/// ```rust,no_run
/// use restmux::router::Container;
/// use restmux::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let container = Container::new();
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(container).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
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

    /// Accepts connections until the listener fails, one task per connection.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener itself fails.
    pub async fn serve(self, container: impl Into<Arc<Container>>) -> Result<(), ServerError> {
        let container = container.into();
        info!(
            address = %self.local_addr,
            services = container.services().len(),
            "restmux listening"
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let container = Arc::clone(&container);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, container).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn reject(stream: &mut TcpStream, status: StatusCode, reason: &str) -> std::io::Result<()> {
    let mut response = Response::new(status).keep_alive(false);
    response.write_error_string(status, reason);
    stream.write_all(&response.into_bytes()).await
}

async fn reject_too_large(stream: &mut TcpStream) -> std::io::Result<()> {
    let reason = "Request entity too large";
    reject(stream, StatusCode::PayloadTooLarge, reason).await
}

// Reads requests off one connection until the peer closes it or a request
// asks for `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    container: Arc<Container>,
) -> Result<(), std::io::Error> {
    let max_request_size = container.config().max_request_size;
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > max_request_size {
            warn!(peer = %peer_addr, max_request_size, "request too large, sending 413");
            reject_too_large(&mut stream).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let reason = format!("Bad Request: {e}");
                reject(&mut stream, StatusCode::BadRequest, &reason).await?;
                break;
            }
        };

        // Content-Length is client supplied and may overflow the offset.
        let Some(total_needed) = body_offset
            .checked_add(request.content_length().unwrap_or(0))
            .filter(|&total| total <= max_request_size)
        else {
            warn!(peer = %peer_addr, max_request_size, "declared body too large, sending 413");
            reject_too_large(&mut stream).await?;
            break;
        };
        if buf.len() < total_needed {
            continue;
        }

        // Pipelined requests may follow this one in the buffer.
        let body = Bytes::copy_from_slice(&buf[body_offset..total_needed]);
        let request = request.body(body);
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = container.dispatch(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::ContainerConfig;
    use crate::service::ServiceBuilder;

    async fn start(config: ContainerConfig) -> SocketAddr {
        let b = ServiceBuilder::new().path("/echo");
        let echo = b.post("").to(|ctx, mut resp: Response| async move {
            let body = ctx.request().body_bytes().clone();
            let _ = resp.write_all(&body);
            resp
        });
        let mut container = Container::with_config(config);
        container.add(b.route(echo).build().unwrap());

        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve(container));
        addr
    }

    async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn body_is_cut_at_content_length() {
        let addr = start(ContainerConfig::default()).await;
        let text = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
        assert!(text.ends_with("\r\n\r\nhello"), "{text}");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let addr = start(ContainerConfig::default()).await;
        let text = exchange(addr, b"GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "{text}");
    }

    #[tokio::test]
    async fn oversized_request_is_413() {
        let addr = start(ContainerConfig {
            max_request_size: 64,
            ..ContainerConfig::default()
        })
        .await;
        let text = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 1000\r\n\r\n",
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 413 "), "{text}");
    }

    #[tokio::test]
    async fn overflowing_content_length_is_413() {
        let addr = start(ContainerConfig::default()).await;
        let text = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n",
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 413 "), "{text}");
    }

    #[tokio::test]
    async fn malformed_request_is_400() {
        let addr = start(ContainerConfig::default()).await;
        let text = exchange(addr, b"GET /echo HTTP/1.1\r\nBad Header\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{text}");
    }
}
