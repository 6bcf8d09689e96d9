pub mod request;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::Error;
pub use request::{HttpRequest, HttpResponse};

/// The external collaborator interface spec.md §4.C describes: the core
/// never parses raw sockets or speaks TLS, it only calls these methods.
/// Implement this trait to plug the server onto whatever HTTP stack a
/// caller already has (a reverse proxy, a TLS terminator, a test double).
#[async_trait]
pub trait HttpConnection: Send {
    async fn read_request_headers(&mut self) -> Result<HttpRequest, Error>;
    async fn read_all_content(&mut self, request: &HttpRequest) -> Result<Vec<u8>, Error>;
    async fn write_response_headers(
        &mut self,
        version: &str,
        status: u16,
        reason: &str,
        headers: &[(String, String)],
    ) -> Result<(), Error>;
    /// Writes a chunk of the response body. When `chunked` is true, a
    /// zero-length `bytes` terminates the chunked body.
    async fn write_content(&mut self, bytes: &[u8], chunked: bool) -> Result<(), Error>;
    /// One-shot convenience: headers + full body in one call.
    async fn respond(
        &mut self,
        version: &str,
        status: u16,
        reason: &str,
        headers: &[(String, String)],
        body: &[u8],
        close_after: bool,
    ) -> Result<(), Error>;
    /// Pushes `request` back into the connection's internal buffer so a
    /// different handler can read it again (used when one handler peeks
    /// the mechanism header before routing).
    fn unread_request_headers(&mut self, request: HttpRequest);
    fn keepalive(&self) -> bool;
    fn current_request(&self) -> Option<&HttpRequest>;
    fn set_current_request(&mut self, request: Option<HttpRequest>);
    async fn flush(&mut self) -> Result<(), Error>;
    async fn close(&mut self) -> Result<(), Error>;
    /// Whether this connection is carried over TLS — the only thing the
    /// handshake needs to know about TLS (spec.md §1 scopes the rest out).
    fn is_tls(&self) -> bool {
        false
    }

    /// Hijacks the connection after a successful WebSocket upgrade
    /// response has been written, handing back the raw byte halves the
    /// codec reads/writes frames on directly. Once called, no further
    /// `HttpConnection` method is valid on this connection.
    fn upgrade(
        self: Box<Self>,
    ) -> (Box<dyn tokio::io::AsyncRead + Unpin + Send>, Box<dyn tokio::io::AsyncWrite + Unpin + Send>);
}

/// A plain-TCP `HttpConnection`, good enough to drive the examples and
/// integration tests. Production deployments typically front this with a
/// TLS-terminating proxy and implement `HttpConnection` against that
/// instead.
pub struct TcpHttpConnection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    pending_request: Option<HttpRequest>,
    current_request: Option<HttpRequest>,
}

impl TcpHttpConnection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, writer) = stream.into_split();
        TcpHttpConnection {
            reader: BufReader::new(read_half),
            writer,
            pending_request: None,
            current_request: None,
        }
    }
}

#[async_trait]
impl HttpConnection for TcpHttpConnection {
    async fn read_request_headers(&mut self) -> Result<HttpRequest, Error> {
        if let Some(request) = self.pending_request.take() {
            return Ok(request);
        }
        request::read_request(&mut self.reader).await
    }

    async fn read_all_content(&mut self, request: &HttpRequest) -> Result<Vec<u8>, Error> {
        Ok(request.body.clone())
    }

    async fn write_response_headers(
        &mut self,
        version: &str,
        status: u16,
        reason: &str,
        headers: &[(String, String)],
    ) -> Result<(), Error> {
        let mut out = format!("{} {} {}\r\n", version, status, reason);
        for (k, v) in headers {
            out.push_str(&format!("{}: {}\r\n", k, v));
        }
        out.push_str("\r\n");
        self.writer.write_all(out.as_bytes()).await?;
        Ok(())
    }

    async fn write_content(&mut self, bytes: &[u8], chunked: bool) -> Result<(), Error> {
        if chunked {
            let size_line = format!("{:x}\r\n", bytes.len());
            self.writer.write_all(size_line.as_bytes()).await?;
            self.writer.write_all(bytes).await?;
            self.writer.write_all(b"\r\n").await?;
        } else {
            self.writer.write_all(bytes).await?;
        }
        Ok(())
    }

    async fn respond(
        &mut self,
        version: &str,
        status: u16,
        reason: &str,
        headers: &[(String, String)],
        body: &[u8],
        close_after: bool,
    ) -> Result<(), Error> {
        request::write_response(&mut self.writer, version, status, reason, headers, body).await?;
        if close_after {
            self.close().await?;
        }
        Ok(())
    }

    fn unread_request_headers(&mut self, request: HttpRequest) {
        self.pending_request = Some(request);
    }

    fn keepalive(&self) -> bool {
        self.current_request
            .as_ref()
            .and_then(|r| r.header("connection"))
            .map(|v| !v.eq_ignore_ascii_case("close"))
            .unwrap_or(true)
    }

    fn current_request(&self) -> Option<&HttpRequest> {
        self.current_request.as_ref()
    }

    fn set_current_request(&mut self, request: Option<HttpRequest>) {
        self.current_request = request;
    }

    async fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.writer.shutdown().await?;
        Ok(())
    }

    fn upgrade(
        self: Box<Self>,
    ) -> (Box<dyn tokio::io::AsyncRead + Unpin + Send>, Box<dyn tokio::io::AsyncWrite + Unpin + Send>) {
        (Box::new(self.reader.into_inner()), Box::new(self.writer))
    }
}
