use std::collections::HashMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};

use crate::error::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const HEADER_CAP: usize = 16 * 1024;

/// A parsed HTTP/1.1 request line + headers + body, the shape every
/// `HttpConnection` hands to the core.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// `true` iff the `Origin` header is present (used for CORS checks).
    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    /// Extracts the query string (without leading `?`) from `uri`.
    pub fn query(&self) -> Option<&str> {
        self.uri.splitn(2, '?').nth(1)
    }

    /// Extracts `{peer_id}` from a `?{peer_id}` query per spec.md §4.E/§4.F.
    pub fn peer_id_from_query(&self) -> Option<&str> {
        self.query().filter(|q| !q.is_empty())
    }

    pub fn path(&self) -> &str {
        self.uri.splitn(2, '?').next().unwrap_or(&self.uri)
    }
}

/// Reads and parses one HTTP/1.1 request off `reader` using `httparse` for
/// the header section, falling back to `Content-Length` for the body.
pub async fn read_request<R>(reader: &mut R) -> Result<HttpRequest, Error>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut scratch = [0u8; 1024];
    let header_end = timeout(REQUEST_TIMEOUT, async {
        loop {
            if let Some(pos) = find_header_end(&buf) {
                return Ok(pos);
            }
            if buf.len() > HEADER_CAP {
                return Err(Error::IncompleteHttpRequest);
            }
            let n = reader.read(&mut scratch).await?;
            if n == 0 {
                return Err(Error::IncompleteHttpRequest);
            }
            buf.extend_from_slice(&scratch[..n]);
        }
    })
    .await??;

    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Request::new(&mut headers_buf);
    let body_start = match parsed.parse(&buf[..header_end])? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Err(Error::IncompleteHttpRequest),
    };

    let method = parsed.method.ok_or(Error::IncompleteHttpRequest)?.to_string();
    let uri = parsed.path.ok_or(Error::IncompleteHttpRequest)?.to_string();
    let version = format!("HTTP/1.{}", parsed.version.ok_or(Error::IncompleteHttpRequest)?);

    let mut headers = HashMap::new();
    for h in parsed.headers.iter() {
        headers.insert(h.name.to_ascii_lowercase(), String::from_utf8_lossy(h.value).into_owned());
    }

    let content_length: usize = match headers.get("content-length") {
        Some(v) => v.parse().map_err(|_| Error::InvalidContentLength)?,
        None => 0,
    };

    let mut body = buf[body_start..].to_vec();
    while body.len() < content_length {
        let n = reader.read(&mut scratch).await?;
        if n == 0 {
            return Err(Error::IncompleteHttpRequest);
        }
        body.extend_from_slice(&scratch[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest { method, uri, version, headers, body })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// A parsed HTTP/1.1 status line + headers, read by the client dial path
/// (spec.md §4.D "Handshake (client side)") to validate the server's
/// upgrade response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Reads and parses one HTTP/1.1 response status line + headers off
/// `reader`, stopping right after the blank line — the caller upgrades the
/// connection immediately afterward and never reads a response body here.
pub async fn read_response<R>(reader: &mut R) -> Result<HttpResponse, Error>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut scratch = [0u8; 1024];
    let header_end = timeout(REQUEST_TIMEOUT, async {
        loop {
            if let Some(pos) = find_header_end(&buf) {
                return Ok(pos);
            }
            if buf.len() > HEADER_CAP {
                return Err(Error::IncompleteHttpRequest);
            }
            let n = reader.read(&mut scratch).await?;
            if n == 0 {
                return Err(Error::IncompleteHttpRequest);
            }
            buf.extend_from_slice(&scratch[..n]);
        }
    })
    .await??;

    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Response::new(&mut headers_buf);
    match parsed.parse(&buf[..header_end])? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(Error::IncompleteHttpRequest),
    }

    let status = parsed.code.ok_or(Error::IncompleteHttpRequest)?;
    let mut headers = HashMap::new();
    for h in parsed.headers.iter() {
        headers.insert(h.name.to_ascii_lowercase(), String::from_utf8_lossy(h.value).into_owned());
    }

    Ok(HttpResponse { status, headers })
}

/// Writes a simple status-line + headers + body response. Used by adapters
/// that don't need chunked transfer-encoding (handshake rejections, LP
/// `/close`).
pub async fn write_response<W>(
    writer: &mut W,
    version: &str,
    status: u16,
    reason: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Result<(), Error>
where
    W: tokio::io::AsyncWriteExt + Unpin,
{
    let mut out = format!("{} {} {}\r\n", version, status, reason);
    for (k, v) in headers {
        out.push_str(&format!("{}: {}\r\n", k, v));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    writer.write_all(out.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}
