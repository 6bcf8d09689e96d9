use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use url::Url;

use crate::config::{BacklogPolicy, WebSocketConfig};
use crate::error::Error;
use crate::event::Event;
use crate::http::request::read_response;
use crate::peer::Peer;
use crate::ws::codec::Role;
use crate::ws::handshake;
use crate::ws::transport::WebSocketTransport;

/// Dials `url` (`ws://host[:port]/path[?query]`) as a WebSocket client:
/// opens a TCP connection, runs the client-side upgrade handshake
/// (spec.md §4.D "Handshake (client side)"), and returns a bound
/// [`WebSocketTransport`] ready for `send`/`close`.
///
/// The remote end is represented by a local [`Peer`] exactly as the server
/// side represents an inbound client — spec.md §2's glossary defines a
/// peer only as "a uniquely identified remote endpoint", not as a
/// server-only concept, so dialing out gets the same backlog/liveness
/// bookkeeping for free.
///
/// `wss://` is out of scope (spec.md §1 excludes TLS session setup): dial
/// over TLS by opening the session yourself and driving
/// [`WebSocketTransport::spawn`] directly against its byte halves instead
/// of calling this helper.
pub async fn connect(
    url: &str,
    config: WebSocketConfig,
    events: mpsc::Sender<Event>,
) -> Result<Arc<WebSocketTransport<tokio::net::tcp::OwnedWriteHalf>>, Error> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "ws" {
        return Err(Error::InvalidSchemeUrl);
    }
    let host = parsed.host_str().ok_or(Error::UrlNoHost)?.to_string();
    let port = parsed.port().unwrap_or(80);
    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    let stream = TcpStream::connect((host.as_str(), port)).await?;
    let (read_half, mut write_half) = stream.into_split();

    let key = handshake::generate_key();
    let mut request = format!("GET {path} HTTP/1.1\r\n");
    for (name, value) in handshake::client_request_headers(&host, &key) {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    write_half.write_all(request.as_bytes()).await?;

    let mut reader = tokio::io::BufReader::new(read_half);
    let response = read_response(&mut reader).await?;
    handshake::validate_client_response(response.status, &response.headers, &key)?;

    let peer = Arc::new(Mutex::new(Peer::new(1024, BacklogPolicy::Reject)));
    let peer_id = peer.lock().await.id();
    let transport = Arc::new(WebSocketTransport::spawn(
        peer_id,
        peer.clone(),
        reader,
        write_half,
        Role::Client,
        config,
        events,
    ));
    transport.mark_carrier().await;
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader as TokioBufReader};
    use tokio::net::TcpListener;

    /// Accepts one connection, reads the request up to the blank line,
    /// computes the accept key and writes back a bare `101` response —
    /// enough to drive `connect`'s client-side handshake validation
    /// without depending on `WebTransportServer`.
    async fn accept_handshake(listener: TcpListener) -> (tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);

        let mut key = None;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if line == "\r\n" {
                break;
            }
            if let Some(value) = line.strip_prefix("Sec-WebSocket-Key:") {
                key = Some(value.trim().to_string());
            }
        }
        let key = key.expect("client request carries Sec-WebSocket-Key");
        let accept = handshake::accept_key(&key);
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        write_half.write_all(response.as_bytes()).await.unwrap();
        (reader.into_inner(), write_half)
    }

    #[tokio::test]
    async fn connect_completes_handshake_and_exchanges_a_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut read_half, mut write_half) = accept_handshake(listener).await;
            // Server sends one unmasked text frame: "81 02 'h' 'i'".
            write_half.write_all(&[0x81, 0x02, b'h', b'i']).await.unwrap();
            // Then reads back the client's masked echo frame header to
            // prove the connection survived the handshake.
            let mut header = [0u8; 2];
            read_half.read_exact(&mut header).await.unwrap();
            header
        });

        let (tx, _rx) = mpsc::channel(8);
        let transport = connect(&format!("ws://{addr}/ws"), WebSocketConfig::default(), tx).await.unwrap();
        transport.send(crate::message::Message::Text("hi".to_string())).await.unwrap();

        let header = server.await.unwrap();
        assert_eq!(header[1] & 0b1000_0000, 0b1000_0000, "client frames must be masked");
    }
}
