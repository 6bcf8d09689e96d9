use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};

use crate::config::ServerConfig;
use crate::cors;
use crate::error::Error;
use crate::event::{Event, EventStream};
use crate::facade::TransportFacade;
use crate::http::{HttpConnection, HttpRequest};
use crate::lp::LongPollingTransport;
use crate::message::Message;
use crate::peer::{Peer, PeerId};
use crate::registry::PeerRegistry;
use crate::validate::{ValidationAccumulator, ValidationOutcome, Validator};
use crate::ws::codec::Role;
use crate::ws::handshake as ws_handshake;
use crate::ws::transport::WebSocketTransport;

const MECHANISM_HEADER: &str = "x-org-eventdance-webtransport-mechanism";
const PEER_ID_HEADER: &str = "x-org-eventdance-webtransport-peer-id";
const URL_HEADER: &str = "x-org-eventdance-webtransport-url";

const MECHANISM_WEB_SOCKET: &str = "web-socket";
const MECHANISM_LONG_POLLING: &str = "long-polling";

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// A handshake whose validation is still pending an external decision
/// (spec.md §4.G step 8): the HTTP connection, the negotiated mechanism
/// and the requesting origin are stashed until `accept_peer`/`reject_peer`
/// resolves it.
struct PendingHandshake {
    connection: Box<dyn HttpConnection>,
    mechanism: &'static str,
    origin: Option<String>,
    host: Option<String>,
}

/// Owns the Long-Polling and WebSocket sub-transports, the peer registry,
/// and the validation accumulator; routes inbound HTTP requests by URL
/// prefix and runs the mechanism-negotiation handshake (spec.md §4.G).
pub struct WebTransportServer {
    config: ServerConfig,
    registry: Arc<PeerRegistry>,
    lp: Arc<LongPollingTransport>,
    ws_connections: Mutex<HashMap<PeerId, Arc<WebSocketTransport<BoxedWriter>>>>,
    validators: Mutex<ValidationAccumulator>,
    pending: Mutex<HashMap<PeerId, PendingHandshake>>,
    events_tx: mpsc::Sender<Event>,
}

impl WebTransportServer {
    pub fn new(config: ServerConfig) -> (Arc<Self>, EventStream) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let registry = if config.standalone {
            Arc::new(PeerRegistry::new(config.peer_registry_config.clone()))
        } else {
            PeerRegistry::shared()
        };
        let lp = Arc::new(LongPollingTransport::new(
            registry.clone(),
            config.long_polling_config.clone(),
            events_tx.clone(),
        ));
        let server = Arc::new(WebTransportServer {
            config,
            registry,
            lp,
            ws_connections: Mutex::new(HashMap::new()),
            validators: Mutex::new(ValidationAccumulator::new()),
            pending: Mutex::new(HashMap::new()),
            events_tx,
        });
        (server, EventStream::new(events_rx))
    }

    pub async fn register_validator(&self, validator: Validator) {
        self.validators.lock().await.register(validator);
    }

    fn mechanism_path(&self, mechanism: &str) -> String {
        match mechanism {
            MECHANISM_WEB_SOCKET => format!("{}/ws", self.config.base_path),
            _ => format!("{}/lp", self.config.base_path),
        }
    }

    /// The `url` handed back in the handshake response (spec.md §4.G item 6):
    /// an absolute `ws`/`wss` URL for the WebSocket mechanism, chosen from
    /// the connection's TLS state and the request's `Host` header, but a
    /// plain relative path for long-polling (the client already knows which
    /// origin it's talking to for its next HTTP request).
    fn mechanism_url(&self, mechanism: &str, host: Option<&str>, is_tls: bool) -> String {
        let path = self.mechanism_path(mechanism);
        match mechanism {
            MECHANISM_WEB_SOCKET => {
                let scheme = if is_tls { "wss" } else { "ws" };
                format!("{scheme}://{}{path}", host.unwrap_or(""))
            }
            _ => path,
        }
    }

    fn cors_headers(&self, origin: Option<&str>) -> Vec<(String, String)> {
        match origin {
            Some(origin) => cors::simple_response_headers(origin),
            None => Vec::new(),
        }
    }

    /// Top-level entry point: reads one request off `connection` and
    /// routes it. Long-polling and the handshake are single-request;
    /// a WebSocket upgrade hands the connection off and returns only once
    /// the connection closes.
    pub async fn handle_connection(self: &Arc<Self>, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        let request = connection.read_request_headers().await?;
        connection.set_current_request(Some(request.clone()));

        if request.method.eq_ignore_ascii_case("OPTIONS") {
            return self.handle_preflight(&request, connection).await;
        }

        if let Some(origin) = request.origin() {
            if !cors::is_allowed(&self.config.cors_config, Some(origin)) {
                connection.respond("HTTP/1.1", 403, "Forbidden", &[], b"", true).await?;
                return Err(Error::OriginNotAllowed);
            }
        }

        let path = request.path().trim_end_matches('/').to_string();
        let base = self.config.base_path.trim_end_matches('/').to_string();

        if path == format!("{base}/handshake") {
            return self.handshake(&request, connection).await;
        }
        if let Some(rest) = path.strip_prefix(&format!("{base}/lp/")) {
            if !self.config.enable_long_polling {
                connection.respond("HTTP/1.1", 404, "Not Found", &[], b"", true).await?;
                return Ok(());
            }
            return self.dispatch_long_polling(rest.to_string(), &request, connection).await;
        }
        if path == format!("{base}/ws") {
            if !self.config.enable_websocket {
                connection.respond("HTTP/1.1", 404, "Not Found", &[], b"", true).await?;
                return Ok(());
            }
            return self.websocket_upgrade(&request, connection).await;
        }

        connection.respond("HTTP/1.1", 404, "Not Found", &[], b"", true).await?;
        Ok(())
    }

    async fn handle_preflight(&self, request: &HttpRequest, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        let Some(origin) = request.origin() else {
            connection.respond("HTTP/1.1", 200, "OK", &[], b"", false).await?;
            return Ok(());
        };
        if !cors::is_allowed(&self.config.cors_config, Some(origin)) {
            connection.respond("HTTP/1.1", 403, "Forbidden", &[], b"", true).await?;
            return Ok(());
        }
        let method = request.header("access-control-request-method").unwrap_or("GET").to_string();
        let requested_headers = request.header("access-control-request-headers").map(str::to_string);
        let headers = cors::preflight_response_headers(
            &self.config.cors_config,
            origin,
            &method,
            requested_headers.as_deref(),
        );
        connection.respond("HTTP/1.1", 200, "OK", &headers, b"", false).await?;
        Ok(())
    }

    /// Handshake algorithm, spec.md §4.G.
    async fn handshake(&self, request: &HttpRequest, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        let origin = request.origin().map(str::to_string);
        let host = request.header("host").map(str::to_string);
        let cors_headers = self.cors_headers(origin.as_deref());

        let Some(requested) = request.header(MECHANISM_HEADER) else {
            connection.respond("HTTP/1.1", 503, "Service Unavailable", &cors_headers, b"", true).await?;
            return Err(Error::NoMechanismRequested);
        };
        let requested: Vec<&str> = requested.split([',', ' ']).map(str::trim).filter(|s| !s.is_empty()).collect();

        let mechanism = if requested.contains(&MECHANISM_WEB_SOCKET) && self.config.enable_websocket {
            MECHANISM_WEB_SOCKET
        } else if requested.contains(&MECHANISM_LONG_POLLING) && self.config.enable_long_polling {
            MECHANISM_LONG_POLLING
        } else {
            connection.respond("HTTP/1.1", 503, "Service Unavailable", &cors_headers, b"", true).await?;
            return Err(Error::NoMechanismNegotiable);
        };

        let peer = Arc::new(Mutex::new(Peer::new(
            self.config.peer_registry_config.max_backlog_len,
            self.config.peer_registry_config.backlog_policy,
        )));
        let peer_id = peer.lock().await.id();
        self.registry.add(peer).await?;

        let outcome = {
            let validators = self.validators.lock().await;
            let peer = self.registry.lookup(peer_id).await.expect("just inserted");
            let peer_guard = peer.lock().await;
            validators.run(&peer_guard).await
        };

        match outcome {
            ValidationOutcome::Accept => self.accept_peer_internal(peer_id, mechanism, cors_headers, host, connection).await,
            ValidationOutcome::Reject => {
                log::debug!("peer {peer_id} rejected during handshake validation");
                self.registry.close(peer_id, false).await;
                connection.respond("HTTP/1.1", 403, "Forbidden", &cors_headers, b"", true).await?;
                Err(Error::PeerRejected)
            }
            ValidationOutcome::Pending => {
                log::debug!("peer {peer_id} handshake pending validation");
                self.pending.lock().await.insert(peer_id, PendingHandshake { connection, mechanism, origin, host });
                Ok(())
            }
        }
    }

    /// Resumes a PENDING handshake with an ACCEPT decision.
    pub async fn accept_peer(&self, peer_id: PeerId) -> Result<(), Error> {
        let pending = self.pending.lock().await.remove(&peer_id);
        let Some(pending) = pending else { return Err(Error::UnknownPeer) };
        let cors_headers = self.cors_headers(pending.origin.as_deref());
        self.accept_peer_internal(peer_id, pending.mechanism, cors_headers, pending.host, pending.connection).await
    }

    /// Resumes a PENDING handshake with a REJECT decision.
    pub async fn reject_peer(&self, peer_id: PeerId) -> Result<(), Error> {
        let pending = self.pending.lock().await.remove(&peer_id);
        let Some(pending) = pending else { return Err(Error::UnknownPeer) };
        let cors_headers = self.cors_headers(pending.origin.as_deref());
        self.registry.close(peer_id, false).await;
        let mut connection = pending.connection;
        connection.respond("HTTP/1.1", 403, "Forbidden", &cors_headers, b"", true).await?;
        Err(Error::PeerRejected)
    }

    async fn accept_peer_internal(
        &self,
        peer_id: PeerId,
        mechanism: &'static str,
        mut headers: Vec<(String, String)>,
        host: Option<String>,
        mut connection: Box<dyn HttpConnection>,
    ) -> Result<(), Error> {
        let url = self.mechanism_url(mechanism, host.as_deref(), connection.is_tls());
        headers.push((MECHANISM_HEADER.to_string(), mechanism.to_string()));
        headers.push((PEER_ID_HEADER.to_string(), peer_id.to_string()));
        headers.push((URL_HEADER.to_string(), url));
        connection.respond("HTTP/1.1", 200, "OK", &headers, b"", false).await?;
        log::info!("peer {peer_id} accepted via {mechanism}");
        let _ = self.events_tx.send(Event::NewClient(peer_id)).await;
        Ok(())
    }

    async fn dispatch_long_polling(
        &self,
        action: String,
        request: &HttpRequest,
        connection: Box<dyn HttpConnection>,
    ) -> Result<(), Error> {
        let peer_id = parse_peer_id(request)?;
        match action.as_str() {
            "receive" => self.lp.receive(peer_id, connection).await,
            "send" => self.lp.send(peer_id, connection).await,
            "close" => self.lp.close(peer_id, connection).await,
            _ => {
                let mut connection = connection;
                connection.respond("HTTP/1.1", 404, "Not Found", &[], b"", true).await?;
                Err(Error::UnknownLongPollingAction)
            }
        }
    }

    /// WebSocket sub-transport handshake + binding, spec.md §4.F.
    async fn websocket_upgrade(self: &Arc<Self>, request: &HttpRequest, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        let peer_id = parse_peer_id(request)?;
        let peer = match self.registry.lookup(peer_id).await {
            Some(peer) => peer,
            None if self.config.standalone => {
                let peer = Arc::new(Mutex::new(Peer::new(
                    self.config.peer_registry_config.max_backlog_len,
                    self.config.peer_registry_config.backlog_policy,
                )));
                self.registry.add(peer.clone()).await?;
                peer
            }
            None => {
                connection.respond("HTTP/1.1", 404, "Not Found", &[], b"", true).await?;
                return Err(Error::UnknownPeer);
            }
        };
        peer.lock().await.touch();

        let handshake = match ws_handshake::validate_server_request(&request.headers) {
            Ok(handshake) => handshake,
            Err(err) => {
                connection.respond("HTTP/1.1", 400, "Bad Request", &[], b"", true).await?;
                return Err(err);
            }
        };
        let response_headers = ws_handshake::server_response_headers(&handshake.accept_key);
        connection.write_response_headers("HTTP/1.1", 101, "Switching Protocols", &response_headers).await?;
        connection.flush().await?;

        let (read_half, write_half): (Box<dyn AsyncRead + Unpin + Send>, BoxedWriter) = connection.upgrade();
        let transport = Arc::new(WebSocketTransport::spawn(
            peer_id,
            peer.clone(),
            read_half,
            write_half,
            Role::Server,
            self.config.web_socket_config.clone(),
            self.events_tx.clone(),
        ));
        transport.mark_carrier().await;
        self.ws_connections.lock().await.insert(peer_id, transport.clone());

        drain_backlog_to_ws(&peer, &transport).await;
        Ok(())
    }
}

async fn drain_backlog_to_ws(peer: &Arc<Mutex<Peer>>, transport: &Arc<WebSocketTransport<BoxedWriter>>) {
    loop {
        let popped = peer.lock().await.pop();
        let Some(message) = popped else { break };
        if let Err(_err) = transport.send(message.clone()).await {
            let _ = peer.lock().await.unshift(message);
            break;
        }
    }
}

fn parse_peer_id(request: &HttpRequest) -> Result<PeerId, Error> {
    let raw = request.peer_id_from_query().ok_or(Error::UnknownPeer)?;
    raw.parse().map_err(|_| Error::UnknownPeer)
}

#[async_trait]
impl TransportFacade for WebTransportServer {
    /// `send` never errors with not-connected: with no bound carrier the
    /// message is simply backlogged (spec.md §4.H).
    async fn send(&self, peer_id: PeerId, message: Message) -> Result<(), Error> {
        let Some(peer) = self.registry.lookup(peer_id).await else {
            return Err(Error::UnknownPeer);
        };
        if let Some(transport) = self.ws_connections.lock().await.get(&peer_id).cloned() {
            return transport.send(message).await;
        }
        peer.lock().await.push(message)?;
        self.lp.deliver(peer_id, &peer).await
    }

    async fn peer_is_connected(&self, peer_id: PeerId) -> bool {
        match self.registry.lookup(peer_id).await {
            Some(peer) => peer.lock().await.carrier().is_some(),
            None => false,
        }
    }

    async fn lookup_peer(&self, peer_id: PeerId) -> Option<Arc<Mutex<Peer>>> {
        self.registry.lookup(peer_id).await
    }

    async fn close_peer(&self, peer_id: PeerId, graceful: bool) {
        if let Some(transport) = self.ws_connections.lock().await.remove(&peer_id) {
            let code = if graceful { 1000 } else { 1006 };
            let _ = transport.close(code, "").await;
        }
        self.registry.close(peer_id, graceful).await;
    }
}
