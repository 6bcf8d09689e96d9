use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::config::LongPollingConfig;
use crate::error::Error;
use crate::event::Event;
use crate::http::HttpConnection;
use crate::lp::context::LongPollingPeerContext;
use crate::lp::envelope;
use crate::message::Message;
use crate::peer::{CarrierKind, PeerId};
use crate::registry::{PeerRegistry, RegistryEvent};

const NOT_FOUND_HEADERS: &[(String, String); 0] = &[];

type ContextMap = Arc<Mutex<HashMap<PeerId, Arc<Mutex<LongPollingPeerContext>>>>>;

/// The long-polling sub-transport (spec.md §4.E): parked-GET drain/park
/// protocol, POST envelope ingestion, `/close`.
pub struct LongPollingTransport {
    registry: Arc<PeerRegistry>,
    contexts: ContextMap,
    config: LongPollingConfig,
    events: mpsc::Sender<Event>,
}

impl LongPollingTransport {
    pub fn new(registry: Arc<PeerRegistry>, config: LongPollingConfig, events: mpsc::Sender<Event>) -> Self {
        let contexts: ContextMap = Arc::new(Mutex::new(HashMap::new()));
        spawn_context_reaper(registry.clone(), contexts.clone());
        LongPollingTransport {
            registry,
            contexts,
            config,
            events,
        }
    }

    async fn context_for(&self, peer_id: PeerId) -> Arc<Mutex<LongPollingPeerContext>> {
        self.contexts
            .lock()
            .await
            .entry(peer_id)
            .or_insert_with(|| Arc::new(Mutex::new(LongPollingPeerContext::new())))
            .clone()
    }

    /// `GET …/receive?{peer_id}`.
    pub async fn receive(&self, peer_id: PeerId, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        let Some(peer) = self.registry.lookup(peer_id).await else {
            connection.respond("HTTP/1.1", 404, "Not Found", NOT_FOUND_HEADERS, b"", true).await?;
            return Err(Error::UnknownPeer);
        };
        peer.lock().await.touch();

        let has_backlog = peer.lock().await.backlog_len() > 0;
        if has_backlog {
            self.drain(&peer, connection).await
        } else {
            // Parking counts as holding a carrier (spec.md §3 Peer Registry
            // liveness invariant) so a long-idle parked GET isn't reaped out
            // from under the client while it waits for the next message.
            peer.lock().await.set_carrier(Some(CarrierKind::LongPolling));
            let context = self.context_for(peer_id).await;
            context.lock().await.park(connection);
            Ok(())
        }
    }

    /// `POST …/send?{peer_id}`. Unlike `/receive`, a POST never parks: it
    /// drains whatever is backlogged (possibly nothing) and returns.
    pub async fn send(&self, peer_id: PeerId, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        let Some(peer) = self.registry.lookup(peer_id).await else {
            connection.respond("HTTP/1.1", 404, "Not Found", NOT_FOUND_HEADERS, b"", true).await?;
            return Err(Error::UnknownPeer);
        };

        let request = connection.current_request().cloned();
        let body = match request {
            Some(req) => connection.read_all_content(&req).await?,
            None => Vec::new(),
        };
        let envelopes = match envelope::decode_all(&body) {
            Ok(envelopes) => envelopes,
            Err(err) => {
                connection.respond("HTTP/1.1", 400, "Bad Request", NOT_FOUND_HEADERS, b"", true).await?;
                return Err(err);
            }
        };
        for decoded in envelopes {
            let _ = self
                .events
                .send(Event::NewMessage(peer_id, Message::Text(String::from_utf8_lossy(&decoded.payload).into_owned())))
                .await;
        }

        peer.lock().await.touch();
        self.drain(&peer, connection).await
    }

    /// `GET …/close?{peer_id}`.
    pub async fn close(&self, peer_id: PeerId, mut connection: Box<dyn HttpConnection>) -> Result<(), Error> {
        connection.respond("HTTP/1.1", 200, "OK", NOT_FOUND_HEADERS, b"", true).await?;
        self.registry.close(peer_id, true).await;
        Ok(())
    }

    /// Invoked when `send(peer, message)` is called on the façade for a
    /// peer currently carried over long-polling: pops the oldest parked
    /// GET (if any) and drains the backlog plus `message` onto it. If none
    /// is parked, `message` was already appended to the backlog by the
    /// caller and will go out on the next `/receive`.
    pub async fn deliver(&self, peer_id: PeerId, peer: &Arc<Mutex<crate::peer::Peer>>) -> Result<(), Error> {
        let context = self.context_for(peer_id).await;
        let parked = context.lock().await.pop();
        let Some(parked) = parked else { return Ok(()) };
        self.drain(peer, parked.connection).await
    }

    async fn drain(
        &self,
        peer: &Arc<Mutex<crate::peer::Peer>>,
        mut connection: Box<dyn HttpConnection>,
    ) -> Result<(), Error> {
        {
            let mut guard = peer.lock().await;
            guard.set_carrier(Some(CarrierKind::LongPolling));
        }

        let keepalive = connection.keepalive();
        let connection_header = if keepalive { "keep-alive" } else { "close" };
        connection
            .write_response_headers(
                "HTTP/1.1",
                200,
                "OK",
                &[
                    ("Content-Type".to_string(), "text/plain; charset=utf-8".to_string()),
                    ("Transfer-Encoding".to_string(), "chunked".to_string()),
                    ("Connection".to_string(), connection_header.to_string()),
                ],
            )
            .await?;

        loop {
            let popped = peer.lock().await.pop();
            let Some(message) = popped else { break };
            let payload = message.as_binary();
            let mut buf = Vec::new();
            if payload.len() <= self.config.write_chunk_size {
                envelope::encode(&mut buf, &payload, false);
            } else {
                for (i, chunk) in payload.chunks(self.config.write_chunk_size).enumerate() {
                    let more = (i + 1) * self.config.write_chunk_size < payload.len();
                    envelope::encode(&mut buf, chunk, more);
                }
            }
            if let Err(err) = connection.write_content(&buf, true).await {
                peer.lock().await.unshift(message)?;
                return Err(err);
            }
        }

        connection.write_content(&[], true).await?;
        connection.flush().await?;
        if !keepalive {
            connection.close().await?;
        }
        peer.lock().await.set_carrier(None);
        Ok(())
    }
}

/// Listens for `peer-closed` (graceful `/close`, or the registry's liveness
/// sweep reaping a stale peer) and drops that peer's parked-GET context, so
/// a GET parked when its peer is reaped doesn't sit forever with no one left
/// to pop it. Any connection still parked at that point is answered with a
/// plain close rather than left hanging.
fn spawn_context_reaper(registry: Arc<PeerRegistry>, contexts: ContextMap) {
    tokio::spawn(async move {
        let mut events = registry.subscribe().await;
        while let Some(event) = events.recv().await {
            let RegistryEvent::PeerClosed(peer_id, _graceful) = event else { continue };
            let Some(context) = contexts.lock().await.remove(&peer_id) else { continue };
            let mut context = context.lock().await;
            while let Some(parked) = context.pop() {
                let mut connection = parked.connection;
                let _ = connection.respond("HTTP/1.1", 410, "Gone", NOT_FOUND_HEADERS, b"", true).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BacklogPolicy, PeerRegistryConfig};
    use crate::peer::Peer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as TokioMutex;

    struct RecordingConnection {
        written: Arc<TokioMutex<Vec<u8>>>,
        status: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl HttpConnection for RecordingConnection {
        async fn read_request_headers(&mut self) -> Result<crate::http::HttpRequest, Error> {
            unimplemented!()
        }
        async fn read_all_content(&mut self, _request: &crate::http::HttpRequest) -> Result<Vec<u8>, Error> {
            Ok(Vec::new())
        }
        async fn write_response_headers(
            &mut self,
            _version: &str,
            status: u16,
            _reason: &str,
            _headers: &[(String, String)],
        ) -> Result<(), Error> {
            self.status.store(status as usize, Ordering::SeqCst);
            Ok(())
        }
        async fn write_content(&mut self, bytes: &[u8], _chunked: bool) -> Result<(), Error> {
            self.written.lock().await.extend_from_slice(bytes);
            Ok(())
        }
        async fn respond(
            &mut self,
            _version: &str,
            status: u16,
            _reason: &str,
            _headers: &[(String, String)],
            body: &[u8],
            _close_after: bool,
        ) -> Result<(), Error> {
            self.status.store(status as usize, Ordering::SeqCst);
            self.written.lock().await.extend_from_slice(body);
            Ok(())
        }
        fn unread_request_headers(&mut self, _request: crate::http::HttpRequest) {}
        fn keepalive(&self) -> bool {
            true
        }
        fn current_request(&self) -> Option<&crate::http::HttpRequest> {
            None
        }
        fn set_current_request(&mut self, _request: Option<crate::http::HttpRequest>) {}
        async fn flush(&mut self) -> Result<(), Error> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }
        fn upgrade(
            self: Box<Self>,
        ) -> (Box<dyn tokio::io::AsyncRead + Unpin + Send>, Box<dyn tokio::io::AsyncWrite + Unpin + Send>) {
            unimplemented!("long-polling connections are never upgraded")
        }
    }

    fn registry() -> Arc<PeerRegistry> {
        Arc::new(PeerRegistry::new(PeerRegistryConfig {
            cleanup_interval: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(5),
            max_backlog_len: 16,
            backlog_policy: BacklogPolicy::Reject,
        }))
    }

    #[tokio::test]
    async fn receive_on_unknown_peer_is_404() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(8);
        let transport = LongPollingTransport::new(registry, LongPollingConfig::default(), tx);
        let status = Arc::new(AtomicUsize::new(0));
        let connection = Box::new(RecordingConnection { written: Arc::new(TokioMutex::new(Vec::new())), status: status.clone() });
        let result = transport.receive(crate::peer::generate_peer_id(), connection).await;
        assert!(matches!(result, Err(Error::UnknownPeer)));
        assert_eq!(status.load(Ordering::SeqCst), 404);
    }

    #[tokio::test]
    async fn receive_with_backlog_drains_immediately() {
        let registry = registry();
        let peer = Arc::new(TokioMutex::new(Peer::new(16, BacklogPolicy::Reject)));
        let id = peer.lock().await.id();
        peer.lock().await.push(Message::Text("hi".into())).unwrap();
        registry.add(peer).await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let transport = LongPollingTransport::new(registry, LongPollingConfig::default(), tx);
        let written = Arc::new(TokioMutex::new(Vec::new()));
        let status = Arc::new(AtomicUsize::new(0));
        let connection = Box::new(RecordingConnection { written: written.clone(), status: status.clone() });
        transport.receive(id, connection).await.unwrap();

        assert_eq!(status.load(Ordering::SeqCst), 200);
        let decoded = envelope::decode_all(&written.lock().await).unwrap();
        assert_eq!(decoded[0].payload, b"hi");
    }

    #[tokio::test]
    async fn receive_with_empty_backlog_parks() {
        let registry = registry();
        let peer = Arc::new(TokioMutex::new(Peer::new(16, BacklogPolicy::Reject)));
        let id = peer.lock().await.id();
        registry.add(peer).await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let transport = LongPollingTransport::new(registry, LongPollingConfig::default(), tx);
        let status = Arc::new(AtomicUsize::new(0));
        let connection = Box::new(RecordingConnection { written: Arc::new(TokioMutex::new(Vec::new())), status: status.clone() });
        transport.receive(id, connection).await.unwrap();

        assert_eq!(status.load(Ordering::SeqCst), 0);
        let context = transport.context_for(id).await;
        assert!(context.lock().await.has_parked());
    }
}
