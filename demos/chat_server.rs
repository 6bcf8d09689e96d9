//! Accepts connections on port 8080 and broadcasts every message to every
//! other connected peer, tracking membership purely from the event stream
//! so it works identically for WebSocket and long-polling participants.

use std::collections::HashSet;

use tokio::net::TcpListener;
use tokio_stream::StreamExt;

use webtransport::http::TcpHttpConnection;
use webtransport::{Event, Message, PeerId, ServerConfig, TransportFacade, WebTransportServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (server, mut events) = WebTransportServer::new(ServerConfig::default());
    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    log::info!("chat server listening on 0.0.0.0:8080");

    let accept_server = server.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = accept_server.clone();
                    tokio::spawn(async move {
                        let connection = Box::new(TcpHttpConnection::new(stream));
                        if let Err(err) = server.handle_connection(connection).await {
                            log::debug!("connection ended: {err}");
                        }
                    });
                }
                Err(err) => log::warn!("accept failed: {err}"),
            }
        }
    });

    let mut members: HashSet<PeerId> = HashSet::new();

    while let Some(event) = events.next().await {
        match event {
            Event::NewClient(peer_id) => {
                members.insert(peer_id);
                log::info!("{peer_id} joined, {} members", members.len());
            }
            Event::NewMessage(from, message) => {
                let text = message.as_text().unwrap_or_default();
                let announcement = Message::Text(format!("{from}: {text}"));
                for &peer_id in members.iter().filter(|&&id| id != from) {
                    if let Err(err) = server.send(peer_id, announcement.clone()).await {
                        log::warn!("broadcast to {peer_id} failed: {err}");
                    }
                }
            }
            Event::Disconnect(peer_id) => {
                members.remove(&peer_id);
                log::info!("{peer_id} left, {} members", members.len());
            }
            Event::Error(peer_id, err) => log::warn!("peer {peer_id} error: {err}"),
        }
    }

    Ok(())
}
