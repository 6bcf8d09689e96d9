//! Accepts connections on port 8080, negotiates either carrier, and echoes
//! every message straight back to the peer that sent it.

use tokio::net::TcpListener;
use tokio_stream::StreamExt;

use webtransport::http::TcpHttpConnection;
use webtransport::{Event, ServerConfig, TransportFacade, WebTransportServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (server, mut events) = WebTransportServer::new(ServerConfig::default());
    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    log::info!("echo server listening on 0.0.0.0:8080");

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

    while let Some(event) = events.next().await {
        match event {
            Event::NewClient(peer_id) => log::info!("peer {peer_id} connected"),
            Event::NewMessage(peer_id, message) => {
                if let Err(err) = server.send(peer_id, message).await {
                    log::warn!("echo to {peer_id} failed: {err}");
                }
            }
            Event::Disconnect(peer_id) => log::info!("peer {peer_id} disconnected"),
            Event::Error(peer_id, err) => log::warn!("peer {peer_id} error: {err}"),
        }
    }

    Ok(())
}
