//! Dials an echo/chat server started from `echo_server`/`chat_server` and
//! sends a timestamp-free ping every few seconds, logging whatever comes
//! back — the WebSocket client-dial counterpart to those two demos.

use std::env;

use webtransport::config::WebSocketConfig;
use webtransport::message::Message;
use webtransport::ws;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let url = env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:8080/transport/ws".to_string());
    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(32);
    let transport = ws::connect(&url, WebSocketConfig::default(), events_tx).await?;
    log::info!("connected to {url}");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
    let mut count: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                count += 1;
                transport.send(Message::Text(format!("ping {count}"))).await?;
            }
            Some(event) = events_rx.recv() => {
                match event {
                    webtransport::Event::NewMessage(_, message) => {
                        log::info!("received: {}", message.as_text().unwrap_or_default());
                    }
                    webtransport::Event::Disconnect(_) => {
                        log::info!("server closed the connection");
                        break;
                    }
                    webtransport::Event::Error(_, err) => log::warn!("connection error: {err}"),
                    webtransport::Event::NewClient(_) => {}
                }
            }
        }
    }

    Ok(())
}
