use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::{sleep, Duration};

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::event::Event;
use crate::frame::{Frame, OpCode};
use crate::message::Message;
use crate::peer::{CarrierKind, Peer, PeerId};
use crate::ws::codec::{FrameReader, FrameWriter, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    Closing,
    Closed,
}

struct CloseState {
    conn: ConnState,
    sent_close: bool,
    received_close: bool,
    received_code: Option<u16>,
}

/// Binds one peer to one live WebSocket connection (spec.md §4.F).
///
/// `reader`/`writer` are the two halves of whatever byte stream the HTTP
/// connection adapter handed off after the upgrade handshake completed.
pub struct WebSocketTransport<W> {
    peer_id: PeerId,
    peer: Arc<Mutex<Peer>>,
    writer: Arc<Mutex<FrameWriter<W>>>,
    close: Arc<Mutex<CloseState>>,
    close_received: Arc<Notify>,
    config: WebSocketConfig,
}

impl<W> WebSocketTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Spawns the read loop and returns a handle usable for `send`/`close`.
    /// `events` receives `NewMessage`/`Disconnect`/`Error` for this peer.
    pub fn spawn<R>(
        peer_id: PeerId,
        peer: Arc<Mutex<Peer>>,
        reader: R,
        writer: W,
        role: Role,
        config: WebSocketConfig,
        events: mpsc::Sender<Event>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(FrameWriter::new(writer, role)));
        let close = Arc::new(Mutex::new(CloseState {
            conn: ConnState::Open,
            sent_close: false,
            received_close: false,
            received_code: None,
        }));
        let close_received = Arc::new(Notify::new());

        let transport = WebSocketTransport {
            peer_id,
            peer: peer.clone(),
            writer: writer.clone(),
            close: close.clone(),
            close_received: close_received.clone(),
            config: config.clone(),
        };

        let read_peer = peer.clone();
        tokio::spawn(async move {
            let mut reader = FrameReader::new(reader, role, config);
            loop {
                match reader.read_message().await {
                    Ok(Ok(message)) => {
                        read_peer.lock().await.touch();
                        let _ = events.send(Event::NewMessage(peer_id, message)).await;
                    }
                    Ok(Err(frame)) => {
                        read_peer.lock().await.touch();
                        match frame.opcode {
                            OpCode::Ping => {
                                let pong = Frame::pong(frame.payload);
                                if let Ok(pong) = pong {
                                    let _ = writer.lock().await.write_frame(&pong).await;
                                }
                            }
                            OpCode::Pong => {}
                            OpCode::Close => {
                                let (code, _) = frame.close_code_and_reason().unwrap_or((1005, String::new()));
                                Self::handle_inbound_close(&close, &close_received, &writer, code).await;
                                break;
                            }
                            _ => unreachable!("data opcodes are resolved to messages"),
                        }
                    }
                    Err(err) => {
                        log::debug!("peer {peer_id} websocket frame error: {err}");
                        let _ = events.send(Event::Error(peer_id, err)).await;
                        break;
                    }
                }
                if close.lock().await.conn == ConnState::Closed {
                    break;
                }
            }
            read_peer.lock().await.set_carrier(None);
            let _ = events.send(Event::Disconnect(peer_id)).await;
        });

        transport
    }

    async fn handle_inbound_close(
        close: &Arc<Mutex<CloseState>>,
        close_received: &Arc<Notify>,
        writer: &Arc<Mutex<FrameWriter<W>>>,
        code: u16,
    ) {
        let mut state = close.lock().await;
        state.received_close = true;
        state.received_code = Some(code);
        let was_open = state.conn == ConnState::Open;
        if was_open {
            state.conn = ConnState::Closing;
        }
        drop(state);
        close_received.notify_waiters();

        if was_open {
            let mirror = Frame::close(code, "").unwrap_or_else(|_| Frame::new(true, OpCode::Close, Vec::new()));
            let _ = writer.lock().await.write_frame(&mirror).await;
        }
        close.lock().await.conn = ConnState::Closed;
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Sends a message, fragmenting at `max_frame_size`. Fails with
    /// `NotConnected` if the connection isn't open.
    pub async fn send(&self, message: Message) -> Result<(), Error> {
        {
            let state = self.close.lock().await;
            if state.conn != ConnState::Open {
                return Err(Error::NotConnected);
            }
        }
        let frames = message.to_frames(self.config.max_frame_size)?;
        let mut writer = self.writer.lock().await;
        for frame in &frames {
            writer.write_frame(frame).await?;
        }
        Ok(())
    }

    /// Closing handshake per spec.md §4.D: send CLOSE, wait up to
    /// `close_timeout` for the peer's own CLOSE, then force-close.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), Error> {
        {
            let mut state = self.close.lock().await;
            if state.conn != ConnState::Open {
                return Ok(());
            }
            state.conn = ConnState::Closing;
            state.sent_close = true;
        }

        let frame = Frame::close(code, reason)?;
        self.writer.lock().await.write_frame(&frame).await?;

        if self.close.lock().await.received_close {
            self.close.lock().await.conn = ConnState::Closed;
            self.peer.lock().await.set_carrier(None);
            return Ok(());
        }

        let already_received = self.close_received.notified();
        tokio::select! {
            _ = already_received => {}
            _ = sleep(self.config.close_timeout) => {}
        }
        self.close.lock().await.conn = ConnState::Closed;
        self.peer.lock().await.set_carrier(None);
        Ok(())
    }

    pub async fn mark_carrier(&self) {
        self.peer.lock().await.set_carrier(Some(CarrierKind::WebSocket));
    }
}
