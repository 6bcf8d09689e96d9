use crate::error::Error;
use crate::message::Message;
use crate::peer::PeerId;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::Receiver;

/// Notifications delivered to the application through a server's
/// [`EventStream`]. One stream multiplexes both sub-transports: the caller
/// never needs to know whether a given peer arrived over WebSocket or
/// long-polling.
pub enum Event {
    /// A peer finished validation and is ready to receive/send.
    NewClient(PeerId),
    /// A complete, reassembled message arrived from a peer.
    NewMessage(PeerId, Message),
    /// A peer was closed, locally or by the remote end.
    Disconnect(PeerId),
    /// A non-fatal protocol or I/O error tied to a specific peer.
    Error(PeerId, Error),
}

/// Wraps an `mpsc::Receiver<Event>` so callers drive the server with
/// `StreamExt` instead of polling the channel directly.
pub struct EventStream {
    receiver: Receiver<Event>,
}

impl EventStream {
    pub fn new(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll_recv(cx)
    }
}
