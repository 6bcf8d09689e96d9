use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::message::Message;
use crate::peer::{Peer, PeerId};

/// The capability surface common to both sub-transports (spec.md §4.H).
/// `send` never fails with `not-connected` on its own: when no carrier is
/// bound, the payload is pushed onto the backlog and `Ok(())` is returned,
/// so producers don't need to know whether a peer is momentarily parked.
#[async_trait]
pub trait TransportFacade: Send + Sync {
    async fn send(&self, peer_id: PeerId, message: Message) -> Result<(), Error>;
    async fn peer_is_connected(&self, peer_id: PeerId) -> bool;
    async fn lookup_peer(&self, peer_id: PeerId) -> Option<Arc<Mutex<Peer>>>;
    async fn close_peer(&self, peer_id: PeerId, graceful: bool);
}
