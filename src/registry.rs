use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};

use crate::config::PeerRegistryConfig;
use crate::error::Error;
use crate::peer::{Peer, PeerId};

/// Notifications the registry fans out when a peer is added or removed.
/// Always dispatched via `tokio::spawn`, never from the caller's own stack,
/// so a handler reacting to `NewPeer` can freely call back into the
/// registry without reentrancy.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    NewPeer(PeerId),
    PeerClosed(PeerId, bool),
}

/// Maps peer ids to peers, with a rate-limited liveness sweep.
///
/// A process-wide default instance is reachable via [`PeerRegistry::shared`]
/// for servers that don't opt into a private one (`ServerConfig::standalone`).
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, Arc<Mutex<Peer>>>>,
    last_sweep: Mutex<Instant>,
    config: PeerRegistryConfig,
    listeners: Mutex<Vec<mpsc::UnboundedSender<RegistryEvent>>>,
}

static SHARED: OnceLock<Arc<PeerRegistry>> = OnceLock::new();

impl PeerRegistry {
    pub fn new(config: PeerRegistryConfig) -> Self {
        PeerRegistry {
            peers: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
            config,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide default registry, lazily constructed on first use.
    pub fn shared() -> Arc<PeerRegistry> {
        SHARED
            .get_or_init(|| Arc::new(PeerRegistry::new(PeerRegistryConfig::default())))
            .clone()
    }

    /// Registers a listener that receives every `new-peer`/`peer-closed`
    /// event from this point on.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().await.push(tx);
        rx
    }

    async fn emit(&self, event: RegistryEvent) {
        let listeners = self.listeners.lock().await.clone();
        tokio::spawn(async move {
            for listener in listeners {
                let _ = listener.send(event.clone());
            }
        });
    }

    /// Inserts `peer`, failing with `PeerAlreadyExists` on a duplicate id.
    /// Schedules `new-peer` asynchronously on success.
    pub async fn add(&self, peer: Arc<Mutex<Peer>>) -> Result<(), Error> {
        let id = peer.lock().await.id();
        {
            let mut peers = self.peers.lock().await;
            if peers.contains_key(&id) {
                return Err(Error::PeerAlreadyExists);
            }
            peers.insert(id, peer);
        }
        self.emit(RegistryEvent::NewPeer(id)).await;
        Ok(())
    }

    /// Looks up a peer by id, opportunistically running a rate-limited
    /// sweep first.
    pub async fn lookup(&self, id: PeerId) -> Option<Arc<Mutex<Peer>>> {
        self.maybe_sweep().await;
        self.peers.lock().await.get(&id).cloned()
    }

    /// Removes `peer` from the map, marks it closed, and emits
    /// `peer-closed` asynchronously.
    pub async fn close(&self, id: PeerId, graceful: bool) {
        let removed = self.peers.lock().await.remove(&id);
        if let Some(peer) = removed {
            peer.lock().await.close(graceful);
            self.emit(RegistryEvent::PeerClosed(id, graceful)).await;
        }
    }

    async fn maybe_sweep(&self) {
        let mut last_sweep = self.last_sweep.lock().await;
        if last_sweep.elapsed() < self.config.cleanup_interval {
            return;
        }
        *last_sweep = Instant::now();
        drop(last_sweep);
        self.sweep().await;
    }

    /// Removes and non-gracefully closes every peer that is not alive.
    /// Rate-limited by `cleanup_interval`; call `maybe_sweep` (via `lookup`)
    /// for the piggybacked form, or call this directly to force one.
    pub async fn sweep(&self) {
        let timeout = self.config.peer_timeout;
        let dead: Vec<PeerId> = {
            let peers = self.peers.lock().await;
            let mut dead = Vec::new();
            for (id, peer) in peers.iter() {
                if !peer.lock().await.is_alive(timeout) {
                    dead.push(*id);
                }
            }
            dead
        };
        for id in dead {
            log::debug!("reaping peer {id}: not alive and no parked carrier");
            self.close(id, false).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacklogPolicy;
    use std::time::Duration;

    fn registry_with(peer_timeout: Duration, cleanup_interval: Duration) -> PeerRegistry {
        PeerRegistry::new(PeerRegistryConfig {
            cleanup_interval,
            peer_timeout,
            max_backlog_len: 16,
            backlog_policy: BacklogPolicy::Reject,
        })
    }

    #[tokio::test]
    async fn add_then_lookup_round_trips() {
        let registry = registry_with(Duration::from_secs(5), Duration::from_secs(5));
        let peer = Arc::new(Mutex::new(Peer::new(16, BacklogPolicy::Reject)));
        let id = peer.lock().await.id();
        registry.add(peer).await.unwrap();
        assert!(registry.lookup(id).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let registry = registry_with(Duration::from_secs(5), Duration::from_secs(5));
        let peer = Arc::new(Mutex::new(Peer::new(16, BacklogPolicy::Reject)));
        registry.add(peer.clone()).await.unwrap();
        let result = registry.add(peer).await;
        assert!(matches!(result, Err(Error::PeerAlreadyExists)));
    }

    #[tokio::test]
    async fn sweep_reaps_timed_out_peers_without_a_carrier() {
        let registry = registry_with(Duration::from_millis(0), Duration::from_secs(0));
        let peer = Arc::new(Mutex::new(Peer::new(16, BacklogPolicy::Reject)));
        let id = peer.lock().await.id();
        registry.add(peer).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.sweep().await;
        assert!(registry.lookup(id).await.is_none());
    }

    #[tokio::test]
    async fn sweep_spares_peers_with_a_parked_carrier() {
        let registry = registry_with(Duration::from_millis(0), Duration::from_secs(0));
        let peer = Arc::new(Mutex::new(Peer::new(16, BacklogPolicy::Reject)));
        peer.lock().await.set_carrier(Some(crate::peer::CarrierKind::LongPolling));
        let id = peer.lock().await.id();
        registry.add(peer).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.sweep().await;
        assert!(registry.lookup(id).await.is_some());
    }

    #[tokio::test]
    async fn close_emits_peer_closed_event() {
        let registry = registry_with(Duration::from_secs(5), Duration::from_secs(5));
        let mut rx = registry.subscribe().await;
        let peer = Arc::new(Mutex::new(Peer::new(16, BacklogPolicy::Reject)));
        let id = peer.lock().await.id();
        registry.add(peer).await.unwrap();
        matches!(rx.recv().await, Some(RegistryEvent::NewPeer(got)) if got == id);
        registry.close(id, true).await;
        let event = rx.recv().await;
        assert!(matches!(event, Some(RegistryEvent::PeerClosed(got, true)) if got == id));
    }
}
