use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::config::BacklogPolicy;
use crate::error::Error;
use crate::message::Message;

pub type PeerId = Uuid;

/// Generates a new peer identity. Every handshake mints one of these,
/// regardless of which sub-transport negotiated it.
pub fn generate_peer_id() -> PeerId {
    let mut rng = StdRng::from_rng(rand::thread_rng());
    let buf = rng.random::<[u8; 16]>();
    Uuid::new_v8(buf)
}

/// A weak binding to whichever sub-transport currently owns a live carrier
/// for this peer. WebSocket peers keep this for the lifetime of the
/// connection; long-polling peers only hold one while a GET is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierKind {
    WebSocket,
    LongPolling,
}

/// A peer: one logical client identity, independent of the sub-transport
/// carrying it at any given moment.
///
/// `backlog` holds messages that could not be delivered immediately
/// (no parked carrier, or a send that failed and was `unshift`ed back).
/// Ordering is strict FIFO except for `unshift`, which restores exactly
/// the message that was just popped to the head.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    last_touch: Instant,
    backlog: VecDeque<Message>,
    closed: bool,
    carrier: Option<CarrierKind>,
    max_backlog_len: usize,
    backlog_policy: BacklogPolicy,
}

impl Peer {
    pub fn new(max_backlog_len: usize, backlog_policy: BacklogPolicy) -> Self {
        Peer {
            id: generate_peer_id(),
            last_touch: Instant::now(),
            backlog: VecDeque::new(),
            closed: false,
            carrier: None,
            max_backlog_len,
            backlog_policy,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Appends `message` to the backlog tail. Fails if the peer is closed;
    /// applies `backlog_policy` if the backlog is already at capacity.
    pub fn push(&mut self, message: Message) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.backlog.len() >= self.max_backlog_len {
            match self.backlog_policy {
                BacklogPolicy::Reject => return Err(Error::BacklogFull),
                BacklogPolicy::DropOldest => {
                    self.backlog.pop_front();
                }
                BacklogPolicy::DropNew => return Ok(()),
            }
        }
        self.backlog.push_back(message);
        self.touch();
        Ok(())
    }

    /// Puts `message` back at the head of the backlog. Used when a send
    /// attempt fails after the message was already popped.
    pub fn unshift(&mut self, message: Message) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.backlog.push_front(message);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.backlog.pop_front()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn touch(&mut self) {
        self.last_touch = Instant::now();
    }

    pub fn last_touch(&self) -> Instant {
        self.last_touch
    }

    /// A peer is alive if touched within `timeout`, or if it currently
    /// holds a parked carrier (a long-polling GET, or an open WebSocket).
    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.last_touch.elapsed() <= timeout || self.carrier.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn carrier(&self) -> Option<CarrierKind> {
        self.carrier
    }

    pub fn set_carrier(&mut self, carrier: Option<CarrierKind>) {
        self.carrier = carrier;
    }

    /// Marks the peer closed. `graceful` only affects what the caller logs
    /// and reports through `peer-closed`; it does not change backlog state.
    pub fn close(&mut self, _graceful: bool) {
        self.closed = true;
        self.carrier = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer() -> Peer {
        Peer::new(4, BacklogPolicy::Reject)
    }

    #[test]
    fn push_then_pop_is_fifo() {
        let mut p = peer();
        p.push(Message::Text("a".into())).unwrap();
        p.push(Message::Text("b".into())).unwrap();
        assert_eq!(p.pop(), Some(Message::Text("a".into())));
        assert_eq!(p.pop(), Some(Message::Text("b".into())));
        assert_eq!(p.pop(), None);
    }

    #[test]
    fn unshift_restores_original_order() {
        let mut p = peer();
        p.push(Message::Text("a".into())).unwrap();
        p.push(Message::Text("b".into())).unwrap();
        let first = p.pop().unwrap();
        // delivery of `first` failed downstream, put it back
        p.unshift(first).unwrap();
        assert_eq!(p.pop(), Some(Message::Text("a".into())));
        assert_eq!(p.pop(), Some(Message::Text("b".into())));
    }

    #[test]
    fn push_fails_once_closed() {
        let mut p = peer();
        p.close(true);
        assert!(matches!(p.push(Message::Text("x".into())), Err(Error::Closed)));
    }

    #[test]
    fn backlog_full_rejects_by_default() {
        let mut p = peer();
        for i in 0..4 {
            p.push(Message::Text(i.to_string())).unwrap();
        }
        assert!(matches!(p.push(Message::Text("overflow".into())), Err(Error::BacklogFull)));
    }

    #[test]
    fn drop_oldest_policy_evicts_head() {
        let mut p = Peer::new(2, BacklogPolicy::DropOldest);
        p.push(Message::Text("a".into())).unwrap();
        p.push(Message::Text("b".into())).unwrap();
        p.push(Message::Text("c".into())).unwrap();
        assert_eq!(p.backlog_len(), 2);
        assert_eq!(p.pop(), Some(Message::Text("b".into())));
        assert_eq!(p.pop(), Some(Message::Text("c".into())));
    }

    #[test]
    fn alive_with_parked_carrier_even_if_stale() {
        let mut p = peer();
        p.set_carrier(Some(CarrierKind::LongPolling));
        // simulate staleness by constructing with an elapsed instant isn't
        // directly possible; liveness-via-carrier is the invariant under test.
        assert!(p.is_alive(Duration::from_secs(0)));
    }
}
