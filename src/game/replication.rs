//! Replication channel between the authority and its participants
//!
//! Outbound traffic is a single broadcast stream of [`Outbound`] envelopes.
//! Every connection subscribes and keeps what is addressed to it, so messages
//! from the authority reach each participant in send order. Inbound intents go
//! through a bounded mpsc queue drained by the match loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::ws::protocol::{PlayerId, ServerMsg};

use super::error::SessionError;
use super::PlayerInput;

/// Default buffered outbound messages per subscriber
pub const OUTBOUND_CAPACITY: usize = 256;

/// Default buffered intents waiting for the match loop
pub const INTENT_CAPACITY: usize = 1024;

/// Who an outbound message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Player(PlayerId),
}

/// A message from the authority plus its addressing
#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Target,
    pub msg: ServerMsg,
}

impl Outbound {
    /// Whether the participant `player_id` should receive this message
    pub fn is_for(&self, player_id: PlayerId) -> bool {
        match self.target {
            Target::All => true,
            Target::Player(id) => id == player_id,
        }
    }
}

/// Outbound side of the replication channel
#[derive(Clone)]
pub struct ReplicationChannel {
    tx: broadcast::Sender<Outbound>,
    authority_bound: Arc<AtomicBool>,
}

impl ReplicationChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            authority_bound: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe a participant (or test probe) to the outbound stream
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }

    /// Deliver to every participant
    pub fn broadcast(&self, msg: ServerMsg) {
        self.send(Outbound {
            target: Target::All,
            msg,
        });
    }

    /// Deliver to a single participant
    pub fn send_to(&self, player_id: PlayerId, msg: ServerMsg) {
        self.send(Outbound {
            target: Target::Player(player_id),
            msg,
        });
    }

    fn send(&self, outbound: Outbound) {
        trace!(target_player = ?outbound.target, msg = ?outbound.msg, "replicating");
        // No subscribers just means nobody is listening yet.
        let _ = self.tx.send(outbound);
    }

    /// Bind the single authority allowed to write to this channel
    pub fn claim_authority(&self) -> Result<AuthorityLink, SessionError> {
        if self
            .authority_bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AuthorityAlreadyBound);
        }
        Ok(AuthorityLink {
            channel: self.clone(),
        })
    }
}

impl Default for ReplicationChannel {
    fn default() -> Self {
        Self::new(OUTBOUND_CAPACITY)
    }
}

/// Write access held by the one authority bound to a channel.
/// Dropping it frees the channel for a new authority.
pub struct AuthorityLink {
    channel: ReplicationChannel,
}

impl AuthorityLink {
    pub fn broadcast(&self, msg: ServerMsg) {
        self.channel.broadcast(msg);
    }

    pub fn send_to(&self, player_id: PlayerId, msg: ServerMsg) {
        self.channel.send_to(player_id, msg);
    }
}

impl Drop for AuthorityLink {
    fn drop(&mut self) {
        self.channel.authority_bound.store(false, Ordering::Release);
    }
}

/// Create the intent queue feeding the match loop
pub fn intent_channel(capacity: usize) -> (mpsc::Sender<PlayerInput>, mpsc::Receiver<PlayerInput>) {
    mpsc::channel(capacity)
}

/// Buffered messages of a subscription plus how many were lost to lag
#[derive(Debug, Default)]
pub struct Drained {
    pub messages: Vec<Outbound>,
    pub skipped: u64,
}

impl Drained {
    /// A subscriber that skipped messages must ask for a full snapshot
    pub fn needs_resync(&self) -> bool {
        self.skipped > 0
    }
}

/// Drain everything currently buffered on a subscription, counting lag
pub fn drain_tracked(rx: &mut broadcast::Receiver<Outbound>) -> Drained {
    let mut drained = Drained::default();
    loop {
        match rx.try_recv() {
            Ok(msg) => drained.messages.push(msg),
            Err(broadcast::error::TryRecvError::Lagged(n)) => drained.skipped += n,
            Err(_) => break,
        }
    }
    drained
}

/// Drain everything currently buffered. Lost messages are not reported.
pub fn drain(rx: &mut broadcast::Receiver<Outbound>) -> Vec<Outbound> {
    drain_tracked(rx).messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn second_authority_is_refused() {
        let channel = ReplicationChannel::default();
        let first = channel.claim_authority();
        assert!(first.is_ok());
        assert_eq!(
            channel.claim_authority().err(),
            Some(SessionError::AuthorityAlreadyBound)
        );
    }

    #[test]
    fn dropping_the_link_releases_the_channel() {
        let channel = ReplicationChannel::default();
        drop(channel.claim_authority().unwrap());
        assert!(channel.claim_authority().is_ok());
    }

    #[test]
    fn point_to_point_reaches_only_its_target() {
        let channel = ReplicationChannel::default();
        let mut rx = channel.subscribe();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        channel.send_to(alice, ServerMsg::Pong { t: 1 });
        channel.broadcast(ServerMsg::Pong { t: 2 });

        let received = drain(&mut rx);
        assert_eq!(received.len(), 2);
        assert!(received[0].is_for(alice));
        assert!(!received[0].is_for(bob));
        assert!(received[1].is_for(bob));
    }

    #[test]
    fn order_is_preserved_per_subscriber() {
        let channel = ReplicationChannel::default();
        let mut rx = channel.subscribe();
        for t in 0..10 {
            channel.broadcast(ServerMsg::Pong { t });
        }
        let ts: Vec<u64> = drain(&mut rx)
            .into_iter()
            .filter_map(|o| match o.msg {
                ServerMsg::Pong { t } => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(ts, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let channel = ReplicationChannel::default();
        channel.broadcast(ServerMsg::Pong { t: 0 });
    }

    #[test]
    fn lag_is_counted_not_hidden() {
        let channel = ReplicationChannel::new(4);
        let mut rx = channel.subscribe();
        for t in 0..6 {
            channel.broadcast(ServerMsg::Pong { t });
        }

        let drained = drain_tracked(&mut rx);
        assert!(drained.needs_resync());
        assert_eq!(drained.skipped, 2);
        let kept: Vec<ServerMsg> = drained.messages.into_iter().map(|o| o.msg).collect();
        assert_eq!(kept.first(), Some(&ServerMsg::Pong { t: 2 }));
        assert_eq!(kept.len(), 4);
    }

}
