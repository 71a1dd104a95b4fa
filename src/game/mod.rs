//! Authoritative match modules

pub mod coins;
pub mod combat;
pub mod error;
pub mod r#match;
pub mod physics;
pub mod replication;
pub mod session;
pub mod snapshot;

pub use error::{SessionError, StaleReason};
pub use r#match::{GameMatch, MatchHandle, MatchStatus};
pub use replication::{Outbound, ReplicationChannel, Target};
pub use session::{AuthoritySession, DamageOutcome, PlayerRecord};

use crate::ws::protocol::{ClientMsg, PlayerId};

/// Intent received from a participant, tagged with who sent it
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub msg: ClientMsg,
    pub received_at: u64,
}
