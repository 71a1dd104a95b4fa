//! Authority-side validation failures
//!
//! None of these are ever sent back to the participant that caused them.
//! The match loop logs them and moves on.

use crate::ws::protocol::{CoinId, PlayerId, ProjectileId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("player {0} is already registered")]
    DuplicateId(PlayerId),

    #[error("request targets a terminal state: {0}")]
    StaleState(StaleReason),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i32),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("unknown projectile {0}")]
    UnknownProjectile(ProjectileId),

    #[error("unknown or already collected coin {0}")]
    UnknownCoin(CoinId),

    #[error("player {0} fired inside the weapon cooldown")]
    FireCooldown(PlayerId),

    #[error("an authority is already bound to this replication channel")]
    AuthorityAlreadyBound,
}

/// Which terminal state made a request stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    MatchEnded,
    PlayerDead(PlayerId),
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::MatchEnded => write!(f, "match has ended"),
            StaleReason::PlayerDead(id) => write!(f, "player {} is dead", id),
        }
    }
}

impl SessionError {
    /// Stale requests are expected traffic (late hits, dead players mashing
    /// fire) and are logged quieter than real validation failures.
    pub fn is_stale(&self) -> bool {
        matches!(self, SessionError::StaleState(_))
    }
}
