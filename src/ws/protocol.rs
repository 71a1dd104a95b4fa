//! WebSocket protocol message definitions
//! These are the wire types for participant <-> authority communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable player identifier, assigned when a participant connects
pub type PlayerId = Uuid;

/// Coin pickup identifier, assigned by the authority at match creation
pub type CoinId = u32;

/// Projectile identifier, unique within a match
pub type ProjectileId = u64;

/// Intents sent from a participant to the authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the running match (sent by the connection handler on connect)
    JoinMatch,

    /// Locomotion direction changed
    Move {
        /// Signed direction (-1.0 = full left, 1.0 = full right)
        direction: f32,
    },

    /// Kinematic state produced by the participant's physics
    Transform { x: f32, y: f32, grounded: bool },

    /// Fire a projectile in the facing direction
    Fire { facing_right: bool },

    /// Local player overlapped a coin
    CollectCoin { coin_id: CoinId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the match
    LeaveMatch,

    /// Ask for a fresh full snapshot after missing replicated messages
    Resync,
}

/// Messages sent from the authority to participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: PlayerId, server_time: u64 },

    /// Full state for a participant that just joined
    MatchJoined {
        match_id: Uuid,
        snapshot: MatchSnapshot,
    },

    /// Player joined the match
    PlayerJoined { player: PlayerSnapshot },

    /// Player left the match
    PlayerLeft { player_id: PlayerId, reason: String },

    /// Authoritative health value
    HealthChanged { player_id: PlayerId, health: i32 },

    /// Authoritative coin total
    CoinsChanged { player_id: PlayerId, coins: u32 },

    /// Authoritative facing
    FacingChanged { player_id: PlayerId, facing_right: bool },

    /// Player is out of the match
    PlayerDied { player_id: PlayerId },

    /// Projectile spawned by the authority (visual only on participants)
    ProjectileSpawned { projectile: ProjectileSnapshot },

    /// Projectile reached a terminal contact
    ProjectileDestroyed {
        projectile_id: ProjectileId,
        reason: DestroyReason,
    },

    /// Coin was credited to a player and no longer exists
    CoinRemoved {
        coin_id: CoinId,
        collector_id: PlayerId,
    },

    /// Periodic transform snapshot
    Transforms {
        /// Authority tick number
        tick: u64,
        players: Vec<TransformSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
    },

    /// Match has ended
    MatchEnded { winner_id: PlayerId, coins: u32 },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Why a projectile was destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// Hit a player other than its owner
    Hit,
    /// Hit a wall surface
    Wall,
    /// Left the horizontal arena border
    OutOfBounds,
}

/// Full state of the match, sent to joining participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub alive_count: usize,
    pub ended: bool,
    pub winner_id: Option<PlayerId>,
    pub players: Vec<PlayerSnapshot>,
    pub coins: Vec<CoinSnapshot>,
}

/// Replicated fields of one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub health: i32,
    pub coins: u32,
    pub alive: bool,
    pub facing_right: bool,
    pub x: f32,
    pub y: f32,
    pub grounded: bool,
}

/// Player kinematics in a periodic snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSnapshot {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub facing_right: bool,
    pub grounded: bool,
}

/// Projectile visual state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub projectile_id: ProjectileId,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    /// +1.0 travelling right, -1.0 travelling left
    pub direction: f32,
}

/// Coin pickup placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSnapshot {
    pub coin_id: CoinId,
    pub x: f32,
    pub y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let json = serde_json::to_string(&ClientMsg::CollectCoin { coin_id: 7 }).unwrap();
        assert_eq!(json, r#"{"type":"collect_coin","coin_id":7}"#);

        let parsed: ClientMsg = serde_json::from_str(r#"{"type":"join_match"}"#).unwrap();
        assert_eq!(parsed, ClientMsg::JoinMatch);
    }

    #[test]
    fn unknown_intent_is_rejected() {
        let parsed = serde_json::from_str::<ClientMsg>(r#"{"type":"set_health","health":100}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn destroy_reason_serializes_as_string() {
        let msg = ServerMsg::ProjectileDestroyed {
            projectile_id: 3,
            reason: DestroyReason::OutOfBounds,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "projectile_destroyed");
        assert_eq!(json["reason"], "out_of_bounds");
    }
}
