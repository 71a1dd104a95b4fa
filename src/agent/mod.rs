//! Participant-side player agents
//!
//! A [`PlayerAgent`] is one player as seen by one participant. The local agent
//! turns input into intents for the authority and predicts the parts that
//! must feel immediate (facing, coin pickup visuals). Every agent's networked
//! fields are a projection that the authority overwrites on replication,
//! without comparing against what was predicted.

pub mod view;

pub use view::{CoinPickup, ParticipantView, ProjectileVisual};

use crate::ws::protocol::{ClientMsg, PlayerId, PlayerSnapshot};

/// Field change surfaced to the rendering collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionEvent {
    HealthChanged { player_id: PlayerId, health: i32 },
    CoinsChanged { player_id: PlayerId, coins: u32 },
    FacingChanged { player_id: PlayerId, facing_right: bool },
    Died { player_id: PlayerId },
    CoinVanished { coin_id: u32 },
    /// A predicted pickup the authority never confirmed
    CoinRestored { coin_id: u32 },
    ProjectileSpawned { projectile_id: u64 },
    ProjectileDestroyed { projectile_id: u64 },
    MatchEnded { winner_id: PlayerId, coins: u32, local_won: bool },
}

/// Values last confirmed by the authority
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub health: i32,
    pub coins: u32,
    pub facing_right: bool,
    pub alive: bool,
    pub x: f32,
    pub y: f32,
    pub grounded: bool,
}

/// One player as seen from a participant
#[derive(Debug, Clone)]
pub struct PlayerAgent {
    id: PlayerId,
    is_local: bool,
    confirmed: Projection,

    // Local prediction
    predicted_facing: bool,
    direction: f32,

    // Edge-triggered input latches
    fire_latched: bool,
    jump_held: bool,
    jump_queued: bool,

    input_enabled: bool,
    hittable: bool,
    events: Vec<ProjectionEvent>,
}

impl PlayerAgent {
    pub fn from_snapshot(snapshot: &PlayerSnapshot, is_local: bool) -> Self {
        Self {
            id: snapshot.player_id,
            is_local,
            confirmed: Projection {
                health: snapshot.health,
                coins: snapshot.coins,
                facing_right: snapshot.facing_right,
                alive: snapshot.alive,
                x: snapshot.x,
                y: snapshot.y,
                grounded: snapshot.grounded,
            },
            predicted_facing: snapshot.facing_right,
            direction: 0.0,
            fire_latched: false,
            jump_held: false,
            jump_queued: false,
            input_enabled: snapshot.alive,
            hittable: snapshot.alive,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub(crate) fn set_local(&mut self, is_local: bool) {
        self.is_local = is_local;
    }

    pub fn projection(&self) -> &Projection {
        &self.confirmed
    }

    pub fn health(&self) -> i32 {
        self.confirmed.health
    }

    pub fn coins(&self) -> u32 {
        self.confirmed.coins
    }

    pub fn is_alive(&self) -> bool {
        self.confirmed.alive
    }

    /// Facing to render: the local prediction until the authority says otherwise
    pub fn facing_right(&self) -> bool {
        self.predicted_facing
    }

    pub fn direction(&self) -> f32 {
        self.direction
    }

    pub fn accepts_input(&self) -> bool {
        self.input_enabled
    }

    pub fn is_hittable(&self) -> bool {
        self.hittable
    }

    /// Movement input. Applied locally at once; the local agent also tells
    /// the authority so facing can be replicated to everyone else.
    pub fn submit_movement(&mut self, direction: f32) -> Option<ClientMsg> {
        if !self.input_enabled {
            return None;
        }
        let direction = if direction.is_finite() {
            direction.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        self.direction = direction;

        if (self.predicted_facing && direction < 0.0) || (!self.predicted_facing && direction > 0.0) {
            self.predicted_facing = !self.predicted_facing;
        }

        self.is_local.then_some(ClientMsg::Move { direction })
    }

    /// Fire pressed. Ignored until `release_fire` once it has fired.
    pub fn submit_fire_intent(&mut self, facing_right: bool) -> Option<ClientMsg> {
        if !self.is_local || !self.input_enabled || self.fire_latched {
            return None;
        }
        self.fire_latched = true;
        Some(ClientMsg::Fire { facing_right })
    }

    pub fn release_fire(&mut self) {
        self.fire_latched = false;
    }

    /// The local player touched a coin. Hides it right away; the authority
    /// decides whether it counts.
    pub fn submit_collect_coin(&mut self, coin: &mut CoinPickup) -> Option<ClientMsg> {
        if !self.is_local || !self.input_enabled || coin.consumed {
            return None;
        }
        coin.consumed = true;
        self.events.push(ProjectionEvent::CoinVanished { coin_id: coin.coin_id });
        Some(ClientMsg::CollectCoin { coin_id: coin.coin_id })
    }

    pub fn press_jump(&mut self) {
        if self.input_enabled && !self.jump_held {
            self.jump_queued = true;
        }
        self.jump_held = true;
    }

    pub fn release_jump(&mut self) {
        self.jump_held = false;
    }

    /// Consume a pending jump for the physics step
    pub fn take_jump(&mut self) -> bool {
        std::mem::take(&mut self.jump_queued)
    }

    /// Kinematics from local physics, reported to the authority
    pub fn sync_transform(&mut self, x: f32, y: f32, grounded: bool) -> Option<ClientMsg> {
        self.confirmed.x = x;
        self.confirmed.y = y;
        self.confirmed.grounded = grounded;
        (self.is_local && self.input_enabled).then_some(ClientMsg::Transform { x, y, grounded })
    }

    pub fn on_health_replicated(&mut self, health: i32) {
        self.confirmed.health = health;
        self.events.push(ProjectionEvent::HealthChanged {
            player_id: self.id,
            health,
        });
    }

    pub fn on_coins_replicated(&mut self, coins: u32) {
        self.confirmed.coins = coins;
        self.events.push(ProjectionEvent::CoinsChanged {
            player_id: self.id,
            coins,
        });
    }

    pub fn on_facing_replicated(&mut self, facing_right: bool) {
        self.confirmed.facing_right = facing_right;
        self.predicted_facing = facing_right;
        self.events.push(ProjectionEvent::FacingChanged {
            player_id: self.id,
            facing_right,
        });
    }

    /// Kinematics from a transform snapshot. Facing always follows the
    /// authority; local physics owns our own position.
    pub fn on_transform_replicated(&mut self, x: f32, y: f32, facing_right: bool, grounded: bool) {
        let rendered = self.predicted_facing;
        self.confirmed.facing_right = facing_right;
        self.predicted_facing = facing_right;
        if rendered != facing_right {
            self.events.push(ProjectionEvent::FacingChanged {
                player_id: self.id,
                facing_right,
            });
        }

        if self.is_local {
            return;
        }
        self.confirmed.x = x;
        self.confirmed.y = y;
        self.confirmed.grounded = grounded;
    }

    /// Catch up with a full snapshot after missed updates. Only fields that
    /// differ are reported; death stays final.
    pub fn reconcile(&mut self, snapshot: &PlayerSnapshot) {
        if self.confirmed.health != snapshot.health {
            self.on_health_replicated(snapshot.health);
        }
        if self.confirmed.coins != snapshot.coins {
            self.on_coins_replicated(snapshot.coins);
        }
        self.on_transform_replicated(snapshot.x, snapshot.y, snapshot.facing_right, snapshot.grounded);
        if !snapshot.alive {
            self.die();
        }
    }

    /// Out of the match for good: no more input, no more hits
    pub fn die(&mut self) {
        if !self.confirmed.alive && !self.input_enabled {
            return;
        }
        self.confirmed.alive = false;
        self.input_enabled = false;
        self.hittable = false;
        self.fire_latched = false;
        self.jump_queued = false;
        self.direction = 0.0;
        self.events.push(ProjectionEvent::Died { player_id: self.id });
    }

    pub(crate) fn drain_events(&mut self) -> std::vec::Drain<'_, ProjectionEvent> {
        self.events.drain(..)
    }
}
