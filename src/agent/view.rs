//! Participant view of a match
//!
//! Applies the authority's replicated stream to local agents, coin pickups and
//! projectile visuals. Nothing here can change authoritative state; the only
//! way out is the intents the local agent returns.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::game::physics::PhysicsSystem;
use crate::ws::protocol::{
    ClientMsg, CoinId, CoinSnapshot, MatchSnapshot, PlayerId, ProjectileId, ProjectileSnapshot,
    ServerMsg,
};

use super::{PlayerAgent, ProjectionEvent};

/// Coin as the participant renders it
#[derive(Debug, Clone, PartialEq)]
pub struct CoinPickup {
    pub coin_id: CoinId,
    pub x: f32,
    pub y: f32,
    /// Hidden locally, either predicted or confirmed
    pub consumed: bool,
}

impl CoinPickup {
    pub fn new(coin_id: CoinId, x: f32, y: f32) -> Self {
        Self {
            coin_id,
            x,
            y,
            consumed: false,
        }
    }
}

impl From<&CoinSnapshot> for CoinPickup {
    fn from(coin: &CoinSnapshot) -> Self {
        Self::new(coin.coin_id, coin.x, coin.y)
    }
}

/// Projectile visual; it never deals damage on a participant
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileVisual {
    pub projectile_id: ProjectileId,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub direction: f32,
}

impl From<&ProjectileSnapshot> for ProjectileVisual {
    fn from(p: &ProjectileSnapshot) -> Self {
        Self {
            projectile_id: p.projectile_id,
            owner_id: p.owner_id,
            x: p.x,
            y: p.y,
            direction: p.direction,
        }
    }
}

/// Outcome as announced by the authority
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub winner_id: PlayerId,
    pub coins: u32,
}

#[derive(Debug, Default)]
pub struct ParticipantView {
    local_id: Option<PlayerId>,
    agents: BTreeMap<PlayerId, PlayerAgent>,
    coins: HashMap<CoinId, CoinPickup>,
    projectiles: BTreeMap<ProjectileId, ProjectileVisual>,
    result: Option<MatchResult>,
    last_tick: u64,
    last_pong: Option<u64>,
    events: Vec<ProjectionEvent>,
}

impl ParticipantView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn agent(&self, id: PlayerId) -> Option<&PlayerAgent> {
        self.agents.get(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &PlayerAgent> {
        self.agents.values()
    }

    pub fn local_agent(&self) -> Option<&PlayerAgent> {
        self.local_id.and_then(|id| self.agents.get(&id))
    }

    pub fn local_agent_mut(&mut self) -> Option<&mut PlayerAgent> {
        let id = self.local_id?;
        self.agents.get_mut(&id)
    }

    /// Coins still visible
    pub fn coins(&self) -> impl Iterator<Item = &CoinPickup> {
        self.coins.values().filter(|c| !c.consumed)
    }

    pub fn coin(&self, coin_id: CoinId) -> Option<&CoinPickup> {
        self.coins.get(&coin_id)
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &ProjectileVisual> {
        self.projectiles.values()
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn last_pong(&self) -> Option<u64> {
        self.last_pong
    }

    /// True once the local player is known to have won
    pub fn local_won(&self) -> bool {
        matches!((self.result, self.local_id), (Some(r), Some(id)) if r.winner_id == id)
    }

    /// Local player overlapped a coin
    pub fn collect_coin(&mut self, coin_id: CoinId) -> Option<ClientMsg> {
        let id = self.local_id?;
        let agent = self.agents.get_mut(&id)?;
        let coin = self.coins.get_mut(&coin_id)?;
        let intent = agent.submit_collect_coin(coin);
        self.pull_events(id);
        intent
    }

    /// Move projectile visuals between snapshots
    pub fn advance_projectiles(&mut self, speed: f32, dt: f32) {
        for p in self.projectiles.values_mut() {
            p.x = PhysicsSystem::advance_projectile(p.x, p.direction, speed, dt);
        }
    }

    /// Apply one replicated message
    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::Welcome { player_id, .. } => {
                self.local_id = Some(*player_id);
                for agent in self.agents.values_mut() {
                    agent.set_local(agent.id() == *player_id);
                }
            }
            ServerMsg::MatchJoined { snapshot, .. } => self.load_snapshot(snapshot),
            ServerMsg::PlayerJoined { player } => {
                let is_local = Some(player.player_id) == self.local_id;
                self.agents
                    .entry(player.player_id)
                    .or_insert_with(|| PlayerAgent::from_snapshot(player, is_local));
            }
            ServerMsg::PlayerLeft { player_id, reason } => {
                debug!(player_id = %player_id, reason = %reason, "Player left");
                self.with_agent(*player_id, PlayerAgent::die);
            }
            ServerMsg::HealthChanged { player_id, health } => {
                let health = *health;
                self.with_agent(*player_id, |a| a.on_health_replicated(health));
            }
            ServerMsg::CoinsChanged { player_id, coins } => {
                let coins = *coins;
                self.with_agent(*player_id, |a| a.on_coins_replicated(coins));
            }
            ServerMsg::FacingChanged {
                player_id,
                facing_right,
            } => {
                let facing_right = *facing_right;
                self.with_agent(*player_id, |a| a.on_facing_replicated(facing_right));
            }
            ServerMsg::PlayerDied { player_id } => {
                self.with_agent(*player_id, PlayerAgent::die);
            }
            ServerMsg::ProjectileSpawned { projectile } => {
                self.projectiles
                    .insert(projectile.projectile_id, ProjectileVisual::from(projectile));
                self.events.push(ProjectionEvent::ProjectileSpawned {
                    projectile_id: projectile.projectile_id,
                });
            }
            ServerMsg::ProjectileDestroyed { projectile_id, .. } => {
                if self.projectiles.remove(projectile_id).is_some() {
                    self.events.push(ProjectionEvent::ProjectileDestroyed {
                        projectile_id: *projectile_id,
                    });
                }
            }
            ServerMsg::CoinRemoved { coin_id, .. } => {
                if let Some(coin) = self.coins.remove(coin_id) {
                    if !coin.consumed {
                        self.events.push(ProjectionEvent::CoinVanished { coin_id: *coin_id });
                    }
                }
            }
            ServerMsg::Transforms {
                tick,
                players,
                projectiles,
            } => {
                if *tick < self.last_tick {
                    return;
                }
                self.last_tick = *tick;
                for t in players {
                    self.with_agent(t.player_id, |a| {
                        a.on_transform_replicated(t.x, t.y, t.facing_right, t.grounded)
                    });
                }
                self.projectiles = projectiles
                    .iter()
                    .map(|p| (p.projectile_id, ProjectileVisual::from(p)))
                    .collect();
            }
            ServerMsg::MatchEnded { winner_id, coins } => {
                self.result = Some(MatchResult {
                    winner_id: *winner_id,
                    coins: *coins,
                });
                self.events.push(ProjectionEvent::MatchEnded {
                    winner_id: *winner_id,
                    coins: *coins,
                    local_won: Some(*winner_id) == self.local_id,
                });
            }
            ServerMsg::Pong { t } => self.last_pong = Some(*t),
        }
    }

    /// Everything that changed since the last call, in arrival order
    pub fn drain_events(&mut self) -> Vec<ProjectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replace the world with a full snapshot. Also serves as the resync
    /// after a lagged stream, so known agents are reconciled in place and
    /// anything that changed in between is reported.
    fn load_snapshot(&mut self, snapshot: &MatchSnapshot) {
        let mut previous = std::mem::take(&mut self.agents);
        for p in &snapshot.players {
            let agent = match previous.remove(&p.player_id) {
                Some(mut agent) => {
                    agent.reconcile(p);
                    self.events.extend(agent.drain_events());
                    agent
                }
                None => PlayerAgent::from_snapshot(p, Some(p.player_id) == self.local_id),
            };
            self.agents.insert(p.player_id, agent);
        }

        let previous_coins = std::mem::take(&mut self.coins);
        self.coins = snapshot
            .coins
            .iter()
            .map(|c| (c.coin_id, CoinPickup::from(c)))
            .collect();
        for (coin_id, coin) in previous_coins {
            let still_there = self.coins.contains_key(&coin_id);
            if coin.consumed && still_there {
                self.events.push(ProjectionEvent::CoinRestored { coin_id });
            } else if !coin.consumed && !still_there {
                self.events.push(ProjectionEvent::CoinVanished { coin_id });
            }
        }

        // Projectiles arrive with the next transform snapshot
        match (snapshot.ended, snapshot.winner_id) {
            (true, Some(winner_id)) => {
                let coins = self.agents.get(&winner_id).map(|a| a.coins()).unwrap_or(0);
                if self.result.is_none() {
                    self.events.push(ProjectionEvent::MatchEnded {
                        winner_id,
                        coins,
                        local_won: Some(winner_id) == self.local_id,
                    });
                }
                self.result = Some(MatchResult { winner_id, coins });
            }
            _ => self.result = None,
        }
    }

    fn with_agent(&mut self, id: PlayerId, f: impl FnOnce(&mut PlayerAgent)) {
        match self.agents.get_mut(&id) {
            Some(agent) => {
                f(agent);
                self.pull_events(id);
            }
            None => debug!(player_id = %id, "Update for unknown player ignored"),
        }
    }

    fn pull_events(&mut self, id: PlayerId) {
        if let Some(agent) = self.agents.get_mut(&id) {
            self.events.extend(agent.drain_events());
        }
    }
}
