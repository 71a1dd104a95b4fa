//! Combat system - projectile spawning and hit resolution
//!
//! Only the authority runs this. Participants get `ProjectileSpawned` /
//! `ProjectileDestroyed` for visuals and never resolve hits themselves.

use std::collections::HashMap;

use tracing::debug;

use crate::config::MatchRules;
use crate::ws::protocol::{DestroyReason, PlayerId, ProjectileId, ProjectileSnapshot, ServerMsg};

use super::error::SessionError;
use super::physics::{ArenaLayout, PhysicsSystem, Rect, PROJECTILE_SPAWN_OFFSET};
use super::session::AuthoritySession;

/// Weapon stats for the single projectile type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: i32,
    /// Projectile speed
    pub projectile_speed: f32,
    /// Cooldown between shots (seconds)
    pub cooldown: f32,
}

impl WeaponStats {
    pub fn from_rules(rules: &MatchRules) -> Self {
        Self {
            damage: rules.projectile_damage,
            projectile_speed: rules.projectile_speed,
            cooldown: rules.fire_cooldown_secs,
        }
    }
}

/// Active projectile in the arena
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: ProjectileId,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    /// +1.0 right, -1.0 left
    pub direction: f32,
    pub speed: f32,
    pub damage: i32,
}

impl Projectile {
    pub fn snapshot(&self) -> ProjectileSnapshot {
        ProjectileSnapshot {
            projectile_id: self.id,
            owner_id: self.owner_id,
            x: self.x,
            y: self.y,
            direction: self.direction,
        }
    }
}

/// Handle returned to the match loop after a successful fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileHandle {
    pub id: ProjectileId,
    pub owner_id: PlayerId,
}

/// What a projectile touched, as reported by collision detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    Player(PlayerId),
    Wall,
    OutOfBounds,
}

/// Terminal outcome of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub projectile_id: ProjectileId,
    pub reason: DestroyReason,
    /// Player that took the hit and whether it died, for hits that landed
    pub target: Option<(PlayerId, bool)>,
}

/// Authority-side projectile bookkeeping
pub struct ProjectileResolver {
    weapon: WeaponStats,
    projectiles: Vec<Projectile>,
    cooldowns: HashMap<PlayerId, f32>,
    next_id: ProjectileId,
}

impl ProjectileResolver {
    pub fn new(weapon: WeaponStats) -> Self {
        Self {
            weapon,
            projectiles: Vec::new(),
            cooldowns: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.iter().find(|p| p.id == id)
    }

    /// Spawn a projectile for `owner_id` travelling along its facing
    pub fn fire(
        &mut self,
        session: &AuthoritySession,
        owner_id: PlayerId,
        facing_right: bool,
    ) -> Result<ProjectileHandle, SessionError> {
        let owner = session.living_player(owner_id)?;

        if self.cooldowns.get(&owner_id).is_some_and(|c| *c > 0.0) {
            return Err(SessionError::FireCooldown(owner_id));
        }

        let direction = if facing_right { 1.0 } else { -1.0 };
        let projectile = Projectile {
            id: self.next_id,
            owner_id,
            x: owner.x + direction * PROJECTILE_SPAWN_OFFSET,
            y: owner.y,
            direction,
            speed: self.weapon.projectile_speed,
            damage: self.weapon.damage,
        };
        self.next_id += 1;

        if self.weapon.cooldown > 0.0 {
            self.cooldowns.insert(owner_id, self.weapon.cooldown);
        }

        session.broadcast(ServerMsg::ProjectileSpawned {
            projectile: projectile.snapshot(),
        });

        debug!(projectile_id = projectile.id, owner_id = %owner_id, facing_right, "Projectile fired");

        let handle = ProjectileHandle {
            id: projectile.id,
            owner_id,
        };
        self.projectiles.push(projectile);
        Ok(handle)
    }

    /// Apply a contact to a live projectile. Touching its owner is ignored
    /// and returns `Ok(None)`; every other contact destroys the projectile.
    pub fn resolve_contact(
        &mut self,
        session: &mut AuthoritySession,
        projectile_id: ProjectileId,
        contact: Contact,
    ) -> Result<Option<Resolution>, SessionError> {
        let idx = self
            .projectiles
            .iter()
            .position(|p| p.id == projectile_id)
            .ok_or(SessionError::UnknownProjectile(projectile_id))?;
        let (owner_id, damage) = (self.projectiles[idx].owner_id, self.projectiles[idx].damage);

        let (reason, target) = match contact {
            Contact::Player(target) if target == owner_id => return Ok(None),
            Contact::Player(target) => {
                // Late hits after a death or the match end are dropped, the
                // projectile is still spent.
                let killed = match session.apply_damage(target, damage) {
                    Ok(outcome) => Some((target, outcome.killed)),
                    Err(e) => {
                        debug!(projectile_id, target_id = %target, error = %e, "Hit discarded");
                        None
                    }
                };
                (DestroyReason::Hit, killed)
            }
            Contact::Wall => (DestroyReason::Wall, None),
            Contact::OutOfBounds => (DestroyReason::OutOfBounds, None),
        };

        self.projectiles.remove(idx);
        session.broadcast(ServerMsg::ProjectileDestroyed {
            projectile_id,
            reason,
        });

        Ok(Some(Resolution {
            projectile_id,
            reason,
            target,
        }))
    }

    /// Advance every projectile by `dt` and resolve the first contact along
    /// its path: a non-owner player, a wall, or the arena border.
    pub fn step(
        &mut self,
        session: &mut AuthoritySession,
        arena: &ArenaLayout,
        dt: f32,
    ) -> Vec<Resolution> {
        for cooldown in self.cooldowns.values_mut() {
            *cooldown = (*cooldown - dt).max(0.0);
        }
        self.cooldowns.retain(|_, c| *c > 0.0);

        let mut contacts = Vec::new();
        for projectile in self.projectiles.iter_mut() {
            let x0 = projectile.x;
            let x1 = PhysicsSystem::advance_projectile(x0, projectile.direction, projectile.speed, dt);

            let mut nearest: Option<(f32, Contact)> = None;
            let mut consider = |distance: f32, contact: Contact| {
                if nearest.map_or(true, |(d, _)| distance < d) {
                    nearest = Some((distance, contact));
                }
            };

            for player in session.players().filter(|p| p.alive && p.id != projectile.owner_id) {
                if let Some(d) = Rect::player(player.x, player.y).sweep_entry(x0, x1, projectile.y) {
                    consider(d, Contact::Player(player.id));
                }
            }
            if let Some(d) = arena.wall_entry(x0, x1, projectile.y) {
                consider(d, Contact::Wall);
            }
            if arena.is_out_of_bounds(x1) {
                let edge = if projectile.direction > 0.0 { arena.border } else { -arena.border };
                consider((edge - x0).abs(), Contact::OutOfBounds);
            }

            projectile.x = x1;
            if let Some((_, contact)) = nearest {
                contacts.push((projectile.id, contact));
            }
        }

        contacts
            .into_iter()
            .filter_map(|(id, contact)| self.resolve_contact(session, id, contact).ok().flatten())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ProjectileSnapshot> {
        self.projectiles.iter().map(Projectile::snapshot).collect()
    }
}
