//! Arena geometry and the minimal kinematics the authority relies on
//!
//! Real locomotion (rigid bodies, ground checks) belongs to the participant's
//! physics. The authority only needs projectile motion, wall/border tests and
//! player hitboxes to resolve hits.

use crate::config::MatchRules;

/// Player hitbox half extents
pub const PLAYER_HALF_WIDTH: f32 = 0.5;
pub const PLAYER_HALF_HEIGHT: f32 = 0.9;

/// Projectile spawn offset from the shooter's center along the facing
pub const PROJECTILE_SPAWN_OFFSET: f32 = 0.8;

/// Ground locomotion speed (units per second)
pub const GROUND_SPEED: f32 = 25.0;
/// Air locomotion speed (units per second)
pub const AIR_SPEED: f32 = 10.0;
/// Initial vertical jump velocity
pub const JUMP_VELOCITY: f32 = 8.0;
/// Downward acceleration
pub const GRAVITY: f32 = 9.81;
/// Extra gravity applied while falling
pub const FALL_MULTIPLIER: f32 = 2.5;

/// Axis aligned rectangle (center + half extents)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub half_w: f32,
    pub half_h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, half_w: f32, half_h: f32) -> Self {
        Self { x, y, half_w, half_h }
    }

    /// Hitbox of a player standing at `(x, y)`
    pub fn player(x: f32, y: f32) -> Self {
        Self::new(x, y, PLAYER_HALF_WIDTH, PLAYER_HALF_HEIGHT)
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        (px - self.x).abs() <= self.half_w && (py - self.y).abs() <= self.half_h
    }

    /// Distance travelled from `x0` before a horizontal sweep to `x1` at
    /// height `y` enters this rect. Fast projectiles would tunnel through
    /// thin walls with a point test alone.
    pub fn sweep_entry(&self, x0: f32, x1: f32, y: f32) -> Option<f32> {
        if (y - self.y).abs() > self.half_h {
            return None;
        }
        let lo = self.x - self.half_w;
        let hi = self.x + self.half_w;
        if (lo..=hi).contains(&x0) {
            return Some(0.0);
        }
        if x1 >= x0 && x0 < lo && x1 >= lo {
            Some(lo - x0)
        } else if x1 < x0 && x0 > hi && x1 <= hi {
            Some(x0 - hi)
        } else {
            None
        }
    }
}

/// Static arena layout
#[derive(Debug, Clone)]
pub struct ArenaLayout {
    /// Horizontal bound, anything with |x| > border is outside
    pub border: f32,
    /// Floor height
    pub floor_y: f32,
    /// Wall surfaces projectiles stop at
    pub walls: Vec<Rect>,
}

impl ArenaLayout {
    /// Default arena: a flat floor with two low walls near the middle
    pub fn from_rules(rules: &MatchRules) -> Self {
        let border = rules.arena_border;
        Self {
            border,
            floor_y: 0.0,
            walls: vec![
                Rect::new(-border * 0.3, 0.75, 0.25, 0.75),
                Rect::new(border * 0.3, 0.75, 0.25, 0.75),
            ],
        }
    }

    /// An arena without any walls
    pub fn open(border: f32) -> Self {
        Self {
            border,
            floor_y: 0.0,
            walls: Vec::new(),
        }
    }

    pub fn is_out_of_bounds(&self, x: f32) -> bool {
        x < -self.border || x > self.border
    }

    pub fn hits_wall(&self, x: f32, y: f32) -> bool {
        self.walls.iter().any(|w| w.contains(x, y))
    }

    /// Nearest wall entry along a horizontal sweep
    pub fn wall_entry(&self, x0: f32, x1: f32, y: f32) -> Option<f32> {
        self.walls
            .iter()
            .filter_map(|w| w.sweep_entry(x0, x1, y))
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Kinematic state of a player body, owned by a participant's physics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub grounded: bool,
}

impl Body {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            grounded: true,
        }
    }
}

/// Physics helpers shared by the authority and the headless bot
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance a projectile along the horizontal axis, returns the new x
    pub fn advance_projectile(x: f32, direction: f32, speed: f32, dt: f32) -> f32 {
        x + direction * speed * dt
    }

    /// Naive platformer integration: walk, jump, gravity, floor and border.
    pub fn integrate_body(body: &mut Body, direction: f32, jump: bool, arena: &ArenaLayout, dt: f32) {
        let direction = direction.clamp(-1.0, 1.0);
        let speed = if body.grounded { GROUND_SPEED } else { AIR_SPEED };
        body.vel_x = direction * speed;

        if jump && body.grounded {
            body.vel_y = JUMP_VELOCITY;
            body.grounded = false;
        }

        if !body.grounded {
            let gravity = if body.vel_y < 0.0 {
                GRAVITY * FALL_MULTIPLIER
            } else {
                GRAVITY
            };
            body.vel_y -= gravity * dt;
        }

        body.x = (body.x + body.vel_x * dt).clamp(-arena.border, arena.border);
        body.y += body.vel_y * dt;

        if body.y <= arena.floor_y {
            body.y = arena.floor_y;
            body.vel_y = 0.0;
            body.grounded = true;
        }
    }
}
