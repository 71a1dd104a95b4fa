//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, empty = any)
    pub client_origin: Option<String>,

    /// Match rules handed to the authority
    pub rules: MatchRules,
}

/// Tunable rules of a single match
#[derive(Clone, Debug, PartialEq)]
pub struct MatchRules {
    /// Health every player spawns with
    pub max_health: i32,
    /// Fixed damage dealt by one projectile hit
    pub projectile_damage: i32,
    /// Projectile speed in arena units per second
    pub projectile_speed: f32,
    /// Minimum time between two shots of the same player (seconds)
    pub fire_cooldown_secs: f32,
    /// Projectiles beyond |x| > border are destroyed
    pub arena_border: f32,
    /// Number of coins placed at match creation
    pub coin_count: u32,
    /// Seed for coin placement
    pub seed: u64,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            max_health: 100,
            projectile_damage: 40,
            projectile_speed: 20.0,
            fire_cooldown_secs: 0.25,
            arena_border: 10.0,
            coin_count: 12,
            seed: 0x5eed,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: None,
            rules: MatchRules::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = MatchRules::default();
        let rules = MatchRules {
            max_health: parse_or("MAX_HEALTH", defaults.max_health)?,
            projectile_damage: parse_or("PROJECTILE_DAMAGE", defaults.projectile_damage)?,
            projectile_speed: parse_or("PROJECTILE_SPEED", defaults.projectile_speed)?,
            fire_cooldown_secs: parse_or("FIRE_COOLDOWN_SECS", defaults.fire_cooldown_secs)?,
            arena_border: parse_or("ARENA_BORDER", defaults.arena_border)?,
            coin_count: parse_or("COIN_COUNT", defaults.coin_count)?,
            seed: match env::var("MATCH_SEED") {
                Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid("MATCH_SEED"))?,
                Err(_) => rand::random(),
            },
        };
        rules.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            rules,
        })
    }
}

impl MatchRules {
    /// Reject rules the authority cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_health <= 0 {
            return Err(ConfigError::Invalid("MAX_HEALTH"));
        }
        if self.projectile_damage <= 0 {
            return Err(ConfigError::Invalid("PROJECTILE_DAMAGE"));
        }
        if !(self.projectile_speed > 0.0) {
            return Err(ConfigError::Invalid("PROJECTILE_SPEED"));
        }
        if self.fire_cooldown_secs < 0.0 {
            return Err(ConfigError::Invalid("FIRE_COOLDOWN_SECS"));
        }
        if !(self.arena_border > 0.0) {
            return Err(ConfigError::Invalid("ARENA_BORDER"));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
