//! Coin Arena - authoritative state server for a small multiplayer arena
//!
//! One authority owns health, coins, deaths and projectile outcomes for a
//! match. Participants send intents over WebSocket and render the replicated
//! stream through [`agent::ParticipantView`].

pub mod agent;
pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
