//! Application state shared across routes

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::game::MatchHandle;
use crate::ws::protocol::PlayerId;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub match_handle: MatchHandle,
    /// Open connections, keyed by player id, with their connect time
    pub participants: Arc<DashMap<PlayerId, u64>>,
}

impl AppState {
    pub fn new(config: Config, match_handle: MatchHandle) -> Self {
        Self {
            config: Arc::new(config),
            match_handle,
            participants: Arc::new(DashMap::new()),
        }
    }

    pub fn connected_count(&self) -> usize {
        self.participants.len()
    }
}
