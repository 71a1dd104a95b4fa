//! Coin pickups placed by the authority

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ws::protocol::{CoinId, CoinSnapshot};

use super::error::SessionError;
use super::physics::ArenaLayout;

/// Height range coins float at
const COIN_MIN_Y: f32 = 0.5;
const COIN_MAX_Y: f32 = 3.0;

/// The set of coins still lying in the arena
#[derive(Debug, Clone, Default)]
pub struct CoinField {
    coins: BTreeMap<CoinId, CoinSnapshot>,
}

impl CoinField {
    /// Scatter `count` coins inside the arena border. Same seed, same layout.
    pub fn scatter(count: u32, seed: u64, arena: &ArenaLayout) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let span = arena.border * 0.9;
        let coins = (0..count)
            .map(|coin_id| {
                let coin = CoinSnapshot {
                    coin_id,
                    x: rng.gen_range(-span..=span),
                    y: rng.gen_range(COIN_MIN_Y..=COIN_MAX_Y),
                };
                (coin_id, coin)
            })
            .collect();
        Self { coins }
    }

    pub fn from_coins(coins: impl IntoIterator<Item = CoinSnapshot>) -> Self {
        Self {
            coins: coins.into_iter().map(|c| (c.coin_id, c)).collect(),
        }
    }

    pub fn contains(&self, coin_id: CoinId) -> bool {
        self.coins.contains_key(&coin_id)
    }

    /// Remove a coin so it can never be credited twice
    pub fn take(&mut self, coin_id: CoinId) -> Result<CoinSnapshot, SessionError> {
        self.coins
            .remove(&coin_id)
            .ok_or(SessionError::UnknownCoin(coin_id))
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn snapshot(&self) -> Vec<CoinSnapshot> {
        self.coins.values().cloned().collect()
    }
}
