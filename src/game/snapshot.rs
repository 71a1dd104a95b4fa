//! Periodic transform snapshots
//!
//! Health, coins, facing and deaths are replicated as discrete field changes.
//! Positions change every tick, so they go out in batches at the snapshot rate.

use crate::ws::protocol::{ProjectileSnapshot, ServerMsg, TransformSnapshot};

/// Builds transform snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    /// Running stats
    stats: SnapshotStats,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            stats: SnapshotStats::default(),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used when the match ends)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message
    pub fn build(
        &mut self,
        tick: u64,
        players: Vec<TransformSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
    ) -> ServerMsg {
        self.stats.record(players.len(), projectiles.len());
        ServerMsg::Transforms {
            tick,
            players,
            projectiles,
        }
    }

    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }
}

/// Snapshot stats for debugging
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub avg_players_per_snapshot: f32,
    pub max_projectiles: usize,
}

impl SnapshotStats {
    pub fn record(&mut self, player_count: usize, projectile_count: usize) {
        self.total_snapshots += 1;
        self.max_projectiles = self.max_projectiles.max(projectile_count);

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_players_per_snapshot =
            self.avg_players_per_snapshot * ((n - 1.0) / n) + (player_count as f32 / n);
    }
}
