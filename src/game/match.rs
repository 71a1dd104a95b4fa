//! Match task and authoritative tick loop

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::util::time::{snapshot_interval_ticks, tick_delta, tick_duration, unix_millis};
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

use super::coins::CoinField;
use super::combat::{ProjectileResolver, WeaponStats};
use super::error::SessionError;
use super::physics::ArenaLayout;
use super::replication::{
    intent_channel, Outbound, ReplicationChannel, INTENT_CAPACITY, OUTBOUND_CAPACITY,
};
use super::session::AuthoritySession;
use super::snapshot::SnapshotBuilder;
use super::PlayerInput;

/// Intents older than this when applied mean the loop is falling behind
const SLOW_INTENT_MS: u64 = 250;

/// Read-only view of the match published for HTTP handlers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchStatus {
    pub match_id: Uuid,
    pub tick: u64,
    pub players: usize,
    pub alive_count: usize,
    pub ended: bool,
    pub winner_id: Option<PlayerId>,
    pub coins_left: usize,
    pub projectiles: usize,
}

/// Handle to the running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    input_tx: mpsc::Sender<PlayerInput>,
    channel: ReplicationChannel,
    status: Arc<RwLock<MatchStatus>>,
}

impl MatchHandle {
    /// Queue an intent for the match loop without waiting.
    /// Returns false if the intent was dropped.
    pub fn submit(&self, player_id: PlayerId, msg: ClientMsg) -> bool {
        let input = PlayerInput {
            player_id,
            msg,
            received_at: unix_millis(),
        };
        match self.input_tx.try_send(input) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(input)) => {
                warn!(player_id = %input.player_id, "Intent queue full, dropping intent");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(player_id = %player_id, "Match loop gone, dropping intent");
                false
            }
        }
    }

    /// Queue an intent that must not be lost, waiting for queue space.
    /// Returns false only if the match loop is gone.
    pub async fn submit_reliable(&self, player_id: PlayerId, msg: ClientMsg) -> bool {
        let input = PlayerInput {
            player_id,
            msg,
            received_at: unix_millis(),
        };
        match self.input_tx.send(input).await {
            Ok(()) => true,
            Err(_) => {
                debug!(player_id = %player_id, "Match loop gone, dropping intent");
                false
            }
        }
    }

    /// Subscribe to everything the authority replicates
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.channel.subscribe()
    }

    pub fn status(&self) -> MatchStatus {
        self.status.read().clone()
    }
}

/// The authoritative game match
pub struct GameMatch {
    session: AuthoritySession,
    resolver: ProjectileResolver,
    arena: ArenaLayout,
    input_rx: mpsc::Receiver<PlayerInput>,
    snapshot_builder: SnapshotBuilder,
    status: Arc<RwLock<MatchStatus>>,
    tick: u64,
}

impl GameMatch {
    /// Create a new match and the handle used to talk to it
    pub fn new(id: Uuid, rules: MatchRules) -> Result<(Self, MatchHandle), SessionError> {
        Self::with_capacity(id, rules, OUTBOUND_CAPACITY, INTENT_CAPACITY)
    }

    /// Create a match with explicit replication and intent queue sizes
    pub fn with_capacity(
        id: Uuid,
        rules: MatchRules,
        outbound_capacity: usize,
        intent_capacity: usize,
    ) -> Result<(Self, MatchHandle), SessionError> {
        let channel = ReplicationChannel::new(outbound_capacity);
        let arena = ArenaLayout::from_rules(&rules);
        let coins = CoinField::scatter(rules.coin_count, rules.seed, &arena);
        let resolver = ProjectileResolver::new(WeaponStats::from_rules(&rules));
        let session = AuthoritySession::new(id, rules, coins, &channel)?;

        let (input_tx, input_rx) = intent_channel(intent_capacity);
        let status = Arc::new(RwLock::new(MatchStatus {
            match_id: id,
            coins_left: session.coins().len(),
            ..Default::default()
        }));

        let handle = MatchHandle {
            id,
            input_tx,
            channel,
            status: status.clone(),
        };

        let game_match = Self {
            session,
            resolver,
            arena,
            input_rx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval_ticks()),
            status,
            tick: 0,
        };

        Ok((game_match, handle))
    }

    pub fn session(&self) -> &AuthoritySession {
        &self.session
    }

    pub fn resolver(&self) -> &ProjectileResolver {
        &self.resolver
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(
            match_id = %self.session.match_id(),
            coins = self.session.coins().len(),
            "Match loop started"
        );

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            if !self.process_inputs() {
                break;
            }
            self.run_tick(tick_delta());
        }

        let stats = self.snapshot_builder.stats();
        info!(
            match_id = %self.session.match_id(),
            ticks = self.tick,
            snapshots = stats.total_snapshots,
            avg_players = stats.avg_players_per_snapshot,
            max_projectiles = stats.max_projectiles,
            "Match loop stopped"
        );
    }

    /// Process all pending intents. Returns false once the queue is closed.
    pub fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => {
                    let player_id = input.player_id;
                    let queued_ms = unix_millis().saturating_sub(input.received_at);
                    if queued_ms > SLOW_INTENT_MS {
                        warn!(player_id = %player_id, queued_ms, "Intent waited long in queue");
                    }
                    if let Err(e) = self.handle_input(input) {
                        log_rejection(player_id, &e);
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Apply one intent to the authority
    pub fn handle_input(&mut self, input: PlayerInput) -> Result<(), SessionError> {
        let id = input.player_id;
        match input.msg {
            ClientMsg::JoinMatch => {
                self.session.register_player(id)?;
            }
            ClientMsg::Move { direction } => {
                self.session.update_movement(id, direction)?;
            }
            ClientMsg::Transform { x, y, grounded } => {
                self.session.update_transform(id, x, y, grounded)?;
            }
            ClientMsg::Fire { facing_right } => {
                self.resolver.fire(&self.session, id, facing_right)?;
            }
            ClientMsg::CollectCoin { coin_id } => {
                self.session.collect_coin(id, coin_id)?;
            }
            ClientMsg::Ping { t } => {
                self.session.send_to(id, ServerMsg::Pong { t });
            }
            ClientMsg::LeaveMatch => {
                self.session.remove_player(id)?;
            }
            ClientMsg::Resync => {
                self.session.resync(id)?;
            }
        }
        Ok(())
    }

    /// Run a single simulation tick
    pub fn run_tick(&mut self, dt: f32) {
        self.tick += 1;
        let was_ended = self.session.is_ended();

        self.resolver.step(&mut self.session, &self.arena, dt);

        if self.session.is_ended() && !was_ended {
            self.snapshot_builder.force_next();
        }

        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(
                self.tick,
                self.session.transforms(),
                self.resolver.snapshot(),
            );
            self.session.broadcast(snapshot);
        }

        self.publish_status();
    }

    fn publish_status(&self) {
        let mut status = self.status.write();
        status.tick = self.tick;
        status.players = self.session.players().count();
        status.alive_count = self.session.alive_count();
        status.ended = self.session.is_ended();
        status.winner_id = self.session.winner();
        status.coins_left = self.session.coins().len();
        status.projectiles = self.resolver.projectiles().len();
    }
}

fn log_rejection(player_id: PlayerId, error: &SessionError) {
    match error {
        e if e.is_stale() => {
            debug!(player_id = %player_id, error = %error, "Stale intent discarded");
        }
        SessionError::FireCooldown(_) | SessionError::UnknownCoin(_) => {
            debug!(player_id = %player_id, error = %error, "Intent discarded");
        }
        _ => {
            warn!(player_id = %player_id, error = %error, "Intent rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::replication::drain;

    fn new_match() -> (GameMatch, MatchHandle) {
        GameMatch::new(
            Uuid::new_v4(),
            MatchRules {
                coin_count: 3,
                fire_cooldown_secs: 0.0,
                seed: 11,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn intents_are_applied_in_queue_order() {
        let (mut game, handle) = new_match();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(handle.submit(a, ClientMsg::JoinMatch));
        assert!(handle.submit(b, ClientMsg::JoinMatch));
        assert!(handle.submit(a, ClientMsg::CollectCoin { coin_id: 0 }));
        assert!(handle.submit(b, ClientMsg::CollectCoin { coin_id: 0 }));
        assert!(game.process_inputs());

        assert_eq!(game.session().alive_count(), 2);
        assert_eq!(game.session().player(a).unwrap().coins, 1);
        assert_eq!(game.session().player(b).unwrap().coins, 0);
    }

    #[test]
    fn rejected_intents_do_not_stop_the_loop() {
        let (mut game, handle) = new_match();
        let a = Uuid::new_v4();

        handle.submit(a, ClientMsg::JoinMatch);
        handle.submit(a, ClientMsg::JoinMatch);
        handle.submit(Uuid::new_v4(), ClientMsg::Fire { facing_right: true });
        handle.submit(a, ClientMsg::Move { direction: -1.0 });
        assert!(game.process_inputs());

        assert_eq!(game.session().alive_count(), 1);
        assert!(!game.session().player(a).unwrap().facing_right);
    }

    #[test]
    fn closed_queue_stops_processing() {
        let (mut game, handle) = new_match();
        drop(handle);
        assert!(!game.process_inputs());
    }

    #[test]
    fn ping_is_answered_point_to_point() {
        let (mut game, handle) = new_match();
        let mut rx = handle.subscribe();
        let a = Uuid::new_v4();

        handle.submit(a, ClientMsg::Ping { t: 42 });
        game.process_inputs();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].msg, ServerMsg::Pong { t: 42 });
        assert!(out[0].is_for(a));
    }

    #[test]
    fn tick_publishes_status_and_snapshots() {
        let (mut game, handle) = new_match();
        let mut rx = handle.subscribe();
        handle.submit(Uuid::new_v4(), ClientMsg::JoinMatch);
        game.process_inputs();
        drain(&mut rx);

        for _ in 0..snapshot_interval_ticks() {
            game.run_tick(tick_delta());
        }

        let status = handle.status();
        assert_eq!(status.players, 1);
        assert_eq!(status.alive_count, 1);
        assert_eq!(status.coins_left, 3);
        assert!(!status.ended);

        let snapshots = drain(&mut rx)
            .into_iter()
            .filter(|o| matches!(o.msg, ServerMsg::Transforms { .. }))
            .count();
        assert_eq!(snapshots, 1);
    }

    #[test]
    fn leaving_player_hands_the_win_to_the_other() {
        let (mut game, handle) = new_match();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        handle.submit(a, ClientMsg::JoinMatch);
        handle.submit(b, ClientMsg::JoinMatch);
        handle.submit(a, ClientMsg::LeaveMatch);
        game.process_inputs();
        game.run_tick(tick_delta());

        let status = handle.status();
        assert!(status.ended);
        assert_eq!(status.winner_id, Some(b));
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_when_handles_drop() {
        let (game, handle) = new_match();
        let task = tokio::spawn(game.run());
        handle.submit(Uuid::new_v4(), ClientMsg::JoinMatch);
        tokio::time::sleep(tick_duration() * 3).await;
        assert_eq!(handle.status().players, 1);

        drop(handle);
        tokio::time::timeout(tick_duration() * 10, task)
            .await
            .expect("match loop should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn reliable_join_waits_for_queue_space() {
        let (mut game, handle) = GameMatch::with_capacity(
            Uuid::new_v4(),
            MatchRules::default(),
            OUTBOUND_CAPACITY,
            1,
        )
        .unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(handle.submit(a, ClientMsg::JoinMatch));
        assert!(!handle.submit(b, ClientMsg::JoinMatch));

        let pending = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit_reliable(b, ClientMsg::JoinMatch).await })
        };
        tokio::task::yield_now().await;

        game.process_inputs();
        assert!(pending.await.unwrap());
        game.process_inputs();

        assert_eq!(game.session().alive_count(), 2);
        assert!(game.session().player(b).is_some());
    }

    #[test]
    fn resync_is_answered_with_a_snapshot() {
        let (mut game, handle) = new_match();
        let mut rx = handle.subscribe();
        let a = Uuid::new_v4();
        handle.submit(a, ClientMsg::JoinMatch);
        game.process_inputs();
        drain(&mut rx);

        handle.submit(a, ClientMsg::Resync);
        handle.submit(Uuid::new_v4(), ClientMsg::Resync);
        game.process_inputs();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_for(a));
        assert!(matches!(out[0].msg, ServerMsg::MatchJoined { .. }));
    }

}
