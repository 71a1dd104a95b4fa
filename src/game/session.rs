//! Authority session: the single writer of canonical player and match state
//!
//! Every mutation goes through this type and every accepted mutation is
//! replicated before the call returns. The owning match task serializes all
//! calls, so `alive_count` and `winner` transitions can never interleave.

use std::collections::BTreeMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::util::time::unix_millis;
use crate::ws::protocol::{
    CoinId, MatchSnapshot, PlayerId, PlayerSnapshot, ServerMsg, TransformSnapshot,
};

use super::coins::CoinField;
use super::error::{SessionError, StaleReason};
use super::replication::{AuthorityLink, ReplicationChannel};

/// Spawn slots as fractions of the arena border, used round robin
const SPAWN_SLOTS: [f32; 4] = [-0.8, 0.8, -0.4, 0.4];

/// Canonical state of one player (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub health: i32,
    pub coins: u32,
    pub alive: bool,
    pub facing_right: bool,

    // Reported by the participant's physics, trusted as-is
    pub direction: f32,
    pub x: f32,
    pub y: f32,
    pub grounded: bool,

    pub connected: bool,
    pub joined_at: u64,
    pub death_time: Option<u64>,
}

impl PlayerRecord {
    fn new(id: PlayerId, health: i32, x: f32) -> Self {
        Self {
            id,
            health,
            coins: 0,
            alive: true,
            facing_right: x <= 0.0,
            direction: 0.0,
            x,
            y: 0.0,
            grounded: true,
            connected: true,
            joined_at: unix_millis(),
            death_time: None,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id,
            health: self.health,
            coins: self.coins,
            alive: self.alive,
            facing_right: self.facing_right,
            x: self.x,
            y: self.y,
            grounded: self.grounded,
        }
    }

    pub fn transform(&self) -> TransformSnapshot {
        TransformSnapshot {
            player_id: self.id,
            x: self.x,
            y: self.y,
            facing_right: self.facing_right,
            grounded: self.grounded,
        }
    }
}

/// Result of an accepted damage request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    pub health: i32,
    pub killed: bool,
}

/// Canonical match state plus the write end of the replication channel
pub struct AuthoritySession {
    match_id: Uuid,
    rules: MatchRules,
    players: BTreeMap<PlayerId, PlayerRecord>,
    alive_count: usize,
    joined_total: usize,
    winner: Option<PlayerId>,
    ended: bool,
    coins: CoinField,
    link: AuthorityLink,
}

impl AuthoritySession {
    /// Bind a new authority to `channel`. Fails if one is already bound.
    pub fn new(
        match_id: Uuid,
        rules: MatchRules,
        coins: CoinField,
        channel: &ReplicationChannel,
    ) -> Result<Self, SessionError> {
        let link = channel.claim_authority()?;
        Ok(Self {
            match_id,
            rules,
            players: BTreeMap::new(),
            alive_count: 0,
            joined_total: 0,
            winner: None,
            ended: false,
            coins,
            link,
        })
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn joined_total(&self) -> usize {
        self.joined_total
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn coins(&self) -> &CoinField {
        &self.coins
    }

    /// Send a message on the authority's replication channel
    pub fn broadcast(&self, msg: ServerMsg) {
        self.link.broadcast(msg);
    }

    /// Send a message to a single participant
    pub fn send_to(&self, player_id: PlayerId, msg: ServerMsg) {
        self.link.send_to(player_id, msg);
    }

    /// Add a participant's player. Allowed before and during the match.
    pub fn register_player(&mut self, id: PlayerId) -> Result<PlayerRecord, SessionError> {
        if self.players.contains_key(&id) {
            return Err(SessionError::DuplicateId(id));
        }
        if self.ended {
            return Err(SessionError::StaleState(StaleReason::MatchEnded));
        }

        let slot = SPAWN_SLOTS[self.joined_total % SPAWN_SLOTS.len()];
        let record = PlayerRecord::new(id, self.rules.max_health, slot * self.rules.arena_border);

        self.players.insert(id, record.clone());
        self.alive_count += 1;
        self.joined_total += 1;
        self.debug_check_alive_count();

        self.link.broadcast(ServerMsg::PlayerJoined {
            player: record.snapshot(),
        });
        self.send_snapshot(id);

        info!(
            match_id = %self.match_id,
            player_id = %id,
            alive_count = self.alive_count,
            "Player registered"
        );

        Ok(record)
    }

    /// Resend the full state to a known participant whose stream lagged.
    /// Works for dead players and after the match ended.
    pub fn resync(&self, id: PlayerId) -> Result<(), SessionError> {
        if !self.players.contains_key(&id) {
            return Err(SessionError::UnknownPlayer(id));
        }
        self.send_snapshot(id);
        debug!(match_id = %self.match_id, player_id = %id, "Snapshot resent");
        Ok(())
    }

    fn send_snapshot(&self, id: PlayerId) {
        self.link.send_to(
            id,
            ServerMsg::MatchJoined {
                match_id: self.match_id,
                snapshot: self.snapshot(),
            },
        );
    }

    /// Look up a player that may still act: match running, player alive
    pub fn living_player(&self, id: PlayerId) -> Result<&PlayerRecord, SessionError> {
        if self.ended {
            return Err(SessionError::StaleState(StaleReason::MatchEnded));
        }
        let player = self.players.get(&id).ok_or(SessionError::UnknownPlayer(id))?;
        if !player.alive {
            return Err(SessionError::StaleState(StaleReason::PlayerDead(id)));
        }
        Ok(player)
    }

    fn living_player_mut(&mut self, id: PlayerId) -> Result<&mut PlayerRecord, SessionError> {
        self.living_player(id)?;
        self.players.get_mut(&id).ok_or(SessionError::UnknownPlayer(id))
    }

    /// Subtract health from `target`, killing it at zero
    pub fn apply_damage(&mut self, target: PlayerId, amount: i32) -> Result<DamageOutcome, SessionError> {
        if amount <= 0 {
            return Err(SessionError::InvalidAmount(amount));
        }

        let player = self.living_player_mut(target)?;
        player.health = (player.health - amount).max(0);
        let health = player.health;

        self.link.broadcast(ServerMsg::HealthChanged {
            player_id: target,
            health,
        });

        debug!(match_id = %self.match_id, player_id = %target, amount, health, "Damage applied");

        let killed = health == 0;
        if killed {
            self.kill(target);
        }

        Ok(DamageOutcome { health, killed })
    }

    /// Add one coin to a living player's total
    pub fn credit_coin(&mut self, id: PlayerId) -> Result<u32, SessionError> {
        let player = self.living_player_mut(id)?;
        player.coins += 1;
        let coins = player.coins;

        self.link.broadcast(ServerMsg::CoinsChanged {
            player_id: id,
            coins,
        });

        Ok(coins)
    }

    /// Remove a coin from the arena and credit it to `id`
    pub fn collect_coin(&mut self, id: PlayerId, coin_id: CoinId) -> Result<u32, SessionError> {
        self.living_player(id)?;
        self.coins.take(coin_id)?;
        let coins = self.credit_coin(id)?;

        self.link.broadcast(ServerMsg::CoinRemoved {
            coin_id,
            collector_id: id,
        });

        Ok(coins)
    }

    /// End the match once a single player is left standing.
    /// Returns true only on the call that ended the match.
    pub fn check_match_end(&mut self) -> bool {
        if self.ended || self.alive_count != 1 || self.joined_total < 2 {
            return false;
        }

        let Some(winner) = self.players.values().find(|p| p.alive) else {
            return false;
        };
        let (winner_id, coins) = (winner.id, winner.coins);

        self.ended = true;
        self.winner = Some(winner_id);

        self.link.broadcast(ServerMsg::MatchEnded { winner_id, coins });

        info!(
            match_id = %self.match_id,
            winner_id = %winner_id,
            coins,
            "Match ended"
        );

        true
    }

    /// Store the movement direction and flip facing on a sign change.
    /// Returns whether facing changed.
    pub fn update_movement(&mut self, id: PlayerId, direction: f32) -> Result<bool, SessionError> {
        let direction = if direction.is_finite() {
            direction.clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let player = self.living_player_mut(id)?;
        player.direction = direction;

        let flip = (player.facing_right && direction < 0.0) || (!player.facing_right && direction > 0.0);
        if !flip {
            return Ok(false);
        }
        player.facing_right = !player.facing_right;
        let facing_right = player.facing_right;

        self.link.broadcast(ServerMsg::FacingChanged {
            player_id: id,
            facing_right,
        });

        Ok(true)
    }

    /// Store kinematics reported by the participant's physics
    pub fn update_transform(&mut self, id: PlayerId, x: f32, y: f32, grounded: bool) -> Result<(), SessionError> {
        let player = self.living_player_mut(id)?;
        if x.is_finite() && y.is_finite() {
            player.x = x;
            player.y = y;
        }
        player.grounded = grounded;
        Ok(())
    }

    /// Participant disconnected. An alive player leaving counts as a death so
    /// the remaining players can still win.
    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), SessionError> {
        let player = self.players.get_mut(&id).ok_or(SessionError::UnknownPlayer(id))?;
        if !player.connected {
            return Ok(());
        }
        player.connected = false;
        let was_alive = player.alive;

        if was_alive && !self.ended {
            if let Some(player) = self.players.get_mut(&id) {
                player.health = 0;
            }
            self.link.broadcast(ServerMsg::HealthChanged {
                player_id: id,
                health: 0,
            });
            self.kill(id);
        }

        self.link.broadcast(ServerMsg::PlayerLeft {
            player_id: id,
            reason: "disconnected".to_string(),
        });

        info!(match_id = %self.match_id, player_id = %id, "Player left match");
        Ok(())
    }

    fn kill(&mut self, id: PlayerId) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.alive {
            return;
        }
        player.alive = false;
        player.direction = 0.0;
        player.death_time = Some(unix_millis());
        self.alive_count -= 1;
        self.debug_check_alive_count();

        self.link.broadcast(ServerMsg::PlayerDied { player_id: id });

        info!(
            match_id = %self.match_id,
            player_id = %id,
            alive_count = self.alive_count,
            "Player died"
        );

        self.check_match_end();
    }

    fn debug_check_alive_count(&self) {
        debug_assert_eq!(
            self.alive_count,
            self.players.values().filter(|p| p.alive).count()
        );
    }

    /// Full state for a joining participant
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            alive_count: self.alive_count,
            ended: self.ended,
            winner_id: self.winner,
            players: self.players.values().map(PlayerRecord::snapshot).collect(),
            coins: self.coins.snapshot(),
        }
    }

    /// Kinematics of every living player
    pub fn transforms(&self) -> Vec<TransformSnapshot> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(PlayerRecord::transform)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::replication::{drain, Outbound};
    use tokio::sync::broadcast;
    use tokio_test::{assert_err, assert_ok};

    fn session() -> (AuthoritySession, broadcast::Receiver<Outbound>) {
        let channel = ReplicationChannel::default();
        let rx = channel.subscribe();
        let session = AuthoritySession::new(
            Uuid::new_v4(),
            MatchRules::default(),
            CoinField::from_coins(Vec::new()),
            &channel,
        )
        .unwrap();
        (session, rx)
    }

    fn two_players() -> (AuthoritySession, broadcast::Receiver<Outbound>, PlayerId, PlayerId) {
        let (mut session, mut rx) = session();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        session.register_player(a).unwrap();
        session.register_player(b).unwrap();
        drain(&mut rx);
        (session, rx, a, b)
    }

    fn messages(rx: &mut broadcast::Receiver<Outbound>) -> Vec<ServerMsg> {
        drain(rx).into_iter().map(|o| o.msg).collect()
    }

    #[test]
    fn register_increments_alive_count() {
        let (session, _rx, _, _) = two_players();
        assert_eq!(session.alive_count(), 2);
        assert_eq!(session.joined_total(), 2);
        assert!(!session.is_ended());
    }

    #[test]
    fn duplicate_registration_is_rejected_locally() {
        let (mut session, mut rx) = session();
        let a = Uuid::new_v4();
        assert_ok!(session.register_player(a));
        drain(&mut rx);

        assert_eq!(session.register_player(a), Err(SessionError::DuplicateId(a)));
        assert_eq!(session.alive_count(), 1);
        assert!(messages(&mut rx).is_empty());
    }

    #[test]
    fn joiner_gets_full_snapshot_point_to_point() {
        let (mut session, mut rx) = session();
        let a = Uuid::new_v4();
        session.register_player(a).unwrap();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].msg, ServerMsg::PlayerJoined { .. }));
        match &out[1].msg {
            ServerMsg::MatchJoined { snapshot, .. } => {
                assert_eq!(snapshot.alive_count, 1);
                assert_eq!(snapshot.players[0].player_id, a);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert!(out[1].is_for(a));
        assert!(!out[1].is_for(Uuid::new_v4()));
    }

    #[test]
    fn three_hits_of_forty_kill_and_end_the_match() {
        let (mut session, mut rx, a, b) = two_players();

        let first = session.apply_damage(b, 40).unwrap();
        assert_eq!(first, DamageOutcome { health: 60, killed: false });
        let second = session.apply_damage(b, 40).unwrap();
        assert_eq!(second, DamageOutcome { health: 20, killed: false });
        assert!(session.player(b).unwrap().alive);

        let third = session.apply_damage(b, 40).unwrap();
        assert_eq!(third, DamageOutcome { health: 0, killed: true });

        assert!(!session.player(b).unwrap().alive);
        assert_eq!(session.alive_count(), 1);
        assert_eq!(session.winner(), Some(a));
        assert!(session.is_ended());

        let msgs = messages(&mut rx);
        assert_eq!(
            msgs,
            vec![
                ServerMsg::HealthChanged { player_id: b, health: 60 },
                ServerMsg::HealthChanged { player_id: b, health: 20 },
                ServerMsg::HealthChanged { player_id: b, health: 0 },
                ServerMsg::PlayerDied { player_id: b },
                ServerMsg::MatchEnded { winner_id: a, coins: 0 },
            ]
        );
    }

    #[test]
    fn health_is_clamped_at_zero() {
        let (mut session, _rx, _a, b) = two_players();
        let outcome = session.apply_damage(b, 1_000).unwrap();
        assert_eq!(outcome.health, 0);
        assert_eq!(session.player(b).unwrap().health, 0);
    }

    #[test]
    fn non_positive_damage_is_invalid() {
        let (mut session, mut rx, _a, b) = two_players();
        assert_eq!(session.apply_damage(b, 0), Err(SessionError::InvalidAmount(0)));
        assert_eq!(session.apply_damage(b, -5), Err(SessionError::InvalidAmount(-5)));
        assert_eq!(session.player(b).unwrap().health, 100);
        assert!(messages(&mut rx).is_empty());
    }

    #[test]
    fn damage_after_end_is_discarded_without_broadcast() {
        let (mut session, mut rx, a, b) = two_players();
        session.apply_damage(b, 100).unwrap();
        assert!(session.is_ended());
        drain(&mut rx);

        let late = session.apply_damage(a, 40);
        assert_eq!(late, Err(SessionError::StaleState(StaleReason::MatchEnded)));
        assert_eq!(session.player(a).unwrap().health, 100);
        assert!(messages(&mut rx).is_empty());
    }

    #[test]
    fn dead_player_cannot_take_damage_again() {
        let channel = ReplicationChannel::default();
        let mut session =
            AuthoritySession::new(Uuid::new_v4(), MatchRules::default(), CoinField::default(), &channel)
                .unwrap();
        let ids: Vec<PlayerId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            session.register_player(*id).unwrap();
        }

        session.apply_damage(ids[0], 100).unwrap();
        assert!(!session.is_ended());
        assert!(assert_err!(session.apply_damage(ids[0], 10)).is_stale());
        assert_eq!(session.alive_count(), 2);
    }

    #[test]
    fn check_match_end_is_idempotent() {
        let (mut session, mut rx, a, b) = two_players();
        session.apply_damage(b, 100).unwrap();
        drain(&mut rx);

        assert!(!session.check_match_end());
        assert!(!session.check_match_end());
        assert_eq!(session.winner(), Some(a));
        assert!(messages(&mut rx).is_empty());
    }

    #[test]
    fn single_player_never_wins_alone() {
        let (mut session, _rx) = session();
        session.register_player(Uuid::new_v4()).unwrap();
        assert!(!session.check_match_end());
        assert!(!session.is_ended());
    }

    #[test]
    fn coins_credit_in_call_order() {
        let (mut session, mut rx, a, _b) = two_players();
        for expected in 1..=5 {
            assert_eq!(session.credit_coin(a), Ok(expected));
        }
        assert_eq!(session.player(a).unwrap().coins, 5);

        let totals: Vec<u32> = messages(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMsg::CoinsChanged { coins, .. } => Some(coins),
                _ => None,
            })
            .collect();
        assert_eq!(totals, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn dead_player_collects_nothing() {
        let channel = ReplicationChannel::default();
        let mut session =
            AuthoritySession::new(Uuid::new_v4(), MatchRules::default(), CoinField::default(), &channel)
                .unwrap();
        let ids: Vec<PlayerId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            session.register_player(*id).unwrap();
        }
        session.credit_coin(ids[0]).unwrap();
        session.apply_damage(ids[0], 100).unwrap();

        assert!(session.credit_coin(ids[0]).unwrap_err().is_stale());
        assert_eq!(session.player(ids[0]).unwrap().coins, 1);
    }

    #[test]
    fn winner_announcement_carries_final_coins() {
        let (mut session, mut rx, a, b) = two_players();
        session.credit_coin(a).unwrap();
        session.credit_coin(a).unwrap();
        drain(&mut rx);

        session.apply_damage(b, 100).unwrap();
        let msgs = messages(&mut rx);
        assert_eq!(
            msgs.last(),
            Some(&ServerMsg::MatchEnded { winner_id: a, coins: 2 })
        );
    }

    #[test]
    fn collecting_a_coin_removes_it_for_everyone() {
        let channel = ReplicationChannel::default();
        let mut rx = channel.subscribe();
        let coins = CoinField::from_coins(vec![crate::ws::protocol::CoinSnapshot {
            coin_id: 9,
            x: 1.0,
            y: 1.0,
        }]);
        let mut session =
            AuthoritySession::new(Uuid::new_v4(), MatchRules::default(), coins, &channel).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        session.register_player(a).unwrap();
        session.register_player(b).unwrap();
        drain(&mut rx);

        assert_eq!(session.collect_coin(a, 9), Ok(1));
        assert_eq!(session.collect_coin(b, 9), Err(SessionError::UnknownCoin(9)));
        assert_eq!(session.player(b).unwrap().coins, 0);

        let msgs = messages(&mut rx);
        assert_eq!(
            msgs,
            vec![
                ServerMsg::CoinsChanged { player_id: a, coins: 1 },
                ServerMsg::CoinRemoved { coin_id: 9, collector_id: a },
            ]
        );
    }

    #[test]
    fn facing_flips_only_on_sign_change() {
        let (mut session, mut rx, a, _b) = two_players();
        // first slot spawns on the left, facing right
        assert!(session.player(a).unwrap().facing_right);

        assert_eq!(session.update_movement(a, 1.0), Ok(false));
        assert_eq!(session.update_movement(a, 0.0), Ok(false));
        assert_eq!(session.update_movement(a, -0.5), Ok(true));
        assert_eq!(session.update_movement(a, -1.0), Ok(false));
        assert!(!session.player(a).unwrap().facing_right);

        assert_eq!(
            messages(&mut rx),
            vec![ServerMsg::FacingChanged { player_id: a, facing_right: false }]
        );
    }

    #[test]
    fn disconnect_counts_as_death() {
        let (mut session, mut rx, a, b) = two_players();
        session.remove_player(b).unwrap();

        assert!(!session.player(b).unwrap().alive);
        assert_eq!(session.alive_count(), 1);
        assert_eq!(session.winner(), Some(a));

        let msgs = messages(&mut rx);
        assert!(msgs.contains(&ServerMsg::PlayerDied { player_id: b }));
        assert!(matches!(msgs.last(), Some(ServerMsg::PlayerLeft { .. })));

        // id stays reserved for the session
        assert_eq!(session.register_player(b), Err(SessionError::DuplicateId(b)));
    }

    #[test]
    fn registration_after_end_is_stale() {
        let (mut session, _rx, _a, b) = two_players();
        session.apply_damage(b, 100).unwrap();
        assert!(session.register_player(Uuid::new_v4()).unwrap_err().is_stale());
        assert_eq!(session.joined_total(), 2);
    }

    #[test]
    fn alive_count_matches_players_through_a_brawl() {
        let channel = ReplicationChannel::default();
        let mut session =
            AuthoritySession::new(Uuid::new_v4(), MatchRules::default(), CoinField::default(), &channel)
                .unwrap();
        let ids: Vec<PlayerId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            session.register_player(*id).unwrap();
        }

        let hits = [(1, 60), (2, 100), (1, 60), (3, 30), (4, 100), (3, 80), (0, 5)];
        for (target, amount) in hits {
            let before = session.player(ids[target]).unwrap().health;
            let _ = session.apply_damage(ids[target], amount);
            let after = session.player(ids[target]).unwrap().health;
            assert!(after <= before);
            assert!(after >= 0);
            assert_eq!(
                session.alive_count(),
                session.players().filter(|p| p.alive).count()
            );
        }

        assert!(session.is_ended());
        let winner = session.winner().unwrap();
        assert!(session.player(winner).unwrap().alive);
    }

    #[test]
    fn second_session_on_same_channel_fails() {
        let channel = ReplicationChannel::default();
        let _first =
            AuthoritySession::new(Uuid::new_v4(), MatchRules::default(), CoinField::default(), &channel)
                .unwrap();
        let second =
            AuthoritySession::new(Uuid::new_v4(), MatchRules::default(), CoinField::default(), &channel);
        assert!(matches!(second, Err(SessionError::AuthorityAlreadyBound)));
    }

    #[test]
    fn resync_resends_snapshot_to_one_player_even_after_death() {
        let (mut session, mut rx, a, b) = two_players();
        session.remove_player(b).unwrap();
        drain(&mut rx);

        session.resync(b).unwrap();
        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_for(b));
        assert!(!out[0].is_for(a));
        match &out[0].msg {
            ServerMsg::MatchJoined { snapshot, .. } => {
                let gone = snapshot.players.iter().find(|p| p.player_id == b).unwrap();
                assert!(!gone.alive);
                assert!(snapshot.ended);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            session.resync(Uuid::new_v4()),
            Err(SessionError::UnknownPlayer(_))
        ));
    }
}
