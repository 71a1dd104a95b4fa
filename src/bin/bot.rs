//! Headless arena participant
//!
//! Connects to a running server, wanders, jumps, fires and picks up coins,
//! rendering nothing. Useful for filling a match while testing a client.

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coin_arena::agent::{ParticipantView, ProjectionEvent};
use coin_arena::config::Config;
use coin_arena::game::physics::{ArenaLayout, Body, PhysicsSystem, Rect};
use coin_arena::util::time::{tick_delta, tick_duration};
use coin_arena::ws::protocol::{ClientMsg, ServerMsg};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let url = std::env::var("BOT_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string());
    info!("Connecting to {}", url);

    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut write, mut read) = ws_stream.split();

    let arena = ArenaLayout::from_rules(&config.rules);
    let mut bot = Bot::new(arena);

    let mut ticker = interval(tick_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMsg>(&text) {
                        Ok(msg) => bot.view.apply(&msg),
                        Err(e) => warn!(error = %e, "Failed to parse server message"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Server closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("websocket read failed"),
                }
            }
            _ = ticker.tick() => {
                for intent in bot.step(tick_delta()) {
                    let json = serde_json::to_string(&intent)?;
                    write.send(Message::Text(json)).await.context("websocket send failed")?;
                }
            }
        }

        if bot.report_events() {
            break;
        }
    }

    let _ = write.send(Message::Close(None)).await;
    Ok(())
}

struct Bot {
    view: ParticipantView,
    arena: ArenaLayout,
    body: Option<Body>,
    rng: ChaCha8Rng,
    direction: f32,
}

impl Bot {
    fn new(arena: ArenaLayout) -> Self {
        Self {
            view: ParticipantView::new(),
            arena,
            body: None,
            rng: ChaCha8Rng::from_entropy(),
            direction: 0.0,
        }
    }

    /// One local frame: input, physics, coin overlap. Returns the intents to send.
    fn step(&mut self, dt: f32) -> Vec<ClientMsg> {
        let mut intents = Vec::new();
        let Some(agent) = self.view.local_agent_mut() else {
            return intents;
        };
        if !agent.accepts_input() {
            return intents;
        }

        let body = self.body.get_or_insert_with(|| {
            let p = agent.projection();
            Body::at(p.x, p.y)
        });

        if self.rng.gen_bool(0.05) {
            self.direction = [-1.0, 0.0, 1.0][self.rng.gen_range(0..3)];
            intents.extend(agent.submit_movement(self.direction));
        }

        if self.rng.gen_bool(0.02) {
            agent.press_jump();
        } else {
            agent.release_jump();
        }

        if self.rng.gen_bool(0.05) {
            let facing_right = agent.facing_right();
            intents.extend(agent.submit_fire_intent(facing_right));
        } else {
            agent.release_fire();
        }

        let jump = agent.take_jump();
        PhysicsSystem::integrate_body(body, agent.direction(), jump, &self.arena, dt);
        intents.extend(agent.sync_transform(body.x, body.y, body.grounded));

        let hitbox = Rect::player(body.x, body.y);
        let touched: Vec<u32> = self
            .view
            .coins()
            .filter(|c| hitbox.contains(c.x, c.y))
            .map(|c| c.coin_id)
            .collect();
        for coin_id in touched {
            intents.extend(self.view.collect_coin(coin_id));
        }

        intents
    }

    /// Log what changed. Returns true once the match is over.
    fn report_events(&mut self) -> bool {
        let local_id = self.view.local_id();
        let mut finished = false;
        for event in self.view.drain_events() {
            match event {
                ProjectionEvent::HealthChanged { player_id, health } if Some(player_id) == local_id => {
                    info!(health, "Took damage");
                }
                ProjectionEvent::CoinsChanged { player_id, coins } if Some(player_id) == local_id => {
                    info!(coins, "Coin collected");
                }
                ProjectionEvent::Died { player_id } if Some(player_id) == local_id => {
                    info!("Eliminated");
                }
                ProjectionEvent::MatchEnded {
                    winner_id,
                    coins,
                    local_won,
                } => {
                    if local_won {
                        info!(coins, "Won the match");
                    } else {
                        info!(winner_id = %winner_id, coins, "Match over");
                    }
                    finished = true;
                }
                other => debug!(?other, "Projection event"),
            }
        }
        finished
    }
}
