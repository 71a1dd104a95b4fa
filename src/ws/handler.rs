//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchHandle, Outbound};
use crate::util::rate_limit::ParticipantRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let player_id = Uuid::new_v4();
    debug!(player_id = %player_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: PlayerId, state: AppState) {
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    // Subscribe before joining so MatchJoined is not missed
    let outbound_rx = state.match_handle.subscribe();
    state.participants.insert(player_id, unix_millis());
    if !state
        .match_handle
        .submit_reliable(player_id, ClientMsg::JoinMatch)
        .await
    {
        error!(player_id = %player_id, "Match loop unavailable, closing connection");
        state.participants.remove(&player_id);
        return;
    }

    run_session(player_id, &state.match_handle, ws_sink, ws_stream, outbound_rx).await;

    state.participants.remove(&player_id);
    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: PlayerId,
    match_handle: &MatchHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) {
    let rate_limiter = ParticipantRateLimiter::new();

    // Writer task: replication stream -> WebSocket
    let resync_handle = match_handle.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(out) => {
                    if !out.is_for(player_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &out.msg).await {
                        debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Skipped deltas are gone for good; only a full snapshot repairs the view
                    warn!(
                        player_id = %player_id,
                        lagged_count = n,
                        "Participant lagged, requesting resync"
                    );
                    if !resync_handle
                        .submit_reliable(player_id, ClientMsg::Resync)
                        .await
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %player_id, "Replication channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> authority
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_intent() {
                    warn!(player_id = %player_id, "Rate limited intent");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    // Joining is done once by the handler itself
                    Ok(ClientMsg::JoinMatch) => {
                        debug!(player_id = %player_id, "Ignoring repeated join");
                    }
                    Ok(ClientMsg::LeaveMatch) => {
                        info!(player_id = %player_id, "Participant left");
                        break;
                    }
                    Ok(msg) => {
                        match_handle.submit(player_id, msg);
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse intent");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Dropping out counts as death on the authority
    match_handle
        .submit_reliable(player_id, ClientMsg::LeaveMatch)
        .await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
