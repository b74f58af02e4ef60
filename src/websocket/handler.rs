use crate::{
    error::ApiError,
    extractors::ValidPath,
    websocket::messages::{ClientMessage, ServerMessage},
    AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// WebSocket upgrade handler for a game's live updates.
///
/// Unknown and finished games are rejected before the upgrade.
pub async fn handle_game_socket(
    ValidPath(game_id): ValidPath<Uuid>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    // Subscribe before loading so no update slips between snapshot and stream
    let updates = state.hub.subscribe(game_id);
    let game = match state.games.get(game_id).await {
        Ok(game) => game,
        Err(e) => {
            drop(updates);
            state.hub.prune(game_id);
            return Err(e);
        }
    };

    tracing::info!(
        "WebSocket subscription requested for game {} ({} subscribers)",
        game_id,
        state.hub.subscriber_count(game_id)
    );
    let snapshot = ServerMessage::GameState {
        game: Box::new(game.player_view()),
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, game_id, snapshot, updates)))
}

/// Handle an individual game subscription
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    game_id: Uuid,
    snapshot: ServerMessage,
    mut updates: broadcast::Receiver<ServerMessage>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(100);

    let _ = tx.send(snapshot).await;

    // Spawn a task to send messages to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let finished = matches!(msg, ServerMessage::GameFinished { .. });
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
            if finished {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // Forward game updates into the outgoing queue
    let tx_for_updates = tx.clone();
    let state_for_updates = state.clone();
    let mut forward_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(msg) => {
                    if tx_for_updates.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Subscriber of game {} lagged by {} updates, resending snapshot",
                        game_id,
                        skipped
                    );
                    let resync = match state_for_updates.games.get(game_id).await {
                        Ok(game) => ServerMessage::GameState {
                            game: Box::new(game.player_view()),
                        },
                        Err(e) => ServerMessage::Error {
                            message: e.to_string(),
                        },
                    };
                    if tx_for_updates.send(resync).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Handle incoming messages from the client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Ping) => ServerMessage::Pong,
                        Err(e) => {
                            tracing::debug!("Failed to parse message: {}", e);
                            ServerMessage::Error {
                                message: format!("Invalid message format: {}", e),
                            }
                        }
                    };
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::debug!("Client closed subscription to game {}", game_id);
                    break;
                }
                _ => {}
            }
        }
    });

    // The send task ends the session; the other two only feed it
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            forward_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            forward_task.abort();
        }
        _ = (&mut forward_task) => {
            // Channel closed: let queued messages drain before closing
            recv_task.abort();
            let _ = send_task.await;
        }
    }

    state.hub.prune(game_id);
    tracing::info!("WebSocket subscription closed for game {}", game_id);
}
