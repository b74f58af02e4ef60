use serde::{Deserialize, Serialize};

use crate::models::{GameView, PlayerScore};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Player view of the game after a transition (also sent once on connect)
    GameState { game: Box<GameView> },
    GameFinished { standings: Vec<PlayerScore> },
    Pong,
    Error { message: String },
}
