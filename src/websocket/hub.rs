use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::models::Game;

/// Buffered messages per game before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Per-game broadcast channels for live state updates
#[derive(Default)]
pub struct GameHub {
    channels: DashMap<Uuid, broadcast::Sender<ServerMessage>>,
}

impl GameHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a game's updates, creating its channel on first use
    pub fn subscribe(&self, game_id: Uuid) -> broadcast::Receiver<ServerMessage> {
        self.channels
            .entry(game_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push a freshly persisted game to its subscribers.
    ///
    /// Finished games get a final standings message and their channel is
    /// dropped, which closes every subscriber's stream.
    pub fn publish(&self, game: &Game) {
        let Some(sender) = self.channels.get(&game.id).map(|s| s.clone()) else {
            return;
        };

        let delivered = sender
            .send(ServerMessage::GameState {
                game: Box::new(game.player_view()),
            })
            .unwrap_or(0);
        tracing::debug!("Published game {} to {} subscribers", game.id, delivered);

        if game.is_finished {
            let _ = sender.send(ServerMessage::GameFinished {
                standings: game.standings(),
            });
            self.channels.remove(&game.id);
        }
    }

    /// Drop a game's channel once nobody listens any more
    pub fn prune(&self, game_id: Uuid) {
        self.channels
            .remove_if(&game_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn subscriber_count(&self, game_id: Uuid) -> usize {
        self.channels
            .get(&game_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
