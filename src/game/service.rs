use std::{future::Future, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{
    scorer::Scorer,
    transitions::{self, SubmissionInput},
};
use crate::{
    config::GameConfig,
    db::{Store, StoreError},
    error::ApiError,
    models::{Game, GameView, PlayerScore, Submission},
    websocket::GameHub,
};

/// Result of `check`: whether a game can still be joined
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCheck {
    pub id: Uuid,
    pub is_started: bool,
    pub is_finished: bool,
}

/// Final or current standings of a game
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResults {
    pub id: Uuid,
    pub is_finished: bool,
    pub standings: Vec<PlayerScore>,
}

/// Response of `submitAnswer`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub game: GameView,
    pub submission: Submission,
}

/// Game procedures: load a row, apply a transition, persist it, publish it.
///
/// Writes are compare-and-swap on the row's lock version. A conflicting write
/// reloads the row and re-applies the transition, up to `max_attempts` times.
pub struct GameService {
    store: Arc<dyn Store>,
    hub: Arc<GameHub>,
    scorer: Scorer,
    default_duration: u32,
    max_attempts: u32,
}

impl GameService {
    pub fn new(store: Arc<dyn Store>, hub: Arc<GameHub>, config: &GameConfig) -> Self {
        Self {
            store,
            hub,
            scorer: Scorer::new(config.max_points),
            default_duration: config.default_scene_duration,
            max_attempts: config.update_retries.max(1),
        }
    }

    pub async fn get(&self, game_id: Uuid) -> Result<Game, ApiError> {
        self.load(game_id).await
    }

    pub async fn check(&self, game_id: Uuid) -> Result<GameCheck, ApiError> {
        let game = self.load(game_id).await?;
        Ok(GameCheck {
            id: game.id,
            is_started: game.is_started,
            is_finished: game.is_finished,
        })
    }

    /// Standings of a live or finished game
    pub async fn results(&self, game_id: Uuid) -> Result<GameResults, ApiError> {
        let game = self
            .store
            .get_game(game_id)
            .await?
            .ok_or_else(ApiError::game_not_found)?;

        Ok(GameResults {
            id: game.id,
            is_finished: game.is_finished,
            standings: game.standings(),
        })
    }

    pub async fn create(&self, pack_id: Uuid) -> Result<Game, ApiError> {
        let pack = self
            .store
            .get_pack(pack_id)
            .await?
            .ok_or_else(|| ApiError::bad_request("Pack not found"))?;
        let scenes = self.store.get_pack_scenes(pack_id).await?;

        let game = {
            let mut rng = rand::rng();
            transitions::create_game(&pack, &scenes, self.default_duration, Utc::now(), &mut rng)?
        };
        let game = self.store.insert_game(&game).await?;

        tracing::info!(
            "Created game {} from pack {} with {} scenes",
            game.id,
            pack_id,
            game.game_scenes.len()
        );
        Ok(game)
    }

    pub async fn start(&self, game_id: Uuid) -> Result<Game, ApiError> {
        self.mutate(game_id, "start", |game| async move {
            transitions::start(game, Utc::now()).map_err(ApiError::from)
        })
        .await
    }

    pub async fn next_step(&self, game_id: Uuid) -> Result<Game, ApiError> {
        self.mutate(game_id, "next_step", |game| async move {
            transitions::next_step(game).map_err(ApiError::from)
        })
        .await
    }

    pub async fn next_scene(&self, game_id: Uuid) -> Result<Game, ApiError> {
        let store = self.store.clone();
        let default_duration = self.default_duration;

        self.mutate(game_id, "next_scene", move |game| {
            let store = store.clone();
            async move {
                let next = match game.next_scene_id() {
                    Some(scene_id) => store.get_scene(scene_id).await.map_err(ApiError::from)?,
                    None => None,
                };
                transitions::next_scene(game, next.as_ref(), default_duration, Utc::now())
                    .map_err(ApiError::from)
            }
        })
        .await
    }

    pub async fn submit_answer(
        &self,
        game_id: Uuid,
        num_players: usize,
        input: SubmissionInput,
    ) -> Result<SubmitOutcome, ApiError> {
        let scorer = self.scorer;
        let mut recorded: Option<Submission> = None;

        let game = {
            let recorded = &mut recorded;
            self.mutate(game_id, "submit_answer", move |game| {
                let outcome =
                    transitions::submit_answer(game, num_players, input.clone(), &scorer, Utc::now());
                let result = outcome.map(|(game, submission)| {
                    *recorded = Some(submission);
                    game
                });
                async move { result.map_err(ApiError::from) }
            })
            .await?
        };

        let submission = recorded.ok_or_else(|| {
            ApiError::Internal(format!("Submission for game {} was not recorded", game_id))
        })?;
        tracing::info!(
            "Player {} answered in game {} (correct: {}, score: {})",
            submission.player_id,
            game_id,
            submission.is_correct,
            submission.score
        );

        Ok(SubmitOutcome {
            game: game.player_view(),
            submission,
        })
    }

    /// Load a game that can still be played
    async fn load(&self, game_id: Uuid) -> Result<Game, ApiError> {
        let game = self.store.get_game(game_id).await?;
        Ok(transitions::ensure_playable(game)?)
    }

    /// Run a read-modify-write against a game row with optimistic retries
    async fn mutate<F, Fut>(
        &self,
        game_id: Uuid,
        action: &'static str,
        mut apply: F,
    ) -> Result<Game, ApiError>
    where
        F: FnMut(Game) -> Fut,
        Fut: Future<Output = Result<Game, ApiError>>,
    {
        for attempt in 1..=self.max_attempts {
            let current = self.load(game_id).await?;
            let next = apply(current).await?;

            match self.store.update_game(&next).await {
                Ok(saved) => {
                    tracing::info!(
                        "Game {} {}: step {} scene {}/{}{}",
                        game_id,
                        action,
                        saved.state.current_step,
                        saved.state.current_scene + 1,
                        saved.state.total_scenes,
                        if saved.is_finished { " (finished)" } else { "" }
                    );
                    self.hub.publish(&saved);
                    return Ok(saved);
                }
                Err(StoreError::VersionConflict { expected, .. }) => {
                    tracing::warn!(
                        "Game {} {} lost a write race at version {} (attempt {}/{})",
                        game_id,
                        action,
                        expected,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(e) => {
                    tracing::error!("Failed to persist game {} {}: {}", game_id, action, e);
                    return Err(e.into());
                }
            }
        }

        Err(ApiError::Conflict(format!(
            "Game {} is busy, please retry",
            game_id
        )))
    }
}
