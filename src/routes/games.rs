use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractors::{ValidJson, ValidPath, Validate},
    game::{
        service::{GameCheck, GameResults, SubmitOutcome},
        SubmissionInput,
    },
    models::GameView,
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub pack_id: Uuid,
}

impl Validate for CreateGameRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub num_players: usize,
    pub submission: SubmissionInput,
}

impl Validate for SubmitAnswerRequest {
    fn validate(&self) -> Result<(), String> {
        if self.num_players == 0 {
            return Err("numPlayers must be at least 1".to_string());
        }
        if self.submission.player_id.trim().is_empty() {
            return Err("playerId must not be empty".to_string());
        }
        Ok(())
    }
}

pub async fn get_game(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
) -> Result<Json<GameView>, ApiError> {
    Ok(Json(state.games.get(game_id).await?.player_view()))
}

pub async fn check_game(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
) -> Result<Json<GameCheck>, ApiError> {
    Ok(Json(state.games.check(game_id).await?))
}

pub async fn create_game(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<CreateGameRequest>,
) -> Result<(StatusCode, Json<GameView>), ApiError> {
    let game = state.games.create(payload.pack_id).await?;
    Ok((StatusCode::CREATED, Json(game.player_view())))
}

pub async fn start_game(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
) -> Result<Json<GameView>, ApiError> {
    Ok(Json(state.games.start(game_id).await?.player_view()))
}

pub async fn next_step(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
) -> Result<Json<GameView>, ApiError> {
    Ok(Json(state.games.next_step(game_id).await?.player_view()))
}

pub async fn next_scene(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
) -> Result<Json<GameView>, ApiError> {
    Ok(Json(state.games.next_scene(game_id).await?.player_view()))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
    ValidJson(payload): ValidJson<SubmitAnswerRequest>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let outcome = state
        .games
        .submit_answer(game_id, payload.num_players, payload.submission)
        .await?;
    Ok(Json(outcome))
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    ValidPath(game_id): ValidPath<Uuid>,
) -> Result<Json<GameResults>, ApiError> {
    Ok(Json(state.games.results(game_id).await?))
}
