//! Pure game-state transitions.
//!
//! Every function takes the current game plus the action payload and the
//! current time, and returns the next game. Nothing here touches storage; the
//! service layer loads, applies and persists.

use chrono::{DateTime, Utc};
use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng,
};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::{matcher::AnswerMatcher, scorer::Scorer};
use crate::models::{
    Game, GameState, Pack, PlayerScore, Scene, SceneSnapshot, Submission, STEP_ANSWERING,
    STEP_REVEAL, STEP_WAITING,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    /// Unknown id, or the game already finished
    #[error("Game not found")]
    NotFound,
    #[error("Pack has {available} scenes but games need {required}")]
    NotEnoughScenes { available: usize, required: usize },
    #[error("Scene {0} is misconfigured: {1}")]
    InvalidScene(Uuid, &'static str),
    #[error("{0}")]
    InvalidInput(String),
}

/// A player's answer as sent by the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub player_id: String,
    pub player_name: String,
    pub content: String,
}

/// Rejects missing and finished games
pub fn ensure_playable(game: Option<Game>) -> Result<Game, GameError> {
    match game {
        Some(game) if !game.is_finished => Ok(game),
        _ => Err(GameError::NotFound),
    }
}

/// Build a new game by sampling `pack.game_length` distinct scenes
pub fn create_game<R: Rng + ?Sized>(
    pack: &Pack,
    scenes: &[Scene],
    default_duration: u32,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Game, GameError> {
    let required = usize::try_from(pack.game_length)
        .ok()
        .filter(|len| *len > 0)
        .ok_or_else(|| GameError::InvalidInput("Pack game length must be positive".into()))?;

    if scenes.len() < required {
        return Err(GameError::NotEnoughScenes {
            available: scenes.len(),
            required,
        });
    }

    let mut picked: Vec<&Scene> = scenes.choose_multiple(rng, required).collect();
    picked.shuffle(rng);

    if let Some(bad) = picked.iter().find(|scene| scene.correct_answer().is_none()) {
        return Err(GameError::InvalidScene(
            bad.id,
            "exactly one answer must be marked correct",
        ));
    }

    let first = picked[0];
    let state = GameState {
        current_step: STEP_WAITING,
        current_scene: 0,
        total_scenes: required,
        submissions: Vec::new(),
        player_scores: Vec::new(),
        duration: first.duration(default_duration),
        start_time: now,
        scene: SceneSnapshot::from(first),
    };

    Ok(Game {
        id: Uuid::new_v4(),
        pack_id: pack.id,
        game_scenes: picked.iter().map(|scene| scene.id).collect(),
        state,
        is_started: false,
        is_finished: false,
        lock_version: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Open answering for the current scene and restart its clock
pub fn start(mut game: Game, now: DateTime<Utc>) -> Result<Game, GameError> {
    if game.is_finished {
        return Err(GameError::NotFound);
    }

    game.is_started = true;
    game.state.current_step = STEP_ANSWERING;
    game.state.start_time = now;
    Ok(game)
}

/// Move to the next step within the scene. Unbounded; callers stop at reveal.
pub fn next_step(mut game: Game) -> Result<Game, GameError> {
    if game.is_finished {
        return Err(GameError::NotFound);
    }

    game.state.current_step += 1;
    Ok(game)
}

/// Advance to `next`, or finish the game when no scene remains.
///
/// `next` must be the scene at `current_scene + 1` and is ignored when the
/// current scene is the last one.
pub fn next_scene(
    mut game: Game,
    next: Option<&Scene>,
    default_duration: u32,
    now: DateTime<Utc>,
) -> Result<Game, GameError> {
    if game.is_finished {
        return Err(GameError::NotFound);
    }

    let Some(next_id) = game.next_scene_id() else {
        game.is_finished = true;
        game.state.current_step = STEP_WAITING;
        return Ok(game);
    };

    let scene = next
        .filter(|scene| scene.id == next_id)
        .ok_or(GameError::InvalidScene(next_id, "scene no longer exists"))?;

    game.state.current_scene += 1;
    game.state.current_step = STEP_ANSWERING;
    game.state.submissions.clear();
    game.state.duration = scene.duration(default_duration);
    game.state.start_time = now;
    game.state.scene = SceneSnapshot::from(scene);
    Ok(game)
}

/// Record a player's answer, score it and fold it into the standings
pub fn submit_answer(
    mut game: Game,
    num_players: usize,
    input: SubmissionInput,
    scorer: &Scorer,
    now: DateTime<Utc>,
) -> Result<(Game, Submission), GameError> {
    if game.is_finished {
        return Err(GameError::NotFound);
    }
    if num_players == 0 {
        return Err(GameError::InvalidInput("numPlayers must be at least 1".into()));
    }
    if input.player_id.trim().is_empty() {
        return Err(GameError::InvalidInput("playerId must not be empty".into()));
    }

    let state = &mut game.state;
    let correct = state.scene.correct_answer().ok_or(GameError::InvalidScene(
        state.scene.scene_id,
        "exactly one answer must be marked correct",
    ))?;

    let is_correct = AnswerMatcher::is_match(state.scene.answer_type, &input.content, &correct.content);
    let score = scorer.score(is_correct, now - state.start_time, state.duration);

    let submission = Submission {
        player_id: input.player_id,
        player_name: input.player_name,
        content: input.content,
        is_correct,
        score,
        submitted_at: now,
    };
    state.submissions.push(submission.clone());

    match state
        .player_scores
        .iter_mut()
        .find(|entry| entry.player_id == submission.player_id)
    {
        Some(entry) => {
            entry.prev_score = entry.score;
            entry.score += score;
            entry.player_name = submission.player_name.clone();
        }
        None => state.player_scores.push(PlayerScore {
            player_id: submission.player_id.clone(),
            player_name: submission.player_name.clone(),
            score,
            prev_score: 0,
        }),
    }

    if state.submissions.len() >= num_players {
        state.current_step = STEP_REVEAL;
    }

    Ok((game, submission))
}
