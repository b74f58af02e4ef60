use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pack::{single_correct, AnswerType, QuestionType, Scene, SceneAnswer};

/// Players are waiting for the host to open the round
pub const STEP_WAITING: i32 = 0;
/// Players are answering the active scene
pub const STEP_ANSWERING: i32 = 1;
/// The correct answer and scores are shown
pub const STEP_REVEAL: i32 = 2;

/// A persisted game row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: Uuid,
    pub pack_id: Uuid,
    /// Scenes sampled for this game, in play order
    pub game_scenes: Vec<Uuid>,
    pub state: GameState,
    pub is_started: bool,
    pub is_finished: bool,
    /// Optimistic concurrency token, bumped on every update
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    /// Id of the scene after the current one, if any
    pub fn next_scene_id(&self) -> Option<Uuid> {
        self.game_scenes.get(self.state.current_scene + 1).copied()
    }

    /// The game as players may see it at its current step
    pub fn player_view(&self) -> GameView {
        GameView::from(self)
    }

    /// Player scores ordered best first
    pub fn standings(&self) -> Vec<PlayerScore> {
        let mut standings = self.state.player_scores.clone();
        standings.sort_by(|a, b| b.score.cmp(&a.score).then(a.player_name.cmp(&b.player_name)));
        standings
    }
}

/// Progress blob for an in-flight game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub current_step: i32,
    pub current_scene: usize,
    pub total_scenes: usize,
    /// Submissions for the active scene only
    pub submissions: Vec<Submission>,
    pub player_scores: Vec<PlayerScore>,
    /// Round length in seconds (advisory)
    pub duration: u32,
    pub start_time: DateTime<Utc>,
    #[serde(flatten)]
    pub scene: SceneSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub player_id: String,
    pub player_name: String,
    pub content: String,
    pub is_correct: bool,
    pub score: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub player_id: String,
    pub player_name: String,
    /// Cumulative score
    pub score: i64,
    /// Cumulative score before the latest submission
    pub prev_score: i64,
}

/// The active scene's question and answers, flattened into the state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub scene_id: Uuid,
    pub question: String,
    pub question_type: QuestionType,
    pub answer_type: AnswerType,
    pub answers: Vec<SceneAnswer>,
}

impl From<&Scene> for SceneSnapshot {
    fn from(scene: &Scene) -> Self {
        Self {
            scene_id: scene.id,
            question: scene.question.clone(),
            question_type: scene.question_type,
            answer_type: scene.answer_type,
            answers: scene.answers.clone(),
        }
    }
}

impl SceneSnapshot {
    /// The single answer marked correct, `None` if the scene is malformed
    pub fn correct_answer(&self) -> Option<&SceneAnswer> {
        single_correct(&self.answers)
    }
}

/// Player-facing rendition of a game row.
///
/// Until the active scene is revealed, answer flags are left out, other
/// players' submissions only show who answered, and scores stay at their
/// values from the start of the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub game_scenes: Vec<Uuid>,
    pub state: GameStateView,
    pub is_started: bool,
    pub is_finished: bool,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub current_step: i32,
    pub current_scene: usize,
    pub total_scenes: usize,
    pub submissions: Vec<SubmissionView>,
    pub player_scores: Vec<PlayerScore>,
    pub duration: u32,
    pub start_time: DateTime<Utc>,
    pub scene_id: Uuid,
    pub question: String,
    pub question_type: QuestionType,
    pub answer_type: AnswerType,
    pub answers: Vec<AnswerView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    pub id: Uuid,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub player_id: String,
    pub player_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        let state = &game.state;
        let revealed = game.is_finished || state.current_step >= STEP_REVEAL;

        let answers = state
            .scene
            .answers
            .iter()
            .map(|answer| AnswerView {
                id: answer.id,
                content: answer.content.clone(),
                is_correct: revealed.then_some(answer.is_correct),
            })
            .collect();

        let submissions = state
            .submissions
            .iter()
            .map(|submission| SubmissionView {
                player_id: submission.player_id.clone(),
                player_name: submission.player_name.clone(),
                content: revealed.then(|| submission.content.clone()),
                is_correct: revealed.then_some(submission.is_correct),
                score: revealed.then_some(submission.score),
                submitted_at: submission.submitted_at,
            })
            .collect();

        let player_scores = if revealed {
            state.player_scores.clone()
        } else {
            scores_before_scene(state)
        };

        Self {
            id: game.id,
            pack_id: game.pack_id,
            game_scenes: game.game_scenes.clone(),
            state: GameStateView {
                current_step: state.current_step,
                current_scene: state.current_scene,
                total_scenes: state.total_scenes,
                submissions,
                player_scores,
                duration: state.duration,
                start_time: state.start_time,
                scene_id: state.scene.scene_id,
                question: state.scene.question.clone(),
                question_type: state.scene.question_type,
                answer_type: state.scene.answer_type,
                answers,
            },
            is_started: game.is_started,
            is_finished: game.is_finished,
            lock_version: game.lock_version,
            created_at: game.created_at,
            updated_at: game.updated_at,
        }
    }
}

/// Standings with the active scene's points taken back out
fn scores_before_scene(state: &GameState) -> Vec<PlayerScore> {
    state
        .player_scores
        .iter()
        .map(|entry| {
            let mut answered = false;
            let mut gained = 0;
            for submission in state.submissions.iter().filter(|s| s.player_id == entry.player_id) {
                answered = true;
                gained += submission.score;
            }
            if !answered {
                return entry.clone();
            }
            PlayerScore {
                score: entry.score - gained,
                prev_score: entry.score - gained,
                ..entry.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> GameState {
        GameState {
            current_step: STEP_WAITING,
            current_scene: 0,
            total_scenes: 2,
            submissions: vec![],
            player_scores: vec![],
            duration: 30,
            start_time: Utc::now(),
            scene: SceneSnapshot {
                scene_id: Uuid::new_v4(),
                question: "2 + 2?".to_string(),
                question_type: QuestionType::Text,
                answer_type: AnswerType::FreeText,
                answers: vec![SceneAnswer {
                    id: Uuid::new_v4(),
                    content: "4".to_string(),
                    is_correct: true,
                }],
            },
        }
    }

    #[test]
    fn test_state_flattens_scene_fields() {
        let json = serde_json::to_value(sample_state()).unwrap();

        assert_eq!(json["currentStep"], 0);
        assert_eq!(json["totalScenes"], 2);
        assert_eq!(json["question"], "2 + 2?");
        assert_eq!(json["answerType"], "free_text");
        assert!(json.get("scene").is_none());
        assert!(json["answers"].is_array());
    }

    #[test]
    fn test_state_json_round_trip() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_standings_sorted_by_score() {
        let mut state = sample_state();
        state.player_scores = vec![
            PlayerScore {
                player_id: "a".into(),
                player_name: "Ann".into(),
                score: 300,
                prev_score: 0,
            },
            PlayerScore {
                player_id: "b".into(),
                player_name: "Bob".into(),
                score: 900,
                prev_score: 400,
            },
        ];
        let now = Utc::now();
        let game = Game {
            id: Uuid::new_v4(),
            pack_id: Uuid::new_v4(),
            game_scenes: vec![state.scene.scene_id],
            state,
            is_started: true,
            is_finished: true,
            lock_version: 3,
            created_at: now,
            updated_at: now,
        };

        let standings = game.standings();
        assert_eq!(standings[0].player_id, "b");
        assert_eq!(standings[1].player_id, "a");
    }

    fn game_at(step: i32) -> Game {
        let mut state = sample_state();
        state.current_step = step;
        let now = Utc::now();
        state.submissions = vec![Submission {
            player_id: "a".into(),
            player_name: "Ann".into(),
            content: "4".into(),
            is_correct: true,
            score: 800,
            submitted_at: now,
        }];
        state.player_scores = vec![PlayerScore {
            player_id: "a".into(),
            player_name: "Ann".into(),
            score: 1100,
            prev_score: 300,
        }];
        Game {
            id: Uuid::new_v4(),
            pack_id: Uuid::new_v4(),
            game_scenes: vec![state.scene.scene_id],
            state,
            is_started: true,
            is_finished: false,
            lock_version: 2,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_player_view_hides_correctness_while_answering() {
        let json = serde_json::to_value(game_at(STEP_ANSWERING).player_view()).unwrap();

        let answer = &json["state"]["answers"][0];
        assert_eq!(answer["content"], "4");
        assert!(answer.get("isCorrect").is_none());

        let submission = &json["state"]["submissions"][0];
        assert_eq!(submission["playerName"], "Ann");
        assert!(submission.get("content").is_none());
        assert!(submission.get("isCorrect").is_none());
        assert!(submission.get("score").is_none());

        assert_eq!(json["state"]["playerScores"][0]["score"], 300);
        assert_eq!(json["state"]["question"], "2 + 2?");
    }

    #[test]
    fn test_player_view_shows_correctness_on_reveal() {
        let json = serde_json::to_value(game_at(STEP_REVEAL).player_view()).unwrap();

        assert_eq!(json["state"]["answers"][0]["isCorrect"], true);
        assert_eq!(json["state"]["submissions"][0]["isCorrect"], true);
        assert_eq!(json["state"]["submissions"][0]["score"], 800);
        assert_eq!(json["state"]["playerScores"][0]["score"], 1100);
        assert_eq!(json["state"]["playerScores"][0]["prevScore"], 300);
    }

    #[test]
    fn test_stored_state_keeps_answer_flags() {
        let game = game_at(STEP_ANSWERING);
        let json = serde_json::to_value(&game.state).unwrap();
        assert_eq!(json["answers"][0]["isCorrect"], true);
    }
}
