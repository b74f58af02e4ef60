use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a scene's question is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Image,
    Audio,
    Video,
}

/// How players answer a scene, which also decides how answers are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    /// Players pick one of the listed answers; compared exactly
    MultipleChoice,
    /// Players type an answer; compared with typo tolerance
    FreeText,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    /// Number of scenes sampled into each game
    pub game_length: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneAnswer {
    pub id: Uuid,
    pub content: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub question: String,
    pub question_type: QuestionType,
    pub answer_type: AnswerType,
    /// Round length in seconds, `None` uses the server default
    pub duration_secs: Option<i32>,
    /// Order within the pack editor
    pub position: i32,
    pub answers: Vec<SceneAnswer>,
}

impl Scene {
    /// The single answer marked correct.
    ///
    /// Returns `None` when zero or several answers are marked correct.
    pub fn correct_answer(&self) -> Option<&SceneAnswer> {
        single_correct(&self.answers)
    }

    /// Round length in seconds
    pub fn duration(&self, default_secs: u32) -> u32 {
        self.duration_secs
            .and_then(|secs| u32::try_from(secs).ok())
            .unwrap_or(default_secs)
    }
}

/// The only answer flagged correct, if exactly one is
pub fn single_correct(answers: &[SceneAnswer]) -> Option<&SceneAnswer> {
    let mut correct = answers.iter().filter(|a| a.is_correct);
    match (correct.next(), correct.next()) {
        (Some(answer), None) => Some(answer),
        _ => None,
    }
}
