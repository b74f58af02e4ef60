use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Result};
use uuid::Uuid;

use crate::models::{AnswerType, Game, GameState, Pack, QuestionType, Scene, SceneAnswer, User};

/// Row shape of the `games` table
#[derive(Debug, FromRow)]
struct GameRow {
    id: Uuid,
    pack_id: Uuid,
    game_scenes: Vec<Uuid>,
    state: Json<GameState>,
    is_started: bool,
    is_finished: bool,
    lock_version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GameRow> for Game {
    fn from(row: GameRow) -> Self {
        Game {
            id: row.id,
            pack_id: row.pack_id,
            game_scenes: row.game_scenes,
            state: row.state.0,
            is_started: row.is_started,
            is_finished: row.is_finished,
            lock_version: row.lock_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SceneRow {
    id: Uuid,
    pack_id: Uuid,
    question: String,
    question_type: QuestionType,
    answer_type: AnswerType,
    duration_secs: Option<i32>,
    position: i32,
}

#[derive(Debug, FromRow)]
struct SceneAnswerRow {
    id: Uuid,
    scene_id: Uuid,
    content: String,
    is_correct: bool,
}

impl SceneRow {
    fn into_scene(self, answers: Vec<SceneAnswer>) -> Scene {
        Scene {
            id: self.id,
            pack_id: self.pack_id,
            question: self.question,
            question_type: self.question_type,
            answer_type: self.answer_type,
            duration_secs: self.duration_secs,
            position: self.position,
            answers,
        }
    }
}

/// Attach answers (already ordered) to their scenes
fn assemble_scenes(rows: Vec<SceneRow>, answers: Vec<SceneAnswerRow>) -> Vec<Scene> {
    let mut by_scene: HashMap<Uuid, Vec<SceneAnswer>> = HashMap::new();
    for answer in answers {
        by_scene.entry(answer.scene_id).or_default().push(SceneAnswer {
            id: answer.id,
            content: answer.content,
            is_correct: answer.is_correct,
        });
    }

    rows.into_iter()
        .map(|row| {
            let answers = by_scene.remove(&row.id).unwrap_or_default();
            row.into_scene(answers)
        })
        .collect()
}

// User queries
pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Insert a user on first sign-in, or refresh their profile and token.
///
/// `refresh_token` must already be encrypted.
pub async fn create_or_update_user(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    display_name: &str,
    refresh_token: Option<&str>,
    token_expires_at: Option<DateTime<Utc>>,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (user_id, email, display_name, refresh_token, token_expires_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            email = $2,
            display_name = $3,
            refresh_token = $4,
            token_expires_at = $5,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(display_name)
    .bind(refresh_token)
    .bind(token_expires_at)
    .fetch_one(pool)
    .await
}

/// Replace a user's stored refresh token after rotation
pub async fn update_user_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    refresh_token: &str,
    token_expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET refresh_token = $1,
            token_expires_at = $2,
            updated_at = NOW()
        WHERE user_id = $3
        "#,
    )
    .bind(refresh_token)
    .bind(token_expires_at)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Clear a user's identity tokens on sign-out
pub async fn clear_user_tokens(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET refresh_token = NULL,
            token_expires_at = NULL,
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

// Pack queries
pub async fn create_pack(pool: &PgPool, pack: &Pack) -> Result<Pack> {
    sqlx::query_as::<_, Pack>(
        r#"
        INSERT INTO packs (id, owner_id, name, description, game_length)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(pack.id)
    .bind(pack.owner_id)
    .bind(&pack.name)
    .bind(&pack.description)
    .bind(pack.game_length)
    .fetch_one(pool)
    .await
}

pub async fn get_pack(pool: &PgPool, pack_id: Uuid) -> Result<Option<Pack>> {
    sqlx::query_as::<_, Pack>("SELECT * FROM packs WHERE id = $1")
        .bind(pack_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_packs(pool: &PgPool) -> Result<Vec<Pack>> {
    sqlx::query_as::<_, Pack>("SELECT * FROM packs ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

// Scene queries

const LOCK_PACK: &str = "SELECT id FROM packs WHERE id = $1 FOR UPDATE";

/// Insert a scene and its answers in one transaction.
///
/// The pack row stays locked until commit so concurrent appends to one pack
/// take positions one after another.
pub async fn create_scene(pool: &PgPool, scene: &Scene) -> Result<Scene> {
    let mut tx = pool.begin().await?;

    sqlx::query(LOCK_PACK)
        .bind(scene.pack_id)
        .fetch_one(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, SceneRow>(
        r#"
        INSERT INTO scenes (id, pack_id, question, question_type, answer_type, duration_secs, position)
        VALUES (
            $1, $2, $3, $4, $5, $6,
            (SELECT COALESCE(MAX(position) + 1, 0) FROM scenes WHERE pack_id = $2)
        )
        RETURNING id, pack_id, question, question_type, answer_type, duration_secs, position
        "#,
    )
    .bind(scene.id)
    .bind(scene.pack_id)
    .bind(&scene.question)
    .bind(scene.question_type)
    .bind(scene.answer_type)
    .bind(scene.duration_secs)
    .fetch_one(&mut *tx)
    .await?;

    for (position, answer) in scene.answers.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO scene_answers (id, scene_id, content, is_correct, position)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(answer.id)
        .bind(scene.id)
        .bind(&answer.content)
        .bind(answer.is_correct)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(row.into_scene(scene.answers.clone()))
}

pub async fn get_scene(pool: &PgPool, scene_id: Uuid) -> Result<Option<Scene>> {
    let Some(row) = sqlx::query_as::<_, SceneRow>(
        r#"
        SELECT id, pack_id, question, question_type, answer_type, duration_secs, position
        FROM scenes WHERE id = $1
        "#,
    )
    .bind(scene_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let answers = sqlx::query_as::<_, SceneAnswerRow>(
        "SELECT id, scene_id, content, is_correct FROM scene_answers WHERE scene_id = $1 ORDER BY position",
    )
    .bind(scene_id)
    .fetch_all(pool)
    .await?;

    Ok(assemble_scenes(vec![row], answers).pop())
}

pub async fn get_pack_scenes(pool: &PgPool, pack_id: Uuid) -> Result<Vec<Scene>> {
    let rows = sqlx::query_as::<_, SceneRow>(
        r#"
        SELECT id, pack_id, question, question_type, answer_type, duration_secs, position
        FROM scenes WHERE pack_id = $1 ORDER BY position
        "#,
    )
    .bind(pack_id)
    .fetch_all(pool)
    .await?;

    let scene_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let answers = sqlx::query_as::<_, SceneAnswerRow>(
        r#"
        SELECT id, scene_id, content, is_correct FROM scene_answers
        WHERE scene_id = ANY($1)
        ORDER BY scene_id, position
        "#,
    )
    .bind(&scene_ids)
    .fetch_all(pool)
    .await?;

    Ok(assemble_scenes(rows, answers))
}

// Game queries
pub async fn insert_game(pool: &PgPool, game: &Game) -> Result<Game> {
    sqlx::query_as::<_, GameRow>(
        r#"
        INSERT INTO games (
            id, pack_id, game_scenes, state, is_started, is_finished, lock_version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(game.id)
    .bind(game.pack_id)
    .bind(&game.game_scenes)
    .bind(Json(&game.state))
    .bind(game.is_started)
    .bind(game.is_finished)
    .bind(game.lock_version)
    .fetch_one(pool)
    .await
    .map(Game::from)
}

pub async fn get_game(pool: &PgPool, game_id: Uuid) -> Result<Option<Game>> {
    sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE id = $1")
        .bind(game_id)
        .fetch_optional(pool)
        .await
        .map(|row| row.map(Game::from))
}

/// Write a game only if its lock_version is unchanged.
///
/// Returns `None` when another writer got there first.
pub async fn update_game_versioned(pool: &PgPool, game: &Game) -> Result<Option<Game>> {
    sqlx::query_as::<_, GameRow>(
        r#"
        UPDATE games
        SET state = $1,
            is_started = $2,
            is_finished = $3,
            lock_version = lock_version + 1,
            updated_at = NOW()
        WHERE id = $4 AND lock_version = $5
        RETURNING *
        "#,
    )
    .bind(Json(&game.state))
    .bind(game.is_started)
    .bind(game.is_finished)
    .bind(game.id)
    .bind(game.lock_version)
    .fetch_optional(pool)
    .await
    .map(|row| row.map(Game::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_row(id: Uuid, position: i32) -> SceneRow {
        SceneRow {
            id,
            pack_id: Uuid::nil(),
            question: format!("Question {}", position),
            question_type: QuestionType::Text,
            answer_type: AnswerType::MultipleChoice,
            duration_secs: None,
            position,
        }
    }

    fn answer_row(scene_id: Uuid, content: &str, is_correct: bool) -> SceneAnswerRow {
        SceneAnswerRow {
            id: Uuid::new_v4(),
            scene_id,
            content: content.to_string(),
            is_correct,
        }
    }

    #[test]
    fn test_assemble_scenes_groups_answers_by_scene() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let rows = vec![scene_row(first, 0), scene_row(second, 1)];
        let answers = vec![
            answer_row(second, "B1", true),
            answer_row(first, "A1", false),
            answer_row(first, "A2", true),
        ];

        let scenes = assemble_scenes(rows, answers);
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].id, first);
        let contents: Vec<_> = scenes[0].answers.iter().map(|a| a.content.as_str()).collect();
        assert_eq!(contents, vec!["A1", "A2"]);
        assert_eq!(scenes[1].answers.len(), 1);
        assert_eq!(scenes[1].correct_answer().unwrap().content, "B1");
    }

    #[test]
    fn test_assemble_scene_without_answers() {
        let id = Uuid::new_v4();
        let scenes = assemble_scenes(vec![scene_row(id, 0)], vec![]);
        assert!(scenes[0].answers.is_empty());
    }

    #[test]
    fn test_game_state_json_column_shape() {
        // The state column stores the same camelCase blob clients receive
        let state = serde_json::json!({
            "currentStep": 1,
            "currentScene": 0,
            "totalScenes": 1,
            "submissions": [],
            "playerScores": [],
            "duration": 30,
            "startTime": "2025-01-01T00:00:00Z",
            "sceneId": Uuid::nil(),
            "question": "Q",
            "questionType": "text",
            "answerType": "free_text",
            "answers": []
        });

        let parsed: GameState = serde_json::from_value(state).expect("state column should parse");
        assert_eq!(parsed.current_step, 1);
        assert_eq!(parsed.scene.answer_type, AnswerType::FreeText);
    }

    #[test]
    fn test_scene_append_locks_pack_row() {
        assert!(LOCK_PACK.starts_with("SELECT id FROM packs"));
        assert!(LOCK_PACK.ends_with("FOR UPDATE"));
    }
}
