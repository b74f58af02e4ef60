use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::ApiError,
    extractors::{ValidJson, ValidPath, Validate},
    models::{AnswerType, Pack, QuestionType, Scene, SceneAnswer},
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackRequest {
    pub name: String,
    pub description: Option<String>,
    pub game_length: i32,
}

impl Validate for CreatePackRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.game_length < 1 {
            return Err("gameLength must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub content: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSceneRequest {
    pub question: String,
    #[serde(default = "default_question_type")]
    pub question_type: QuestionType,
    pub answer_type: AnswerType,
    pub duration_secs: Option<i32>,
    pub answers: Vec<AnswerRequest>,
}

fn default_question_type() -> QuestionType {
    QuestionType::Text
}

impl CreateSceneRequest {
    fn into_scene(self, pack_id: Uuid) -> Scene {
        Scene {
            id: Uuid::new_v4(),
            pack_id,
            question: self.question.trim().to_string(),
            question_type: self.question_type,
            answer_type: self.answer_type,
            duration_secs: self.duration_secs,
            position: 0,
            answers: self
                .answers
                .into_iter()
                .map(|a| SceneAnswer {
                    id: Uuid::new_v4(),
                    content: a.content.trim().to_string(),
                    is_correct: a.is_correct,
                })
                .collect(),
        }
    }
}

impl Validate for CreateSceneRequest {
    fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question must not be empty".to_string());
        }
        if self.answers.is_empty() {
            return Err("a scene needs at least one answer".to_string());
        }
        if self.answers.iter().any(|a| a.content.trim().is_empty()) {
            return Err("answers must not be empty".to_string());
        }
        if self.answers.iter().filter(|a| a.is_correct).count() != 1 {
            return Err("exactly one answer must be marked correct".to_string());
        }
        if matches!(self.duration_secs, Some(secs) if secs <= 0) {
            return Err("durationSecs must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackDetail {
    #[serde(flatten)]
    pub pack: Pack,
    pub scenes: Vec<Scene>,
}

pub async fn create_pack(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<CreatePackRequest>,
) -> Result<(StatusCode, Json<Pack>), ApiError> {
    let pack = Pack {
        id: Uuid::new_v4(),
        owner_id: Some(user.user_id),
        name: payload.name.trim().to_string(),
        description: payload
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        game_length: payload.game_length,
        created_at: Utc::now(),
    };
    let pack = state.store.create_pack(&pack).await?;

    tracing::info!("User {} created pack {} ({})", user.user_id, pack.id, pack.name);
    Ok((StatusCode::CREATED, Json(pack)))
}

pub async fn list_packs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Pack>>, ApiError> {
    Ok(Json(state.store.list_packs().await?))
}

pub async fn get_pack(
    State(state): State<Arc<AppState>>,
    ValidPath(pack_id): ValidPath<Uuid>,
) -> Result<Json<PackDetail>, ApiError> {
    let pack = load_pack(&state, pack_id).await?;
    let scenes = state.store.get_pack_scenes(pack_id).await?;
    Ok(Json(PackDetail { pack, scenes }))
}

pub async fn add_scene(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    ValidPath(pack_id): ValidPath<Uuid>,
    ValidJson(payload): ValidJson<CreateSceneRequest>,
) -> Result<(StatusCode, Json<Scene>), ApiError> {
    let pack = load_pack(&state, pack_id).await?;
    if pack.owner_id != Some(user.user_id) {
        tracing::warn!(
            "User {} tried to edit pack {} owned by {:?}",
            user.user_id,
            pack_id,
            pack.owner_id
        );
        return Err(ApiError::Forbidden(
            "Only the pack owner can add scenes".to_string(),
        ));
    }

    let scene = state.store.create_scene(&payload.into_scene(pack_id)).await?;

    tracing::info!("Added scene {} to pack {} at position {}", scene.id, pack_id, scene.position);
    Ok((StatusCode::CREATED, Json(scene)))
}

async fn load_pack(state: &AppState, pack_id: Uuid) -> Result<Pack, ApiError> {
    state
        .store
        .get_pack(pack_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("Pack not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::generate_token,
        config::Config,
        test_support::{call, state},
    };
    use axum::http::Method;
    use serde_json::json;

    fn token(user_id: Uuid) -> String {
        generate_token(user_id, "Editor", "test-jwt-secret").unwrap()
    }

    fn scene_body() -> serde_json::Value {
        json!({
            "question": "Largest planet?",
            "answerType": "multiple_choice",
            "durationSecs": 15,
            "answers": [
                { "content": "Jupiter", "isCorrect": true },
                { "content": "Mars" },
            ],
        })
    }

    #[test]
    fn test_scene_validation() {
        let mut request: CreateSceneRequest = serde_json::from_value(scene_body()).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.question_type, QuestionType::Text);

        request.answers[1].is_correct = true;
        assert!(request.validate().is_err());

        request.answers.clear();
        assert_eq!(
            request.validate().unwrap_err(),
            "a scene needs at least one answer"
        );

        let mut request: CreateSceneRequest = serde_json::from_value(scene_body()).unwrap();
        request.duration_secs = Some(0);
        assert!(request.validate().is_err());
    }

    #[tokio::test]
    async fn test_owner_builds_pack() {
        let state = state(Config::for_tests());
        let owner = token(Uuid::new_v4());

        let (status, pack) = call(
            &state,
            Method::POST,
            "/api/packs",
            Some(&owner),
            Some(json!({ "name": "Space", "gameLength": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let pack_id = pack["id"].as_str().unwrap().to_string();

        let (status, scene) = call(
            &state,
            Method::POST,
            &format!("/api/packs/{}/scenes", pack_id),
            Some(&owner),
            Some(scene_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(scene["position"], 0);

        let (_, detail) = call(&state, Method::GET, &format!("/api/packs/{}", pack_id), None, None).await;
        assert_eq!(detail["name"], "Space");
        assert_eq!(detail["scenes"].as_array().unwrap().len(), 1);

        let (_, packs) = call(&state, Method::GET, "/api/packs", None, None).await;
        assert_eq!(packs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pack_writes_need_auth_and_ownership() {
        let state = state(Config::for_tests());

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/packs",
            None,
            Some(json!({ "name": "Space", "gameLength": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, pack) = call(
            &state,
            Method::POST,
            "/api/packs",
            Some(&token(Uuid::new_v4())),
            Some(json!({ "name": "Space", "gameLength": 1 })),
        )
        .await;

        let (status, _) = call(
            &state,
            Method::POST,
            &format!("/api/packs/{}/scenes", pack["id"].as_str().unwrap()),
            Some(&token(Uuid::new_v4())),
            Some(scene_body()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &state,
            Method::GET,
            &format!("/api/packs/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Pack not found");
    }
}
