use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::models::{Game, Pack, Scene, User};

/// In-process `Store` used by tests and `STORE=memory` runs.
///
/// Each map entry is guarded by its shard lock, so the version check and the
/// write in `update_game` happen atomically.
#[derive(Default)]
pub struct MemoryStore {
    packs: DashMap<Uuid, Pack>,
    scenes: DashMap<Uuid, Scene>,
    games: DashMap<Uuid, Game>,
    users: DashMap<Uuid, User>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_pack(&self, pack: &Pack) -> StoreResult<Pack> {
        self.packs.insert(pack.id, pack.clone());
        Ok(pack.clone())
    }

    async fn get_pack(&self, pack_id: Uuid) -> StoreResult<Option<Pack>> {
        Ok(self.packs.get(&pack_id).map(|p| p.clone()))
    }

    async fn list_packs(&self) -> StoreResult<Vec<Pack>> {
        let mut packs: Vec<Pack> = self.packs.iter().map(|p| p.clone()).collect();
        packs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(packs)
    }

    async fn create_scene(&self, scene: &Scene) -> StoreResult<Scene> {
        // Holding the pack entry serializes appends to the same pack
        let _pack = self
            .packs
            .get_mut(&scene.pack_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        let position = self
            .scenes
            .iter()
            .filter(|s| s.pack_id == scene.pack_id)
            .map(|s| s.position + 1)
            .max()
            .unwrap_or(0);

        let stored = Scene {
            position,
            ..scene.clone()
        };
        self.scenes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_scene(&self, scene_id: Uuid) -> StoreResult<Option<Scene>> {
        Ok(self.scenes.get(&scene_id).map(|s| s.clone()))
    }

    async fn get_pack_scenes(&self, pack_id: Uuid) -> StoreResult<Vec<Scene>> {
        let mut scenes: Vec<Scene> = self
            .scenes
            .iter()
            .filter(|s| s.pack_id == pack_id)
            .map(|s| s.clone())
            .collect();
        scenes.sort_by_key(|s| s.position);
        Ok(scenes)
    }

    async fn insert_game(&self, game: &Game) -> StoreResult<Game> {
        self.games.insert(game.id, game.clone());
        Ok(game.clone())
    }

    async fn get_game(&self, game_id: Uuid) -> StoreResult<Option<Game>> {
        Ok(self.games.get(&game_id).map(|g| g.clone()))
    }

    async fn update_game(&self, game: &Game) -> StoreResult<Game> {
        let conflict = || StoreError::VersionConflict {
            game_id: game.id,
            expected: game.lock_version,
        };

        let mut stored = self.games.get_mut(&game.id).ok_or_else(conflict)?;
        if stored.lock_version != game.lock_version {
            return Err(conflict());
        }

        let updated = Game {
            lock_version: game.lock_version + 1,
            updated_at: Utc::now(),
            ..game.clone()
        };
        *stored = updated.clone();
        Ok(updated)
    }

    async fn upsert_user(
        &self,
        user_id: Uuid,
        email: &str,
        display_name: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<User> {
        let now = Utc::now();
        let mut entry = self.users.entry(user_id).or_insert_with(|| User {
            user_id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            refresh_token: None,
            token_expires_at: None,
            created_at: now,
            updated_at: now,
        });

        entry.email = email.to_string();
        entry.display_name = display_name.to_string();
        entry.refresh_token = refresh_token.map(str::to_string);
        entry.token_expires_at = token_expires_at;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn update_user_refresh_token(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.refresh_token = Some(refresh_token.to_string());
            user.token_expires_at = Some(token_expires_at);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_user_tokens(&self, user_id: Uuid) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.refresh_token = None;
            user.token_expires_at = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerType, GameState, QuestionType, SceneAnswer, SceneSnapshot};

    fn pack() -> Pack {
        Pack {
            id: Uuid::new_v4(),
            owner_id: None,
            name: "Movies".to_string(),
            description: Some("Film trivia".to_string()),
            game_length: 2,
            created_at: Utc::now(),
        }
    }

    fn scene(pack_id: Uuid) -> Scene {
        Scene {
            id: Uuid::new_v4(),
            pack_id,
            question: "Who directed Alien?".to_string(),
            question_type: QuestionType::Text,
            answer_type: AnswerType::FreeText,
            duration_secs: None,
            position: 99,
            answers: vec![SceneAnswer {
                id: Uuid::new_v4(),
                content: "Ridley Scott".to_string(),
                is_correct: true,
            }],
        }
    }

    fn game(pack_id: Uuid) -> Game {
        let scene = scene(pack_id);
        let now = Utc::now();
        Game {
            id: Uuid::new_v4(),
            pack_id,
            game_scenes: vec![scene.id],
            state: GameState {
                current_step: 0,
                current_scene: 0,
                total_scenes: 1,
                submissions: vec![],
                player_scores: vec![],
                duration: 30,
                start_time: now,
                scene: SceneSnapshot::from(&scene),
            },
            is_started: false,
            is_finished: false,
            lock_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_scenes_are_appended_in_order() {
        let store = MemoryStore::new();
        let pack = store.create_pack(&pack()).await.unwrap();

        let first = store.create_scene(&scene(pack.id)).await.unwrap();
        let second = store.create_scene(&scene(pack.id)).await.unwrap();
        assert_eq!(first.position, 0);
        assert_eq!(second.position, 1);

        let scenes = store.get_pack_scenes(pack.id).await.unwrap();
        assert_eq!(
            scenes.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
        assert!(store.get_pack_scenes(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_get_distinct_positions() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let pack_id = store.create_pack(&pack()).await.unwrap().id;

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_scene(&scene(pack_id)).await.unwrap() })
            })
            .collect();
        let mut positions = Vec::new();
        for task in tasks {
            positions.push(task.await.unwrap().position);
        }

        positions.sort_unstable();
        assert_eq!(positions, (0..32).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_scene_for_missing_pack_is_rejected() {
        let store = MemoryStore::new();
        let err = store.create_scene(&scene(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_update_game_bumps_version() {
        let store = MemoryStore::new();
        let game = store.insert_game(&game(Uuid::new_v4())).await.unwrap();

        let mut changed = game.clone();
        changed.is_started = true;
        let updated = store.update_game(&changed).await.unwrap();
        assert_eq!(updated.lock_version, 1);
        assert!(store.get_game(game.id).await.unwrap().unwrap().is_started);
    }

    #[tokio::test]
    async fn test_update_game_rejects_stale_version() {
        let store = MemoryStore::new();
        let game = store.insert_game(&game(Uuid::new_v4())).await.unwrap();

        tokio_test::assert_ok!(store.update_game(&game).await);
        let err = store.update_game(&game).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_update_missing_game_conflicts() {
        let store = MemoryStore::new();
        let err = store.update_game(&game(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_user_upsert_and_token_lifecycle() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let user = store
            .upsert_user(id, "host@example.com", "Host", Some("enc-1"), Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("enc-1"));

        let user = store
            .upsert_user(id, "host@example.com", "Quiz Host", Some("enc-2"), None)
            .await
            .unwrap();
        assert_eq!(user.display_name, "Quiz Host");
        assert_eq!(user.refresh_token.as_deref(), Some("enc-2"));

        store.clear_user_tokens(id).await.unwrap();
        let user = store.get_user(id).await.unwrap().unwrap();
        assert!(user.refresh_token.is_none());
        assert!(user.token_expires_at.is_none());
    }
}
