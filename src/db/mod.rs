use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Game, Pack, Scene, User};

pub mod memory;
pub mod queries;

pub use memory::MemoryStore;

pub async fn create_pool(database_url: &str, max_connections: u32) -> sqlx::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The row's lock_version no longer matches the caller's copy
    #[error("Game {game_id} was updated since version {expected}")]
    VersionConflict { game_id: Uuid, expected: i32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for packs, scenes, games and users.
///
/// Game updates are compare-and-swap on `lock_version`: `update_game` writes
/// only if the stored version equals `game.lock_version`, and the returned
/// row carries the bumped version.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_pack(&self, pack: &Pack) -> StoreResult<Pack>;
    async fn get_pack(&self, pack_id: Uuid) -> StoreResult<Option<Pack>>;
    async fn list_packs(&self) -> StoreResult<Vec<Pack>>;

    /// Insert a scene with its answers; the scene is appended after the pack's last one
    async fn create_scene(&self, scene: &Scene) -> StoreResult<Scene>;
    async fn get_scene(&self, scene_id: Uuid) -> StoreResult<Option<Scene>>;
    async fn get_pack_scenes(&self, pack_id: Uuid) -> StoreResult<Vec<Scene>>;

    async fn insert_game(&self, game: &Game) -> StoreResult<Game>;
    async fn get_game(&self, game_id: Uuid) -> StoreResult<Option<Game>>;
    async fn update_game(&self, game: &Game) -> StoreResult<Game>;

    async fn upsert_user(
        &self,
        user_id: Uuid,
        email: &str,
        display_name: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<User>;
    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;
    async fn update_user_refresh_token(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn clear_user_tokens(&self, user_id: Uuid) -> StoreResult<()>;
}

/// `Store` backed by Postgres
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_pack(&self, pack: &Pack) -> StoreResult<Pack> {
        Ok(queries::create_pack(&self.pool, pack).await?)
    }

    async fn get_pack(&self, pack_id: Uuid) -> StoreResult<Option<Pack>> {
        Ok(queries::get_pack(&self.pool, pack_id).await?)
    }

    async fn list_packs(&self) -> StoreResult<Vec<Pack>> {
        Ok(queries::list_packs(&self.pool).await?)
    }

    async fn create_scene(&self, scene: &Scene) -> StoreResult<Scene> {
        Ok(queries::create_scene(&self.pool, scene).await?)
    }

    async fn get_scene(&self, scene_id: Uuid) -> StoreResult<Option<Scene>> {
        Ok(queries::get_scene(&self.pool, scene_id).await?)
    }

    async fn get_pack_scenes(&self, pack_id: Uuid) -> StoreResult<Vec<Scene>> {
        Ok(queries::get_pack_scenes(&self.pool, pack_id).await?)
    }

    async fn insert_game(&self, game: &Game) -> StoreResult<Game> {
        Ok(queries::insert_game(&self.pool, game).await?)
    }

    async fn get_game(&self, game_id: Uuid) -> StoreResult<Option<Game>> {
        Ok(queries::get_game(&self.pool, game_id).await?)
    }

    async fn update_game(&self, game: &Game) -> StoreResult<Game> {
        queries::update_game_versioned(&self.pool, game)
            .await?
            .ok_or(StoreError::VersionConflict {
                game_id: game.id,
                expected: game.lock_version,
            })
    }

    async fn upsert_user(
        &self,
        user_id: Uuid,
        email: &str,
        display_name: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<User> {
        Ok(queries::create_or_update_user(
            &self.pool,
            user_id,
            email,
            display_name,
            refresh_token,
            token_expires_at,
        )
        .await?)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(queries::get_user(&self.pool, user_id).await?)
    }

    async fn update_user_refresh_token(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(
            queries::update_user_refresh_token(&self.pool, user_id, refresh_token, token_expires_at)
                .await?,
        )
    }

    async fn clear_user_tokens(&self, user_id: Uuid) -> StoreResult<()> {
        Ok(queries::clear_user_tokens(&self.pool, user_id).await?)
    }
}
