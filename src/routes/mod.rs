pub mod auth;
pub mod games;
pub mod health;
pub mod packs;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/signout", post(auth::sign_out))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/me", get(auth::get_current_user))
        .route("/games", post(games::create_game))
        .route("/games/{game_id}", get(games::get_game))
        .route("/games/{game_id}/check", get(games::check_game))
        .route("/games/{game_id}/start", post(games::start_game))
        .route("/games/{game_id}/next-step", post(games::next_step))
        .route("/games/{game_id}/next-scene", post(games::next_scene))
        .route("/games/{game_id}/submit", post(games::submit_answer))
        .route("/games/{game_id}/results", get(games::results))
        .route("/packs", post(packs::create_pack).get(packs::list_packs))
        .route("/packs/{pack_id}", get(packs::get_pack))
        .route("/packs/{pack_id}/scenes", post(packs::add_scene))
}
