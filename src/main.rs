mod auth;
mod config;
mod db;
mod encryption;
mod error;
mod extractors;
mod game;
mod identity;
mod models;
mod routes;
mod websocket;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{http::HeaderValue, routing::get, Router};
use config::{Config, StoreKind};
use db::{MemoryStore, PgStore, Store};
use encryption::TokenCipher;
use game::GameService;
use identity::IdentityClient;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use websocket::GameHub;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub games: GameService,
    pub hub: Arc<GameHub>,
    pub identity: IdentityClient,
    pub cipher: TokenCipher,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, http_client: reqwest::Client) -> Result<Self> {
        let hub = Arc::new(GameHub::new());
        let games = GameService::new(store.clone(), hub.clone(), &config.game);
        let identity = IdentityClient::new(http_client, &config.identity);
        let cipher = TokenCipher::from_base64_key(&config.security.encryption_key)
            .context("ENCRYPTION_KEY is not a valid 32-byte base64 key")?;

        Ok(Self {
            config,
            store,
            games,
            hub,
            identity,
            cipher,
        })
    }
}

/// Build the HTTP router: API, live game sockets and the static frontend
pub fn app(state: Arc<AppState>) -> Router {
    let origin = match state.config.server.frontend_url.as_str() {
        "*" => AllowOrigin::any(),
        url => match HeaderValue::from_str(url) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!("FRONTEND_URL '{}' is not a valid origin, allowing any", url);
                AllowOrigin::any()
            }
        },
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    let frontend_service = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/ws/games/{game_id}", get(websocket::handle_game_socket))
        .merge(routes::create_routes())
        .fallback_service(frontend_service)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trivia_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting trivia backend server...");

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let store: Arc<dyn Store> = match config.database.store {
        StoreKind::Postgres => {
            let pool =
                db::create_pool(config.database_url(), config.database.max_connections).await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations completed");
            Arc::new(PgStore::new(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    tracing::info!("HTTP client initialized");

    let state = Arc::new(AppState::new(config.clone(), store, http_client)?);
    let app = app(state);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Game updates: ws://{}/ws/games/{{game_id}}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
