use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub game: GameConfig,
}

/// Which persistence backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub store: StoreKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the hosted identity service's auth API
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Round length for scenes without their own duration
    pub default_scene_duration: u32,
    /// Points for an instant correct answer
    pub max_points: u32,
    /// Attempts at a game update before giving up on version conflicts
    pub update_retries: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            default_scene_duration: 30,
            max_points: 1000,
            update_retries: 5,
        }
    }
}

impl StoreKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => anyhow::bail!("STORE must be 'postgres' or 'memory', got '{}'", other),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let store = StoreKind::parse(&env::var("STORE").unwrap_or_else(|_| "postgres".to_string()))?;

        let database = DatabaseConfig {
            url: match store {
                StoreKind::Postgres => env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                StoreKind::Memory => env::var("DATABASE_URL").unwrap_or_default(),
            },
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a number")?,
            store,
        };

        let identity = IdentityConfig {
            base_url: env::var("IDENTITY_URL")
                .context("IDENTITY_URL must be set")?
                .trim_end_matches('/')
                .to_string(),
            api_key: env::var("IDENTITY_API_KEY").context("IDENTITY_API_KEY must be set")?,
        };

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a number")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "../frontend".to_string()),
        };

        let security = SecurityConfig {
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            encryption_key: env::var("ENCRYPTION_KEY")
                .context("ENCRYPTION_KEY must be set (32-byte base64 encoded key)")?,
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            default_scene_duration: env::var("DEFAULT_SCENE_DURATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_scene_duration),
            max_points: env::var("GAME_MAX_POINTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_points),
            update_retries: env::var("GAME_UPDATE_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|retries: &u32| *retries > 0)
                .unwrap_or(defaults.update_retries),
        };

        Ok(Config {
            database,
            identity,
            server,
            security,
            game,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
impl Config {
    /// Self-contained config for tests: memory store, fixed secrets
    pub fn for_tests() -> Self {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

        Config {
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                store: StoreKind::Memory,
            },
            identity: IdentityConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                api_key: "test-api-key".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                frontend_url: "http://localhost:3000".to_string(),
                static_dir: "./frontend".to_string(),
            },
            security: SecurityConfig {
                jwt_secret: "test-jwt-secret".to_string(),
                encryption_key: BASE64.encode([7u8; 32]),
            },
            game: GameConfig::default(),
        }
    }
}
