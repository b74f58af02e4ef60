use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Id issued by the hosted identity service
    pub user_id: Uuid,
    pub email: String,
    /// Name shown to other players
    pub display_name: String,
    /// Identity-service refresh token, encrypted at rest
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fallback display name derived from the email's local part
    pub fn default_display_name(email: &str) -> String {
        email.split('@').next().unwrap_or(email).to_string()
    }
}
