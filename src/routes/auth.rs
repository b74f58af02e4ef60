use crate::{
    auth,
    error::ApiError,
    extractors::{ValidJson, Validate},
    identity::{IdentityError, IdentitySession, SignUpOutcome},
    models::User,
    AppState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

impl Validate for SignUpRequest {
    fn validate(&self) -> Result<(), String> {
        validate_credentials(&self.email, &self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl Validate for SignInRequest {
    fn validate(&self) -> Result<(), String> {
        validate_credentials(&self.email, &self.password)
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err("email is not valid".to_string()),
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: uuid::Uuid,
    pub display_name: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            display_name: user.display_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// JWT for backend API authentication
    pub access_token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub confirmation_required: bool,
    pub email: String,
}

/// Register with email and password.
///
/// Returns a session right away, or `202` when the identity service wants the
/// email confirmed first.
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<SignUpRequest>,
) -> Result<Response, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| User::default_display_name(&email));

    tracing::info!("Signing up {}", email);
    match state.identity.sign_up(&email, &payload.password, &name).await? {
        SignUpOutcome::Session(session) => {
            let response = establish_session(&state, session).await?;
            Ok(Json(response).into_response())
        }
        SignUpOutcome::PendingConfirmation(user) => {
            tracing::info!("Sign-up for {} awaits email confirmation", user.id);
            let body = PendingConfirmation {
                confirmation_required: true,
                email: user.email.unwrap_or(email),
            };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
    }
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<SignInRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let session = state.identity.sign_in(&email, &payload.password).await?;
    Ok(Json(establish_session(&state, session).await?))
}

/// Store the identity session for the user and issue our own JWT
async fn establish_session(
    state: &AppState,
    session: IdentitySession,
) -> Result<TokenResponse, ApiError> {
    let identity_user = session.user;
    let email = identity_user.email.clone().unwrap_or_default();
    let display_name = identity_user.display_name();

    let encrypted = state
        .cipher
        .encrypt(&session.refresh_token)
        .map_err(|e| ApiError::Internal(format!("Failed to encrypt refresh token: {}", e)))?;
    let token_expires_at = Utc::now() + Duration::seconds(session.expires_in);

    let user = state
        .store
        .upsert_user(
            identity_user.id,
            &email,
            &display_name,
            Some(&encrypted),
            Some(token_expires_at),
        )
        .await?;

    let access_token =
        auth::generate_token(user.user_id, &user.display_name, &state.config.security.jwt_secret)?;

    tracing::info!(
        "Successfully authenticated user: {} (ID: {})",
        user.display_name,
        user.user_id
    );
    Ok(TokenResponse {
        access_token,
        user: UserResponse::from(&user),
    })
}

/// Current user's player identity
pub async fn get_current_user(
    user: auth::AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserResponse>, ApiError> {
    let db_user = state.store.get_user(user.user_id).await?.ok_or_else(|| {
        tracing::warn!("Token for unknown user {}", user.user_id);
        ApiError::Unauthorized
    })?;

    Ok(Json(UserResponse::from(&db_user)))
}

/// Rotate the identity tokens and return a fresh JWT
pub async fn refresh_token(
    user: auth::AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TokenResponse>, ApiError> {
    tracing::info!(
        "Refreshing token for user: {} ({})",
        user.display_name,
        user.user_id
    );

    let db_user = state
        .store
        .get_user(user.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let encrypted = db_user.refresh_token.as_deref().ok_or_else(|| {
        tracing::warn!("No refresh token stored for user: {}", user.user_id);
        ApiError::Unauthorized
    })?;
    let current = state
        .cipher
        .decrypt(encrypted)
        .map_err(|e| ApiError::Internal(format!("Failed to decrypt refresh token: {}", e)))?;

    let session = state
        .identity
        .refresh(&current)
        .await
        .map_err(|e| {
            // Revoked or expired upstream: the user has to sign in again
            if matches!(e, IdentityError::Rejected { .. }) {
                tracing::warn!("Identity refresh rejected for {}: {}", user.user_id, e);
                ApiError::Unauthorized
            } else {
                e.into()
            }
        })?;

    let rotated = state
        .cipher
        .encrypt(&session.refresh_token)
        .map_err(|e| ApiError::Internal(format!("Failed to encrypt refresh token: {}", e)))?;
    let token_expires_at = Utc::now() + Duration::seconds(session.expires_in);
    state
        .store
        .update_user_refresh_token(user.user_id, &rotated, token_expires_at)
        .await?;

    let access_token = auth::generate_token(
        db_user.user_id,
        &db_user.display_name,
        &state.config.security.jwt_secret,
    )?;

    Ok(Json(TokenResponse {
        access_token,
        user: UserResponse::from(&db_user),
    }))
}

/// Revoke the identity session (best-effort) and clear stored tokens
pub async fn sign_out(
    user: auth::AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    tracing::info!(
        "Signing out user: {} ({})",
        user.display_name,
        user.user_id
    );

    let stored = state
        .store
        .get_user(user.user_id)
        .await?
        .and_then(|u| u.refresh_token);
    if let Some(encrypted) = stored {
        match state.cipher.decrypt(&encrypted) {
            Ok(refresh_token) => {
                if let Err(e) = state.identity.sign_out(&refresh_token).await {
                    tracing::warn!(
                        "Failed to revoke identity session (continuing anyway): {}",
                        e
                    );
                }
            }
            Err(e) => tracing::warn!("Stored refresh token is unreadable: {}", e),
        }
    }

    state.store.clear_user_tokens(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
