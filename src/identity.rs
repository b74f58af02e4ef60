use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::config::IdentityConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service understood the request and refused it (bad credentials, taken email)
    #[error("Identity service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Identity service returned status {status}")]
    Unexpected { status: u16 },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserMetadata {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl IdentityUser {
    /// Name chosen at sign-up, falling back to the email's local part
    pub fn display_name(&self) -> String {
        self.user_metadata
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                crate::models::User::default_display_name(self.email.as_deref().unwrap_or(""))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySession {
    pub refresh_token: String,
    /// Seconds until the identity access token expires
    pub expires_in: i64,
    pub user: IdentityUser,
}

/// Sign-up either logs the user straight in or waits for email confirmation
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpOutcome {
    Session(IdentitySession),
    PendingConfirmation(IdentityUser),
}

/// Error payloads vary between endpoints
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorPayload {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Client for the hosted email/password identity service
#[derive(Clone)]
pub struct IdentityClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl IdentityClient {
    pub fn new(http: Client, config: &IdentityConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<SignUpOutcome, IdentityError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "name": name },
        });
        let response = self
            .http
            .post(format!("{}/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;

        Self::parse(response).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<IdentitySession, IdentityError> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&Credentials { email, password })
            .send()
            .await?;

        Self::parse(response).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<IdentitySession, IdentityError> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.api_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Revoke a refresh token
    pub async fn sign_out(&self, refresh_token: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.api_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::failure(response).await)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, IdentityError> {
        if response.status().is_success() {
            return Ok(response.json::<T>().await?);
        }
        Err(Self::failure(response).await)
    }

    async fn failure(response: Response) -> IdentityError {
        let status = response.status();
        if status.is_server_error() {
            tracing::error!("Identity service failed with {}", status);
            return IdentityError::Unexpected {
                status: status.as_u16(),
            };
        }

        let payload = response
            .json::<ErrorPayload>()
            .await
            .unwrap_or_default();
        match payload.into_message() {
            Some(message) => IdentityError::Rejected {
                status: status.as_u16(),
                message,
            },
            None => IdentityError::Unexpected {
                status: status.as_u16(),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Minimal stand-in for the identity service, served on an ephemeral port

    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use dashmap::DashMap;
    use serde_json::{json, Value};
    use std::{collections::HashMap, sync::Arc};
    use uuid::Uuid;

    pub const API_KEY: &str = "test-anon-key";
    pub const CONFIRM_PREFIX: &str = "confirm+";

    #[derive(Default)]
    pub struct MockIdentity {
        /// email -> (user id, password, name)
        users: DashMap<String, (Uuid, String, String)>,
        /// refresh token -> email
        refresh_tokens: DashMap<String, String>,
        pub revoked: DashMap<String, ()>,
    }

    impl MockIdentity {
        fn session(&self, email: &str) -> Value {
            let (id, _, name) = self
                .users
                .get(email)
                .map(|u| u.clone())
                .unwrap_or_default();
            let refresh_token = Uuid::new_v4().to_string();
            self.refresh_tokens
                .insert(refresh_token.clone(), email.to_string());
            json!({
                "access_token": "identity-access",
                "refresh_token": refresh_token,
                "expires_in": 3600,
                "token_type": "bearer",
                "user": { "id": id, "email": email, "user_metadata": { "name": name } },
            })
        }
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
    }

    async fn signup(
        State(mock): State<Arc<MockIdentity>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "No API key found"})));
        }
        let email = body["email"].as_str().unwrap_or_default().to_string();
        let password = body["password"].as_str().unwrap_or_default().to_string();
        let name = body["data"]["name"].as_str().unwrap_or_default().to_string();

        if mock.users.contains_key(&email) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"code": 422, "msg": "User already registered"})),
            );
        }
        let id = Uuid::new_v4();
        mock.users.insert(email.clone(), (id, password, name.clone()));

        if email.starts_with(CONFIRM_PREFIX) {
            return (
                StatusCode::OK,
                Json(json!({"id": id, "email": email, "user_metadata": {"name": name}})),
            );
        }
        (StatusCode::OK, Json(mock.session(&email)))
    }

    async fn token(
        State(mock): State<Arc<MockIdentity>>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "No API key found"})));
        }
        let invalid = || {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid login credentials",
                })),
            )
        };

        match query.get("grant_type").map(String::as_str) {
            Some("password") => {
                let email = body["email"].as_str().unwrap_or_default();
                let password = body["password"].as_str().unwrap_or_default();
                match mock.users.get(email) {
                    Some(user) if user.1 == password => {
                        drop(user);
                        (StatusCode::OK, Json(mock.session(email)))
                    }
                    _ => invalid(),
                }
            }
            Some("refresh_token") => {
                let token = body["refresh_token"].as_str().unwrap_or_default();
                match mock.refresh_tokens.remove(token) {
                    Some((_, email)) => (StatusCode::OK, Json(mock.session(&email))),
                    None => invalid(),
                }
            }
            _ => invalid(),
        }
    }

    async fn logout(
        State(mock): State<Arc<MockIdentity>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        if let Some(token) = body["refresh_token"].as_str() {
            mock.refresh_tokens.remove(token);
            mock.revoked.insert(token.to_string(), ());
        }
        StatusCode::NO_CONTENT
    }

    /// Start the mock and return its base URL
    pub async fn spawn() -> (String, Arc<MockIdentity>) {
        let mock = Arc::new(MockIdentity::default());
        let app = Router::new()
            .route("/signup", post(signup))
            .route("/token", post(token))
            .route("/logout", post(logout))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), mock)
    }
}
