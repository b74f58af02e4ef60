use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Field-level checks run after a body deserializes
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// JSON body extractor whose parse and validation failures are `BadRequest`s
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            tracing::debug!("Rejected request body: {}", rejection.body_text());
            ApiError::BadRequest(rejection.body_text())
        })?;

        value.validate().map_err(ApiError::BadRequest)?;
        Ok(ValidJson(value))
    }
}

/// Path parameter extractor whose parse failures are `BadRequest`s
#[derive(Debug)]
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                tracing::debug!("Rejected path parameters: {}", rejection.body_text());
                ApiError::BadRequest(rejection.body_text())
            })?;
        Ok(ValidPath(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header, routing::get, Router};
    use serde::Deserialize;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    impl Validate for Named {
        fn validate(&self) -> Result<(), String> {
            if self.name.trim().is_empty() {
                return Err("name must not be empty".to_string());
            }
            Ok(())
        }
    }

    fn request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body_passes() {
        let ValidJson(named) = ValidJson::<Named>::from_request(request(r#"{"name":"Ann"}"#), &())
            .await
            .unwrap();
        assert_eq!(named.name, "Ann");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let err = ValidJson::<Named>::from_request(request("{not json"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_validation_is_bad_request() {
        let err = ValidJson::<Named>::from_request(request(r#"{"name":"  "}"#), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "name must not be empty"));
    }

    async fn echo_id(ValidPath(id): ValidPath<Uuid>) -> String {
        id.to_string()
    }

    async fn get_status(uri: &str) -> (axum::http::StatusCode, String) {
        let app = Router::new().route("/items/{id}", get(echo_id));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        (status, content_type)
    }

    #[tokio::test]
    async fn test_valid_path_parses_uuid() {
        let (status, _) = get_status(&format!("/items/{}", Uuid::new_v4())).await;
        assert_eq!(status, axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_path_is_json_bad_request() {
        let (status, content_type) = get_status("/items/not-a-uuid").await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(content_type, "application/json");
    }
}
