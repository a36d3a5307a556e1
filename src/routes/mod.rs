/**
 * Routes Module
 * API route handlers
 */
use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db;

pub mod auth;
pub mod health;
pub mod logs;
pub mod post;
pub mod site;
pub mod upload;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Success response (for delete)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Rejection returned by handlers before any work is done.
pub type Rejection = (StatusCode, Json<ErrorResponse>);

pub fn reject(status: StatusCode, error: &str) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: None,
        }),
    )
}

pub fn reject_with(status: StatusCode, error: &str, message: &str) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }),
    )
}

/// Resolve the caller from the bearer token.
pub fn require_user(headers: &HeaderMap) -> Result<auth::Claims, Rejection> {
    let token = auth::extract_bearer_token(headers)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Authorization required"))?;

    auth::verify_access_token(&token)
        .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

/// The caller's user id; tokens carry it as a UUID string.
pub fn user_id(claims: &auth::Claims) -> Result<Uuid, Rejection> {
    Uuid::parse_str(&claims.sub).map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid token subject"))
}

pub fn require_pool() -> Result<Arc<PgPool>, Rejection> {
    db::get_pool().ok_or_else(|| reject(StatusCode::SERVICE_UNAVAILABLE, "Database not available"))
}

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, Rejection> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| reject_with(StatusCode::BAD_REQUEST, "Invalid id", &format!("{what} must be a UUID")))
}

/// Unique-constraint violations surface as conflicts.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_require_user_without_header_is_unauthorized() {
        let headers = HeaderMap::new();
        let (status, body) = require_user(&headers).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.0.error, "Authorization required");
    }

    #[test]
    fn test_require_user_with_garbage_token_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer not.a.jwt"));
        let (status, body) = require_user(&headers).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.0.error, "Invalid or expired token");
    }

    #[test]
    fn test_parse_id_rejects_non_uuid() {
        let (status, _) = parse_id("42", "postId").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(parse_id(" 6f1c2a52-3b55-4c1e-9a53-0d7c8a2f1b11 ", "postId").is_ok());
    }
}
