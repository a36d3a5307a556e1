/**
 * Health Routes
 * Liveness and readiness of the server and its database
 */
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Pin the uptime origin to server startup.
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detailed health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub database: ServiceCheck,
}

/// Ready check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn check_database() -> ServiceCheck {
    match crate::db::health_check().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => ServiceCheck {
            status: "unhealthy".to_string(),
            response_time: None,
            error: Some(e.to_string()),
        },
    }
}

/// GET /health
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed
///
/// The process answering is "ok" even with the database down.
pub async fn health_detailed() -> impl IntoResponse {
    let response = DetailedHealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        database: check_database().await,
    };

    (StatusCode::OK, Json(response))
}

/// GET /health/database
pub async fn health_database() -> impl IntoResponse {
    (StatusCode::OK, Json(check_database().await))
}

/// GET /health/ready
///
/// Every post and site route needs the database, so readiness does too.
pub async fn health_ready() -> impl IntoResponse {
    let database = check_database().await;

    if database.status == "healthy" {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready".to_string(),
                timestamp: Utc::now(),
                reason: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready".to_string(),
                timestamp: Utc::now(),
                reason: database.error.or_else(|| Some("Database is not healthy".to_string())),
            }),
        )
    }
}
