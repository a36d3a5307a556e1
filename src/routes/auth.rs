/**
 * Authentication Routes
 * JWT sessions: register, login, refresh, session lookup and logout
 */
use axum::{
    body::Bytes,
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::User;
use crate::routes::{reject, require_pool, Rejection};

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());

    /// Rate limit storage (IP -> last attempt timestamp)
    static ref RATE_LIMIT: Arc<RwLock<HashMap<String, i64>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Access token expiry in minutes
const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 15;

/// Refresh token expiry in days
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// One login/register attempt per IP per window
#[cfg_attr(test, allow(dead_code))]
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// User as exposed to the page layer
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            image: user.image,
        }
    }
}

/// `GET /api/auth/session` payload
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub user: SessionUser,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user: SessionUser,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// Refresh tokens are stored as SHA-256 digests, never in the clear.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn create_access_token(
    user_id: &str,
    email: &str,
    name: Option<&str>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES);

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.map(str::to_string),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Check rate limit for an IP, evicting expired windows as it goes.
async fn check_rate_limit(ip: &str) -> bool {
    #[cfg(test)]
    {
        let _ = ip;
        true
    }

    #[cfg(not(test))]
    {
        let now = Utc::now().timestamp();
        let mut limits = RATE_LIMIT.write().await;

        limits.retain(|_, last| now - *last < RATE_LIMIT_WINDOW_SECS);

        if limits.contains_key(ip) {
            return false;
        }

        limits.insert(ip.to_string(), now);
        true
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), Rejection> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Email and password are required"));
    }
    if !email.contains('@') {
        return Err(reject(StatusCode::BAD_REQUEST, "Invalid email format"));
    }
    Ok(())
}

/// Mint an access token plus a persisted refresh token for `user`.
async fn issue_tokens(pool: &sqlx::PgPool, user: &User) -> Result<(String, String), Rejection> {
    let access_token = create_access_token(&user.id.to_string(), &user.email, user.name.as_deref())
        .map_err(|e| {
            tracing::error!("Failed to create access token: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
        })?;

    let refresh_token = generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS);

    sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user.id)
        .bind(hash_refresh_token(&refresh_token))
        .bind(expires_at)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to persist refresh token: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
        })?;

    Ok((access_token, refresh_token))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
pub async fn register(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !check_rate_limit(&addr.ip().to_string()).await {
        return reject(StatusCode::TOO_MANY_REQUESTS, "Too many requests. Please try again later.")
            .into_response();
    }

    if let Err(rejection) = validate_credentials(&payload.email, &payload.password) {
        return rejection.into_response();
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        return reject(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters long",
        )
        .into_response();
    }

    let pool = match require_pool() {
        Ok(p) => p,
        Err(rejection) => return rejection.into_response(),
    };

    // bcrypt is CPU-bound; keep it off the async executor.
    let password = payload.password.clone();
    let password_hash = match tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST)).await {
        Ok(Ok(h)) => h,
        Ok(Err(e)) => {
            tracing::error!("Failed to hash password: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password")
                .into_response();
        }
        Err(e) => {
            tracing::error!("spawn_blocking panic during hash: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password")
                .into_response();
        }
    };

    match sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, name, password_hash)
        VALUES (LOWER($1), $2, $3)
        RETURNING id, name, email, image, password_hash, created_at
        "#,
    )
    .bind(payload.email.trim())
    .bind(&payload.name)
    .bind(&password_hash)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "user registered");
            (StatusCode::CREATED, Json(SessionUser::from(user))).into_response()
        }
        Err(e) if crate::routes::is_unique_violation(&e) => {
            reject(StatusCode::CONFLICT, "Email already registered").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to create user: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create account").into_response()
        }
    }
}

/// POST /api/auth/login
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    if !check_rate_limit(&addr.ip().to_string()).await {
        return reject(StatusCode::TOO_MANY_REQUESTS, "Too many requests. Please try again later.")
            .into_response();
    }

    if let Err(rejection) = validate_credentials(&payload.email, &payload.password) {
        return rejection.into_response();
    }

    let pool = match require_pool() {
        Ok(p) => p,
        Err(rejection) => return rejection.into_response(),
    };

    let user = match sqlx::query_as::<_, User>(
        "SELECT id, name, email, image, password_hash, created_at FROM users WHERE email = LOWER($1)",
    )
    .bind(payload.email.trim())
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("Login attempt for unknown user: {}", payload.email);
            return reject(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
        }
        Err(e) => {
            tracing::error!("Database error during login: {}", e);
            return reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service temporarily unavailable.",
            )
            .into_response();
        }
    };

    let password = payload.password.clone();
    let stored_hash = user.password_hash.clone();
    let password_ok = tokio::task::spawn_blocking(move || verify(password, &stored_hash).unwrap_or(false))
        .await
        .unwrap_or(false);

    if !password_ok {
        tracing::warn!(user_id = %user.id, "failed login attempt");
        return reject(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let (access_token, refresh_token) = match issue_tokens(pool.as_ref(), &user).await {
        Ok(tokens) => tokens,
        Err(rejection) => return rejection.into_response(),
    };

    tracing::info!(user_id = %user.id, "successful login");

    (
        StatusCode::OK,
        Json(TokenResponse {
            user: SessionUser::from(user),
            access_token,
            refresh_token,
        }),
    )
        .into_response()
}

/// GET /api/auth/session
///
/// Always 200: `null` when there is no valid session, so the page layer can
/// tell "unauthenticated" apart from a transport failure.
pub async fn session(headers: HeaderMap) -> impl IntoResponse {
    let claims = match extract_bearer_token(&headers).map(|t| verify_access_token(&t)) {
        Some(Ok(claims)) => claims,
        Some(Err(e)) => {
            tracing::debug!("Session token rejected: {}", e);
            return (StatusCode::OK, Json(None::<Session>)).into_response();
        }
        None => return (StatusCode::OK, Json(None::<Session>)).into_response(),
    };

    // The avatar lives in the users table; fall back to the token claims
    // when the database is unavailable.
    let from_claims = SessionUser {
        id: claims.sub.clone(),
        name: claims.name.clone(),
        email: claims.email.clone(),
        image: None,
    };

    let user = match (crate::db::get_pool(), Uuid::parse_str(&claims.sub)) {
        (Some(pool), Ok(id)) => match sqlx::query_as::<_, User>(
            "SELECT id, name, email, image, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
        {
            Ok(Some(user)) => SessionUser::from(user),
            // Deleted account: the token is dead weight.
            Ok(None) => return (StatusCode::OK, Json(None::<Session>)).into_response(),
            Err(e) => {
                tracing::error!("Database error loading session user: {}", e);
                from_claims
            }
        },
        _ => from_claims,
    };

    (StatusCode::OK, Json(Some(Session { user }))).into_response()
}

/// POST /api/auth/refresh - rotate a refresh token
pub async fn refresh(Json(payload): Json<RefreshRequest>) -> impl IntoResponse {
    if payload.refresh_token.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "Refresh token is required").into_response();
    }

    let pool = match require_pool() {
        Ok(p) => p,
        Err(rejection) => return rejection.into_response(),
    };

    let token_hash = hash_refresh_token(&payload.refresh_token);

    let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, bool)>(
        "SELECT user_id, expires_at, revoked FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(&token_hash)
    .fetch_optional(pool.as_ref())
    .await;

    let user_id = match row {
        Ok(Some((user_id, expires_at, revoked))) if !revoked && expires_at > Utc::now() => user_id,
        Ok(_) => {
            return reject(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token")
                .into_response()
        }
        Err(e) => {
            tracing::error!("DB error during token refresh lookup: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let user = match sqlx::query_as::<_, User>(
        "SELECT id, name, email, image, password_hash, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return reject(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token")
                .into_response()
        }
        Err(e) => {
            tracing::error!("DB error loading refresh token owner: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
        .bind(&token_hash)
        .execute(pool.as_ref())
        .await
    {
        tracing::error!("Failed to revoke rotated refresh token: {}", e);
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
    }

    match issue_tokens(pool.as_ref(), &user).await {
        Ok((access_token, refresh_token)) => (
            StatusCode::OK,
            Json(RefreshResponse {
                access_token,
                refresh_token,
            }),
        )
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// POST /api/auth/logout
///
/// Idempotent: revokes the supplied refresh token and, for a valid bearer
/// token, every refresh token of its user.
pub async fn logout(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    // The body is optional; signing out with only a bearer token is fine.
    let payload: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();

    if let Some(pool) = crate::db::get_pool() {
        if let Some(refresh_token) = payload.refresh_token {
            let _ = sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
                .bind(hash_refresh_token(&refresh_token))
                .execute(pool.as_ref())
                .await;
        }

        let user_id = extract_bearer_token(&headers)
            .and_then(|t| verify_access_token(&t).ok())
            .and_then(|claims| Uuid::parse_str(&claims.sub).ok());

        if let Some(user_id) = user_id {
            let _ = sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE user_id = $1")
                .bind(user_id)
                .execute(pool.as_ref())
                .await;
            tracing::info!(user_id = %user_id, "user signed out");
        }
    }

    (StatusCode::OK, Json(crate::routes::SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn auth_router() -> Router {
        use axum::extract::connect_info::MockConnectInfo;
        Router::new()
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/session", get(session))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::body::Bytes) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn json_request(uri: &str, json: &impl Serialize) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap()
    }

    #[test]
    fn test_access_token_round_trips_claims() {
        let token = create_access_token("user-1", "ada@example.com", Some("Ada")).unwrap();
        let claims = verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_refresh_token_hash_is_stable_hex() {
        let a = hash_refresh_token("abc");
        assert_eq!(a, hash_refresh_token("abc"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_refresh_token("abd"));
    }

    #[test]
    fn test_extract_bearer_token_ignores_empty() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_login_empty_email_returns_bad_request() {
        let req = json_request(
            "/api/auth/login",
            &LoginRequest {
                email: "".to_string(),
                password: "password123".to_string(),
            },
        );
        let (status, _) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_short_password_returns_bad_request() {
        let req = json_request(
            "/api/auth/register",
            &RegisterRequest {
                email: "ada@example.com".to_string(),
                password: "short".to_string(),
                name: None,
            },
        );
        let (status, _) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_without_database_is_unavailable() {
        let req = json_request(
            "/api/auth/login",
            &LoginRequest {
                email: "ada@example.com".to_string(),
                password: "password123".to_string(),
            },
        );
        let (status, _) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_session_without_token_is_null() {
        let req = Request::get("/api/auth/session").body(Body::empty()).unwrap();
        let (status, bytes) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::OK);
        let body: Option<Session> = serde_json::from_slice(&bytes).unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_session_with_valid_token_uses_claims_without_database() {
        let token = create_access_token("user-1", "ada@example.com", Some("Ada")).unwrap();
        let req = Request::get("/api/auth/session")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::OK);
        let body: Option<Session> = serde_json::from_slice(&bytes).unwrap();
        let user = body.unwrap().user;
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert_eq!(user.image, None);
    }

    #[tokio::test]
    async fn test_refresh_empty_token_returns_bad_request() {
        let req = json_request(
            "/api/auth/refresh",
            &RefreshRequest {
                refresh_token: "".to_string(),
            },
        );
        let (status, _) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logout_without_body_returns_success() {
        let req = Request::post("/api/auth/logout").body(Body::empty()).unwrap();
        let (status, bytes) = send(auth_router(), req).await;
        assert_eq!(status, StatusCode::OK);
        let body: crate::routes::SuccessResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.success);
    }
}
