//! Platforms Backend - multi-tenant blogging: post API, authenticated shell
//! and post settings page logic.

pub mod app;
pub mod db;
pub mod logging;
pub mod media;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

/// Request body cap: the 5 MB upload limit plus multipart framing.
const BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect()
}

/// Configure CORS from ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN,
/// falling back to the local dev frontend.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|s| parse_origins(&s))
        .filter(|origins| !origins.is_empty())
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .map(|s| parse_origins(&s))
                .filter(|origins| !origins.is_empty())
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();

    Router::new()
        .route("/api/logs", post(routes::logs::receive_client_logs))
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/session", get(routes::auth::session))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/site", get(routes::site::get_site))
        .route(
            "/api/post",
            get(routes::post::get_post)
                .post(routes::post::create_post)
                .put(routes::post::update_post)
                .delete(routes::post::delete_post),
        )
        .route("/api/upload", post(routes::upload::upload_image))
        .nest_service("/uploads", ServeDir::new(&media::UPLOADS.dir))
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(cors)
}

/// Refuse to run production with the built-in JWT secret.
fn check_production_secrets() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment != "production" {
        return;
    }

    let secret = std::env::var("JWT_SECRET").unwrap_or_default();
    if secret.is_empty() || secret == routes::auth::DEFAULT_JWT_SECRET {
        panic!(
            "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
             Refusing to start with the default secret."
        );
    }

    if std::env::var("PUBLIC_BASE_URL").is_err() {
        tracing::warn!(
            "PUBLIC_BASE_URL is not set; uploaded images will be addressed as http://localhost:3001"
        );
    }
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    let _log_guards = logging::init();

    routes::health::init_start_time();
    check_production_secrets();

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    let app = create_app();

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
