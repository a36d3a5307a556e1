/**
 * Post Routes
 * `/api/post`: settings lookup, listing, creation, settings update and deletion
 */
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::models::{Post, PostSite, PostWithSite, Site};
use crate::media::{self, UPLOADS};
use crate::routes::{
    is_unique_violation, parse_id, reject, reject_with, require_pool, require_user, user_id,
    Rejection, SuccessResponse,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters shared by GET/POST/DELETE /api/post
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    pub post_id: Option<String>,
    pub site_id: Option<String>,
    pub published: Option<bool>,
}

/// Request body for PUT /api/post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_blurhash: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

/// Post summary (for list view)
#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub slug: String,
    pub image: Option<String>,
    pub image_blurhash: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response for GET /api/post?siteId=
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    pub site: Site,
    pub posts: Vec<PostSummary>,
}

/// Response for POST /api/post
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostResponse {
    pub post_id: Uuid,
}

/// Flat row of a post joined with its site.
#[derive(Debug, FromRow)]
struct PostWithSiteRow {
    id: Uuid,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    slug: String,
    image: Option<String>,
    image_blurhash: Option<String>,
    published: bool,
    site_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    site_name: Option<String>,
    site_subdomain: Option<String>,
    site_custom_domain: Option<String>,
}

impl From<PostWithSiteRow> for PostWithSite {
    fn from(row: PostWithSiteRow) -> Self {
        let site = row.site_id.map(|id| PostSite {
            id,
            name: row.site_name,
            subdomain: row.site_subdomain,
            custom_domain: row.site_custom_domain,
        });
        PostWithSite {
            post: Post {
                id: row.id,
                title: row.title,
                description: row.description,
                content: row.content,
                slug: row.slug,
                image: row.image,
                image_blurhash: row.image_blurhash,
                published: row.published,
                site_id: row.site_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            site,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$")
        .expect("slug pattern is valid");
}

fn validate_slug(slug: &str) -> Result<(), Rejection> {
    if slug.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Slug is required"));
    }
    if !SLUG_REGEX.is_match(slug) {
        return Err(reject_with(
            StatusCode::BAD_REQUEST,
            "Invalid slug",
            "Slug must contain only lowercase letters, numbers, and hyphens",
        ));
    }
    Ok(())
}

fn generate_draft_slug() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8).to_lowercase()
}

/// What to do with the stored blur placeholder on a settings save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaceholderAction {
    Keep,
    Clear,
    Recompute,
}

/// The page does not regenerate placeholders after swapping the thumbnail,
/// so a new image arriving with the previous token is stale.
fn placeholder_action(
    previous_image: Option<&str>,
    previous_placeholder: Option<&str>,
    image: &str,
    placeholder: &str,
) -> PlaceholderAction {
    if image.is_empty() {
        return PlaceholderAction::Clear;
    }
    if placeholder.is_empty() {
        return PlaceholderAction::Recompute;
    }
    let image_changed = previous_image != Some(image);
    if image_changed && previous_placeholder == Some(placeholder) {
        return PlaceholderAction::Recompute;
    }
    PlaceholderAction::Keep
}

async fn resolve_placeholder(existing: &Post, image: &str, placeholder: &str) -> Option<String> {
    match placeholder_action(
        existing.image.as_deref(),
        existing.image_blurhash.as_deref(),
        image,
        placeholder,
    ) {
        PlaceholderAction::Keep => Some(placeholder.to_string()),
        PlaceholderAction::Clear => None,
        PlaceholderAction::Recompute => match UPLOADS.local_file_for(image) {
            Some(path) => media::placeholder_for_file(&path).await,
            None => None,
        },
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

// ============================================================================
// Queries
// ============================================================================

async fn fetch_owned_post(
    pool: &PgPool,
    post_id: Uuid,
    owner: Uuid,
) -> Result<Option<PostWithSite>, sqlx::Error> {
    let row = sqlx::query_as::<_, PostWithSiteRow>(
        r#"
        SELECT p.id, p.title, p.description, p.content, p.slug, p.image, p.image_blurhash,
               p.published, p.site_id, p.created_at, p.updated_at,
               s.name AS site_name, s.subdomain AS site_subdomain,
               s.custom_domain AS site_custom_domain
        FROM posts p
        JOIN sites s ON s.id = p.site_id
        WHERE p.id = $1 AND s.user_id = $2
        "#,
    )
    .bind(post_id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(PostWithSite::from))
}

pub(crate) async fn fetch_owned_site(
    pool: &PgPool,
    site_id: Uuid,
    owner: Uuid,
) -> Result<Option<Site>, sqlx::Error> {
    sqlx::query_as::<_, Site>(
        r#"
        SELECT id, name, description, subdomain, custom_domain, user_id, created_at, updated_at
        FROM sites
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(site_id)
    .bind(owner)
    .fetch_optional(pool)
    .await
}

fn database_error(context: &str, e: sqlx::Error) -> Rejection {
    tracing::error!("Database error {}: {}", context, e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/post?postId= (settings) or ?siteId=[&published=] (listing)
pub async fn get_post(headers: HeaderMap, Query(query): Query<PostQuery>) -> impl IntoResponse {
    let result = match (query.post_id.as_deref(), query.site_id.as_deref()) {
        (Some(post_id), _) => get_post_settings(&headers, post_id).await,
        (None, Some(site_id)) => list_site_posts(&headers, site_id, query.published).await,
        (None, None) => Err(reject(StatusCode::BAD_REQUEST, "postId or siteId is required")),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

async fn get_post_settings(headers: &HeaderMap, raw_id: &str) -> Result<axum::response::Response, Rejection> {
    let owner = user_id(&require_user(headers)?)?;
    let post_id = parse_id(raw_id, "postId")?;
    let pool = require_pool()?;

    let post = load_settings(pool.as_ref(), owner, post_id).await?;
    Ok((StatusCode::OK, Json(post)).into_response())
}

/// The caller's post with its site; 404 when it is missing or not theirs.
async fn load_settings(pool: &PgPool, owner: Uuid, post_id: Uuid) -> Result<PostWithSite, Rejection> {
    match fetch_owned_post(pool, post_id, owner).await {
        Ok(Some(post)) => Ok(post),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "Not found")),
        Err(e) => Err(database_error("fetching post", e)),
    }
}

async fn list_site_posts(
    headers: &HeaderMap,
    raw_id: &str,
    published: Option<bool>,
) -> Result<axum::response::Response, Rejection> {
    let owner = user_id(&require_user(headers)?)?;
    let site_id = parse_id(raw_id, "siteId")?;
    let pool = require_pool()?;

    let site = match fetch_owned_site(pool.as_ref(), site_id, owner).await {
        Ok(Some(site)) => site,
        Ok(None) => return Err(reject(StatusCode::NOT_FOUND, "Not found")),
        Err(e) => return Err(database_error("fetching site", e)),
    };

    let posts = sqlx::query_as::<_, PostSummary>(
        r#"
        SELECT id, title, description, slug, image, image_blurhash, published, created_at, updated_at
        FROM posts
        WHERE site_id = $1 AND ($2::BOOLEAN IS NULL OR published = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(site_id)
    .bind(published)
    .fetch_all(pool.as_ref())
    .await
    .map_err(|e| database_error("listing posts", e))?;

    Ok((StatusCode::OK, Json(PostListResponse { site, posts })).into_response())
}

/// POST /api/post?siteId= - create an empty draft in a site
pub async fn create_post(headers: HeaderMap, Query(query): Query<PostQuery>) -> impl IntoResponse {
    create_draft(&headers, query.site_id.as_deref())
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn create_draft(headers: &HeaderMap, raw_id: Option<&str>) -> Result<axum::response::Response, Rejection> {
    let owner = user_id(&require_user(headers)?)?;
    let raw_id = raw_id.ok_or_else(|| reject(StatusCode::BAD_REQUEST, "siteId is required"))?;
    let site_id = parse_id(raw_id, "siteId")?;
    let pool = require_pool()?;

    let post_id = insert_draft(pool.as_ref(), owner, site_id).await?;
    Ok((StatusCode::CREATED, Json(CreatePostResponse { post_id })).into_response())
}

async fn insert_draft(pool: &PgPool, owner: Uuid, site_id: Uuid) -> Result<Uuid, Rejection> {
    match fetch_owned_site(pool, site_id, owner).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(reject(StatusCode::NOT_FOUND, "Not found")),
        Err(e) => return Err(database_error("fetching site", e)),
    }

    let (post_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO posts (slug, site_id, published, created_at, updated_at)
        VALUES ($1, $2, false, now(), now())
        RETURNING id
        "#,
    )
    .bind(generate_draft_slug())
    .bind(site_id)
    .fetch_one(pool)
    .await
    .map_err(|e| database_error("creating post", e))?;

    tracing::info!(post_id = %post_id, site_id = %site_id, "draft post created");
    Ok(post_id)
}

/// PUT /api/post - persist post settings
pub async fn update_post(headers: HeaderMap, Json(payload): Json<UpdatePostRequest>) -> impl IntoResponse {
    save_settings(&headers, payload)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn save_settings(
    headers: &HeaderMap,
    payload: UpdatePostRequest,
) -> Result<axum::response::Response, Rejection> {
    let owner = user_id(&require_user(headers)?)?;
    let post_id = parse_id(&payload.id, "id")?;
    validate_slug(&payload.slug)?;
    let pool = require_pool()?;

    let post = apply_settings(pool.as_ref(), owner, post_id, &payload).await?;
    Ok((StatusCode::OK, Json(post)).into_response())
}

/// Write validated settings to the caller's post.
async fn apply_settings(
    pool: &PgPool,
    owner: Uuid,
    post_id: Uuid,
    payload: &UpdatePostRequest,
) -> Result<Post, Rejection> {
    let existing = load_settings(pool, owner, post_id).await?;

    if let Some(site) = &existing.site {
        if payload.subdomain.is_some() && payload.subdomain != site.subdomain {
            tracing::warn!(
                post_id = %post_id,
                claimed = ?payload.subdomain,
                actual = ?site.subdomain,
                "settings save carried a different subdomain than the post's site"
            );
        }
    }

    let image = non_empty(&payload.image);
    let placeholder = match image {
        Some(image) => resolve_placeholder(&existing.post, image, &payload.image_blurhash).await,
        None => None,
    };

    let updated = sqlx::query_as::<_, Post>(
        r#"
        UPDATE posts
        SET slug = $1,
            image = $2,
            image_blurhash = $3,
            title = COALESCE($4, title),
            description = COALESCE($5, description),
            content = COALESCE($6, content),
            published = COALESCE($7, published),
            updated_at = now()
        WHERE id = $8
        RETURNING id, title, description, content, slug, image, image_blurhash,
                  published, site_id, created_at, updated_at
        "#,
    )
    .bind(&payload.slug)
    .bind(image)
    .bind(&placeholder)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.content)
    .bind(payload.published)
    .bind(post_id)
    .fetch_one(pool)
    .await;

    match updated {
        Ok(post) => {
            tracing::info!(
                post_id = %post.id,
                subdomain = ?payload.subdomain,
                custom_domain = ?payload.custom_domain,
                "post settings saved; tenant pages need revalidation"
            );
            Ok(post)
        }
        Err(e) if is_unique_violation(&e) => Err(reject(
            StatusCode::CONFLICT,
            "Slug already exists in this site",
        )),
        Err(e) => Err(database_error("updating post", e)),
    }
}

/// DELETE /api/post?postId= - remove a post
pub async fn delete_post(headers: HeaderMap, Query(query): Query<PostQuery>) -> impl IntoResponse {
    remove_post(&headers, query.post_id.as_deref())
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn remove_post(headers: &HeaderMap, raw_id: Option<&str>) -> Result<axum::response::Response, Rejection> {
    let owner = user_id(&require_user(headers)?)?;
    let raw_id = raw_id.ok_or_else(|| reject(StatusCode::BAD_REQUEST, "postId is required"))?;
    let post_id = parse_id(raw_id, "postId")?;
    let pool = require_pool()?;

    delete_owned_post(pool.as_ref(), owner, post_id).await?;
    Ok((StatusCode::OK, Json(SuccessResponse { success: true })).into_response())
}

async fn delete_owned_post(pool: &PgPool, owner: Uuid, post_id: Uuid) -> Result<(), Rejection> {
    let result = sqlx::query(
        r#"
        DELETE FROM posts p
        USING sites s
        WHERE p.id = $1 AND p.site_id = s.id AND s.user_id = $2
        "#,
    )
    .bind(post_id)
    .bind(owner)
    .execute(pool)
    .await
    .map_err(|e| database_error("deleting post", e))?;

    if result.rows_affected() == 0 {
        return Err(reject(StatusCode::NOT_FOUND, "Not found"));
    }

    tracing::info!(post_id = %post_id, "post deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::create_access_token;
    use crate::routes::ErrorResponse;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    const POST_ID: &str = "6f1c2a52-3b55-4c1e-9a53-0d7c8a2f1b11";

    fn post_router() -> Router {
        Router::new().route(
            "/api/post",
            get(get_post)
                .post(create_post)
                .put(update_post)
                .delete(delete_post),
        )
    }

    fn bearer() -> String {
        let token = create_access_token(&Uuid::new_v4().to_string(), "ada@example.com", Some("Ada"))
            .unwrap();
        format!("Bearer {}", token)
    }

    async fn send(req: Request<Body>) -> (StatusCode, ErrorResponse) {
        let res = post_router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn put(body: &UpdatePostRequest, auth: Option<String>) -> Request<Body> {
        let mut builder = Request::put("/api/post").header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn settings(slug: &str) -> UpdatePostRequest {
        UpdatePostRequest {
            id: POST_ID.to_string(),
            slug: slug.to_string(),
            image: String::new(),
            image_blurhash: String::new(),
            subdomain: Some("acme".to_string()),
            custom_domain: None,
            title: None,
            description: None,
            content: None,
            published: None,
        }
    }

    fn slug_error(slug: &str) -> String {
        let (_, Json(body)) = validate_slug(slug).unwrap_err();
        body.error
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("hello-world").is_ok());
        assert!(validate_slug("post-2").is_ok());
        assert_eq!(slug_error(""), "Slug is required");
        assert_eq!(slug_error("   "), "Slug is required");
        assert_eq!(slug_error("Hello World"), "Invalid slug");
        assert_eq!(slug_error("trailing-"), "Invalid slug");
    }

    #[test]
    fn test_generated_draft_slug_is_valid() {
        for _ in 0..32 {
            let slug = generate_draft_slug();
            assert_eq!(slug.len(), 8);
            assert!(validate_slug(&slug).is_ok(), "{slug}");
        }
    }

    #[test]
    fn test_placeholder_action() {
        use PlaceholderAction::*;
        // No image: nothing to preview.
        assert_eq!(placeholder_action(Some("a.png"), Some("h"), "", "h"), Clear);
        // Unchanged image keeps its token.
        assert_eq!(placeholder_action(Some("a.png"), Some("h"), "a.png", "h"), Keep);
        // Replaced image still carrying the old token is stale.
        assert_eq!(placeholder_action(Some("a.png"), Some("h"), "b.png", "h"), Recompute);
        // Replaced image with a fresh token from the uploader.
        assert_eq!(placeholder_action(Some("a.png"), Some("h"), "b.png", "h2"), Keep);
        // Missing token gets filled in.
        assert_eq!(placeholder_action(None, None, "b.png", ""), Recompute);
    }

    #[test]
    fn test_post_with_site_json_shape() {
        let now = Utc::now();
        let site_id = Uuid::new_v4();
        let row = PostWithSiteRow {
            id: Uuid::parse_str(POST_ID).unwrap(),
            title: Some("Hello".to_string()),
            description: None,
            content: None,
            slug: "hello".to_string(),
            image: None,
            image_blurhash: None,
            published: false,
            site_id: Some(site_id),
            created_at: now,
            updated_at: now,
            site_name: Some("Acme".to_string()),
            site_subdomain: Some("acme".to_string()),
            site_custom_domain: None,
        };
        let json = serde_json::to_value(PostWithSite::from(row)).unwrap();
        assert_eq!(json["id"], POST_ID);
        assert_eq!(json["slug"], "hello");
        assert!(json["imageBlurhash"].is_null());
        assert_eq!(json["site"]["id"], site_id.to_string());
        assert_eq!(json["site"]["subdomain"], "acme");
        assert!(json["site"]["customDomain"].is_null());
    }

    #[tokio::test]
    async fn test_get_requires_auth() {
        let req = Request::get(format!("/api/post?postId={}", POST_ID))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_without_ids_is_bad_request() {
        let req = Request::get("/api/post")
            .header("authorization", bearer())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "postId or siteId is required");
    }

    #[tokio::test]
    async fn test_get_with_malformed_id_is_bad_request() {
        let req = Request::get("/api/post?postId=42")
            .header("authorization", bearer())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_without_database_is_unavailable() {
        let req = Request::get(format!("/api/post?postId={}", POST_ID))
            .header("authorization", bearer())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_put_requires_auth() {
        let (status, _) = send(put(&settings("hello"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_put_empty_slug_is_rejected() {
        let (status, body) = send(put(&settings(""), Some(bearer()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Slug is required");
    }

    #[tokio::test]
    async fn test_put_invalid_slug_is_rejected() {
        let (status, body) = send(put(&settings("Hello World"), Some(bearer()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Invalid slug");
    }

    #[tokio::test]
    async fn test_put_valid_settings_without_database_is_unavailable() {
        let (status, _) = send(put(&settings("hello-world"), Some(bearer()))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_delete_requires_post_id() {
        let req = Request::delete("/api/post")
            .header("authorization", bearer())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "postId is required");
    }

    #[tokio::test]
    async fn test_create_requires_site_id() {
        let req = Request::post("/api/post")
            .header("authorization", bearer())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "siteId is required");
    }

    // ------------------------------------------------------------------
    // Database-backed: run only when DATABASE_URL points at a Postgres.
    // ------------------------------------------------------------------

    static SCHEMA: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

    async fn test_pool() -> Option<PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping database test");
            return None;
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("DATABASE_URL should accept connections");
        SCHEMA
            .get_or_init(|| async {
                crate::db::run_migrations(&pool).await.expect("migrations apply");
            })
            .await;
        Some(pool)
    }

    async fn insert_owner(pool: &PgPool) -> Uuid {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO users (email, password_hash) VALUES ($1, 'unused') RETURNING id",
        )
        .bind(format!("{}@example.com", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_site(pool: &PgPool, owner: Uuid) -> (Uuid, String) {
        let subdomain = format!("t{}", Uuid::new_v4().simple());
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO sites (name, subdomain, user_id) VALUES ('Acme', $1, $2) RETURNING id",
        )
        .bind(&subdomain)
        .bind(owner)
        .fetch_one(pool)
        .await
        .unwrap();
        (id, subdomain)
    }

    fn settings_for(post_id: Uuid, slug: &str) -> UpdatePostRequest {
        UpdatePostRequest {
            id: post_id.to_string(),
            ..settings(slug)
        }
    }

    fn status_of<T>(result: Result<T, Rejection>) -> Option<StatusCode> {
        result.err().map(|(status, _)| status)
    }

    #[tokio::test]
    async fn test_db_duplicate_slug_within_site_conflicts() {
        let Some(pool) = test_pool().await else { return };
        let owner = insert_owner(&pool).await;
        let (site_id, _) = insert_site(&pool, owner).await;
        let (other_site, _) = insert_site(&pool, owner).await;
        let first = insert_draft(&pool, owner, site_id).await.unwrap();
        let second = insert_draft(&pool, owner, site_id).await.unwrap();
        let elsewhere = insert_draft(&pool, owner, other_site).await.unwrap();

        let saved = apply_settings(&pool, owner, first, &settings_for(first, "hello")).await;
        assert_eq!(saved.ok().map(|post| post.slug), Some("hello".to_string()));

        let clash = apply_settings(&pool, owner, second, &settings_for(second, "hello")).await;
        assert_eq!(status_of(clash), Some(StatusCode::CONFLICT));

        let other = apply_settings(&pool, owner, elsewhere, &settings_for(elsewhere, "hello")).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_db_post_of_another_owner_is_not_found() {
        let Some(pool) = test_pool().await else { return };
        let owner = insert_owner(&pool).await;
        let stranger = insert_owner(&pool).await;
        let (site_id, _) = insert_site(&pool, owner).await;
        let post_id = insert_draft(&pool, owner, site_id).await.unwrap();

        assert_eq!(
            status_of(load_settings(&pool, stranger, post_id).await),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            status_of(apply_settings(&pool, stranger, post_id, &settings_for(post_id, "mine")).await),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            status_of(delete_owned_post(&pool, stranger, post_id).await),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            status_of(insert_draft(&pool, stranger, site_id).await),
            Some(StatusCode::NOT_FOUND)
        );
        assert!(load_settings(&pool, owner, post_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_db_settings_carry_joined_site() {
        let Some(pool) = test_pool().await else { return };
        let owner = insert_owner(&pool).await;
        let (site_id, subdomain) = insert_site(&pool, owner).await;
        let post_id = insert_draft(&pool, owner, site_id).await.unwrap();

        let Ok(loaded) = load_settings(&pool, owner, post_id).await else {
            panic!("owner should see their post");
        };
        let json = serde_json::to_value(&loaded).unwrap();
        assert_eq!(json["id"], post_id.to_string());
        assert_eq!(json["published"], false);
        assert_eq!(json["site"]["id"], site_id.to_string());
        assert_eq!(json["site"]["subdomain"], subdomain.as_str());
        assert!(json["site"]["customDomain"].is_null());
        assert!(validate_slug(json["slug"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_db_second_delete_is_not_found() {
        let Some(pool) = test_pool().await else { return };
        let owner = insert_owner(&pool).await;
        let (site_id, _) = insert_site(&pool, owner).await;
        let post_id = insert_draft(&pool, owner, site_id).await.unwrap();

        assert!(delete_owned_post(&pool, owner, post_id).await.is_ok());
        assert_eq!(
            status_of(delete_owned_post(&pool, owner, post_id).await),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            status_of(load_settings(&pool, owner, post_id).await),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn test_db_save_recomputes_placeholder_for_stored_upload() {
        let Some(pool) = test_pool().await else { return };
        let owner = insert_owner(&pool).await;
        let (site_id, _) = insert_site(&pool, owner).await;
        let post_id = insert_draft(&pool, owner, site_id).await.unwrap();

        tokio::fs::create_dir_all(&UPLOADS.dir).await.unwrap();
        let filename = format!("{}.png", Uuid::new_v4());
        let path = UPLOADS.dir.join(&filename);
        tokio::fs::write(&path, crate::media::tests::png_bytes(32, 16))
            .await
            .unwrap();

        let mut request = settings_for(post_id, "cover");
        request.image = UPLOADS.secure_url_for(&filename);
        let saved = apply_settings(&pool, owner, post_id, &request).await;
        let _ = tokio::fs::remove_file(&path).await;

        let Ok(post) = saved else {
            panic!("save should succeed");
        };
        assert_eq!(post.image.as_deref(), Some(request.image.as_str()));
        let placeholder = post.image_blurhash.unwrap_or_default();
        assert!(placeholder.starts_with("data:image/png;base64,"), "{placeholder}");

        // A foreign image has nothing to recompute from.
        let mut foreign = settings_for(post_id, "cover");
        foreign.image = "https://images.example.org/cover.png".to_string();
        foreign.image_blurhash = placeholder;
        let Ok(post) = apply_settings(&pool, owner, post_id, &foreign).await else {
            panic!("save should succeed");
        };
        assert_eq!(post.image_blurhash, None);
    }
}
