/**
 * Site Routes
 * Read-only tenant lookup for the dashboard and site pages
 */
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::db::models::Site;
use crate::routes::post::fetch_owned_site;
use crate::routes::{parse_id, reject, require_pool, require_user, user_id, Rejection};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteQuery {
    pub site_id: Option<String>,
}

/// GET /api/site - every site of the caller, or one with ?siteId=
pub async fn get_site(headers: HeaderMap, Query(query): Query<SiteQuery>) -> impl IntoResponse {
    lookup(&headers, query.site_id.as_deref())
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn lookup(headers: &HeaderMap, raw_id: Option<&str>) -> Result<Response, Rejection> {
    let owner = user_id(&require_user(headers)?)?;
    let site_id = raw_id.map(|raw| parse_id(raw, "siteId")).transpose()?;
    let pool = require_pool()?;

    if let Some(site_id) = site_id {
        return match fetch_owned_site(pool.as_ref(), site_id, owner).await {
            Ok(Some(site)) => Ok((StatusCode::OK, Json(site)).into_response()),
            Ok(None) => Err(reject(StatusCode::NOT_FOUND, "Not found")),
            Err(e) => {
                tracing::error!("Database error fetching site: {}", e);
                Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error"))
            }
        };
    }

    match sqlx::query_as::<_, Site>(
        r#"
        SELECT id, name, description, subdomain, custom_domain, user_id, created_at, updated_at
        FROM sites
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(sites) => Ok((StatusCode::OK, Json(sites)).into_response()),
        Err(e) => {
            tracing::error!("Database error listing sites: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error"))
        }
    }
}
