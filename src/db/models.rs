//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Site (tenant) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub slug: String,
    pub image: Option<String>,
    pub image_blurhash: Option<String>,
    pub published: bool,
    pub site_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parent site fields carried alongside a post
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostSite {
    pub id: Uuid,
    pub name: Option<String>,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
}

/// Post joined with its parent site, as returned by `GET /api/post?postId=`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostWithSite {
    #[serde(flatten)]
    pub post: Post,
    pub site: Option<PostSite>,
}
