//! HTTP collaborators of the dashboard pages.
//!
//! The views only see the [`PostApi`] and [`SessionApi`] traits; [`HttpClient`]
//! implements both against this server's `/api` routes.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::routes::auth::Session;
use crate::routes::post::UpdatePostRequest;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),
}

/// Parent site fields of a loaded post.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSite {
    pub id: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

/// `GET /api/post?postId=` as the settings page reads it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadedPost {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_blurhash: Option<String>,
    #[serde(default)]
    pub site: Option<LoadedSite>,
}

/// Result of a settings save that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    pub status: StatusCode,
    /// Placeholder the server stored, when the response carried one.
    pub image_blurhash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedPost {
    #[serde(default)]
    image_blurhash: Option<String>,
}

#[async_trait]
pub trait PostApi: Send + Sync {
    /// Load settings; any non-2xx status is an error.
    async fn fetch_settings(&self, post_id: &str) -> Result<LoadedPost, ClientError>;

    async fn update_settings(&self, request: &UpdatePostRequest) -> Result<SaveReceipt, ClientError>;

    async fn delete_post(&self, post_id: &str) -> Result<StatusCode, ClientError>;
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Current session, `None` when signed out.
    async fn session(&self) -> Result<Option<Session>, ClientError>;

    async fn sign_out(&self) -> Result<(), ClientError>;
}

/// Programmatic navigation.
pub trait Navigator {
    fn navigate(&mut self, path: &str);
}

/// Toast notifications.
pub trait Notifier {
    fn success(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Domain tenant subdomains hang off, e.g. `acme.<root_domain>`.
    pub root_domain: String,
    pub access_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            root_domain: std::env::var("ROOT_DOMAIN")
                .unwrap_or_else(|_| "startblogging.xyz".to_string()),
            access_token: std::env::var("API_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

/// reqwest-backed implementation of the page collaborators.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl PostApi for HttpClient {
    async fn fetch_settings(&self, post_id: &str) -> Result<LoadedPost, ClientError> {
        let response = self
            .authorized(self.http.get(self.url("/api/post")))
            .query(&[("postId", post_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn update_settings(&self, request: &UpdatePostRequest) -> Result<SaveReceipt, ClientError> {
        let response = self
            .authorized(self.http.put(self.url("/api/post")))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let image_blurhash = if status.is_success() {
            response
                .json::<SavedPost>()
                .await
                .ok()
                .and_then(|saved| saved.image_blurhash)
        } else {
            None
        };
        Ok(SaveReceipt {
            status,
            image_blurhash,
        })
    }

    async fn delete_post(&self, post_id: &str) -> Result<StatusCode, ClientError> {
        let response = self
            .authorized(self.http.delete(self.url("/api/post")))
            .query(&[("postId", post_id)])
            .send()
            .await?;
        Ok(response.status())
    }
}

#[async_trait]
impl SessionApi for HttpClient {
    async fn session(&self) -> Result<Option<Session>, ClientError> {
        let response = self
            .authorized(self.http.get(self.url("/api/auth/session")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        let response = self
            .authorized(self.http.post(self.url("/api/auth/logout")))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(())
    }
}
