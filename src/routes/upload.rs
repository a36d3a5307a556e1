/**
 * Upload Routes
 * Thumbnail image upload; the response carries `secure_url` for the
 * settings page's upload completion callback.
 */
use axum::{
    extract::Multipart,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::{self, UploadConfig, ALLOWED_EXTENSIONS, UPLOADS};
use crate::routes::{reject, require_user, Rejection};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(rename = "secure_url")]
    pub secure_url: String,
    pub url: String,
    pub filename: String,
    pub size: usize,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_data_url: Option<String>,
}

/// Validate an uploaded file and work out its stored name and type.
fn check_upload(
    config: &UploadConfig,
    original_name: &str,
    bytes: &[u8],
) -> Result<(String, &'static str), Rejection> {
    // A bare "png" has no extension; the name needs a stem before the dot.
    let original_ext = original_name
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.",
        ));
    }

    if bytes.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Empty file"));
    }

    if bytes.len() > config.max_file_size {
        return Err(reject(StatusCode::PAYLOAD_TOO_LARGE, "File too large"));
    }

    let mime_type = media::sniff_image_mime(bytes).ok_or_else(|| {
        reject(
            StatusCode::BAD_REQUEST,
            "File content does not match an allowed image type.",
        )
    })?;

    let filename = format!("{}.{}", Uuid::new_v4(), media::extension_for_mime(mime_type));
    Ok((filename, mime_type))
}

/// POST /api/upload - store an image and return its public URL and placeholder
pub async fn upload_image(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    let claims = match require_user(&headers) {
        Ok(c) => c,
        Err(rejection) => return rejection.into_response(),
    };

    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return reject(StatusCode::BAD_REQUEST, "No file provided").into_response(),
        Err(e) => {
            tracing::warn!("Multipart error: {}", e);
            return reject(StatusCode::BAD_REQUEST, "Invalid multipart data").into_response();
        }
    };

    let original_name = field.file_name().unwrap_or("unknown").to_string();

    let bytes = match field.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Failed to read upload bytes: {}", e);
            return reject(StatusCode::BAD_REQUEST, "Failed to read file data").into_response();
        }
    };

    let config: &UploadConfig = &UPLOADS;

    let (filename, mime_type) = match check_upload(config, &original_name, &bytes) {
        Ok(checked) => checked,
        Err(rejection) => return rejection.into_response(),
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.dir).await {
        tracing::error!("Failed to create upload directory: {}", e);
        return reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to initialize upload directory",
        )
        .into_response();
    }

    let file_path = config.dir.join(&filename);
    if let Err(e) = tokio::fs::write(&file_path, &bytes).await {
        tracing::error!("Failed to write upload file: {}", e);
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file").into_response();
    }

    // A sniffed header does not guarantee a decodable body; the upload
    // still succeeds and the placeholder is filled in on save.
    let blur_data_url = media::placeholder_for_file(&file_path).await;

    tracing::info!(
        user_id = %claims.sub,
        filename = %filename,
        size = bytes.len(),
        "image uploaded"
    );

    (
        StatusCode::CREATED,
        Json(UploadResponse {
            secure_url: config.secure_url_for(&filename),
            url: config.path_for(&filename),
            filename,
            size: bytes.len(),
            mime_type: mime_type.to_string(),
            blur_data_url,
        }),
    )
        .into_response()
}
