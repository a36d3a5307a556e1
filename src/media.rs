//! Uploaded image storage and blur placeholders.

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use once_cell::sync::Lazy;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Longest edge of a placeholder image, in pixels.
const PLACEHOLDER_EDGE: u32 = 8;

/// Process-wide upload settings, read from the environment on first use.
pub static UPLOADS: Lazy<UploadConfig> = Lazy::new(UploadConfig::default);

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Where uploads live and how they are addressed publicly.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    /// Absolute origin used to build `secure_url`, e.g. `https://app.example.com`.
    pub public_base_url: String,
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string())
                .trim_end_matches('/')
                .to_string(),
            max_file_size: std::env::var("UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5 * 1024 * 1024),
        }
    }
}

impl UploadConfig {
    /// Public path for a stored file.
    pub fn path_for(&self, filename: &str) -> String {
        format!("/uploads/{}", filename)
    }

    pub fn secure_url_for(&self, filename: &str) -> String {
        format!("{}{}", self.public_base_url, self.path_for(filename))
    }

    /// Map an image URL back to a file this server stored, if it is one.
    pub fn local_file_for(&self, url: &str) -> Option<PathBuf> {
        let path = url.strip_prefix(&self.public_base_url).unwrap_or(url);
        let filename = path.strip_prefix("/uploads/")?;
        if !is_safe_filename(filename) {
            return None;
        }
        Some(self.dir.join(filename))
    }
}

/// Reject path traversal and separators.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

/// Sniff the image type from its leading bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Build a `data:image/png;base64,...` blur placeholder from encoded image bytes.
pub fn placeholder_data_url(bytes: &[u8]) -> Result<String, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let tiny = img.thumbnail(PLACEHOLDER_EDGE, PLACEHOLDER_EDGE);

    let mut png = Cursor::new(Vec::new());
    tiny.write_to(&mut png, ImageFormat::Png)?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png.into_inner())
    ))
}

/// Recompute the placeholder for a stored upload. `None` when the file is
/// not ours, missing, or not decodable.
pub async fn placeholder_for_file(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match tokio::task::spawn_blocking(move || placeholder_data_url(&bytes)).await {
        Ok(Ok(url)) => Some(url),
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "could not decode stored image");
            None
        }
        Err(e) => {
            tracing::error!("spawn_blocking panic during placeholder: {}", e);
            None
        }
    }
}
