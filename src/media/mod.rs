//! Hosted media storage used by the upload endpoints and employee documents.

pub mod cloudinary;

use crate::{config::UploadLimits, error::AppError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

pub use cloudinary::CloudinaryClient;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("media api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("unexpected media api response: {0}")]
    InvalidResponse(String),
}

/// A file received from a multipart request, fully buffered
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "url": "https://res.cloudinary.com/demo/image/upload/v1/hrm/avatar.png",
    "publicId": "hrm/avatar",
    "format": "png",
    "bytes": 48213
}))]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
    pub format: String,
    pub bytes: u64,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, file: FilePart) -> Result<UploadedAsset, MediaError>;

    /// Fails with `MediaError::NotFound` when nothing was stored under `public_id`
    async fn destroy(&self, public_id: &str) -> Result<(), MediaError>;
}

/// Media store shared through app data; `None` when credentials are missing
#[derive(Clone, Default)]
pub struct MediaHandle(Option<Arc<dyn MediaStore>>);

impl MediaHandle {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self(Some(store))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn store(&self) -> Result<&dyn MediaStore, AppError> {
        self.0
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("File storage is not configured".into()))
    }
}

/// Human readable size limit, whole megabytes when possible
pub fn size_label(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Accepts images and PDFs up to the configured size
pub fn check_file(file: &FilePart, limits: &UploadLimits) -> Result<(), AppError> {
    let mime = file.content_type.to_ascii_lowercase();
    let allowed = mime.starts_with("image/") || mime == "application/pdf";

    if !allowed {
        return Err(AppError::UnsupportedMedia(format!(
            "{}: only images and PDF files are allowed",
            file.file_name
        )));
    }

    if file.bytes.is_empty() {
        return Err(AppError::bad_request(format!("{}: file is empty", file.file_name)));
    }

    if file.bytes.len() > limits.max_file_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "{}: file exceeds the {} limit",
            file.file_name,
            size_label(limits.max_file_bytes)
        )));
    }

    Ok(())
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Keeps uploads in memory, keyed by public id
    #[derive(Default)]
    pub struct InMemoryMediaStore {
        assets: Mutex<HashMap<String, UploadedAsset>>,
    }

    impl InMemoryMediaStore {
        pub fn len(&self) -> usize {
            self.assets.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MediaStore for InMemoryMediaStore {
        async fn upload(&self, file: FilePart) -> Result<UploadedAsset, MediaError> {
            if file.file_name.contains("reject") {
                return Err(MediaError::Api {
                    status: 400,
                    message: "rejected by test store".into(),
                });
            }

            let stem = file.file_name.rsplit_once('.').map_or(file.file_name.as_str(), |(s, _)| s);
            let format = file.file_name.rsplit_once('.').map_or("bin", |(_, e)| e);
            let public_id = format!("hrm/{stem}");
            let asset = UploadedAsset {
                url: format!("https://media.test/{public_id}.{format}"),
                public_id: public_id.clone(),
                format: format.to_string(),
                bytes: file.bytes.len() as u64,
            };
            self.assets.lock().unwrap().insert(public_id, asset.clone());
            Ok(asset)
        }

        async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
            match self.assets.lock().unwrap().remove(public_id) {
                Some(_) => Ok(()),
                None => Err(MediaError::NotFound(public_id.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, mime: &str, len: usize) -> FilePart {
        FilePart {
            file_name: name.into(),
            content_type: mime.into(),
            bytes: vec![7; len],
        }
    }

    #[test]
    fn accepts_images_and_pdf() {
        let limits = UploadLimits::default();
        assert!(check_file(&part("a.png", "image/png", 10), &limits).is_ok());
        assert!(check_file(&part("b.jpg", "IMAGE/JPEG", 10), &limits).is_ok());
        assert!(check_file(&part("c.pdf", "application/pdf", 10), &limits).is_ok());
    }

    #[test]
    fn rejects_other_mime_types() {
        let limits = UploadLimits::default();
        let err = check_file(&part("run.sh", "application/x-sh", 10), &limits).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMedia(_)));

        let err = check_file(&part("notes.txt", "text/plain", 10), &limits).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMedia(_)));
    }

    #[test]
    fn size_labels() {
        assert_eq!(size_label(10 * 1024 * 1024), "10 MB");
        assert_eq!(size_label(1024), "1024 bytes");
    }

    #[test]
    fn rejects_files_over_the_limit() {
        let limits = UploadLimits::default();
        let exact = part("big.png", "image/png", limits.max_file_bytes);
        assert!(check_file(&exact, &limits).is_ok());

        let over = part("bigger.png", "image/png", limits.max_file_bytes + 1);
        assert!(matches!(
            check_file(&over, &limits),
            Err(AppError::PayloadTooLarge(_))
        ));
    }
}
