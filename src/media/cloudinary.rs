use super::{FilePart, MediaError, MediaStore, UploadedAsset};
use crate::config::MediaConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

/// PDFs are stored as images too, so uploads and destroys share one resource type
const RESOURCE_TYPE: &str = "image";

/// Client for the Cloudinary upload API
pub struct CloudinaryClient {
    http: reqwest::Client,
    config: MediaConfig,
}

#[derive(Deserialize)]
struct UploadBody {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    format: Option<String>,
    bytes: u64,
}

#[derive(Deserialize)]
struct DestroyBody {
    result: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Signature over the request parameters: sorted `k=v` pairs joined with `&`,
/// followed by the api secret, hashed with SHA-1.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl CloudinaryClient {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            resource_type,
            action
        )
    }

    async fn api_error(resp: reqwest::Response) -> MediaError {
        let status = resp.status().as_u16();
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => "no error detail".to_string(),
        };
        MediaError::Api { status, message }
    }
}

#[async_trait]
impl MediaStore for CloudinaryClient {
    async fn upload(&self, file: FilePart) -> Result<UploadedAsset, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[
                ("folder", self.config.folder.clone()),
                ("timestamp", timestamp.clone()),
            ],
            &self.config.api_secret,
        );

        let file_name = file.file_name.clone();
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.config.folder.clone())
            .text("signature", signature);

        debug!(file = %file_name, "Uploading file to media api");

        let resp = self
            .http
            .post(self.endpoint(RESOURCE_TYPE, "upload"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = Self::api_error(resp).await;
            warn!(error = %err, file = %file_name, "Media upload rejected");
            return Err(err);
        }

        let body: UploadBody = resp
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        Ok(UploadedAsset {
            url: body.secure_url,
            public_id: body.public_id,
            format: body.format.unwrap_or_default(),
            bytes: body.bytes,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[
                ("public_id", public_id.to_string()),
                ("timestamp", timestamp.clone()),
            ],
            &self.config.api_secret,
        );

        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
        ];

        let resp = self
            .http
            .post(self.endpoint(RESOURCE_TYPE, "destroy"))
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }

        let body: DestroyBody = resp
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(MediaError::NotFound(public_id.to_string())),
            other => Err(MediaError::InvalidResponse(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: String) -> CloudinaryClient {
        CloudinaryClient::new(MediaConfig {
            api_base: base,
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            folder: "hrm".into(),
        })
    }

    #[test]
    fn signature_sorts_parameters() {
        let a = sign(&[("timestamp", "1".into()), ("folder", "hrm".into())], "s");
        let b = sign(&[("folder", "hrm".into()), ("timestamp", "1".into())], "s");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn signature_matches_known_digest() {
        // sha1("public_id=sample&timestamp=1315060510abcd")
        let sig = sign(
            &[
                ("timestamp", "1315060510".into()),
                ("public_id", "sample".into()),
            ],
            "abcd",
        );
        assert_eq!(sig, "c3470533147774275dd37996cc4d0e68fd03cd4f");
    }

    #[actix_web::test]
    async fn pdf_uploads_use_the_image_resource_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1_1/demo/image/upload")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"secure_url":"https://cdn.test/hrm/cv.pdf","public_id":"hrm/cv","format":"pdf","bytes":1234}"#,
            )
            .create_async()
            .await;

        let asset = client(server.url())
            .upload(FilePart {
                file_name: "cv.pdf".into(),
                content_type: "application/pdf".into(),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(asset.url, "https://cdn.test/hrm/cv.pdf");
        assert_eq!(asset.public_id, "hrm/cv");
        assert_eq!(asset.format, "pdf");
        assert_eq!(asset.bytes, 1234);
    }

    #[actix_web::test]
    async fn upload_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1_1/demo/image/upload")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Invalid Signature"}}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .upload(FilePart {
                file_name: "a.png".into(),
                content_type: "image/png".into(),
                bytes: vec![0],
            })
            .await
            .unwrap_err();

        match err {
            MediaError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid Signature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn destroy_reports_missing_assets() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1_1/demo/image/destroy")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"not found"}"#)
            .create_async()
            .await;

        let err = client(server.url()).destroy("hrm/ghost").await.unwrap_err();
        assert!(matches!(err, MediaError::NotFound(id) if id == "hrm/ghost"));
    }

    #[actix_web::test]
    async fn destroy_accepts_ok_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1_1/demo/image/destroy")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"ok"}"#)
            .create_async()
            .await;

        assert!(client(server.url()).destroy("hrm/cv").await.is_ok());
    }
}
