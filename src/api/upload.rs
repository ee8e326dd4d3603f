use crate::{
    api::done,
    auth::user::AuthUser,
    config::{Config, UploadLimits},
    error::{AppError, AppResult},
    media::{FilePart, MediaHandle, UploadedAsset, check_file, size_label},
};
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{HttpResponse, web};
use futures::future::try_join_all;
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct DeleteUpload {
    #[serde(rename = "publicId")]
    #[schema(example = "hrm/avatar")]
    pub public_id: String,
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::bad_request(format!("Invalid multipart body: {e}"))
}

/// Buffers one file field, failing as soon as it grows past the limit
async fn read_field(mut field: Field, limits: &UploadLimits) -> AppResult<FilePart> {
    let file_name = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string();

    let content_type = field
        .content_type()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > limits.max_file_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "{file_name}: file exceeds the {} limit",
                size_label(limits.max_file_bytes)
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(FilePart {
        file_name,
        content_type,
        bytes,
    })
}

/// Collects the files sent under `field_name`, in request order. Other fields
/// are drained and ignored.
async fn read_files(
    mut payload: Multipart,
    field_name: &str,
    limits: &UploadLimits,
) -> AppResult<Vec<FilePart>> {
    let mut files = Vec::new();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            while field.try_next().await.map_err(multipart_error)?.is_some() {}
            continue;
        }

        if files.len() == limits.max_files {
            return Err(AppError::bad_request(format!(
                "At most {} files can be uploaded at once",
                limits.max_files
            )));
        }

        let file = read_field(field, limits).await?;
        check_file(&file, limits)?;
        files.push(file);
    }

    Ok(files)
}

#[utoipa::path(
    post,
    path = "/api/upload/single",
    request_body(content = String, content_type = "multipart/form-data", description = "Form field `file`: one image or PDF"),
    responses(
        (status = 200, description = "File uploaded", body = Object, example = json!({
            "success": true,
            "message": "File uploaded successfully",
            "data": {
                "url": "https://res.cloudinary.com/demo/image/upload/v1/hrm/avatar.png",
                "publicId": "hrm/avatar",
                "format": "png",
                "bytes": 48213
            }
        })),
        (status = 400, description = "No file in field `file`"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Only images and PDF files are allowed"),
        (status = 503, description = "File storage is not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn upload_single(
    _auth: AuthUser,
    media: web::Data<MediaHandle>,
    config: web::Data<Config>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let store = media.store()?;

    let mut files = read_files(payload, "file", &config.upload).await?;
    if files.len() != 1 {
        return Err(AppError::bad_request("Exactly one file is expected in field 'file'"));
    }
    let file = files.remove(0);

    debug!(file_name = %file.file_name, bytes = file.bytes.len(), "Uploading file");
    let asset = store.upload(file).await?;
    info!(public_id = %asset.public_id, bytes = asset.bytes, "File uploaded");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "File uploaded successfully",
        "data": asset
    })))
}

/// Uploads run concurrently; one failure fails the whole request
#[utoipa::path(
    post,
    path = "/api/upload/multiple",
    request_body(content = String, content_type = "multipart/form-data", description = "Form field `files`: up to 10 images or PDFs"),
    responses(
        (status = 200, description = "Files uploaded, in request order", body = [UploadedAsset]),
        (status = 400, description = "No files, or too many files"),
        (status = 413, description = "A file is too large"),
        (status = 415, description = "Only images and PDF files are allowed"),
        (status = 503, description = "File storage is not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn upload_multiple(
    _auth: AuthUser,
    media: web::Data<MediaHandle>,
    config: web::Data<Config>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let store = media.store()?;

    let files = read_files(payload, "files", &config.upload).await?;
    if files.is_empty() {
        return Err(AppError::bad_request("No files found in field 'files'"));
    }

    let count = files.len();
    let assets: Vec<UploadedAsset> =
        try_join_all(files.into_iter().map(|file| store.upload(file))).await?;
    info!(count, "Files uploaded");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("{count} files uploaded successfully"),
        "data": assets
    })))
}

#[utoipa::path(
    delete,
    path = "/api/upload",
    request_body = DeleteUpload,
    responses(
        (status = 200, description = "File deleted", body = Object, example = json!({
            "success": true,
            "message": "File deleted successfully"
        })),
        (status = 404, description = "No file stored under this publicId", body = Object, example = json!({
            "success": false,
            "message": "Asset not found: hrm/missing"
        })),
        (status = 503, description = "File storage is not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn delete_upload(
    _auth: AuthUser,
    media: web::Data<MediaHandle>,
    payload: web::Json<DeleteUpload>,
) -> AppResult<HttpResponse> {
    let store = media.store()?;

    let public_id = payload.public_id.trim();
    if public_id.is_empty() {
        return Err(AppError::bad_request("publicId is required"));
    }

    store.destroy(public_id).await?;
    info!(public_id, "File deleted");

    Ok(done("File deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token};
    use crate::media::{MediaStore, fake::InMemoryMediaStore};
    use actix_web::{App, dev::ServiceResponse, test};
    use serde_json::Value;
    use std::sync::Arc;

    const BOUNDARY: &str = "----hrm-test-boundary";

    struct Part<'a> {
        field: &'a str,
        file_name: &'a str,
        mime: &'a str,
        bytes: Vec<u8>,
    }

    fn part<'a>(field: &'a str, file_name: &'a str, mime: &'a str, len: usize) -> Part<'a> {
        Part {
            field,
            file_name,
            mime,
            bytes: vec![b'x'; len],
        }
    }

    fn multipart_body(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for p in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    p.field, p.file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", p.mime).as_bytes());
            body.extend_from_slice(&p.bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn token(config: &Config) -> String {
        let subject = Subject {
            user_id: 1,
            username: "hr.lead".into(),
            role: 2,
            employee_id: Some(1),
        };
        generate_access_token(&subject, &config.jwt_secret, 60).unwrap()
    }

    fn test_config() -> Config {
        let mut config = Config::for_tests();
        config.upload = UploadLimits {
            max_file_bytes: 1024,
            max_files: 3,
        };
        config
    }

    async fn send(
        media: MediaHandle,
        method: &str,
        uri: &str,
        parts: &[Part<'_>],
    ) -> ServiceResponse {
        let config = test_config();
        let bearer = format!("Bearer {}", token(&config));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(media))
                .route("/upload/single", web::post().to(upload_single))
                .route("/upload/multiple", web::post().to(upload_multiple))
                .route("/upload", web::delete().to(delete_upload)),
        )
        .await;

        let req = match method {
            "DELETE" => test::TestRequest::delete()
                .uri(uri)
                .insert_header(("Authorization", bearer))
                .set_json(json!({ "publicId": parts.first().map_or("", |p| p.file_name) })),
            _ => test::TestRequest::post()
                .uri(uri)
                .insert_header(("Authorization", bearer))
                .insert_header((
                    "Content-Type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                ))
                .set_payload(multipart_body(parts)),
        };

        test::call_service(&app, req.to_request()).await
    }

    async fn json_body(resp: ServiceResponse) -> Value {
        test::read_body_json(resp).await
    }

    fn store() -> (Arc<InMemoryMediaStore>, MediaHandle) {
        let store = Arc::new(InMemoryMediaStore::default());
        let handle = MediaHandle::new(store.clone());
        (store, handle)
    }

    #[actix_web::test]
    async fn single_upload_returns_asset() {
        let (store, media) = store();

        let resp = send(
            media,
            "POST",
            "/upload/single",
            &[part("file", "avatar.png", "image/png", 64)],
        )
        .await;

        assert_eq!(resp.status(), 200);
        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["publicId"], "hrm/avatar");
        assert_eq!(body["data"]["format"], "png");
        assert_eq!(body["data"]["bytes"], 64);
        assert_eq!(store.len(), 1);
    }

    #[actix_web::test]
    async fn rejects_unsupported_mime_type() {
        let (store, media) = store();

        let resp = send(
            media,
            "POST",
            "/upload/single",
            &[part("file", "run.sh", "application/x-sh", 10)],
        )
        .await;

        assert_eq!(resp.status(), 415);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn rejects_oversized_file() {
        let (store, media) = store();

        let resp = send(
            media,
            "POST",
            "/upload/single",
            &[part("file", "huge.pdf", "application/pdf", 1025)],
        )
        .await;

        assert_eq!(resp.status(), 413);
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn multiple_upload_keeps_request_order() {
        let (store, media) = store();
        let parts = [
            part("files", "c.png", "image/png", 3),
            part("files", "a.pdf", "application/pdf", 1),
            part("files", "b.jpg", "image/jpeg", 2),
        ];

        let resp = send(media, "POST", "/upload/multiple", &parts).await;

        assert_eq!(resp.status(), 200);
        let body = json_body(resp).await;
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["publicId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["hrm/c", "hrm/a", "hrm/b"]);
        assert_eq!(store.len(), 3);
    }

    #[actix_web::test]
    async fn multiple_upload_fails_as_a_whole() {
        let (_, media) = store();
        let parts = [
            part("files", "ok.png", "image/png", 3),
            part("files", "reject.png", "image/png", 3),
        ];

        let resp = send(media, "POST", "/upload/multiple", &parts).await;

        assert_eq!(resp.status(), 502);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[actix_web::test]
    async fn too_many_files_are_rejected() {
        let (store, media) = store();
        let parts: Vec<Part> = (0..4).map(|_| part("files", "x.png", "image/png", 1)).collect();

        let resp = send(media, "POST", "/upload/multiple", &parts).await;

        assert_eq!(resp.status(), 400);
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn deleting_unknown_asset_is_not_found() {
        let (_, media) = store();

        let resp = send(media, "DELETE", "/upload", &[part("", "hrm/missing", "", 0)]).await;

        assert_eq!(resp.status(), 404);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Asset not found: hrm/missing");
    }

    #[actix_web::test]
    async fn deleting_uploaded_asset_succeeds() {
        let (store, media) = store();
        store
            .upload(FilePart {
                file_name: "cv.pdf".into(),
                content_type: "application/pdf".into(),
                bytes: vec![1; 4],
            })
            .await
            .unwrap();

        let resp = send(media, "DELETE", "/upload", &[part("", "hrm/cv", "", 0)]).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn disabled_storage_is_unavailable() {
        let resp = send(
            MediaHandle::disabled(),
            "POST",
            "/upload/single",
            &[part("file", "avatar.png", "image/png", 8)],
        )
        .await;

        assert_eq!(resp.status(), 503);
    }
}
