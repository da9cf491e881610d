//! HTTP surface.
//!
//! A thin axum router over the lifecycle engine. Handlers translate requests
//! into engine calls, run them on the blocking pool (key derivation is CPU
//! bound and storage is synchronous), and render [`LifecycleError`] as
//! `{status, code, msg}` JSON.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{
        Extensions, HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use oneshare_core::{Document, Environment, ids::is_valid_document_id};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    lifecycle::{ErrorClass, Lifecycle, LifecycleError, UploadFile, UploadRequest},
    storage::{BlobStore, DocumentRepository},
};

/// Header carrying the original file name on a raw-body upload
pub const FILENAME_HEADER: &str = "x-filename";

/// Multipart field carrying uploaded files; repeat it for several files
pub const FILES_FIELD: &str = "files";

const DEFAULT_FILENAME: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_FILENAME_CHARS: usize = 255;

/// Headroom above the upload ceiling, so oversized bodies reach the engine
/// and get its error instead of a bare 413.
const BODY_LIMIT_HEADROOM: u64 = 64 * 1024;

/// Shared state for all handlers.
pub struct AppState<E, R, B> {
    /// Lifecycle engine
    pub engine: Arc<Lifecycle<E, R, B>>,
    /// Public URL prefix for share links, without trailing slash
    pub base_url: String,
}

/// Upload response.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Document id
    pub id: String,
    /// One-time passphrase
    pub key: String,
    /// Share link
    pub link: String,
}

/// Metadata shown before download.
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Document id
    pub id: String,
    /// Original file name
    pub filename: String,
    /// MIME type
    pub content_type: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Upload time (Unix seconds)
    pub uploaded_at: u64,
}

impl From<Document> for DocumentInfo {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            filename: document.filename,
            content_type: document.content_type,
            size: document.plaintext_size,
            uploaded_at: document.uploaded_at,
        }
    }
}

/// Download request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Passphrase from the upload response
    pub key: String,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code
    pub status: u16,
    /// Stable error code
    pub code: u16,
    /// Human-readable message
    pub msg: String,
}

/// Create the axum router.
pub fn router<E, R, B>(state: Arc<AppState<E, R, B>>) -> Router
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    let limit = state.engine.config().max_upload_bytes.saturating_add(BODY_LIMIT_HEADROOM);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_upload::<E, R, B>))
        .route("/documents/{id}", get(handle_check::<E, R, B>))
        .route("/documents/{id}/download", post(handle_download::<E, R, B>))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_upload<E, R, B>(
    State(state): State<Arc<AppState<E, R, B>>>,
    request: Request,
) -> Response
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    let requester = requester_address(request.headers(), request.extensions());
    let files = match read_upload(request).await {
        Ok(files) => files,
        Err(response) => return response,
    };

    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || {
        let fingerprint = engine.fingerprint(&requester);
        engine.upload(UploadRequest { fingerprint, files })
    })
    .await;

    match result {
        Ok(Ok(receipt)) => {
            let link = format!("{}/{}", state.base_url, receipt.id);
            let response = UploadResponse { id: receipt.id, key: receipt.passphrase, link };
            (StatusCode::CREATED, Json(response)).into_response()
        },
        Ok(Err(e)) => error_response(&e),
        Err(e) => internal_error(&e),
    }
}

/// Files in an upload request.
///
/// `multipart/form-data` bodies yield one file per [`FILES_FIELD`] part;
/// anything else is a single file named by [`FILENAME_HEADER`].
async fn read_upload(request: Request) -> Result<Vec<UploadFile>, Response> {
    let is_multipart = header_str(request.headers(), CONTENT_TYPE.as_str())
        .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/"));

    if !is_multipart {
        let headers = request.headers();
        let filename = sanitize_filename(header_filename(headers).as_deref());
        let content_type = content_type_or_default(header_str(headers, CONTENT_TYPE.as_str()));
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| upload_rejection(e.status(), &e.body_text()))?;
        return Ok(vec![UploadFile::new(filename, content_type, body.to_vec())]);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| upload_rejection(e.status(), &e.body_text()))?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_rejection(e.status(), &e.body_text()))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = sanitize_filename(field.file_name());
        let content_type = content_type_or_default(field.content_type());
        let bytes = field.bytes().await.map_err(|e| upload_rejection(e.status(), &e.body_text()))?;
        files.push(UploadFile::new(filename, content_type, bytes.to_vec()));
    }

    Ok(files)
}

async fn handle_check<E, R, B>(
    State(state): State<Arc<AppState<E, R, B>>>,
    Path(id): Path<String>,
) -> Response
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    if !is_valid_document_id(&id) {
        return error_response(&LifecycleError::NotFound);
    }

    let engine = Arc::clone(&state.engine);
    match tokio::task::spawn_blocking(move || engine.check(&id)).await {
        Ok(Ok(document)) => Json(DocumentInfo::from(document)).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => internal_error(&e),
    }
}

async fn handle_download<E, R, B>(
    State(state): State<Arc<AppState<E, R, B>>>,
    Path(id): Path<String>,
    Json(request): Json<DownloadRequest>,
) -> Response
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    if !is_valid_document_id(&id) {
        return error_response(&LifecycleError::NotFound);
    }

    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || engine.retrieve(&id, &request.key)).await;

    match result {
        Ok(Ok(retrieved)) => {
            let document = retrieved.document;
            let mut headers = HeaderMap::new();
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_str(&document.content_type)
                    .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
            );
            headers.insert(
                CONTENT_DISPOSITION,
                HeaderValue::from_str(&format!(
                    "attachment; filename=\"{}\"",
                    sanitize_filename(Some(&document.filename))
                ))
                .unwrap_or(HeaderValue::from_static("attachment")),
            );
            (StatusCode::OK, headers, retrieved.plaintext).into_response()
        },
        Ok(Err(e)) => error_response(&e),
        Err(e) => internal_error(&e),
    }
}

/// HTTP status for an engine error.
pub fn status_for(err: &LifecycleError) -> StatusCode {
    match err.class() {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Terminal => StatusCode::GONE,
        ErrorClass::WrongPassphrase => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Body that could not be read as an upload.
///
/// Oversized bodies keep their 413; everything else is the engine's
/// "can't get file" validation error.
fn upload_rejection(status: StatusCode, detail: &str) -> Response {
    let err = LifecycleError::Bundle(detail.to_string());
    let status = if status == StatusCode::PAYLOAD_TOO_LARGE { status } else { status_for(&err) };
    let body = ErrorBody { status: status.as_u16(), code: err.code(), msg: err.public_message() };
    (status, Json(body)).into_response()
}

fn error_response(err: &LifecycleError) -> Response {
    let status = status_for(err);
    let body = ErrorBody { status: status.as_u16(), code: err.code(), msg: err.public_message() };
    (status, Json(body)).into_response()
}

fn internal_error(err: &tokio::task::JoinError) -> Response {
    error!(error = %err, "engine task failed");
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let body =
        ErrorBody { status: status.as_u16(), code: 1030, msg: "can't process file".to_string() };
    (status, Json(body)).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// File name header, decoded as UTF-8 so non-ASCII names survive.
fn header_filename(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FILENAME_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

fn content_type_or_default(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Network identity of the requester.
///
/// Proxy headers win over the socket peer, matching a deployment behind a
/// reverse proxy.
fn requester_address(headers: &HeaderMap, extensions: &Extensions) -> String {
    let real_ip = header_str(headers, "x-real-ip").map(str::trim);
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim);

    if let Some(proxied) = real_ip.into_iter().chain(forwarded).find(|ip| !ip.is_empty()) {
        return proxied.to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// File name safe to echo in a `Content-Disposition` header.
///
/// Drops any directory part, quotes and control characters, and caps the
/// length.
fn sanitize_filename(raw: Option<&str>) -> String {
    let raw = raw.unwrap_or_default();
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .take(MAX_FILENAME_CHARS)
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_sanitizing() {
        assert_eq!(sanitize_filename(None), "file");
        assert_eq!(sanitize_filename(Some("")), "file");
        assert_eq!(sanitize_filename(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_filename(Some("C:\\Users\\a\\report.pdf")), "report.pdf");
        assert_eq!(sanitize_filename(Some("a\"b\r\n.txt")), "ab.txt");
        assert_eq!(sanitize_filename(Some("dir/")), "file");
        assert_eq!(sanitize_filename(Some(&"x".repeat(400))).chars().count(), 255);
    }

    #[test]
    fn filename_header_keeps_non_ascii() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_filename(&headers), None);

        headers.insert(
            FILENAME_HEADER,
            HeaderValue::from_bytes("résumé.pdf".as_bytes()).unwrap(),
        );
        assert_eq!(header_filename(&headers).as_deref(), Some("résumé.pdf"));
        assert_eq!(sanitize_filename(header_filename(&headers).as_deref()), "résumé.pdf");
    }

    #[test]
    fn content_type_defaults() {
        assert_eq!(content_type_or_default(None), "application/octet-stream");
        assert_eq!(content_type_or_default(Some("  ")), "application/octet-stream");
        assert_eq!(content_type_or_default(Some("text/plain")), "text/plain");
    }

    #[test]
    fn requester_prefers_proxy_headers() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 5000))));

        let mut headers = HeaderMap::new();
        assert_eq!(requester_address(&headers, &extensions), "10.0.0.1");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.2"));
        assert_eq!(requester_address(&headers, &extensions), "203.0.113.9");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(requester_address(&headers, &extensions), "198.51.100.7");

        assert_eq!(requester_address(&HeaderMap::new(), &Extensions::new()), "unknown");
    }

    #[test]
    fn status_classes() {
        assert_eq!(status_for(&LifecycleError::NoPayload), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&LifecycleError::Expired), StatusCode::GONE);
        assert_eq!(
            status_for(&LifecycleError::WrongPassphrase { remaining: 1 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&LifecycleError::RateLimited { limit: 5, window_secs: 3600 }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
