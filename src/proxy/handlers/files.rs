// Upload store and file serving for the web frontend
use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::path::{Path as FsPath, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};

use crate::error::ProxyError;
use crate::proxy::middleware::auth::{query_param, AccessGate, ACCESS_CODE_PARAM};
use crate::proxy::server::AppState;

/// Route prefix under which stored files are served
pub const FILES_PREFIX: &str = "/files/";

/// Longest extension kept on a stored name
const MAX_EXTENSION_LEN: usize = 9;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub stored: String,
}

/// Flat directory of uploaded files
pub struct FileStore {
    dir: PathBuf,
    max_upload_bytes: u64,
    gate: AccessGate,
}

impl FileStore {
    pub fn new(dir: PathBuf, max_upload_bytes: u64, gate: AccessGate) -> Self {
        Self {
            dir,
            max_upload_bytes,
            gate,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Store the first `file` part of a multipart upload
    pub async fn upload(&self, request: Request) -> Result<UploadResponse, ProxyError> {
        if request.method() != Method::POST {
            return Err(ProxyError::MethodNotAllowed);
        }

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            error!("Failed to create upload directory {:?}: {}", self.dir, e);
            ProxyError::Internal
        })?;

        let headers = request.headers().clone();
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| invalid_multipart())?;

        while let Some(mut field) = multipart.next_field().await.map_err(|_| invalid_multipart())? {
            let original = match (field.name(), field.file_name()) {
                (Some("file"), Some(name)) if !name.is_empty() => name.to_string(),
                _ => continue,
            };

            let stored = stored_name(&original);
            let path = self.dir.join(&stored);
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map_err(|e| {
                    error!("Failed to create {:?}: {}", path, e);
                    ProxyError::Internal
                })?;

            let mut written: u64 = 0;
            let copied: Result<(), String> = async {
                while let Some(chunk) = field.chunk().await.map_err(|e| e.to_string())? {
                    file.write_all(&chunk).await.map_err(|e| e.to_string())?;
                    written += chunk.len() as u64;
                }
                file.flush().await.map_err(|e| e.to_string())
            }
            .await;
            drop(file);

            if let Err(e) = copied {
                warn!("Upload of {:?} failed: {}", original, e);
                let _ = fs::remove_file(&path).await;
                return Err(ProxyError::BadRequest("upload failed".to_string()));
            }

            info!("Stored upload {:?} as {} ({} bytes)", original, stored, written);
            return Ok(UploadResponse {
                url: public_url(&headers, &format!("{}{}", FILES_PREFIX, stored)),
                filename: original,
                stored,
            });
        }

        Err(ProxyError::BadRequest("missing file".to_string()))
    }

    /// Serve a stored file.
    ///
    /// Reads are public so `<img>` tags work. An access code is only
    /// enforced when one is configured *and* the query carries one;
    /// leaving it off the query skips the check entirely.
    pub async fn serve(&self, name: &str, request: Request) -> Result<Response, ProxyError> {
        if !is_flat_name(name) {
            return Err(ProxyError::NotFound);
        }

        let query = request.uri().query();
        let code_in_query =
            query_param(query, ACCESS_CODE_PARAM).is_some_and(|c| !c.trim().is_empty());
        if !self.gate.is_open() && code_in_query && !self.gate.check(request.headers(), query) {
            return Err(ProxyError::Unauthorized);
        }

        let response = ServeFile::new(self.dir.join(name))
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});
        Ok(response.map(Body::new))
    }
}

fn invalid_multipart() -> ProxyError {
    ProxyError::BadRequest("invalid multipart".to_string())
}

/// Only plain names inside the upload directory
fn is_flat_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

/// Random 32-hex-char name, keeping a short alphanumeric extension
fn stored_name(original: &str) -> String {
    let token: [u8; 16] = rand::random();
    let base: String = token.iter().map(|b| format!("{:02x}", b)).collect();
    match safe_extension(original) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

fn safe_extension(original: &str) -> Option<String> {
    let ext = FsPath::new(original)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    let simple = ext
        .bytes()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    (!ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN && simple).then_some(ext)
}

/// Absolute URL for `path` as seen by the client, honouring reverse-proxy headers
pub fn public_url(headers: &HeaderMap, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .unwrap_or_default();

    if host.is_empty() {
        return path;
    }
    format!("{}://{}{}", scheme, host, path)
}

pub async fn handle_upload(State(state): State<AppState>, request: Request) -> Response {
    match state.files.upload(request).await {
        Ok(uploaded) => Json(uploaded).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    match state.files.serve(&name, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
