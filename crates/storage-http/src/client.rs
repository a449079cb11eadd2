//! reqwest-based `SyncClient` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response};

use asset_sync_storage::{
    AssetManifestEntry, AssetPayload, ChunkAck, ChunkUpload, FinalizeRequest, StorageUsage,
    SyncClient, SyncError,
};

use crate::auth::AuthProvider;
use crate::error::HttpError;

/// `SyncClient` talking to the project server over HTTP.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpSyncClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// Server root, without a trailing slash.
    base_url: String,
    /// Source of bearer tokens.
    auth: Arc<dyn AuthProvider>,
}

impl HttpSyncClient {
    /// Create a client with a default `reqwest::Client`.
    ///
    /// # Arguments
    /// * `base_url` - Server root, e.g. `https://api.example.com`
    /// * `auth` - Source of bearer tokens
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::InvalidConfig {
                message: e.to_string(),
            })?;
        Ok(Self::from_client(http, base_url, auth))
    }

    /// Create a client from a configured `reqwest::Client` (timeouts,
    /// proxies and TLS settings are taken from it).
    pub fn from_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let base_url: String = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token, send, and reject non-success statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, HttpError> {
        let token: String = self.auth.bearer_token().await?;
        let response: Response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: String = response.text().await.unwrap_or_default();
        Err(HttpError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Build a binary multipart part.
fn file_part(data: Bytes, filename: &str, mime_type: &str) -> Result<Part, HttpError> {
    let length: u64 = data.len() as u64;
    Part::stream_with_length(Body::from(data), length)
        .file_name(filename.to_string())
        .mime_str(mime_type)
        .map_err(|e| HttpError::Request {
            message: format!("invalid MIME type {:?}: {}", mime_type, e),
            retryable: false,
        })
}

/// Parse a chunk or finalize acknowledgement.
///
/// An empty or non-JSON body carries no completion signal.
fn parse_ack(body: &str) -> ChunkAck {
    if body.trim().is_empty() {
        return ChunkAck::default();
    }
    match serde_json::from_str::<ChunkAck>(body) {
        Ok(ack) => ack,
        Err(e) => {
            log::debug!("Treating unparseable chunk response as incomplete: {}", e);
            ChunkAck::default()
        }
    }
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    async fn save_document(&self, project_id: &str, document: Vec<u8>) -> Result<(), SyncError> {
        let url = self.url(&format!(
            "/projects/uuid/{}/yjs-document?markSaved=true",
            project_id
        ));
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(document);
        self.send(request).await?;
        Ok(())
    }

    async fn storage_usage(&self) -> Result<StorageUsage, SyncError> {
        let request = self.http.get(self.url("/user/storage"));
        let usage: StorageUsage = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(HttpError::from)?;
        Ok(usage)
    }

    async fn sync_assets(
        &self,
        project_id: &str,
        assets: Vec<AssetPayload>,
    ) -> Result<serde_json::Value, SyncError> {
        let mut manifest: Vec<AssetManifestEntry> = Vec::with_capacity(assets.len());
        let mut form = Form::new();
        for payload in assets {
            form = form.part(
                "files",
                file_part(payload.data, &payload.entry.filename, &payload.entry.mime_type)?,
            );
            manifest.push(payload.entry);
        }
        let metadata: String =
            serde_json::to_string(&manifest).map_err(|e| SyncError::InvalidResponse {
                message: e.to_string(),
            })?;
        form = form.text("metadata", metadata);

        let request = self
            .http
            .post(self.url(&format!("/projects/{}/assets/sync", project_id)))
            .multipart(form);
        let body: String = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(HttpError::from)?;

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            SyncError::from(HttpError::Decode {
                message: e.to_string(),
            })
        })
    }

    async fn upload_chunk(
        &self,
        project_id: &str,
        chunk: ChunkUpload,
    ) -> Result<ChunkAck, SyncError> {
        let chunk_number: u32 = chunk.chunk_number;
        let form = Form::new()
            .part("file", file_part(chunk.data, &chunk.filename, &chunk.mime_type)?)
            .text("resumableIdentifier", chunk.identifier)
            .text("resumableChunkNumber", chunk_number.to_string())
            .text("resumableTotalChunks", chunk.total_chunks.to_string())
            .text("resumableFilename", chunk.filename)
            .text("resumableType", chunk.mime_type)
            .text("clientId", chunk.client_id);

        let request = self
            .http
            .post(self.url(&format!("/projects/{}/assets/upload-chunk", project_id)))
            .multipart(form);
        let body: String = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(HttpError::from)?;

        let ack: ChunkAck = parse_ack(&body);
        if let Some(progress) = ack.progress {
            log::debug!(
                "Chunk {} acknowledged: {}/{} received",
                chunk_number,
                progress.received,
                progress.total
            );
        }
        Ok(ack)
    }

    async fn finalize_chunks(
        &self,
        project_id: &str,
        request: &FinalizeRequest,
    ) -> Result<ChunkAck, SyncError> {
        let builder = self
            .http
            .post(self.url(&format!(
                "/projects/{}/assets/upload-chunk/finalize",
                project_id
            )))
            .json(request);
        let body: String = self
            .send(builder)
            .await?
            .text()
            .await
            .map_err(HttpError::from)?;
        Ok(parse_ack(&body))
    }

    async fn update_metadata(&self, project_id: &str, title: &str) -> Result<(), SyncError> {
        let request = self
            .http
            .patch(self.url(&format!("/projects/uuid/{}/metadata", project_id)))
            .json(&serde_json::json!({ "title": title }));
        self.send(request).await?;
        Ok(())
    }
}
