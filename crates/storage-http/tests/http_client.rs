//! Wire contract tests for the HTTP backend.
//!
//! Each test stands up a mock server and checks the exact paths, query,
//! bearer header, multipart part names and JSON bodies the client produces.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use asset_sync_storage::{
    Asset, AssetManifestEntry, AssetPayload, AssetRegistry, ChunkUpload, DocumentStore,
    FinalizeRequest, ProjectTarget, SaveOrchestrator, SavePhase, SyncClient, SyncError,
    SyncSettings,
};
use asset_sync_storage_http::{HttpSyncClient, StaticToken};

fn client_for(server: &MockServer) -> HttpSyncClient {
    HttpSyncClient::new(server.uri(), Arc::new(StaticToken::new("secret-token"))).unwrap()
}

/// Value of a text field in a multipart body.
fn multipart_field(body: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{}\"", name);
    let start = body.find(&marker)?;
    let rest = &body[start..];
    let value_start = rest.find("\r\n\r\n")? + 4;
    let value = &rest[value_start..];
    let value_end = value.find("\r\n")?;
    Some(value[..value_end].to_string())
}

fn body_text(request: &Request) -> String {
    String::from_utf8_lossy(&request.body).into_owned()
}

async fn only_request(server: &MockServer) -> Request {
    let mut requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    requests.remove(0)
}

fn payload(id: &str, filename: &str, mime: &str, data: &'static [u8]) -> AssetPayload {
    AssetPayload {
        entry: AssetManifestEntry {
            client_id: id.to_string(),
            filename: filename.to_string(),
            mime_type: mime.to_string(),
            content_hash: format!("hash-{}", id),
        },
        data: Bytes::from_static(data),
    }
}

#[tokio::test]
async fn test_save_document_posts_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/uuid/p-1/yjs-document"))
        .and(query_param("markSaved", "true"))
        .and(header("authorization", "Bearer secret-token"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(b"\x00\x01yjs".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .save_document("p-1", b"\x00\x01yjs".to_vec())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_storage_usage_decodes_known_and_unknown_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/storage"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"quota_mb": 1000, "used_bytes": 2048})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/storage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"quota_mb": null, "used_bytes": 0})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let known = client.storage_usage().await.unwrap();
    assert_eq!(known.quota_mb, Some(1000.0));
    assert_eq!(known.used_bytes, 2048);
    assert_eq!(known.quota_bytes(), Some(1000 * 1024 * 1024));

    let unknown = client.storage_usage().await.unwrap();
    assert_eq!(unknown.quota_bytes(), None);
}

#[tokio::test]
async fn test_sync_assets_sends_files_and_aligned_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/p-1/assets/sync"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"synced": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client_for(&server)
        .sync_assets(
            "p-1",
            vec![
                payload("a1", "first.png", "image/png", b"PNGDATA"),
                payload("a2", "second.svg", "image/svg+xml", b"<svg/>"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(summary, serde_json::json!({"synced": 2}));

    let request = only_request(&server).await;
    let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = body_text(&request);
    assert_eq!(body.matches("name=\"files\"").count(), 2);
    let first = body.find("filename=\"first.png\"").unwrap();
    let second = body.find("filename=\"second.svg\"").unwrap();
    assert!(first < second);
    assert!(body.contains("PNGDATA"));

    let metadata: serde_json::Value =
        serde_json::from_str(&multipart_field(&body, "metadata").unwrap()).unwrap();
    assert_eq!(
        metadata,
        serde_json::json!([
            {"clientId": "a1", "filename": "first.png", "mimeType": "image/png", "contentHash": "hash-a1"},
            {"clientId": "a2", "filename": "second.svg", "mimeType": "image/svg+xml", "contentHash": "hash-a2"}
        ])
    );
}

#[tokio::test]
async fn test_upload_chunk_sends_resumable_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/p-1/assets/upload-chunk"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"complete": false, "progress": {"received": 2, "total": 3}}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client_for(&server)
        .upload_chunk(
            "p-1",
            ChunkUpload {
                identifier: "video-abc".into(),
                chunk_number: 2,
                total_chunks: 3,
                filename: "video.mp4".into(),
                mime_type: "video/mp4".into(),
                client_id: "video".into(),
                data: Bytes::from_static(b"CHUNK-TWO"),
            },
        )
        .await
        .unwrap();
    assert!(!ack.complete);
    assert_eq!(ack.progress.map(|p| (p.received, p.total)), Some((2, 3)));

    let request = only_request(&server).await;
    // Chunk bytes are streamed with a known length.
    let content_length: usize = request
        .headers
        .get("content-length")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(content_length, request.body.len());
    let body = body_text(&request);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("CHUNK-TWO"));
    assert_eq!(multipart_field(&body, "resumableIdentifier").as_deref(), Some("video-abc"));
    assert_eq!(multipart_field(&body, "resumableChunkNumber").as_deref(), Some("2"));
    assert_eq!(multipart_field(&body, "resumableTotalChunks").as_deref(), Some("3"));
    assert_eq!(multipart_field(&body, "resumableFilename").as_deref(), Some("video.mp4"));
    assert_eq!(multipart_field(&body, "resumableType").as_deref(), Some("video/mp4"));
    assert_eq!(multipart_field(&body, "clientId").as_deref(), Some("video"));
}

#[tokio::test]
async fn test_upload_chunk_without_json_is_incomplete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/p-1/assets/upload-chunk"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let ack = client_for(&server)
        .upload_chunk(
            "p-1",
            ChunkUpload {
                identifier: "x-1".into(),
                chunk_number: 1,
                total_chunks: 1,
                filename: "x.bin".into(),
                mime_type: "application/octet-stream".into(),
                client_id: "x".into(),
                data: Bytes::from_static(b"x"),
            },
        )
        .await
        .unwrap();
    assert!(!ack.complete);
}

#[tokio::test]
async fn test_finalize_posts_camel_case_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/p-1/assets/upload-chunk/finalize"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(serde_json::json!({
            "resumableIdentifier": "video-abc",
            "resumableTotalChunks": 3,
            "resumableFilename": "video.mp4",
            "resumableType": "video/mp4",
            "clientId": "video"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"complete": true, "progress": {"received": 3, "total": 3}}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client_for(&server)
        .finalize_chunks(
            "p-1",
            &FinalizeRequest {
                resumable_identifier: "video-abc".into(),
                resumable_total_chunks: 3,
                resumable_filename: "video.mp4".into(),
                resumable_type: "video/mp4".into(),
                client_id: "video".into(),
            },
        )
        .await
        .unwrap();
    assert!(ack.complete);
}

#[tokio::test]
async fn test_update_metadata_patches_title() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/projects/uuid/p-1/metadata"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(serde_json::json!({"title": "Week 3"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .update_metadata("p-1", "Week 3")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_statuses_map_to_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/storage"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.storage_usage().await.unwrap_err();
    match &err {
        SyncError::Server { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());

    let err = client.update_metadata("p-1", "t").await.unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 403, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/storage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"used_bytes": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpSyncClient::new(
        format!("{}/", server.uri()),
        Arc::new(StaticToken::new("secret-token")),
    )
    .unwrap();
    let usage = client.storage_usage().await.unwrap();
    assert_eq!(usage.used_bytes, 1);
    assert_eq!(usage.quota_mb, None);
}

// ============================================================================
// End to end
// ============================================================================

#[derive(Default)]
struct Registry {
    assets: Vec<Asset>,
    data: HashMap<String, Bytes>,
    uploaded: Mutex<HashSet<String>>,
}

impl Registry {
    fn with(mut self, id: &str, mime: &str, size: usize) -> Self {
        let data: Vec<u8> = (0..size).map(|i| (i % 97) as u8).collect();
        self.assets
            .push(Asset::new(id, format!("{}.bin", id), mime, size as u64));
        self.data.insert(id.to_string(), Bytes::from(data));
        self
    }
}

#[async_trait]
impl AssetRegistry for Registry {
    async fn pending_assets(&self) -> Result<Vec<Asset>, SyncError> {
        let uploaded = self.uploaded.lock().unwrap();
        Ok(self
            .assets
            .iter()
            .filter(|a| !uploaded.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn mark_asset_uploaded(&self, asset_id: &str) -> Result<(), SyncError> {
        self.uploaded.lock().unwrap().insert(asset_id.to_string());
        Ok(())
    }

    async fn read_asset(&self, asset_id: &str) -> Result<Bytes, SyncError> {
        self.data
            .get(asset_id)
            .cloned()
            .ok_or_else(|| SyncError::Registry {
                message: format!("missing {}", asset_id),
            })
    }
}

struct Document;

#[async_trait]
impl DocumentStore for Document {
    async fn serialize(&self) -> Result<Vec<u8>, SyncError> {
        Ok(b"state".to_vec())
    }
}

#[tokio::test]
async fn test_orchestrator_saves_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/uuid/p-9/yjs-document"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/storage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"quota_mb": 100, "used_bytes": 0})),
        )
        .expect(1)
        .mount(&server)
        .await;
    // Chunk responses never signal completion; finalize does.
    Mock::given(method("POST"))
        .and(path("/projects/p-9/assets/upload-chunk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-9/assets/upload-chunk/finalize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"complete": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/p-9/assets/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/projects/uuid/p-9/metadata"))
        .and(body_json(serde_json::json!({"title": "Unit 1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = Arc::new(
        Registry::default()
            .with("clip", "video/mp4", 250)
            .with("icon", "image/png", 40)
            .with("font", "font/woff2", 60),
    );
    let settings = SyncSettings::default()
        .with_large_file_threshold(100)
        .with_chunk_size(100)
        .with_finalize_retry(3, std::time::Duration::from_millis(1));
    let orchestrator = SaveOrchestrator::new(
        client_for(&server),
        registry.clone(),
        Arc::new(Document),
        ProjectTarget::new("p-9").with_title("Unit 1"),
    )
    .with_settings(settings);

    let report = orchestrator.save(None).await.unwrap();

    assert_eq!(report.uploaded_count, 3);
    assert_eq!(report.failed_count, 0);
    assert_eq!(report.uploaded_bytes, 350);
    assert!(report.metadata_synced);
    assert_eq!(report.session.phase, SavePhase::Completed);
    assert!(registry.pending_assets().await.unwrap().is_empty());
}
