//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SyncError;
use crate::traits::{AssetRegistry, DocumentStore, SyncClient};
use crate::types::{
    Asset, AssetManifestEntry, AssetPayload, ChunkAck, ChunkUpload, FinalizeRequest,
    StorageUsage,
};

/// Registry holding assets and their bytes in memory.
#[derive(Default)]
pub struct MemoryRegistry {
    assets: Mutex<Vec<Asset>>,
    data: Mutex<HashMap<String, Bytes>>,
    uploaded: Mutex<HashSet<String>>,
    unmarkable: Mutex<HashSet<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset of `size` bytes and return it.
    pub fn add(&self, id: &str, size: u64) -> Asset {
        self.add_asset(Asset::new(id, format!("{}.bin", id), "application/octet-stream", size))
    }

    /// Add a prepared asset, filling its bytes with a pattern.
    pub fn add_asset(&self, asset: Asset) -> Asset {
        let data: Vec<u8> = (0..asset.size).map(|i| (i % 251) as u8).collect();
        self.data
            .lock()
            .unwrap()
            .insert(asset.id.clone(), Bytes::from(data));
        self.assets.lock().unwrap().push(asset.clone());
        asset
    }

    /// Make `mark_asset_uploaded` fail for this asset.
    pub fn fail_mark(&self, id: &str) {
        self.unmarkable.lock().unwrap().insert(id.to_string());
    }

    pub fn is_uploaded(&self, id: &str) -> bool {
        self.uploaded.lock().unwrap().contains(id)
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetRegistry for MemoryRegistry {
    async fn pending_assets(&self) -> Result<Vec<Asset>, SyncError> {
        let uploaded = self.uploaded.lock().unwrap();
        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !uploaded.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn mark_asset_uploaded(&self, asset_id: &str) -> Result<(), SyncError> {
        if self.unmarkable.lock().unwrap().contains(asset_id) {
            return Err(SyncError::Registry {
                message: "disk full".into(),
            });
        }
        self.uploaded.lock().unwrap().insert(asset_id.to_string());
        Ok(())
    }

    async fn read_asset(&self, asset_id: &str) -> Result<Bytes, SyncError> {
        self.data
            .lock()
            .unwrap()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| SyncError::Registry {
                message: format!("unknown asset {}", asset_id),
            })
    }
}

/// Document store returning fixed bytes.
pub struct MemoryDocument(pub Vec<u8>);

#[async_trait]
impl DocumentStore for MemoryDocument {
    async fn serialize(&self) -> Result<Vec<u8>, SyncError> {
        Ok(self.0.clone())
    }
}

/// When a chunk response carries the completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// On the response that completes the set of received chunks.
    WhenAllReceived,
    /// Only on the response for this chunk number.
    OnChunk(u32),
    /// Never; the finalize loop must confirm.
    Never,
}

/// A chunk request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct LoggedChunk {
    pub identifier: String,
    pub chunk_number: u32,
    pub total_chunks: u32,
    pub client_id: String,
    pub len: usize,
}

/// Scriptable in-memory server.
pub struct MockClient {
    pub usage: Mutex<Result<StorageUsage, SyncError>>,
    pub completion: CompletionMode,
    pub finalize_complete_after: Option<u32>,
    pub failing_chunk: Option<u32>,
    pub failing_assets: HashSet<String>,
    pub fail_metadata: AtomicBool,
    pub fail_document: AtomicBool,
    pub finalize_calls: AtomicU32,
    pub chunks_in_flight: AtomicUsize,
    pub max_chunks_in_flight: AtomicUsize,
    pub batches_in_flight: AtomicUsize,
    pub max_batches_in_flight: AtomicUsize,
    chunks: Mutex<Vec<LoggedChunk>>,
    received: Mutex<HashMap<String, HashSet<u32>>>,
    batches: Mutex<Vec<Vec<AssetManifestEntry>>>,
    finalizes: Mutex<Vec<FinalizeRequest>>,
    pub documents: Mutex<Vec<Vec<u8>>>,
    pub titles: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            usage: Mutex::new(Ok(StorageUsage::default())),
            completion: CompletionMode::WhenAllReceived,
            finalize_complete_after: None,
            failing_chunk: None,
            failing_assets: HashSet::new(),
            fail_metadata: AtomicBool::new(false),
            fail_document: AtomicBool::new(false),
            finalize_calls: AtomicU32::new(0),
            chunks_in_flight: AtomicUsize::new(0),
            max_chunks_in_flight: AtomicUsize::new(0),
            batches_in_flight: AtomicUsize::new(0),
            max_batches_in_flight: AtomicUsize::new(0),
            chunks: Mutex::new(Vec::new()),
            received: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            finalizes: Mutex::new(Vec::new()),
            documents: Mutex::new(Vec::new()),
            titles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_completion(mut self, mode: CompletionMode) -> Self {
        self.completion = mode;
        self
    }

    /// Finalize answers complete from the `n`th call on.
    pub fn with_finalize_complete_after(mut self, n: u32) -> Self {
        self.finalize_complete_after = Some(n);
        self
    }

    pub fn with_failing_chunk(mut self, chunk_number: u32) -> Self {
        self.failing_chunk = Some(chunk_number);
        self
    }

    /// Fail every batch and chunk that carries this asset.
    pub fn with_failing_asset(mut self, asset_id: &str) -> Self {
        self.failing_assets.insert(asset_id.to_string());
        self
    }

    pub fn with_usage(self, usage: StorageUsage) -> Self {
        *self.usage.lock().unwrap() = Ok(usage);
        self
    }

    pub fn chunk_log(&self) -> Vec<LoggedChunk> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn batch_log(&self) -> Vec<Vec<AssetManifestEntry>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn last_finalize(&self) -> Option<FinalizeRequest> {
        self.finalizes.lock().unwrap().last().cloned()
    }

    fn network_error() -> SyncError {
        SyncError::Network {
            message: "connection reset".into(),
            retryable: true,
        }
    }
}

fn track_max(current: &AtomicUsize, max: &AtomicUsize) {
    let now: usize = current.fetch_add(1, Ordering::SeqCst) + 1;
    max.fetch_max(now, Ordering::SeqCst);
}

#[async_trait]
impl SyncClient for MockClient {
    async fn save_document(&self, _project_id: &str, document: Vec<u8>) -> Result<(), SyncError> {
        if self.fail_document.load(Ordering::SeqCst) {
            return Err(SyncError::Server {
                status: 500,
                message: "document rejected".into(),
            });
        }
        self.documents.lock().unwrap().push(document);
        Ok(())
    }

    async fn storage_usage(&self) -> Result<StorageUsage, SyncError> {
        self.usage.lock().unwrap().clone()
    }

    async fn sync_assets(
        &self,
        _project_id: &str,
        assets: Vec<AssetPayload>,
    ) -> Result<serde_json::Value, SyncError> {
        track_max(&self.batches_in_flight, &self.max_batches_in_flight);
        tokio::task::yield_now().await;
        self.batches_in_flight.fetch_sub(1, Ordering::SeqCst);

        let entries: Vec<AssetManifestEntry> = assets.iter().map(|a| a.entry.clone()).collect();
        let fails: bool = entries
            .iter()
            .any(|e| self.failing_assets.contains(&e.client_id));
        self.batches.lock().unwrap().push(entries);
        if fails {
            return Err(Self::network_error());
        }
        Ok(serde_json::json!({ "uploaded": assets.len() }))
    }

    async fn upload_chunk(
        &self,
        _project_id: &str,
        chunk: ChunkUpload,
    ) -> Result<ChunkAck, SyncError> {
        track_max(&self.chunks_in_flight, &self.max_chunks_in_flight);
        tokio::task::yield_now().await;
        self.chunks_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.chunks.lock().unwrap().push(LoggedChunk {
            identifier: chunk.identifier.clone(),
            chunk_number: chunk.chunk_number,
            total_chunks: chunk.total_chunks,
            client_id: chunk.client_id.clone(),
            len: chunk.data.len(),
        });
        if self.failing_chunk == Some(chunk.chunk_number)
            || self.failing_assets.contains(&chunk.client_id)
        {
            return Err(Self::network_error());
        }

        let received: usize = {
            let mut received = self.received.lock().unwrap();
            let set = received.entry(chunk.identifier.clone()).or_default();
            set.insert(chunk.chunk_number);
            set.len()
        };
        let complete: bool = match self.completion {
            CompletionMode::WhenAllReceived => received == chunk.total_chunks as usize,
            CompletionMode::OnChunk(n) => chunk.chunk_number == n,
            CompletionMode::Never => false,
        };
        Ok(ChunkAck {
            complete,
            progress: None,
        })
    }

    async fn finalize_chunks(
        &self,
        _project_id: &str,
        request: &FinalizeRequest,
    ) -> Result<ChunkAck, SyncError> {
        let call: u32 = self.finalize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.finalizes.lock().unwrap().push(request.clone());
        let complete: bool = self.finalize_complete_after.is_some_and(|n| call >= n);
        Ok(ChunkAck {
            complete,
            progress: None,
        })
    }

    async fn update_metadata(&self, _project_id: &str, title: &str) -> Result<(), SyncError> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(SyncError::Server {
                status: 502,
                message: "bad gateway".into(),
            });
        }
        self.titles.lock().unwrap().push(title.to_string());
        Ok(())
    }
}
