//! Chunked upload of large assets.
//!
//! Assets above the large-file threshold skip batching. Each one is split
//! into fixed-size chunks which are sent in windows of bounded width:
//!
//! 1. Every chunk in a window is sent concurrently.
//! 2. The whole window settles before the next one is admitted, bounding
//!    the bytes held in memory.
//! 3. Any acknowledgement in a settled window may carry the completion
//!    signal, because chunks finish in arbitrary order. All of them are
//!    inspected.
//! 4. If no window signals completion, a bounded finalize loop asks the
//!    server for the assembly state without resending data.
//!
//! Several large assets upload at once, capped separately, and their
//! progress is folded into one fraction for the session.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::join_all;
use futures::stream::{self, StreamExt};

use crate::chunks::{generate_chunks, ChunkInfo};
use crate::error::{SyncError, TransferError};
use crate::settings::SyncSettings;
use crate::traits::{AssetRegistry, SyncClient};
use crate::types::{Asset, ChunkAck, ChunkUpload, FinalizeRequest, UploadOutcome};

/// State of one chunked upload attempt.
#[derive(Debug, Clone)]
pub struct ChunkUploadSession {
    /// Identifier unique to (asset, attempt).
    pub identifier: String,
    /// Number of chunks: `ceil(size / chunk_size)`.
    pub total_chunks: u32,
    /// Chunk size used for this attempt.
    pub chunk_size: u64,
    /// Chunks acknowledged so far.
    pub uploaded_count: u32,
    /// Acknowledgement flag per chunk index.
    pub chunk_done: Vec<bool>,
}

impl ChunkUploadSession {
    /// Start a session for an asset.
    pub fn new(asset: &Asset, chunk_size: u64, total_chunks: usize) -> Self {
        Self {
            identifier: session_identifier(&asset.id),
            total_chunks: total_chunks as u32,
            chunk_size,
            uploaded_count: 0,
            chunk_done: vec![false; total_chunks],
        }
    }

    /// Record an acknowledged chunk. Repeated acknowledgements count once.
    pub fn record(&mut self, index: usize) {
        if let Some(done) = self.chunk_done.get_mut(index) {
            if !*done {
                *done = true;
                self.uploaded_count += 1;
            }
        }
    }

    /// Fraction of chunks acknowledged, 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        self.uploaded_count as f64 / self.total_chunks as f64
    }
}

/// Build an upload identifier unique to one attempt for an asset.
///
/// Characters outside `[A-Za-z0-9_-]` are replaced so the identifier is
/// safe as a form value and server-side file name.
pub fn session_identifier(asset_id: &str) -> String {
    let safe: String = asset_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", safe, uuid::Uuid::new_v4().simple())
}

/// Folds per-asset chunk progress into one fraction.
///
/// fraction = (settled assets + sum of in-flight fractions) / total assets
struct LargeFileProgress {
    total: usize,
    state: Mutex<ProgressState>,
}

#[derive(Default)]
struct ProgressState {
    settled: usize,
    in_flight: HashMap<String, f64>,
}

impl LargeFileProgress {
    fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn update(&self, asset_id: &str, fraction: f64) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .in_flight
            .insert(asset_id.to_string(), fraction.clamp(0.0, 1.0));
        self.fraction_locked(&state)
    }

    fn settle(&self, asset_id: &str) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight.remove(asset_id);
        state.settled += 1;
        self.fraction_locked(&state)
    }

    fn fraction_locked(&self, state: &ProgressState) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        let partial: f64 = state.in_flight.values().sum();
        ((state.settled as f64 + partial) / self.total as f64).min(1.0)
    }
}

/// Uploads large assets chunk by chunk.
pub struct ChunkedUploadCoordinator<'a, C: SyncClient> {
    /// Transport for chunk and finalize requests.
    client: &'a C,
    /// Registry supplying chunk bytes and recording completion.
    registry: &'a dyn AssetRegistry,
    /// Project the assets belong to.
    project_id: &'a str,
    /// Chunk size, window width and finalize budget.
    settings: &'a SyncSettings,
}

impl<'a, C: SyncClient> ChunkedUploadCoordinator<'a, C> {
    /// Create a new coordinator.
    ///
    /// # Arguments
    /// * `client` - Transport for chunk and finalize requests
    /// * `registry` - Asset registry
    /// * `project_id` - Target project
    /// * `settings` - Pipeline settings
    pub fn new(
        client: &'a C,
        registry: &'a dyn AssetRegistry,
        project_id: &'a str,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            client,
            registry,
            project_id,
            settings,
        }
    }

    /// Upload several large assets with bounded concurrency.
    ///
    /// A failing asset is recorded and never aborts the others.
    ///
    /// # Arguments
    /// * `assets` - Large assets to upload
    /// * `on_progress` - Receives the combined fraction, 0.0 to 1.0
    pub async fn upload_all(
        &self,
        assets: Vec<Asset>,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> UploadOutcome {
        if assets.is_empty() {
            return UploadOutcome::default();
        }

        let tracker: LargeFileProgress = LargeFileProgress::new(assets.len());
        let tracker: &LargeFileProgress = &tracker;
        let max_concurrency: usize = self.settings.max_concurrent_large_files.max(1);

        let results: Vec<(Asset, Result<(), SyncError>)> = stream::iter(assets)
            .map(|asset| async move {
                let report = |fraction: f64| on_progress(tracker.update(&asset.id, fraction));
                let result: Result<(), SyncError> = self.upload_large(&asset, &report).await;
                on_progress(tracker.settle(&asset.id));
                (asset, result)
            })
            .buffer_unordered(max_concurrency)
            .collect()
            .await;

        let mut outcome = UploadOutcome::default();
        for (asset, result) in results {
            match result {
                Ok(()) => outcome.record_uploaded(asset.size),
                Err(e) => {
                    log::warn!("Chunked upload of {} failed: {}", asset.id, e);
                    outcome.record_failed(TransferError::new(asset.id, e));
                }
            }
        }
        outcome
    }

    /// Upload one large asset and mark it uploaded on confirmation.
    ///
    /// # Arguments
    /// * `asset` - The asset to upload
    /// * `on_progress` - Receives acknowledged chunks / total chunks
    pub async fn upload_large(
        &self,
        asset: &Asset,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), SyncError> {
        let chunks: Vec<ChunkInfo> = generate_chunks(asset.size, self.settings.chunk_size);
        let mut session = ChunkUploadSession::new(asset, self.settings.chunk_size, chunks.len());
        let window_width: usize = self.settings.max_concurrent_chunks.max(1);

        log::debug!(
            "Uploading {} ({} bytes) as {} chunks, session {}",
            asset.id,
            asset.size,
            session.total_chunks,
            session.identifier
        );

        let mut complete: bool = false;
        for window in chunks.chunks(window_width) {
            let acks: Vec<Result<ChunkAck, SyncError>> = join_all(
                window
                    .iter()
                    .map(|chunk| self.send_chunk(asset, &session, chunk)),
            )
            .await;

            let mut failure: Option<SyncError> = None;
            for (chunk, ack) in window.iter().zip(acks) {
                match ack {
                    Ok(ack) => {
                        session.record(chunk.index);
                        if ack.complete {
                            complete = true;
                        }
                    }
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }
            on_progress(session.fraction());

            // A completion ack means the server holds every chunk, so a lost
            // sibling response no longer matters.
            if complete {
                if let Some(e) = failure {
                    log::debug!("{} complete despite a failed chunk response: {}", asset.id, e);
                }
                break;
            }
            if let Some(e) = failure {
                return Err(e);
            }
        }

        if !complete {
            self.confirm_assembly(asset, &session).await?;
        }

        self.registry.mark_asset_uploaded(&asset.id).await?;
        on_progress(1.0);
        Ok(())
    }

    /// Ask the server whether every chunk has been assembled.
    ///
    /// Sends up to `finalize_attempts` requests, pausing `finalize_delay`
    /// between them. Returns on the first positive answer.
    pub async fn confirm_assembly(
        &self,
        asset: &Asset,
        session: &ChunkUploadSession,
    ) -> Result<(), SyncError> {
        let request = FinalizeRequest {
            resumable_identifier: session.identifier.clone(),
            resumable_total_chunks: session.total_chunks,
            resumable_filename: asset.filename.clone(),
            resumable_type: asset.mime_type.clone(),
            client_id: asset.id.clone(),
        };
        let attempts: u32 = self.settings.finalize_attempts;

        for attempt in 1..=attempts {
            match self.client.finalize_chunks(self.project_id, &request).await {
                Ok(ack) if ack.complete => {
                    log::debug!("{} assembled after {} finalize attempts", asset.id, attempt);
                    return Ok(());
                }
                Ok(ack) => {
                    if let Some(progress) = ack.progress {
                        log::debug!(
                            "{} not assembled yet ({}/{} chunks received)",
                            asset.id,
                            progress.received,
                            progress.total
                        );
                    }
                }
                Err(e) => {
                    log::warn!("Finalize attempt {} for {} failed: {}", attempt, asset.id, e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.finalize_delay()).await;
            }
        }

        Err(SyncError::FinalizeExhausted {
            asset_id: asset.id.clone(),
            attempts,
        })
    }

    /// Read and send one chunk.
    async fn send_chunk(
        &self,
        asset: &Asset,
        session: &ChunkUploadSession,
        chunk: &ChunkInfo,
    ) -> Result<ChunkAck, SyncError> {
        let data = self
            .registry
            .read_asset_range(&asset.id, chunk.offset, chunk.length)
            .await?;

        let upload = ChunkUpload {
            identifier: session.identifier.clone(),
            chunk_number: chunk.number(),
            total_chunks: session.total_chunks,
            filename: asset.filename.clone(),
            mime_type: asset.mime_type.clone(),
            client_id: asset.id.clone(),
            data,
        };

        let ack: ChunkAck = self.client.upload_chunk(self.project_id, upload).await?;
        log::debug!(
            "Chunk {}/{} of {} acknowledged (complete={})",
            chunk.number(),
            session.total_chunks,
            asset.id,
            ack.complete
        );
        Ok(ack)
    }
}
