//! Combined upload of small assets.
//!
//! Each batch goes out as one multipart request whose manifest is
//! positionally aligned with its file parts. A batch succeeds or fails as
//! a whole. Batches are dispatched with bounded concurrency and every
//! batch's result is collected on its own, so one failure never stops
//! its siblings.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};

use asset_sync_common::hash_bytes;

use crate::error::{SyncError, TransferError};
use crate::traits::{AssetRegistry, SyncClient};
use crate::types::{AssetManifestEntry, AssetPayload, Batch, UploadOutcome};

/// Uploads batches of small assets.
pub struct BatchUploadCoordinator<'a, C: SyncClient> {
    /// Transport for combined upload requests.
    client: &'a C,
    /// Registry supplying asset bytes and recording completion.
    registry: &'a dyn AssetRegistry,
    /// Project the assets belong to.
    project_id: &'a str,
    /// Batches in flight at once.
    max_concurrency: usize,
}

impl<'a, C: SyncClient> BatchUploadCoordinator<'a, C> {
    /// Create a new coordinator.
    ///
    /// # Arguments
    /// * `client` - Transport for combined upload requests
    /// * `registry` - Asset registry
    /// * `project_id` - Target project
    /// * `max_concurrency` - Batches in flight at once (at least 1)
    pub fn new(
        client: &'a C,
        registry: &'a dyn AssetRegistry,
        project_id: &'a str,
        max_concurrency: usize,
    ) -> Self {
        Self {
            client,
            registry,
            project_id,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Send one batch as a single request and mark its assets uploaded.
    ///
    /// Files and manifest entries are built from the same pass over the
    /// batch, so their order always matches.
    ///
    /// # Returns
    /// One `TransferError` per asset the registry could not mark. Those
    /// assets stay pending even though the server accepted them.
    pub async fn upload_batch(&self, batch: &Batch) -> Result<Vec<TransferError>, SyncError> {
        let mut payloads: Vec<AssetPayload> = Vec::with_capacity(batch.len());
        for asset in &batch.assets {
            let data = self.registry.read_asset(&asset.id).await?;
            let content_hash: String = match &asset.content_hash {
                Some(hash) => hash.clone(),
                None => hash_bytes(&data),
            };
            payloads.push(AssetPayload {
                entry: AssetManifestEntry {
                    client_id: asset.id.clone(),
                    filename: asset.filename.clone(),
                    mime_type: asset.mime_type.clone(),
                    content_hash,
                },
                data,
            });
        }

        let summary = self.client.sync_assets(self.project_id, payloads).await?;
        log::debug!(
            "Batch of {} assets ({} bytes) synced: {}",
            batch.len(),
            batch.total_bytes,
            summary
        );

        let mut unmarked: Vec<TransferError> = Vec::new();
        for asset in &batch.assets {
            if let Err(e) = self.registry.mark_asset_uploaded(&asset.id).await {
                log::warn!("Could not mark {} as uploaded: {}", asset.id, e);
                unmarked.push(TransferError::new(asset.id.clone(), e));
            }
        }
        Ok(unmarked)
    }

    /// Upload batches concurrently, continuing past failures.
    ///
    /// # Arguments
    /// * `batches` - Batches in dispatch order
    /// * `on_progress` - Receives the settled fraction, 0.0 to 1.0, weighted
    ///   by bytes (by batch count when every asset is empty)
    ///
    /// # Returns
    /// Counts of uploaded and failed assets. Assets of a failed batch stay
    /// pending for the next save.
    pub async fn dispatch(
        &self,
        batches: Vec<Batch>,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> UploadOutcome {
        if batches.is_empty() {
            return UploadOutcome::default();
        }

        let total_bytes: u64 = batches.iter().map(|b| b.total_bytes).sum();
        let total_batches: usize = batches.len();
        let settled_bytes: AtomicU64 = AtomicU64::new(0);
        let settled_batches: AtomicUsize = AtomicUsize::new(0);
        let settled_bytes: &AtomicU64 = &settled_bytes;
        let settled_batches: &AtomicUsize = &settled_batches;

        let results: Vec<(Batch, Result<Vec<TransferError>, SyncError>)> = stream::iter(batches)
            .map(|batch| async move {
                let result: Result<Vec<TransferError>, SyncError> =
                    self.upload_batch(&batch).await;

                let bytes: u64 =
                    settled_bytes.fetch_add(batch.total_bytes, Ordering::SeqCst) + batch.total_bytes;
                let count: usize = settled_batches.fetch_add(1, Ordering::SeqCst) + 1;
                let fraction: f64 = if total_bytes > 0 {
                    bytes as f64 / total_bytes as f64
                } else {
                    count as f64 / total_batches as f64
                };
                on_progress(fraction.min(1.0));

                (batch, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut outcome = UploadOutcome::default();
        for (batch, result) in results {
            match result {
                Ok(unmarked) => {
                    for asset in &batch.assets {
                        if !unmarked.iter().any(|u| u.asset_id == asset.id) {
                            outcome.record_uploaded(asset.size);
                        }
                    }
                    for error in unmarked {
                        outcome.record_failed(error);
                    }
                }
                Err(e) => {
                    log::warn!("Batch of {} assets failed: {}", batch.len(), e);
                    for asset in batch.assets {
                        outcome.record_failed(TransferError::new(asset.id, e.clone()));
                    }
                }
            }
        }
        outcome
    }
}
