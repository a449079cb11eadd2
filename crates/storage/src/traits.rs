//! Collaborator traits consumed by the save pipeline.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SyncError;
use crate::types::{
    Asset, AssetPayload, ChunkAck, ChunkUpload, FinalizeRequest, StorageUsage,
};

/// Source of pending assets and record of completed uploads.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    /// Assets not yet uploaded, in registry order.
    async fn pending_assets(&self) -> Result<Vec<Asset>, SyncError>;

    /// Flag an asset as uploaded. Must be idempotent.
    async fn mark_asset_uploaded(&self, asset_id: &str) -> Result<(), SyncError>;

    /// Read an asset's full contents.
    async fn read_asset(&self, asset_id: &str) -> Result<Bytes, SyncError>;

    /// Read a byte range of an asset (for chunked uploads).
    ///
    /// The default implementation reads the whole asset and slices it;
    /// registries backed by seekable storage should override it.
    async fn read_asset_range(
        &self,
        asset_id: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, SyncError> {
        let data: Bytes = self.read_asset(asset_id).await?;
        let start: usize = offset as usize;
        let end: usize = start.saturating_add(length as usize);
        if end > data.len() {
            return Err(SyncError::Registry {
                message: format!(
                    "Range {}..{} out of bounds for {} ({} bytes)",
                    start,
                    end,
                    asset_id,
                    data.len()
                ),
            });
        }
        Ok(data.slice(start..end))
    }
}

/// The collaborative document being saved.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Serialize the full document state.
    async fn serialize(&self) -> Result<Vec<u8>, SyncError>;
}

/// Optional external source of asset urgency.
pub trait PrioritySource: Send + Sync {
    /// Priority score for an asset, or `None` if unknown.
    fn priority(&self, asset_id: &str) -> Option<i32>;
}

/// Server operations used by a save - implemented by each transport.
#[async_trait]
pub trait SyncClient: Send + Sync {
    /// Upload the serialized document and mark the project saved.
    async fn save_document(&self, project_id: &str, document: Vec<u8>) -> Result<(), SyncError>;

    /// Fetch the user's storage quota and usage.
    async fn storage_usage(&self) -> Result<StorageUsage, SyncError>;

    /// Upload a group of assets in one request.
    ///
    /// Payload order is the wire order: the manifest is built from the
    /// same sequence as the file parts.
    async fn sync_assets(
        &self,
        project_id: &str,
        assets: Vec<AssetPayload>,
    ) -> Result<serde_json::Value, SyncError>;

    /// Upload one chunk of a large asset.
    async fn upload_chunk(&self, project_id: &str, chunk: ChunkUpload)
        -> Result<ChunkAck, SyncError>;

    /// Ask the server for the assembly state of a chunked upload.
    async fn finalize_chunks(
        &self,
        project_id: &str,
        request: &FinalizeRequest,
    ) -> Result<ChunkAck, SyncError>;

    /// Update the project's title.
    async fn update_metadata(&self, project_id: &str, title: &str) -> Result<(), SyncError>;
}
