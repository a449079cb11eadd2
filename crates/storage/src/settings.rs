//! Configuration for save and upload operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use asset_sync_common::{
    CHUNK_SIZE, DEFAULT_BATCH_MAX_BYTES, DEFAULT_BATCH_MAX_COUNT, FINALIZE_ATTEMPTS,
    FINALIZE_DELAY_MS, HIGH_PRIORITY_BATCH_MAX_BYTES, HIGH_PRIORITY_BATCH_MAX_COUNT,
    LARGE_FILE_THRESHOLD, MAX_CONCURRENT_BATCHES, MAX_CONCURRENT_CHUNKS,
    MAX_CONCURRENT_LARGE_FILES,
};

use crate::error::SyncError;

/// Count and byte limits for one combined upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Maximum assets per batch.
    pub max_count: usize,
    /// Maximum bytes per batch (a single oversized asset may exceed it).
    pub max_bytes: u64,
}

impl BatchLimits {
    /// Create new limits.
    pub fn new(max_count: usize, max_bytes: u64) -> Self {
        Self {
            max_count,
            max_bytes,
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_MAX_COUNT, DEFAULT_BATCH_MAX_BYTES)
    }
}

/// Tunables for the upload pipeline.
///
/// # Example
///
/// ```ignore
/// let settings = SyncSettings::default()
///     .with_chunk_size(8 * MIB)
///     .with_max_concurrent_batches(4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Limits for normal, low and idle priority batches.
    pub batch_limits: BatchLimits,
    /// Tighter limits for high priority batches.
    pub high_priority_limits: BatchLimits,
    /// Assets strictly larger than this are uploaded in chunks.
    pub large_file_threshold: u64,
    /// Chunk size for large assets.
    pub chunk_size: u64,
    /// Combined upload requests in flight.
    pub max_concurrent_batches: usize,
    /// Large assets uploading at once.
    pub max_concurrent_large_files: usize,
    /// Chunk window width per large asset.
    pub max_concurrent_chunks: usize,
    /// Finalize requests before a chunked upload fails.
    pub finalize_attempts: u32,
    /// Delay between finalize requests, in milliseconds.
    pub finalize_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_limits: BatchLimits::default(),
            high_priority_limits: BatchLimits::new(
                HIGH_PRIORITY_BATCH_MAX_COUNT,
                HIGH_PRIORITY_BATCH_MAX_BYTES,
            ),
            large_file_threshold: LARGE_FILE_THRESHOLD,
            chunk_size: CHUNK_SIZE,
            max_concurrent_batches: MAX_CONCURRENT_BATCHES,
            max_concurrent_large_files: MAX_CONCURRENT_LARGE_FILES,
            max_concurrent_chunks: MAX_CONCURRENT_CHUNKS,
            finalize_attempts: FINALIZE_ATTEMPTS,
            finalize_delay_ms: FINALIZE_DELAY_MS,
        }
    }
}

impl SyncSettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set limits for normal priority batches.
    pub fn with_batch_limits(mut self, limits: BatchLimits) -> Self {
        self.batch_limits = limits;
        self
    }

    /// Set limits for high priority batches.
    pub fn with_high_priority_limits(mut self, limits: BatchLimits) -> Self {
        self.high_priority_limits = limits;
        self
    }

    /// Set the size above which assets are chunked.
    pub fn with_large_file_threshold(mut self, threshold: u64) -> Self {
        self.large_file_threshold = threshold;
        self
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the number of batches in flight.
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    /// Set the number of large assets uploading at once.
    pub fn with_max_concurrent_large_files(mut self, max: usize) -> Self {
        self.max_concurrent_large_files = max;
        self
    }

    /// Set the chunk window width.
    pub fn with_max_concurrent_chunks(mut self, max: usize) -> Self {
        self.max_concurrent_chunks = max;
        self
    }

    /// Set the finalize retry budget.
    ///
    /// # Arguments
    /// * `attempts` - Number of finalize requests
    /// * `delay` - Pause between requests
    pub fn with_finalize_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.finalize_attempts = attempts;
        self.finalize_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay between finalize requests.
    pub fn finalize_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_delay_ms)
    }

    /// Check that the settings describe a workable pipeline.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be greater than zero"));
        }
        for (name, limits) in [
            ("batch_limits", &self.batch_limits),
            ("high_priority_limits", &self.high_priority_limits),
        ] {
            if limits.max_count == 0 || limits.max_bytes == 0 {
                return Err(invalid(&format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> SyncError {
    SyncError::InvalidConfig {
        message: message.to_string(),
    }
}
