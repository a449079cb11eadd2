//! Shared constants used across asset-sync crates.

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Default maximum number of assets in one combined upload request.
pub const DEFAULT_BATCH_MAX_COUNT: usize = 30;

/// Default maximum byte total of one combined upload request (20MB).
pub const DEFAULT_BATCH_MAX_BYTES: u64 = 20 * MIB;

/// Count limit for high-priority batches.
/// Kept small so urgent assets are not held back by a large request.
pub const HIGH_PRIORITY_BATCH_MAX_COUNT: usize = 5;

/// Byte limit for high-priority batches (5MB).
pub const HIGH_PRIORITY_BATCH_MAX_BYTES: u64 = 5 * MIB;

/// Assets strictly larger than this are uploaded in chunks (20MB).
pub const LARGE_FILE_THRESHOLD: u64 = 20 * MIB;

/// Size of each chunk of a large asset (5MB).
pub const CHUNK_SIZE: u64 = 5 * MIB;

/// Maximum combined upload requests in flight.
pub const MAX_CONCURRENT_BATCHES: usize = 3;

/// Maximum large assets uploading at once.
pub const MAX_CONCURRENT_LARGE_FILES: usize = 2;

/// Width of the chunk window for one large asset.
pub const MAX_CONCURRENT_CHUNKS: usize = 3;

/// Number of finalize requests sent before a chunked upload is given up.
pub const FINALIZE_ATTEMPTS: u32 = 10;

/// Delay between finalize requests, in milliseconds.
pub const FINALIZE_DELAY_MS: u64 = 300;

/// Priority score for assets that block what the user is looking at.
pub const PRIORITY_CRITICAL: i32 = 100;

/// Priority score for assets needed soon.
pub const PRIORITY_HIGH: i32 = 75;

/// Priority score for ordinary assets.
pub const PRIORITY_MEDIUM: i32 = 50;

/// Priority score for background assets.
pub const PRIORITY_LOW: i32 = 25;

/// Priority score used when nothing is known about an asset.
pub const PRIORITY_IDLE: i32 = 0;
