//! Shared types and utilities for asset-sync.
//!
//! This crate provides common functionality used across all asset-sync crates:
//! - Transfer limits and priority scores
//! - Content hash computation
//! - Generic progress callback trait
//! - Byte formatting for user-facing messages

pub mod constants;
pub mod format;
pub mod hash;
pub mod progress;

// Re-export commonly used items at crate root
pub use constants::*;
pub use format::format_bytes;
pub use hash::hash_bytes;
pub use progress::{progress_fn, FnProgress, NoOpProgress, ProgressCallback};
