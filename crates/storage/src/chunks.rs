//! Chunking decisions for large assets.
//!
//! Pure logic for splitting an asset into byte ranges. No I/O.

/// Information about a single chunk of a large asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Zero-based chunk index.
    pub index: usize,
    /// Byte offset within the asset.
    pub offset: u64,
    /// Length of this chunk in bytes.
    pub length: u64,
}

impl ChunkInfo {
    /// 1-indexed chunk number as sent on the wire.
    pub fn number(&self) -> u32 {
        self.index as u32 + 1
    }
}

/// Determine if an asset must take the chunked path.
///
/// Assets strictly larger than `threshold` are chunked.
pub fn needs_chunking(size: u64, threshold: u64) -> bool {
    size > threshold
}

/// Generate chunk information for a large asset.
///
/// Splits `size` bytes into chunks of `chunk_size` bytes.
/// The last chunk may be smaller than `chunk_size`.
///
/// # Arguments
/// * `size` - Total asset size in bytes
/// * `chunk_size` - Size of each chunk
///
/// # Returns
/// Vector of ChunkInfo describing each chunk's offset and length.
/// Returns a single chunk for empty assets or when `chunk_size` is 0.
pub fn generate_chunks(size: u64, chunk_size: u64) -> Vec<ChunkInfo> {
    if chunk_size == 0 || size == 0 {
        return vec![ChunkInfo {
            index: 0,
            offset: 0,
            length: size,
        }];
    }

    let mut chunks = Vec::with_capacity(expected_chunk_count(size, chunk_size));
    let mut offset = 0u64;
    let mut index = 0usize;

    while offset < size {
        let length = std::cmp::min(chunk_size, size - offset);
        chunks.push(ChunkInfo {
            index,
            offset,
            length,
        });
        offset += length;
        index += 1;
    }

    chunks
}

/// Calculate the expected number of chunks: `ceil(size / chunk_size)`.
pub fn expected_chunk_count(size: u64, chunk_size: u64) -> usize {
    if chunk_size == 0 || size == 0 {
        return 1;
    }
    size.div_ceil(chunk_size) as usize
}
