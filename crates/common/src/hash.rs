//! Content hash computation.

/// Compute XXH128 hash of a byte slice.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 32-character lowercase hex string (128 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let hash: u128 = xxhash_rust::xxh3::xxh3_128(data);
    format!("{:032x}", hash)
}
