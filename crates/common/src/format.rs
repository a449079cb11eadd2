//! Human-readable byte formatting for user-facing messages.

use crate::constants::MIB;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Format a byte count as MiB or GiB with one decimal place.
pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1} GiB", b / GIB)
    } else {
        format!("{:.1} MiB", b / MIB as f64)
    }
}
