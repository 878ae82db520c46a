//! Output size projection.

use crate::range::TimeRange;

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Projected size of a trimmed copy: `source_bytes × (end − start) / duration`.
///
/// Returns exactly `source_bytes` when the range spans the whole source.
pub fn estimate_trimmed_size(source_bytes: u64, range: &TimeRange) -> u64 {
    let ratio = range.ratio();
    if ratio >= 1.0 {
        return source_bytes;
    }
    (source_bytes as f64 * ratio).round() as u64
}

/// Projected size of a re-encode at a fixed bitrate.
pub fn estimate_encoded_size(bitrate_bps: u64, seconds: f64) -> u64 {
    (bitrate_bps as f64 * seconds.max(0.0) / 8.0).round() as u64
}

/// Human-readable size on the binary (1024) scale, two decimals above bytes.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} Bytes");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// The estimate string shown next to the range controls.
pub fn estimated_size_label(source_bytes: u64, range: &TimeRange) -> String {
    format_bytes(estimate_trimmed_size(source_bytes, range))
}
