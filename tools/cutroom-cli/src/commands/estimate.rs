//! Project output size for a trim window.

use std::path::PathBuf;

use cutroom_common::clock::format_timestamp;
use cutroom_common::config::AppConfig;
use cutroom_media_model::estimate::{
    estimate_encoded_size, estimate_trimmed_size, format_bytes,
};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    start: f64,
    end: Option<f64>,
    bitrate: Option<u64>,
) -> anyhow::Result<()> {
    let (source, range) = super::load_window(config, &path, start, end).await?;
    let bitrate = bitrate.unwrap_or(config.export.bitrate_bps);

    println!(
        "Window: {} - {} ({:.3}s of {:.3}s)",
        format_timestamp(range.start()),
        format_timestamp(range.end()),
        range.len_secs(),
        source.duration_secs
    );
    println!(
        "  Stream copy: ~{}",
        format_bytes(estimate_trimmed_size(source.byte_size, &range))
    );
    println!(
        "  Re-encode @ {} kbps: ~{}",
        bitrate / 1000,
        format_bytes(estimate_encoded_size(bitrate, range.len_secs()))
    );

    Ok(())
}
