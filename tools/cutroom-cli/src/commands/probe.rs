//! Show source metadata.

use std::path::PathBuf;

use cutroom_common::clock::format_timestamp;
use cutroom_common::config::AppConfig;
use cutroom_export_engine::probe::probe_source;
use cutroom_media_model::estimate::format_bytes;

pub async fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let source = probe_source(&config.transcoder.ffprobe, &path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?;

    println!("Source: {}", source.path.display());
    println!("  Type: {}", source.mime_type);
    println!(
        "  Duration: {} ({:.3}s)",
        format_timestamp(source.duration_secs),
        source.duration_secs
    );
    println!(
        "  Resolution: {}x{} @ {}fps",
        source.natural_width, source.natural_height, source.fps
    );
    println!("  Frames: {}", source.frame_count());
    println!("  Codec: {}", source.video_codec.as_deref().unwrap_or("unknown"));
    println!("  Size: {}", format_bytes(source.byte_size));

    Ok(())
}
