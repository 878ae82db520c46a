pub mod check;
pub mod estimate;
pub mod export;
pub mod probe;

use std::path::Path;

use cutroom_common::config::AppConfig;
use cutroom_export_engine::probe::probe_source;
use cutroom_media_model::range::TimeRange;
use cutroom_media_model::source::SourceMedia;

/// Probe a source and build a window over it.
pub(crate) async fn load_window(
    config: &AppConfig,
    path: &Path,
    start: f64,
    end: Option<f64>,
) -> anyhow::Result<(SourceMedia, TimeRange)> {
    let source = probe_source(&config.transcoder.ffprobe, path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?;
    let range = TimeRange::requested(
        source.duration_secs,
        source.fps,
        start,
        end.unwrap_or(source.duration_secs),
    )?;
    Ok((source, range))
}
