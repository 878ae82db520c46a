//! Source probing via ffprobe.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;

use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::source::{MediaContainer, SourceMedia, SourceMetadata};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rate such as `30000/1001`, rounded to whole frames.
///
/// Returns `None` for `0/0`, zero, or unparseable input.
pub fn parse_frame_rate(raw: &str) -> Option<u32> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Some(rate.round().max(1.0) as u32)
}

/// Build [`SourceMetadata`] from ffprobe's `-print_format json` output.
pub fn metadata_from_probe(json: &str, byte_size: u64) -> CutroomResult<SourceMetadata> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| CutroomError::unsupported_source("No video stream found"))?;

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(SourceMetadata {
        duration_secs,
        natural_width: video.width.unwrap_or(0),
        natural_height: video.height.unwrap_or(0),
        byte_size,
        fps,
        video_codec: video.codec_name.clone(),
    })
}

/// Probe `path` and build its [`SourceMedia`].
///
/// The MIME type is derived from the extension; unknown types are rejected
/// before ffprobe runs.
pub async fn probe_source(ffprobe: &str, path: &Path) -> CutroomResult<SourceMedia> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CutroomError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CutroomError::Io(e)
        }
    })?;
    let container = MediaContainer::from_path(path)?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| CutroomError::unsupported(format!("Failed to run {ffprobe}: {e}")))?;
    if !output.status.success() {
        return Err(CutroomError::unsupported_source(format!(
            "ffprobe could not read {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    let metadata = metadata_from_probe(&json, meta.len())?;
    let source = SourceMedia::new(path, container.mime_type(), metadata)?;
    tracing::info!(
        path = %path.display(),
        duration_secs = source.duration_secs,
        width = source.natural_width,
        height = source.natural_height,
        fps = source.fps,
        bytes = source.byte_size,
        "Source probed"
    );
    Ok(source)
}
