//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Export pipeline defaults.
    #[serde(default)]
    pub export: ExportDefaults,

    /// External transcoder settings.
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Frame rate assumed when the source does not report one.
    pub fps: u32,

    /// Fixed target bitrate for re-encoding strategies, bits per second.
    pub bitrate_bps: u64,

    /// Force a keyframe every N encoded frames.
    pub keyframe_interval: u32,

    /// Maximum decoded frames in flight between decode and encode.
    pub queue_depth: usize,

    /// Refresh rate driving canvas-capture ticks, in Hz.
    pub refresh_hz: u32,

    /// How frames are fit onto a differently sized capture surface.
    pub draw_rect: DrawRectPolicy,

    /// Preferred trade-off when more than one strategy is viable.
    pub fidelity: FidelityPreference,

    /// How long to wait for the transcoder readiness gate, in milliseconds.
    pub transcoder_ready_timeout_ms: u64,
}

/// Placement of a source frame on a capture surface of another size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawRectPolicy {
    /// Scale to fill the whole surface, ignoring aspect ratio.
    #[default]
    Stretch,
    /// Preserve aspect ratio, pad with black bars.
    Letterbox,
}

/// Declared fidelity/speed preference for strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FidelityPreference {
    /// Prefer the fastest viable strategy (stream copy when possible).
    #[default]
    Speed,
    /// Prefer frame-accurate cut points over speed.
    Accuracy,
}

/// External transcoder binaries and working area.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// ffmpeg executable name or path.
    pub ffmpeg: String,

    /// ffprobe executable name or path.
    pub ffprobe: String,

    /// Root for per-job working directories.
    pub work_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "cutroom=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate_bps: 2_000_000,
            keyframe_interval: 30,
            queue_depth: 4,
            refresh_hz: 60,
            draw_rect: DrawRectPolicy::default(),
            fidelity: FidelityPreference::default(),
            transcoder_ready_timeout_ms: 5_000,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            work_dir: std::env::temp_dir().join("cutroom"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cutroom").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"export":{"bitrate_bps":500000}}"#).unwrap();
        assert_eq!(parsed.export.bitrate_bps, 500_000);
        assert_eq!(parsed.export.keyframe_interval, 30);
        assert_eq!(parsed.transcoder.ffmpeg, "ffmpeg");
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("cutroom_test_bad_config.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.fps, 30);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn policies_serialize_lowercase() {
        let json = serde_json::to_string(&DrawRectPolicy::Letterbox).unwrap();
        assert_eq!(json, "\"letterbox\"");
        let parsed: FidelityPreference = serde_json::from_str("\"accuracy\"").unwrap();
        assert_eq!(parsed, FidelityPreference::Accuracy);
    }
}
