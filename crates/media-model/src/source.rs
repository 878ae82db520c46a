//! Source media metadata and output resolution choices.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cutroom_common::clock::{FrameClock, DEFAULT_FPS};
use cutroom_common::error::{CutroomError, CutroomResult};

/// Container families the pipeline accepts and produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaContainer {
    Mp4,
    Webm,
}

impl MediaContainer {
    /// Resolve a declared MIME type. Codec parameters (`; codecs=...`) are ignored.
    pub fn from_mime(mime: &str) -> CutroomResult<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "video/mp4" => Ok(Self::Mp4),
            "video/webm" => Ok(Self::Webm),
            other => Err(CutroomError::unsupported_source(format!(
                "Unrecognized media type '{other}'. Supported: video/mp4, video/webm"
            ))),
        }
    }

    /// Guess the container from a file extension.
    pub fn from_path(path: &Path) -> CutroomResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "mp4" | "m4v" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            _ => Err(CutroomError::unsupported_source(format!(
                "Unrecognized file type for {}",
                path.display()
            ))),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

/// Probed properties of a source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub duration_secs: f64,
    pub natural_width: u32,
    pub natural_height: u32,
    pub byte_size: u64,

    /// Frame rate; `None` or zero means unknown.
    pub fps: Option<u32>,

    /// Video codec name as reported by the prober, if any.
    pub video_codec: Option<String>,
}

/// A loaded source file plus its probed metadata.
///
/// One per session; a dedicated export handle is opened from it for each job
/// so preview playback never seeks the same handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMedia {
    pub path: PathBuf,
    pub mime_type: String,
    pub container: MediaContainer,
    pub duration_secs: f64,
    pub natural_width: u32,
    pub natural_height: u32,
    pub byte_size: u64,
    pub fps: u32,
    pub video_codec: Option<String>,
}

impl SourceMedia {
    /// Validate the declared MIME type and metadata.
    pub fn new(
        path: impl Into<PathBuf>,
        mime_type: &str,
        metadata: SourceMetadata,
    ) -> CutroomResult<Self> {
        let container = MediaContainer::from_mime(mime_type)?;
        if !metadata.duration_secs.is_finite() || metadata.duration_secs <= 0.0 {
            return Err(CutroomError::unsupported_source(
                "Source reports no playable duration",
            ));
        }

        Ok(Self {
            path: path.into(),
            mime_type: container.mime_type().to_string(),
            container,
            duration_secs: metadata.duration_secs,
            natural_width: metadata.natural_width,
            natural_height: metadata.natural_height,
            byte_size: metadata.byte_size,
            fps: metadata.fps.filter(|fps| *fps > 0).unwrap_or(DEFAULT_FPS),
            video_codec: metadata.video_codec,
        })
    }

    pub fn frame_clock(&self) -> FrameClock {
        FrameClock::new(self.fps)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_clock().frame_count(self.duration_secs)
    }

    /// File name without extension, if the path has a usable one.
    pub fn base_name(&self) -> Option<&str> {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
    }
}

/// Requested output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep the source's natural dimensions.
    #[default]
    Original,
    Fixed { width: u32, height: u32 },
}

/// Named presets offered to the user.
pub const RESOLUTION_PRESETS: &[(&str, Resolution)] = &[
    ("Original", Resolution::Original),
    ("1080p", Resolution::Fixed { width: 1920, height: 1080 }),
    ("720p", Resolution::Fixed { width: 1280, height: 720 }),
    ("480p", Resolution::Fixed { width: 854, height: 480 }),
    ("360p", Resolution::Fixed { width: 640, height: 360 }),
];

impl Resolution {
    /// Parse a preset label (case-insensitive) or an explicit `WxH`.
    pub fn parse(input: &str) -> CutroomResult<Self> {
        let trimmed = input.trim();
        if let Some((_, preset)) = RESOLUTION_PRESETS
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(trimmed))
        {
            return Ok(*preset);
        }

        let (w, h) = trimmed
            .split_once(['x', 'X'])
            .ok_or_else(|| CutroomError::config(format!("Unknown resolution '{trimmed}'")))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| CutroomError::config(format!("Invalid width in '{trimmed}'")))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| CutroomError::config(format!("Invalid height in '{trimmed}'")))?;
        if width == 0 || height == 0 {
            return Err(CutroomError::config(format!(
                "Resolution must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self::Fixed { width, height })
    }

    /// Preset label, or `WxH` for non-preset sizes.
    pub fn label(&self) -> String {
        RESOLUTION_PRESETS
            .iter()
            .find(|(_, preset)| preset == self)
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| match self {
                Self::Original => "Original".to_string(),
                Self::Fixed { width, height } => format!("{width}x{height}"),
            })
    }

    pub fn is_original(&self) -> bool {
        matches!(self, Self::Original)
    }

    /// Output dimensions for a source of the given natural size.
    pub fn dimensions(&self, natural_width: u32, natural_height: u32) -> (u32, u32) {
        match *self {
            Self::Original => (natural_width, natural_height),
            Self::Fixed { width, height } => (width, height),
        }
    }
}
