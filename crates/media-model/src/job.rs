//! Export job description and the artifact it produces.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cutroom_common::config::FidelityPreference;
use cutroom_common::error::{CutroomError, CutroomResult};

use crate::range::TimeRange;
use crate::source::{MediaContainer, Resolution, SourceMedia};

/// Filename stem used when the source has no usable base name.
pub const DEFAULT_OUTPUT_STEM: &str = "trimmed-video";

/// The three interchangeable export strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Stream-copy trim through the external transcoder.
    ExternalTranscoder,
    /// Decode, filter by timestamp, re-encode.
    CodecPipeline,
    /// Real-time rasterize-and-record.
    CanvasCapture,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalTranscoder => "external-transcoder",
            Self::CodecPipeline => "codec-pipeline",
            Self::CanvasCapture => "canvas-capture",
        }
    }
}

/// How the strategy for a job is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Probe capabilities in priority order.
    #[default]
    Auto,
    /// Use exactly this strategy, or fail if it is unavailable.
    Only(StrategyKind),
}

/// One export request: a source, a window, and an output size.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub source: SourceMedia,
    pub range: TimeRange,
    pub resolution: Resolution,
    pub strategy: StrategyChoice,
    pub fidelity: FidelityPreference,
}

impl ExportJob {
    pub fn new(source: SourceMedia, range: TimeRange, resolution: Resolution) -> Self {
        Self {
            source,
            range,
            resolution,
            strategy: StrategyChoice::Auto,
            fidelity: FidelityPreference::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyChoice) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_fidelity(mut self, fidelity: FidelityPreference) -> Self {
        self.fidelity = fidelity;
        self
    }

    /// Reject jobs whose range was built for a different source.
    pub fn validate(&self) -> CutroomResult<()> {
        if (self.range.duration() - self.source.duration_secs).abs() > 1e-6 {
            return Err(CutroomError::invalid_range(format!(
                "range built for a {:.3}s source, job source is {:.3}s",
                self.range.duration(),
                self.source.duration_secs
            )));
        }
        if let Resolution::Fixed { width, height } = self.resolution {
            if width == 0 || height == 0 {
                return Err(CutroomError::config(format!(
                    "Output resolution must be non-zero, got {width}x{height}"
                )));
            }
        }
        Ok(())
    }

    /// Output frame size after applying the requested resolution.
    pub fn output_dimensions(&self) -> (u32, u32) {
        self.resolution
            .dimensions(self.source.natural_width, self.source.natural_height)
    }

    /// `<base>-trimmed[-<label>].<ext>`, or a fixed default stem when the
    /// source has no usable name. Never equal to the source's own file name.
    pub fn suggested_file_name(&self, container: MediaContainer, with_label: bool) -> String {
        let stem = match self.source.base_name() {
            Some(base) => format!("{base}-trimmed"),
            None => DEFAULT_OUTPUT_STEM.to_string(),
        };
        if with_label {
            format!(
                "{stem}-{}.{}",
                self.resolution.label(),
                container.extension()
            )
        } else {
            format!("{stem}.{}", container.extension())
        }
    }
}

/// Finished export bytes handed to the download collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub suggested_file_name: String,
}

impl OutputArtifact {
    pub fn new(bytes: Vec<u8>, container: MediaContainer, suggested_file_name: String) -> Self {
        Self {
            bytes,
            mime_type: container.mime_type().to_string(),
            suggested_file_name,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the artifact into `dir` under its suggested name.
    pub fn write_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.suggested_file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}
