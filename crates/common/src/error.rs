//! Error types shared across Cutroom crates.

use std::path::PathBuf;

/// Top-level error type for Cutroom operations.
///
/// The pipeline variants mirror the export failure taxonomy: every one of them
/// aborts the current job outright, after resource cleanup has run.
#[derive(Debug, thiserror::Error)]
pub enum CutroomError {
    #[error("Invalid range: {message}")]
    InvalidRange { message: String },

    #[error("Unsupported source: {message}")]
    UnsupportedSource { message: String },

    #[error("Capture surface unavailable: {message}")]
    CaptureSurfaceUnavailable { message: String },

    #[error("Recorder initialization failed: {message}")]
    RecorderInitFailed { message: String },

    #[error("Decoder error: {message}")]
    DecoderError { message: String },

    #[error("Encoder error: {message}")]
    EncoderError { message: String },

    #[error("No frames in range [{start_secs:.3}s, {end_secs:.3}s]")]
    NoFramesInRange { start_secs: f64, end_secs: f64 },

    #[error("External transcode failed: {message}")]
    ExternalTranscodeFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CutroomError.
pub type CutroomResult<T> = Result<T, CutroomError>;

impl CutroomError {
    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: msg.into(),
        }
    }

    pub fn unsupported_source(msg: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            message: msg.into(),
        }
    }

    pub fn surface_unavailable(msg: impl Into<String>) -> Self {
        Self::CaptureSurfaceUnavailable {
            message: msg.into(),
        }
    }

    pub fn recorder_init(msg: impl Into<String>) -> Self {
        Self::RecorderInitFailed {
            message: msg.into(),
        }
    }

    pub fn decoder(msg: impl Into<String>) -> Self {
        Self::DecoderError {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::EncoderError {
            message: msg.into(),
        }
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::ExternalTranscodeFailed {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Stable short identifier, used as a structured log field and in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::UnsupportedSource { .. } => "unsupported_source",
            Self::CaptureSurfaceUnavailable { .. } => "capture_surface_unavailable",
            Self::RecorderInitFailed { .. } => "recorder_init_failed",
            Self::DecoderError { .. } => "decoder_error",
            Self::EncoderError { .. } => "encoder_error",
            Self::NoFramesInRange { .. } => "no_frames_in_range",
            Self::ExternalTranscodeFailed { .. } => "external_transcode_failed",
            Self::Config { .. } => "config",
            Self::FileNotFound { .. } => "file_not_found",
            Self::Unsupported { .. } => "unsupported",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_frames_message_includes_window() {
        let err = CutroomError::NoFramesInRange {
            start_secs: 20.0,
            end_secs: 25.0,
        };
        assert_eq!(err.to_string(), "No frames in range [20.000s, 25.000s]");
        assert_eq!(err.kind(), "no_frames_in_range");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: CutroomError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
