//! Strategy dispatch.

use async_trait::async_trait;

use cutroom_common::config::FidelityPreference;
use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::job::{ExportJob, OutputArtifact, StrategyChoice, StrategyKind};

use crate::progress::ProgressReporter;

/// One way of turning an [`ExportJob`] into an [`OutputArtifact`].
///
/// A strategy is chosen once per job and runs to completion or failure; it
/// never hands over to another strategy mid-job. Implementations release
/// every resource they opened before returning, on success and failure alike.
#[async_trait]
pub trait ExportStrategy: Send {
    fn kind(&self) -> StrategyKind;

    async fn export(
        &mut self,
        job: &ExportJob,
        progress: &ProgressReporter,
    ) -> CutroomResult<OutputArtifact>;
}

/// What the current environment can do, as probed before a job starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The external transcoder passed its readiness gate.
    pub transcoder_ready: bool,
    /// Raw decode/encode primitives are present.
    pub codec_primitives: bool,
    /// The source can be rendered onto a capture surface.
    pub capture_surface: bool,
}

impl Capabilities {
    pub fn supports(&self, kind: StrategyKind) -> bool {
        match kind {
            StrategyKind::ExternalTranscoder => self.transcoder_ready,
            StrategyKind::CodecPipeline => self.codec_primitives,
            StrategyKind::CanvasCapture => self.capture_surface,
        }
    }
}

/// Pick the strategy for `job`.
///
/// Priority under [`StrategyChoice::Auto`]:
/// 1. external transcoder, when ready and a stream copy is acceptable
///    (no resize, and speed preferred over frame-accurate cuts);
/// 2. codec pipeline, when decode/encode primitives exist;
/// 3. canvas capture, real-time bound but universally available.
pub fn select_strategy(job: &ExportJob, caps: &Capabilities) -> CutroomResult<StrategyKind> {
    if let StrategyChoice::Only(kind) = job.strategy {
        if caps.supports(kind) {
            return Ok(kind);
        }
        return Err(CutroomError::unsupported(format!(
            "Requested strategy '{}' is not available",
            kind.as_str()
        )));
    }

    let copy_acceptable =
        job.resolution.is_original() && job.fidelity != FidelityPreference::Accuracy;
    if caps.transcoder_ready && copy_acceptable {
        return Ok(StrategyKind::ExternalTranscoder);
    }
    if caps.codec_primitives {
        return Ok(StrategyKind::CodecPipeline);
    }
    if caps.capture_surface {
        return Ok(StrategyKind::CanvasCapture);
    }
    if caps.transcoder_ready {
        return Err(CutroomError::unsupported(
            "Only stream copy is available, and it cannot resize or cut frame-accurately",
        ));
    }
    Err(CutroomError::unsupported("No export strategy is available"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutroom_media_model::range::TimeRange;
    use cutroom_media_model::source::{Resolution, SourceMedia, SourceMetadata};

    fn job(resolution: Resolution) -> ExportJob {
        let source = SourceMedia::new(
            "clip.mp4",
            "video/mp4",
            SourceMetadata {
                duration_secs: 10.0,
                natural_width: 640,
                natural_height: 360,
                byte_size: 1000,
                fps: Some(30),
                video_codec: None,
            },
        )
        .unwrap();
        let range = TimeRange::new(10.0, 30).unwrap();
        ExportJob::new(source, range, resolution)
    }

    const ALL: Capabilities = Capabilities {
        transcoder_ready: true,
        codec_primitives: true,
        capture_surface: true,
    };

    #[test]
    fn transcoder_wins_for_original_resolution() {
        let kind = select_strategy(&job(Resolution::Original), &ALL).unwrap();
        assert_eq!(kind, StrategyKind::ExternalTranscoder);
    }

    #[test]
    fn resize_skips_stream_copy() {
        let kind = select_strategy(&job(Resolution::parse("480p").unwrap()), &ALL).unwrap();
        assert_eq!(kind, StrategyKind::CodecPipeline);
    }

    #[test]
    fn accuracy_preference_skips_stream_copy() {
        let job = job(Resolution::Original).with_fidelity(FidelityPreference::Accuracy);
        assert_eq!(
            select_strategy(&job, &ALL).unwrap(),
            StrategyKind::CodecPipeline
        );
    }

    #[test]
    fn canvas_is_the_fallback() {
        let caps = Capabilities {
            capture_surface: true,
            ..Capabilities::default()
        };
        assert_eq!(
            select_strategy(&job(Resolution::Original), &caps).unwrap(),
            StrategyKind::CanvasCapture
        );
    }

    #[test]
    fn nothing_available_is_unsupported() {
        let err = select_strategy(&job(Resolution::Original), &Capabilities::default())
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported");

        let caps = Capabilities {
            transcoder_ready: true,
            ..Capabilities::default()
        };
        let err = select_strategy(&job(Resolution::parse("720p").unwrap()), &caps).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
    }

    #[test]
    fn explicit_choice_is_honoured_or_rejected() {
        let job = job(Resolution::Original)
            .with_strategy(StrategyChoice::Only(StrategyKind::CanvasCapture));
        assert_eq!(
            select_strategy(&job, &ALL).unwrap(),
            StrategyKind::CanvasCapture
        );
        let caps = Capabilities {
            codec_primitives: true,
            ..Capabilities::default()
        };
        assert!(select_strategy(&job, &caps).is_err());
    }
}
