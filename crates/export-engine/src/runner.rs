//! Job runner: validate, probe capabilities, select once, export.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use cutroom_common::clock::JobClock;
use cutroom_common::config::{AppConfig, ExportDefaults};
use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::job::{ExportJob, OutputArtifact, StrategyKind};

use crate::canvas::{CanvasCaptureStrategy, CaptureBackend};
use crate::codec::{CodecBackend, CodecPipelineStrategy};
use crate::ffmpeg::{FfmpegCaptureBackend, FfmpegCodecBackend, FfmpegTranscoder};
use crate::frame::FrameLedger;
use crate::progress::{ExportStage, ProgressCallback, ProgressReporter};
use crate::strategy::{select_strategy, Capabilities, ExportStrategy};
use crate::transcoder::{ExternalTranscoderStrategy, Transcoder, TranscoderRuntime};

/// Collaborators available to export jobs.
#[derive(Clone)]
pub struct ExportToolkit {
    pub settings: ExportDefaults,
    pub transcoder: Option<Arc<TranscoderRuntime>>,
    pub codec: Option<Arc<dyn CodecBackend>>,
    pub capture: Option<Arc<dyn CaptureBackend>>,
}

impl ExportToolkit {
    pub fn new(settings: ExportDefaults) -> Self {
        Self {
            settings,
            transcoder: None,
            codec: None,
            capture: None,
        }
    }

    pub fn with_transcoder(mut self, runtime: Arc<TranscoderRuntime>) -> Self {
        self.transcoder = Some(runtime);
        self
    }

    pub fn with_codec(mut self, backend: Arc<dyn CodecBackend>) -> Self {
        self.codec = Some(backend);
        self
    }

    pub fn with_capture(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.capture = Some(backend);
        self
    }

    /// Everything backed by the configured ffmpeg binary.
    ///
    /// Starts loading the process-wide transcoder; a missing binary leaves
    /// the readiness gate closed rather than failing here.
    pub async fn ffmpeg(config: &AppConfig) -> Self {
        let runtime = TranscoderRuntime::global();
        let transcoder_config = config.transcoder.clone();
        if let Err(e) = runtime
            .init(|| FfmpegTranscoder::load(transcoder_config))
            .await
        {
            tracing::warn!(error = %e, "Stream copy unavailable");
        }

        Self::new(config.export.clone())
            .with_transcoder(runtime)
            .with_codec(Arc::new(FfmpegCodecBackend::new(config.transcoder.ffmpeg.clone())))
            .with_capture(Arc::new(FfmpegCaptureBackend::new(
                config.transcoder.ffmpeg.clone(),
            )))
    }

    /// Probe every collaborator. Awaits the transcoder readiness gate.
    pub async fn capabilities(&self) -> (Capabilities, Option<Arc<dyn Transcoder>>) {
        let transcoder = match &self.transcoder {
            Some(runtime) => {
                runtime
                    .wait_ready(Duration::from_millis(
                        self.settings.transcoder_ready_timeout_ms,
                    ))
                    .await
            }
            None => None,
        };
        let caps = Capabilities {
            transcoder_ready: transcoder.is_some(),
            codec_primitives: self.codec.as_ref().is_some_and(|c| c.is_available()),
            capture_surface: self.capture.as_ref().is_some_and(|c| c.is_available()),
        };
        tracing::debug!(?caps, "Export capabilities");
        (caps, transcoder)
    }

    fn build(
        &self,
        kind: StrategyKind,
        transcoder: Option<Arc<dyn Transcoder>>,
        ledger: &FrameLedger,
    ) -> CutroomResult<Box<dyn ExportStrategy>> {
        let missing = || CutroomError::unsupported(format!("'{}' has no backend", kind.as_str()));
        let strategy: Box<dyn ExportStrategy> = match kind {
            StrategyKind::ExternalTranscoder => {
                Box::new(ExternalTranscoderStrategy::new(transcoder.ok_or_else(missing)?))
            }
            StrategyKind::CodecPipeline => Box::new(CodecPipelineStrategy::new(
                self.codec.clone().ok_or_else(missing)?,
                self.settings.clone(),
                ledger.clone(),
            )),
            StrategyKind::CanvasCapture => Box::new(CanvasCaptureStrategy::new(
                self.capture.clone().ok_or_else(missing)?,
                self.settings.clone(),
                ledger.clone(),
            )),
        };
        Ok(strategy)
    }
}

/// A finished job.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub artifact: OutputArtifact,
    pub summary: ExportSummary,
}

/// Serializable description of a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub strategy: StrategyKind,
    pub start_secs: f64,
    pub end_secs: f64,
    pub bytes: u64,
    pub frames_encoded: u64,
    pub elapsed_secs: f64,
    pub started_at: String,
    pub finished_at: String,
}

/// Run one export job to completion.
///
/// Strategy choice happens once, before any work; a failure mid-job is
/// surfaced as-is, never retried with another strategy.
pub async fn run_export(
    job: &ExportJob,
    toolkit: &ExportToolkit,
    progress: Option<ProgressCallback>,
) -> CutroomResult<ExportOutcome> {
    let reporter = ProgressReporter::new(progress);
    reporter.stage(ExportStage::Preparing);

    let result = run_inner(job, toolkit, &reporter).await;
    match &result {
        Ok(outcome) => {
            reporter.stage(ExportStage::Complete);
            tracing::info!(
                strategy = outcome.summary.strategy.as_str(),
                bytes = outcome.summary.bytes,
                frames = outcome.summary.frames_encoded,
                elapsed_secs = outcome.summary.elapsed_secs,
                file = %outcome.artifact.suggested_file_name,
                "Export complete"
            );
        }
        Err(e) => {
            reporter.stage(ExportStage::Failed);
            tracing::error!(kind = e.kind(), error = %e, "Export failed");
        }
    }
    result
}

async fn run_inner(
    job: &ExportJob,
    toolkit: &ExportToolkit,
    reporter: &ProgressReporter,
) -> CutroomResult<ExportOutcome> {
    job.validate()?;

    let (caps, transcoder) = toolkit.capabilities().await;
    let kind = select_strategy(job, &caps)?;
    tracing::info!(
        strategy = kind.as_str(),
        start = job.range.start(),
        end = job.range.end(),
        "Strategy selected"
    );

    let ledger = FrameLedger::new();
    let mut strategy = toolkit.build(kind, transcoder, &ledger)?;
    let result = strategy.export(job, reporter).await;
    drop(strategy);

    let outstanding = ledger.outstanding();
    if outstanding != 0 {
        tracing::error!(outstanding, issued = ledger.issued(), "Frames leaked by export");
        if result.is_ok() {
            return Err(CutroomError::Other(anyhow::anyhow!(
                "{outstanding} frames were not released"
            )));
        }
    }
    let artifact = result?;

    let clock: &JobClock = reporter.clock();
    let summary = ExportSummary {
        strategy: kind,
        start_secs: job.range.start(),
        end_secs: job.range.end(),
        bytes: artifact.len() as u64,
        frames_encoded: reporter.frames_encoded(),
        elapsed_secs: clock.elapsed_secs(),
        started_at: clock.epoch_wall().to_string(),
        finished_at: JobClock::now_wall(),
    };
    Ok(ExportOutcome { artifact, summary })
}
