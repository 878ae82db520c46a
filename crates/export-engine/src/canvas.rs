//! Real-time rasterize-and-record export.
//!
//! The source is stepped one frame at a time from `start` towards `end`. Each
//! tick rasterizes the current picture onto an [`RgbaSurface`] whose live
//! stream feeds a [`Recorder`]. Ticks are paced by the refresh clock, so this
//! strategy never runs faster than 1x playback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use cutroom_common::config::ExportDefaults;
use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::job::{ExportJob, OutputArtifact, StrategyKind};
use cutroom_media_model::source::{MediaContainer, SourceMedia};

use crate::codec::concat_chunks;
use crate::frame::{ChunkSink, DecodedPicture, EncodedPayload, Frame, FrameLedger};
use crate::progress::{ExportStage, ProgressReporter};
use crate::resources::{Closeable, Closing};
use crate::strategy::ExportStrategy;
use crate::surface::RgbaSurface;

/// A renderable view of the source, separate from any preview handle.
#[async_trait]
pub trait SourceSurface: Closeable + Send {
    fn natural_size(&self) -> (u32, u32);

    /// Move to `secs`; resolves with the confirmed position.
    async fn seek(&mut self, secs: f64) -> CutroomResult<f64>;

    /// The picture at the confirmed position.
    fn current_picture(&mut self) -> CutroomResult<DecodedPicture>;
}

/// Recorder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u64,
}

/// Incremental encoder consuming a live capture stream.
pub trait Recorder: Closeable + Send {
    /// Begin consuming `stream`, delivering encoded output to `chunks` in
    /// arrival order.
    fn start(
        &mut self,
        stream: mpsc::Receiver<Frame>,
        chunks: mpsc::UnboundedSender<EncodedPayload>,
    ) -> CutroomResult<()>;

    /// Stop signal. Resolves once every chunk has been delivered; the
    /// capture stream must already be closed for it to resolve.
    fn stop(&mut self) -> oneshot::Receiver<CutroomResult<()>>;
}

/// Provider of capture surfaces and recorders.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn open_source(&self, source: &SourceMedia) -> CutroomResult<Box<dyn SourceSurface>>;

    fn create_recorder(&self, config: &RecorderConfig) -> CutroomResult<Box<dyn Recorder>>;
}

/// States of one capture job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    Idle,
    SeekToStart,
    Capturing { position: f64 },
    Stopping,
    Finalized,
    Failed,
}

/// Counters from the last run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub ticks: u64,
    pub frames_published: u64,
    pub chunks: u64,
}

/// Fallback strategy: render each frame and record the surface.
pub struct CanvasCaptureStrategy {
    backend: Arc<dyn CaptureBackend>,
    settings: ExportDefaults,
    ledger: FrameLedger,
    state: CaptureState,
    stats: CaptureStats,
}

impl CanvasCaptureStrategy {
    pub fn new(backend: Arc<dyn CaptureBackend>, settings: ExportDefaults, ledger: FrameLedger) -> Self {
        Self {
            backend,
            settings,
            ledger,
            state: CaptureState::Idle,
            stats: CaptureStats::default(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    fn transition(&mut self, next: CaptureState) {
        tracing::trace!(from = ?self.state, to = ?next, "Capture state change");
        self.state = next;
    }

    async fn run(
        &mut self,
        job: &ExportJob,
        progress: &ProgressReporter,
    ) -> CutroomResult<OutputArtifact> {
        let mut source = Closing::new(self.backend.open_source(&job.source)?);
        let (width, height) = if job.resolution.is_original() {
            source.natural_size()
        } else {
            job.output_dimensions()
        };
        let fps = job.source.fps.max(1);
        let start = job.range.start();
        let end = job.range.end();

        let (stream_tx, stream_rx) = mpsc::channel(self.settings.queue_depth.max(1));
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();

        let mut surface = RgbaSurface::new(
            width,
            height,
            self.settings.draw_rect,
            self.ledger.clone(),
            stream_tx,
        )?;
        let mut recorder = Closing::new(
            self.backend
                .create_recorder(&RecorderConfig {
                    width,
                    height,
                    fps,
                    bitrate_bps: self.settings.bitrate_bps,
                })
                .map_err(|e| match e {
                    CutroomError::RecorderInitFailed { .. } => e,
                    other => CutroomError::recorder_init(other.to_string()),
                })?,
        );
        recorder.start(stream_rx, chunk_tx).map_err(|e| match e {
            CutroomError::RecorderInitFailed { .. } => e,
            other => CutroomError::recorder_init(other.to_string()),
        })?;

        self.transition(CaptureState::SeekToStart);
        progress.stage(ExportStage::Seeking);
        let mut position = source.seek(start).await?;

        self.transition(CaptureState::Capturing { position });
        progress.stage(ExportStage::Capturing);

        let refresh = Duration::from_secs_f64(1.0 / f64::from(self.settings.refresh_hz.max(1)));
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Positions derive from the frame index so long windows do not drift.
        let mut index: u64 = 0;
        loop {
            ticker.tick().await;
            self.stats.ticks += 1;

            let picture = source.current_picture()?;
            surface.draw(&picture)?;
            if !surface.publish(position).await {
                return Err(CutroomError::encoder("Recorder closed the capture stream early"));
            }

            index += 1;
            let next = start + index as f64 / f64::from(fps);
            if next >= end {
                break;
            }
            position = source.seek(next).await?;
            self.transition(CaptureState::Capturing { position });
        }

        self.transition(CaptureState::Stopping);
        progress.stage(ExportStage::Finalizing);
        self.stats.frames_published = surface.published();
        progress.add_frames(surface.published());
        surface.close();
        source.close();

        recorder
            .stop()
            .await
            .map_err(|_| CutroomError::encoder("Recorder went away before signalling stop"))??;
        recorder.close();

        let mut sink = ChunkSink::new();
        while let Ok(payload) = chunk_rx.try_recv() {
            sink.push(payload);
        }
        self.stats.chunks = sink.len() as u64;
        if sink.is_empty() {
            return Err(CutroomError::encoder("Recorder produced no output"));
        }

        let container = MediaContainer::Webm;
        let bytes = concat_chunks(sink.into_chunks())?;
        Ok(OutputArtifact::new(
            bytes,
            container,
            job.suggested_file_name(container, true),
        ))
    }
}

#[async_trait]
impl ExportStrategy for CanvasCaptureStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CanvasCapture
    }

    async fn export(
        &mut self,
        job: &ExportJob,
        progress: &ProgressReporter,
    ) -> CutroomResult<OutputArtifact> {
        self.state = CaptureState::Idle;
        self.stats = CaptureStats::default();
        tracing::info!(
            backend = self.backend.name(),
            start = job.range.start(),
            end = job.range.end(),
            resolution = %job.resolution.label(),
            "Starting canvas capture export"
        );

        match self.run(job, progress).await {
            Ok(artifact) => {
                self.transition(CaptureState::Finalized);
                tracing::debug!(stats = ?self.stats, "Canvas capture finished");
                Ok(artifact)
            }
            Err(e) => {
                self.transition(CaptureState::Failed);
                Err(e)
            }
        }
    }
}
