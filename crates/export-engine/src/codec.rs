//! Decode → filter → encode export.
//!
//! ```text
//! decoder ──(blocking task)──► window filter ──► mpsc(queue_depth) ──► encoder ──► chunk sink ──► muxer
//!                                   │
//!                                   └── out-of-window frames closed immediately
//! ```
//!
//! Decode runs on its own blocking task and hands in-window frames to the
//! encode loop through a bounded channel, so at most `queue_depth` decoded
//! frames are resident at once. The encoder is configured lazily from the
//! first in-window frame.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use cutroom_common::config::ExportDefaults;
use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::job::{ExportJob, OutputArtifact, StrategyKind};
use cutroom_media_model::source::{MediaContainer, SourceMedia};

use crate::frame::{ChunkSink, DecodedPicture, EncodedChunk, EncodedPayload, Frame, FrameLedger};
use crate::progress::{ExportStage, ProgressReporter};
use crate::resources::{Closeable, Closing};
use crate::strategy::ExportStrategy;

/// Tolerance for comparing frame timestamps against the window bounds.
const TIMESTAMP_EPSILON: f64 = 1e-6;

/// Compressed stream → decoded pictures.
pub trait VideoDecoder: Closeable + Send {
    /// Decode the next unit of input. `Ok(None)` means end of stream.
    fn decode_next(&mut self) -> CutroomResult<Option<Vec<DecodedPicture>>>;

    /// Emit any pictures still buffered after end of stream.
    fn flush(&mut self) -> CutroomResult<Vec<DecodedPicture>>;
}

/// Raw frames → encoded payloads.
pub trait VideoEncoder: Closeable + Send {
    fn configure(&mut self, config: &EncoderConfig) -> CutroomResult<()>;

    fn encode(&mut self, frame: &Frame, key_frame: bool) -> CutroomResult<Vec<EncodedPayload>>;

    /// Emit everything still buffered. Called once, after the last frame.
    fn flush(&mut self) -> CutroomResult<Vec<EncodedPayload>>;
}

/// Joins sequenced chunks into one container byte stream.
pub trait Muxer: Send {
    fn mux(&mut self, chunks: Vec<EncodedChunk>, config: &EncoderConfig) -> CutroomResult<Vec<u8>>;
}

/// Output codec for re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp8,
    H264,
}

impl VideoCodec {
    pub fn container(&self) -> MediaContainer {
        match self {
            Self::Vp8 => MediaContainer::Webm,
            Self::H264 => MediaContainer::Mp4,
        }
    }
}

/// Encoder parameters, fixed for the whole job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncoderConfig {
    pub codec: VideoCodec,
    /// Coded size of incoming frames.
    pub input_width: u32,
    pub input_height: u32,
    /// Size of the encoded output.
    pub output_width: u32,
    pub output_height: u32,
    pub bitrate_bps: u64,
    pub fps: u32,
    pub keyframe_interval: u32,
}

impl EncoderConfig {
    pub fn container(&self) -> MediaContainer {
        self.codec.container()
    }
}

/// Muxer for encoders whose payloads are already container bytes.
///
/// Chunks must arrive in strictly increasing sequence order; they are
/// concatenated as-is.
#[derive(Debug, Default)]
pub struct ConcatMuxer;

impl Muxer for ConcatMuxer {
    fn mux(&mut self, chunks: Vec<EncodedChunk>, _config: &EncoderConfig) -> CutroomResult<Vec<u8>> {
        concat_chunks(chunks)
    }
}

/// Concatenate chunks, rejecting any out-of-order sequence.
pub fn concat_chunks(chunks: Vec<EncodedChunk>) -> CutroomResult<Vec<u8>> {
    let total: usize = chunks.iter().map(|c| c.bytes.len()).sum();
    let mut out = Vec::with_capacity(total);
    let mut previous: Option<u64> = None;
    for chunk in chunks {
        if let Some(prev) = previous {
            if chunk.sequence_index <= prev {
                return Err(CutroomError::encoder(format!(
                    "Chunk {} arrived after chunk {prev}",
                    chunk.sequence_index
                )));
            }
        }
        previous = Some(chunk.sequence_index);
        out.extend_from_slice(&chunk.bytes);
    }
    Ok(out)
}

/// Handles opened for one job, against a dedicated view of the source.
pub struct CodecSession {
    pub decoder: Box<dyn VideoDecoder>,
    pub encoder: Box<dyn VideoEncoder>,
    pub muxer: Box<dyn Muxer>,
}

/// Provider of decode/encode primitives.
pub trait CodecBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Output codec this backend encodes to.
    fn codec(&self) -> VideoCodec {
        VideoCodec::Vp8
    }

    /// Open a decoder over a fresh handle on `source`, plus an unconfigured encoder.
    fn open(&self, source: &SourceMedia) -> CutroomResult<CodecSession>;
}

/// Counters from the last run, for tests and the job summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_decoded: u64,
    pub frames_in_window: u64,
    pub frames_dropped: u64,
    pub frames_encoded: u64,
    pub chunks: u64,
}

#[derive(Debug)]
struct DecodeReport {
    decoded: u64,
    in_window: u64,
    dropped: u64,
    result: CutroomResult<()>,
}

impl DecodeReport {
    fn new() -> Self {
        Self {
            decoded: 0,
            in_window: 0,
            dropped: 0,
            result: Ok(()),
        }
    }
}

/// Re-encoding strategy built on a [`CodecBackend`].
pub struct CodecPipelineStrategy {
    backend: Arc<dyn CodecBackend>,
    settings: ExportDefaults,
    ledger: FrameLedger,
    stats: PipelineStats,
}

impl CodecPipelineStrategy {
    pub fn new(backend: Arc<dyn CodecBackend>, settings: ExportDefaults, ledger: FrameLedger) -> Self {
        Self {
            backend,
            settings,
            ledger,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    fn encoder_config(&self, job: &ExportJob, first: &Frame) -> EncoderConfig {
        let (output_width, output_height) = if job.resolution.is_original() {
            (first.width(), first.height())
        } else {
            job.output_dimensions()
        };
        EncoderConfig {
            codec: self.backend.codec(),
            input_width: first.width(),
            input_height: first.height(),
            output_width,
            output_height,
            bitrate_bps: self.settings.bitrate_bps,
            fps: job.source.fps,
            keyframe_interval: self.settings.keyframe_interval.max(1),
        }
    }

    async fn encode_stage(
        &mut self,
        job: &ExportJob,
        encoder: &mut Closing<dyn VideoEncoder>,
        frames: &mut mpsc::Receiver<Frame>,
        sink: &mut ChunkSink,
        progress: &ProgressReporter,
    ) -> CutroomResult<Option<EncoderConfig>> {
        let start = job.range.start();
        let len = job.range.len_secs();
        let mut config: Option<EncoderConfig> = None;

        while let Some(frame) = frames.recv().await {
            if config.is_none() {
                let cfg = self.encoder_config(job, &frame);
                tracing::debug!(
                    input = %format!("{}x{}", cfg.input_width, cfg.input_height),
                    output = %format!("{}x{}", cfg.output_width, cfg.output_height),
                    bitrate = cfg.bitrate_bps,
                    fps = cfg.fps,
                    "Configuring encoder from first in-window frame"
                );
                encoder.configure(&cfg)?;
                config = Some(cfg);
            }
            let interval = config.as_ref().map_or(1, |cfg| u64::from(cfg.keyframe_interval));

            let key_frame = self.stats.frames_encoded % interval == 0;
            let timestamp = frame.timestamp_secs();
            let payloads = encoder.encode(&frame, key_frame)?;
            frame.close();

            sink.extend(payloads);
            self.stats.frames_encoded += 1;
            progress.add_frames(1);
            if len > 0.0 {
                progress.report(ExportStage::Encoding, (timestamp - start) / len);
            }
        }

        Ok(config)
    }

    async fn run(
        &mut self,
        job: &ExportJob,
        session: CodecSession,
        progress: &ProgressReporter,
    ) -> CutroomResult<OutputArtifact> {
        let CodecSession {
            decoder,
            encoder,
            mut muxer,
        } = session;
        let decoder = Closing::new(decoder);
        let mut encoder = Closing::new(encoder);

        let (tx, mut rx) = mpsc::channel(self.settings.queue_depth.max(1));
        let window = (job.range.start(), job.range.end());
        let ledger = self.ledger.clone();

        progress.stage(ExportStage::Decoding);
        let decode_task =
            tokio::task::spawn_blocking(move || decode_stage(decoder, ledger, window, tx));

        let mut sink = ChunkSink::new();
        let encoded = self
            .encode_stage(job, &mut encoder, &mut rx, &mut sink, progress)
            .await;

        // Unblocks the decode task if the encoder bailed out early.
        drop(rx);
        let decoded = decode_task
            .await
            .map_err(|e| CutroomError::decoder(format!("Decode task failed: {e}")))?;

        self.stats.frames_decoded = decoded.decoded;
        self.stats.frames_in_window = decoded.in_window;
        self.stats.frames_dropped = decoded.dropped;

        let config = encoded?;
        decoded.result?;
        let config = config.ok_or(CutroomError::NoFramesInRange {
            start_secs: window.0,
            end_secs: window.1,
        })?;

        progress.stage(ExportStage::Flushing);
        sink.extend(encoder.flush()?);
        encoder.close();
        self.stats.chunks = sink.len() as u64;

        progress.stage(ExportStage::Finalizing);
        let bytes = muxer.mux(sink.into_chunks(), &config)?;
        let container = config.container();
        Ok(OutputArtifact::new(
            bytes,
            container,
            job.suggested_file_name(container, false),
        ))
    }
}

/// Pull pictures until end of stream, routing in-window frames downstream.
fn decode_stage(
    mut decoder: Closing<dyn VideoDecoder>,
    ledger: FrameLedger,
    (start, end): (f64, f64),
    tx: mpsc::Sender<Frame>,
) -> DecodeReport {
    let mut report = DecodeReport::new();

    // Returns false once the encode side has hung up.
    let route = |picture: DecodedPicture, report: &mut DecodeReport| -> bool {
        report.decoded += 1;
        let frame = ledger.issue(picture);
        let ts = frame.timestamp_secs();
        if ts + TIMESTAMP_EPSILON < start || ts - TIMESTAMP_EPSILON > end {
            report.dropped += 1;
            frame.close();
            return true;
        }
        report.in_window += 1;
        tx.blocking_send(frame).is_ok()
    };

    loop {
        match decoder.decode_next() {
            Ok(Some(pictures)) => {
                for picture in pictures {
                    if !route(picture, &mut report) {
                        tracing::debug!("Encode stage closed; stopping decode");
                        decoder.close();
                        return report;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                report.result = Err(e);
                decoder.close();
                return report;
            }
        }
    }

    match decoder.flush() {
        Ok(pictures) => {
            for picture in pictures {
                if !route(picture, &mut report) {
                    break;
                }
            }
        }
        Err(e) => report.result = Err(e),
    }
    decoder.close();

    tracing::debug!(
        decoded = report.decoded,
        in_window = report.in_window,
        dropped = report.dropped,
        "Decode stage finished"
    );
    report
}

#[async_trait]
impl ExportStrategy for CodecPipelineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CodecPipeline
    }

    async fn export(
        &mut self,
        job: &ExportJob,
        progress: &ProgressReporter,
    ) -> CutroomResult<OutputArtifact> {
        self.stats = PipelineStats::default();
        progress.stage(ExportStage::Preparing);
        tracing::info!(
            backend = self.backend.name(),
            start = job.range.start(),
            end = job.range.end(),
            resolution = %job.resolution.label(),
            "Starting codec pipeline export"
        );

        let session = self.backend.open(&job.source)?;
        let result = self.run(job, session, progress).await;

        tracing::debug!(stats = ?self.stats, outstanding = self.ledger.outstanding(), "Codec pipeline finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64, bytes: &[u8]) -> EncodedChunk {
        EncodedChunk {
            bytes: bytes.to_vec(),
            is_key_frame: seq == 0,
            sequence_index: seq,
        }
    }

    #[test]
    fn concat_preserves_order() {
        let out = concat_chunks(vec![chunk(0, b"ab"), chunk(1, b"c"), chunk(5, b"d")]).unwrap();
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn concat_rejects_reordering() {
        let err = concat_chunks(vec![chunk(1, b"a"), chunk(0, b"b")]).unwrap_err();
        assert_eq!(err.kind(), "encoder_error");
    }

    #[test]
    fn codec_maps_to_container() {
        assert_eq!(VideoCodec::Vp8.container(), MediaContainer::Webm);
        assert_eq!(VideoCodec::H264.container(), MediaContainer::Mp4);
    }
}
