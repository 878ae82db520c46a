//! In-memory collaborators for export tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use cutroom_common::config::ExportDefaults;
use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_export_engine::canvas::{CaptureBackend, Recorder, RecorderConfig, SourceSurface};
use cutroom_export_engine::codec::{
    CodecBackend, CodecSession, ConcatMuxer, EncoderConfig, VideoDecoder, VideoEncoder,
};
use cutroom_export_engine::frame::{DecodedPicture, EncodedPayload, Frame, FrameLedger};
use cutroom_export_engine::resources::{Closeable, ResourceHandle, ResourceTracker};
use cutroom_export_engine::transcoder::Transcoder;
use cutroom_media_model::range::TimeRange;
use cutroom_media_model::source::{SourceMedia, SourceMetadata};

pub fn source(path: impl Into<PathBuf>, mime: &str, duration: f64, fps: u32) -> SourceMedia {
    SourceMedia::new(
        path,
        mime,
        SourceMetadata {
            duration_secs: duration,
            natural_width: 4,
            natural_height: 2,
            byte_size: 1_000,
            fps: Some(fps),
            video_codec: Some("synthetic".to_string()),
        },
    )
    .unwrap()
}

pub fn range(source: &SourceMedia, start: f64, end: f64) -> TimeRange {
    let mut range = TimeRange::new(source.duration_secs, source.fps).unwrap();
    range.set_range(start, end);
    range
}

pub fn fast_settings() -> ExportDefaults {
    ExportDefaults {
        refresh_hz: 1_000,
        queue_depth: 2,
        ..ExportDefaults::default()
    }
}

pub fn picture(ts: f64, width: u32, height: u32) -> DecodedPicture {
    DecodedPicture {
        timestamp_secs: ts,
        width,
        height,
        pixels: vec![(ts * 10.0) as u8; (width * height * 4) as usize],
    }
}

/// Where a synthetic pipeline should fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    DecodeAt(usize),
    EncodeAt(usize),
}

/// What the synthetic encoder saw.
#[derive(Debug, Default)]
pub struct EncodeLog {
    pub timestamps: Vec<f64>,
    pub key_frames: Vec<bool>,
    pub config: Option<EncoderConfig>,
    pub max_outstanding: usize,
    pub flushed: bool,
}

pub struct SyntheticDecoder {
    pictures: Vec<DecodedPicture>,
    next: usize,
    fault: Fault,
    handle: Option<ResourceHandle>,
}

impl VideoDecoder for SyntheticDecoder {
    fn decode_next(&mut self) -> CutroomResult<Option<Vec<DecodedPicture>>> {
        if self.fault == Fault::DecodeAt(self.next) {
            return Err(CutroomError::decoder("corrupt packet"));
        }
        let Some(picture) = self.pictures.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next += 1;
        Ok(Some(vec![picture]))
    }

    fn flush(&mut self) -> CutroomResult<Vec<DecodedPicture>> {
        Ok(Vec::new())
    }
}

impl Closeable for SyntheticDecoder {
    fn close(&mut self) {
        self.handle.take();
    }
}

pub struct SyntheticEncoder {
    log: Arc<Mutex<EncodeLog>>,
    ledger: FrameLedger,
    fault: Fault,
    handle: Option<ResourceHandle>,
}

impl VideoEncoder for SyntheticEncoder {
    fn configure(&mut self, config: &EncoderConfig) -> CutroomResult<()> {
        self.log.lock().unwrap().config = Some(config.clone());
        Ok(())
    }

    fn encode(&mut self, frame: &Frame, key_frame: bool) -> CutroomResult<Vec<EncodedPayload>> {
        let mut log = self.log.lock().unwrap();
        if self.fault == Fault::EncodeAt(log.timestamps.len()) {
            return Err(CutroomError::encoder("encoder rejected frame"));
        }
        log.max_outstanding = log.max_outstanding.max(self.ledger.outstanding());
        log.timestamps.push(frame.timestamp_secs());
        log.key_frames.push(key_frame);
        Ok(vec![EncodedPayload {
            data: vec![frame.timestamp_secs() as u8],
            is_key_frame: key_frame,
        }])
    }

    fn flush(&mut self) -> CutroomResult<Vec<EncodedPayload>> {
        self.log.lock().unwrap().flushed = true;
        Ok(vec![EncodedPayload {
            data: b"END".to_vec(),
            is_key_frame: false,
        }])
    }
}

impl Closeable for SyntheticEncoder {
    fn close(&mut self) {
        self.handle.take();
    }
}

/// Codec backend decoding a fixed list of timestamps.
pub struct SyntheticCodecBackend {
    pub timestamps: Vec<f64>,
    pub fault: Fault,
    pub tracker: ResourceTracker,
    pub ledger: FrameLedger,
    pub log: Arc<Mutex<EncodeLog>>,
}

impl SyntheticCodecBackend {
    pub fn new(timestamps: Vec<f64>, ledger: FrameLedger) -> Self {
        Self {
            timestamps,
            fault: Fault::None,
            tracker: ResourceTracker::new(),
            ledger,
            log: Arc::new(Mutex::new(EncodeLog::default())),
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }
}

impl CodecBackend for SyntheticCodecBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn open(&self, source: &SourceMedia) -> CutroomResult<CodecSession> {
        let pictures = self
            .timestamps
            .iter()
            .map(|&ts| picture(ts, source.natural_width, source.natural_height))
            .collect();
        Ok(CodecSession {
            decoder: Box::new(SyntheticDecoder {
                pictures,
                next: 0,
                fault: self.fault,
                handle: Some(self.tracker.acquire("decoder")),
            }),
            encoder: Box::new(SyntheticEncoder {
                log: Arc::clone(&self.log),
                ledger: self.ledger.clone(),
                fault: self.fault,
                handle: Some(self.tracker.acquire("encoder")),
            }),
            muxer: Box::new(ConcatMuxer),
        })
    }
}

/// Transcoder whose "media" files are `DUR=<seconds>` text.
#[derive(Default)]
pub struct InMemoryTranscoder {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub commands: Mutex<Vec<Vec<String>>>,
    pub fail_exec: bool,
}

impl InMemoryTranscoder {
    pub fn failing() -> Self {
        Self {
            fail_exec: true,
            ..Self::default()
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

pub fn media_duration(bytes: &[u8]) -> f64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.strip_prefix("DUR="))
        .and_then(|d| d.trim().parse().ok())
        .unwrap_or(-1.0)
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[async_trait]
impl Transcoder for InMemoryTranscoder {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn write_file(&self, name: &str, bytes: Vec<u8>) -> CutroomResult<()> {
        self.files.lock().unwrap().insert(name.to_string(), bytes);
        Ok(())
    }

    async fn exec(
        &self,
        args: Vec<String>,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> CutroomResult<()> {
        self.commands.lock().unwrap().push(args.clone());
        if self.fail_exec {
            return Err(CutroomError::transcode("exit status 1"));
        }
        let start: f64 = arg_after(&args, "-ss").and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let input = arg_after(&args, "-i").unwrap_or_default().to_string();
        let output = args.last().cloned().unwrap_or_default();

        let source_duration = {
            let files = self.files.lock().unwrap();
            let bytes = files
                .get(&input)
                .ok_or_else(|| CutroomError::transcode(format!("{input}: no such file")))?;
            media_duration(bytes)
        };
        let end: f64 = arg_after(&args, "-to")
            .and_then(|v| v.parse().ok())
            .unwrap_or(source_duration)
            .min(source_duration);
        let out_duration = (end - start).max(0.0);

        on_progress(out_duration / 2.0);
        on_progress(out_duration);
        self.files
            .lock()
            .unwrap()
            .insert(output, format!("DUR={out_duration:.3}").into_bytes());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> CutroomResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CutroomError::transcode(format!("{name}: no such file")))
    }

    async fn remove_file(&self, name: &str) -> CutroomResult<()> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Surface over a synthetic source; every seek is confirmed on the next poll.
pub struct FakeSurface {
    size: (u32, u32),
    position: f64,
    pub seeks: Arc<Mutex<Vec<f64>>>,
    handle: Option<ResourceHandle>,
}

#[async_trait]
impl SourceSurface for FakeSurface {
    fn natural_size(&self) -> (u32, u32) {
        self.size
    }

    async fn seek(&mut self, secs: f64) -> CutroomResult<f64> {
        tokio::task::yield_now().await;
        self.position = secs;
        self.seeks.lock().unwrap().push(secs);
        Ok(secs)
    }

    fn current_picture(&mut self) -> CutroomResult<DecodedPicture> {
        Ok(picture(self.position, self.size.0, self.size.1))
    }
}

impl Closeable for FakeSurface {
    fn close(&mut self) {
        self.handle.take();
    }
}

/// Recorder emitting one chunk per consumed frame.
pub struct FakeRecorder {
    stopped: Option<oneshot::Receiver<CutroomResult<()>>>,
    handle: Option<ResourceHandle>,
    pub frames_seen: Arc<Mutex<Vec<f64>>>,
    /// Simulated encode time per frame.
    pub per_frame_delay: Option<Duration>,
}

impl Recorder for FakeRecorder {
    fn start(
        &mut self,
        mut stream: mpsc::Receiver<Frame>,
        chunks: mpsc::UnboundedSender<EncodedPayload>,
    ) -> CutroomResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let seen = Arc::clone(&self.frames_seen);
        let delay = self.per_frame_delay;
        tokio::spawn(async move {
            let _ = chunks.send(EncodedPayload {
                data: b"WEBM".to_vec(),
                is_key_frame: true,
            });
            while let Some(frame) = stream.recv().await {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                seen.lock().unwrap().push(frame.timestamp_secs());
                let _ = chunks.send(EncodedPayload {
                    data: vec![frame.pixels()[0]],
                    is_key_frame: false,
                });
                frame.close();
            }
            let _ = done_tx.send(Ok(()));
        });
        self.stopped = Some(done_rx);
        Ok(())
    }

    fn stop(&mut self) -> oneshot::Receiver<CutroomResult<()>> {
        self.stopped.take().unwrap_or_else(|| {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Err(CutroomError::encoder("not started")));
            rx
        })
    }
}

impl Closeable for FakeRecorder {
    fn close(&mut self) {
        self.handle.take();
    }
}

pub struct FakeCaptureBackend {
    pub tracker: ResourceTracker,
    pub seeks: Arc<Mutex<Vec<f64>>>,
    pub frames_seen: Arc<Mutex<Vec<f64>>>,
    pub recorder_fails: bool,
    pub recorder_delay: Option<Duration>,
}

impl FakeCaptureBackend {
    pub fn new() -> Self {
        Self {
            tracker: ResourceTracker::new(),
            seeks: Arc::new(Mutex::new(Vec::new())),
            frames_seen: Arc::new(Mutex::new(Vec::new())),
            recorder_fails: false,
            recorder_delay: None,
        }
    }
}

impl CaptureBackend for FakeCaptureBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn open_source(&self, source: &SourceMedia) -> CutroomResult<Box<dyn SourceSurface>> {
        Ok(Box::new(FakeSurface {
            size: (source.natural_width, source.natural_height),
            position: 0.0,
            seeks: Arc::clone(&self.seeks),
            handle: Some(self.tracker.acquire("surface")),
        }))
    }

    fn create_recorder(&self, _config: &RecorderConfig) -> CutroomResult<Box<dyn Recorder>> {
        if self.recorder_fails {
            return Err(CutroomError::recorder_init("no encoder for video/webm"));
        }
        Ok(Box::new(FakeRecorder {
            stopped: None,
            handle: Some(self.tracker.acquire("recorder")),
            frames_seen: Arc::clone(&self.frames_seen),
            per_frame_delay: self.recorder_delay,
        }))
    }
}
