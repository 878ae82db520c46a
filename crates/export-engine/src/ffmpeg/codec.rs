//! Raw-frame decode and encode through ffmpeg subprocesses.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::source::SourceMedia;

use super::{command_exists, spawn_stderr_drain};
use crate::codec::{
    CodecBackend, CodecSession, ConcatMuxer, EncoderConfig, VideoCodec, VideoDecoder, VideoEncoder,
};
use crate::frame::{DecodedPicture, EncodedPayload, Frame};
use crate::resources::Closeable;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Decodes the whole source to RGBA at its nominal frame rate.
///
/// Frame `i` is stamped `i / fps`.
pub struct FfmpegFrameDecoder {
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: u32,
    index: u64,
}

impl FfmpegFrameDecoder {
    pub fn spawn(binary: &str, source: &SourceMedia) -> CutroomResult<Self> {
        if source.natural_width == 0 || source.natural_height == 0 {
            return Err(CutroomError::decoder("Source has no video dimensions"));
        }
        let mut child = Command::new(binary)
            .args(["-hide_banner", "-nostdin", "-v", "error", "-i"])
            .arg(&source.path)
            .args(["-an", "-vf"])
            .arg(format!("fps={}", source.fps))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CutroomError::decoder(format!("Failed to start {binary}: {e}")))?;
        let stderr = child.stderr.take().map(spawn_stderr_drain);
        tracing::debug!(pid = child.id(), path = %source.path.display(), "Decoder started");

        Ok(Self {
            child: Some(child),
            stderr,
            width: source.natural_width,
            height: source.natural_height,
            fps: source.fps.max(1),
            index: 0,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn finish(&mut self) -> CutroomResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| CutroomError::decoder(format!("Failed to wait on decoder: {e}")))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(CutroomError::decoder(format!(
                "Decoder exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl VideoDecoder for FfmpegFrameDecoder {
    fn decode_next(&mut self) -> CutroomResult<Option<Vec<DecodedPicture>>> {
        let frame_len = self.frame_len();
        let Some(stdout) = self.child.as_mut().and_then(|c| c.stdout.as_mut()) else {
            return Ok(None);
        };

        let mut pixels = vec![0u8; frame_len];
        match stdout.read_exact(&mut pixels) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finish()?;
                return Ok(None);
            }
            Err(e) => return Err(CutroomError::decoder(format!("Decoder read failed: {e}"))),
        }

        let timestamp_secs = self.index as f64 / f64::from(self.fps);
        self.index += 1;
        Ok(Some(vec![DecodedPicture {
            timestamp_secs,
            width: self.width,
            height: self.height,
            pixels,
        }]))
    }

    fn flush(&mut self) -> CutroomResult<Vec<DecodedPicture>> {
        self.finish()?;
        Ok(Vec::new())
    }
}

impl Closeable for FfmpegFrameDecoder {
    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(frames = self.index, "Decoder closed before end of stream");
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}

struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: std_mpsc::Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
}

/// Feeds RGBA frames to ffmpeg and forwards its container output as chunks.
///
/// Payloads are byte ranges of the muxed stream in arrival order, so they do
/// not line up with frame boundaries; keyframe cadence is enforced with `-g`.
pub struct FfmpegChunkEncoder {
    binary: String,
    process: Option<EncoderProcess>,
    frame_len: usize,
}

impl FfmpegChunkEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            process: None,
            frame_len: 0,
        }
    }

    fn encoder_args(config: &EncoderConfig) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostats",
            "-v",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend([
            "-s".to_string(),
            format!("{}x{}", config.input_width, config.input_height),
            "-r".to_string(),
            config.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ]);
        if (config.output_width, config.output_height) != (config.input_width, config.input_height)
        {
            args.push("-vf".to_string());
            args.push(format!(
                "scale={}:{}",
                config.output_width, config.output_height
            ));
        }
        let (codec, format) = match config.codec {
            VideoCodec::Vp8 => ("libvpx", "webm"),
            VideoCodec::H264 => ("libx264", "mp4"),
        };
        args.extend([
            "-c:v".to_string(),
            codec.to_string(),
            "-b:v".to_string(),
            config.bitrate_bps.to_string(),
            "-g".to_string(),
            config.keyframe_interval.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
        if config.codec == VideoCodec::H264 {
            args.push("-movflags".to_string());
            args.push("frag_keyframe+empty_moov".to_string());
        }
        args.extend(["-f".to_string(), format.to_string(), "pipe:1".to_string()]);
        args
    }

    fn drain(process: &EncoderProcess) -> Vec<EncodedPayload> {
        process
            .chunks
            .try_iter()
            .map(|data| EncodedPayload {
                data,
                is_key_frame: false,
            })
            .collect()
    }
}

impl VideoEncoder for FfmpegChunkEncoder {
    fn configure(&mut self, config: &EncoderConfig) -> CutroomResult<()> {
        if self.process.is_some() {
            return Err(CutroomError::encoder("Encoder is already configured"));
        }
        let args = Self::encoder_args(config);
        tracing::debug!(args = ?args, "Starting encoder");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CutroomError::encoder(format!("Failed to start {}: {e}", self.binary)))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CutroomError::encoder("Failed to capture encoder stdout"))?;
        let stderr = child.stderr.take().map(spawn_stderr_drain);

        let (tx, rx) = std_mpsc::channel();
        let reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });

        self.frame_len = config.input_width as usize * config.input_height as usize * 4;
        self.process = Some(EncoderProcess {
            child,
            stdin,
            chunks: rx,
            reader: Some(reader),
            stderr,
        });
        Ok(())
    }

    fn encode(&mut self, frame: &Frame, _key_frame: bool) -> CutroomResult<Vec<EncodedPayload>> {
        let frame_len = self.frame_len;
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| CutroomError::encoder("Encoder used before configure"))?;
        if frame.pixels().len() != frame_len {
            return Err(CutroomError::encoder(format!(
                "Frame at {:.3}s is {}x{}, encoder expects the first frame's size",
                frame.timestamp_secs(),
                frame.width(),
                frame.height()
            )));
        }
        let stdin = process
            .stdin
            .as_mut()
            .ok_or_else(|| CutroomError::encoder("Encoder input already closed"))?;
        stdin
            .write_all(frame.pixels())
            .map_err(|e| CutroomError::encoder(format!("Encoder write failed: {e}")))?;
        Ok(Self::drain(process))
    }

    fn flush(&mut self) -> CutroomResult<Vec<EncodedPayload>> {
        let Some(mut process) = self.process.take() else {
            return Ok(Vec::new());
        };
        drop(process.stdin.take());
        if let Some(reader) = process.reader.take() {
            let _ = reader.join();
        }
        let payloads = Self::drain(&process);
        let status = process
            .child
            .wait()
            .map_err(|e| CutroomError::encoder(format!("Failed to wait on encoder: {e}")))?;
        let stderr = process
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(CutroomError::encoder(format!(
                "Encoder exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(payloads)
    }
}

impl Closeable for FfmpegChunkEncoder {
    fn close(&mut self) {
        if let Some(mut process) = self.process.take() {
            drop(process.stdin.take());
            let _ = process.child.kill();
            let _ = process.child.wait();
            if let Some(reader) = process.reader.take() {
                let _ = reader.join();
            }
            if let Some(stderr) = process.stderr.take() {
                let _ = stderr.join();
            }
        }
    }
}

/// [`CodecBackend`] over the ffmpeg CLI.
pub struct FfmpegCodecBackend {
    binary: String,
    codec: VideoCodec,
}

impl FfmpegCodecBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            codec: VideoCodec::Vp8,
        }
    }

    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }
}

impl CodecBackend for FfmpegCodecBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn codec(&self) -> VideoCodec {
        self.codec
    }

    fn open(&self, source: &SourceMedia) -> CutroomResult<CodecSession> {
        Ok(CodecSession {
            decoder: Box::new(FfmpegFrameDecoder::spawn(&self.binary, source)?),
            encoder: Box::new(FfmpegChunkEncoder::new(self.binary.clone())),
            muxer: Box::new(ConcatMuxer),
        })
    }
}
