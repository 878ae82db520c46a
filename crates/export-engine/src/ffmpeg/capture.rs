//! Canvas-capture collaborators over ffmpeg.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::source::SourceMedia;

use super::command_exists;
use crate::canvas::{CaptureBackend, Recorder, RecorderConfig, SourceSurface};
use crate::frame::{DecodedPicture, EncodedPayload, Frame};
use crate::resources::Closeable;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Hand recorder output to the chunk channel; fails once nobody is listening.
fn forward_chunk(
    chunks: &mpsc::UnboundedSender<EncodedPayload>,
    data: &[u8],
) -> std::io::Result<()> {
    chunks
        .send(EncodedPayload {
            data: data.to_vec(),
            is_key_frame: false,
        })
        .map_err(|_| {
            tracing::warn!(bytes = data.len(), "Chunk receiver dropped; stopping recorder output");
            std::io::Error::other("chunk receiver dropped")
        })
}

/// Source surface that grabs one frame per seek.
pub struct FfmpegFrameGrabber {
    binary: String,
    path: PathBuf,
    width: u32,
    height: u32,
    position: f64,
    picture: Option<DecodedPicture>,
}

impl FfmpegFrameGrabber {
    pub fn new(binary: impl Into<String>, source: &SourceMedia) -> CutroomResult<Self> {
        if source.natural_width == 0 || source.natural_height == 0 {
            return Err(CutroomError::surface_unavailable(
                "Source has no video dimensions to render",
            ));
        }
        Ok(Self {
            binary: binary.into(),
            path: source.path.clone(),
            width: source.natural_width,
            height: source.natural_height,
            position: 0.0,
            picture: None,
        })
    }
}

#[async_trait]
impl SourceSurface for FfmpegFrameGrabber {
    fn natural_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn seek(&mut self, secs: f64) -> CutroomResult<f64> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-nostdin", "-v", "error", "-ss"])
            .arg(format!("{secs:.3}"))
            .arg("-i")
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CutroomError::decoder(format!("Failed to start {}: {e}", self.binary)))?;

        let expected = self.width as usize * self.height as usize * 4;
        if !output.status.success() || output.stdout.len() < expected {
            return Err(CutroomError::decoder(format!(
                "No frame at {secs:.3}s: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut pixels = output.stdout;
        pixels.truncate(expected);
        self.position = secs;
        self.picture = Some(DecodedPicture {
            timestamp_secs: secs,
            width: self.width,
            height: self.height,
            pixels,
        });
        Ok(secs)
    }

    fn current_picture(&mut self) -> CutroomResult<DecodedPicture> {
        self.picture.clone().ok_or_else(|| {
            CutroomError::decoder(format!("No picture decoded at {:.3}s", self.position))
        })
    }
}

impl Closeable for FfmpegFrameGrabber {
    fn close(&mut self) {
        self.picture = None;
    }
}

/// WebM/VP8 recorder fed by the capture stream.
pub struct FfmpegRecorder {
    binary: String,
    config: RecorderConfig,
    task: Option<JoinHandle<()>>,
    stopped: Option<oneshot::Receiver<CutroomResult<()>>>,
}

impl FfmpegRecorder {
    pub fn new(binary: impl Into<String>, config: RecorderConfig) -> CutroomResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(CutroomError::recorder_init(format!(
                "Cannot record a {}x{} stream",
                config.width, config.height
            )));
        }
        Ok(Self {
            binary: binary.into(),
            config,
            task: None,
            stopped: None,
        })
    }
}

impl Recorder for FfmpegRecorder {
    fn start(
        &mut self,
        mut stream: mpsc::Receiver<Frame>,
        chunks: mpsc::UnboundedSender<EncodedPayload>,
    ) -> CutroomResult<()> {
        if self.task.is_some() {
            return Err(CutroomError::recorder_init("Recorder already started"));
        }
        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-nostats", "-v", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-s"])
            .arg(format!("{}x{}", self.config.width, self.config.height))
            .arg("-r")
            .arg(self.config.fps.to_string())
            .args(["-i", "pipe:0", "-c:v", "libvpx", "-b:v"])
            .arg(self.config.bitrate_bps.to_string())
            .args(["-pix_fmt", "yuv420p", "-f", "webm", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CutroomError::recorder_init(format!("Failed to start {}: {e}", self.binary)))?;

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(CutroomError::recorder_init("Failed to capture recorder pipes"));
        };

        let (done_tx, done_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let writer = async move {
                while let Some(frame) = stream.recv().await {
                    stdin.write_all(frame.pixels()).await?;
                    frame.close();
                }
                stdin.shutdown().await?;
                Ok::<_, std::io::Error>(())
            };
            let reader = async move {
                let mut buf = vec![0u8; READ_CHUNK_BYTES];
                loop {
                    let n = stdout.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    forward_chunk(&chunks, &buf[..n])?;
                }
                Ok::<_, std::io::Error>(())
            };
            let diagnostics = async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            };

            let (written, read, diagnostics) = tokio::join!(writer, reader, diagnostics);
            let status = child.wait().await;
            let result = match (written, read, status) {
                (Ok(()), Ok(()), Ok(status)) if status.success() => Ok(()),
                (Err(e), _, _) | (_, Err(e), _) => Err(CutroomError::encoder(format!(
                    "Recorder pipe failed: {e}"
                ))),
                (_, _, Ok(status)) => Err(CutroomError::encoder(format!(
                    "Recorder exited with {status}: {}",
                    diagnostics.trim()
                ))),
                (_, _, Err(e)) => Err(CutroomError::encoder(format!(
                    "Failed to wait on recorder: {e}"
                ))),
            };
            let _ = done_tx.send(result);
        });

        self.task = Some(task);
        self.stopped = Some(done_rx);
        Ok(())
    }

    fn stop(&mut self) -> oneshot::Receiver<CutroomResult<()>> {
        match self.stopped.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(Err(CutroomError::encoder("Recorder was never started")));
                rx
            }
        }
    }
}

impl Closeable for FfmpegRecorder {
    fn close(&mut self) {
        self.stopped = None;
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                task.abort();
                tracing::debug!("Recorder aborted before finishing");
            }
        }
    }
}

/// [`CaptureBackend`] over the ffmpeg CLI.
pub struct FfmpegCaptureBackend {
    binary: String,
}

impl FfmpegCaptureBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl CaptureBackend for FfmpegCaptureBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn open_source(&self, source: &SourceMedia) -> CutroomResult<Box<dyn SourceSurface>> {
        Ok(Box::new(FfmpegFrameGrabber::new(self.binary.clone(), source)?))
    }

    fn create_recorder(&self, config: &RecorderConfig) -> CutroomResult<Box<dyn Recorder>> {
        Ok(Box::new(FfmpegRecorder::new(self.binary.clone(), *config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_chunks_arrive_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_chunk(&tx, b"ab").unwrap();
        forward_chunk(&tx, b"c").unwrap();
        assert_eq!(rx.try_recv().unwrap().data, b"ab");
        assert_eq!(rx.try_recv().unwrap().data, b"c");
    }

    #[test]
    fn forwarding_to_dropped_receiver_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let err = forward_chunk(&tx, b"lost").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
    }

    #[test]
    fn zero_sized_recorder_fails_init() {
        let err = FfmpegRecorder::new(
            "ffmpeg",
            RecorderConfig {
                width: 0,
                height: 720,
                fps: 30,
                bitrate_bps: 2_000_000,
            },
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), "recorder_init_failed");
    }

    #[tokio::test]
    async fn stop_without_start_reports_error() {
        let mut recorder = FfmpegRecorder::new(
            "ffmpeg",
            RecorderConfig {
                width: 2,
                height: 2,
                fps: 30,
                bitrate_bps: 1,
            },
        )
        .unwrap();
        assert!(recorder.stop().await.unwrap().is_err());
    }
}
