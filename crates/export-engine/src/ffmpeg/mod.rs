//! ffmpeg-backed collaborators.
//!
//! - [`FfmpegTranscoder`]: stream-copy commands in a private working directory
//! - [`codec`]: raw-frame decoder and chunk encoder subprocesses
//! - [`capture`]: frame grabber surface and live recorder

pub mod capture;
pub mod codec;

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use cutroom_common::config::TranscoderConfig;
use cutroom_common::error::{CutroomError, CutroomResult};

use crate::resources::ScratchDir;
use crate::transcoder::Transcoder;

pub use capture::{FfmpegCaptureBackend, FfmpegFrameGrabber, FfmpegRecorder};
pub use codec::{FfmpegChunkEncoder, FfmpegCodecBackend, FfmpegFrameDecoder};

/// Seconds without `out_time` advancing before a stall warning.
const STALL_WARN_SECS: u64 = 10;

/// Whether `binary` resolves on `PATH` (or is an existing path).
pub fn command_exists(binary: &str) -> bool {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(binary).is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Parsed `-progress pipe:1` key/value state.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

/// Run ffmpeg to completion, forwarding `out_time` as it advances.
fn run_ffmpeg(
    binary: &str,
    work_dir: &Path,
    args: &[String],
    mut on_out_time: impl FnMut(f64),
) -> CutroomResult<()> {
    let mut cmd = Command::new(binary);
    cmd.current_dir(work_dir)
        .args(["-hide_banner", "-nostdin", "-y", "-nostats", "-progress", "pipe:1"])
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| CutroomError::transcode(format!("Failed to start {binary}: {e}")))?;
    tracing::debug!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CutroomError::transcode("Failed to capture ffmpeg stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CutroomError::transcode("Failed to capture ffmpeg stderr"))?;

    // ffmpeg blocks once its stderr pipe fills.
    let stderr_task = spawn_stderr_drain(stderr);

    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let mut state = ProgressState::default();
    let mut last_out_time = 0.0f64;
    let mut last_advance = Instant::now();
    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .map_err(|e| CutroomError::transcode(format!("Failed reading ffmpeg progress: {e}")))?;
        if bytes == 0 {
            break;
        }
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        state.update(key, value);
        if key != "progress" {
            continue;
        }

        if state.out_time_secs > last_out_time + 0.001 {
            last_out_time = state.out_time_secs;
            last_advance = Instant::now();
            on_out_time(state.out_time_secs);
        } else if last_advance.elapsed().as_secs() >= STALL_WARN_SECS {
            tracing::warn!(
                out_time_secs = state.out_time_secs,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "No ffmpeg progress for {STALL_WARN_SECS}s"
            );
            last_advance = Instant::now();
        }
    }

    let status = child
        .wait()
        .map_err(|e| CutroomError::transcode(format!("Failed to wait on ffmpeg: {e}")))?;
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if !status.success() {
        return Err(CutroomError::transcode(format!(
            "ffmpeg failed (status {status}): {}",
            stderr_output.trim()
        )));
    }
    tracing::debug!(
        elapsed_secs = start.elapsed().as_secs_f64(),
        complete = state.complete,
        "ffmpeg finished"
    );
    Ok(())
}

/// Collect a child's stderr on a separate thread.
fn spawn_stderr_drain<R: Read + Send + 'static>(stderr: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

/// Transcoder backed by the ffmpeg CLI, working in a private directory.
///
/// The directory lives as long as the transcoder; dropping it (runtime
/// teardown) removes every leftover working file.
pub struct FfmpegTranscoder {
    binary: String,
    scratch: ScratchDir,
}

impl FfmpegTranscoder {
    /// Create `<work_dir>/transcoder-<pid>` for this process.
    pub fn new(config: &TranscoderConfig) -> CutroomResult<Self> {
        let scratch = ScratchDir::create(
            &config.work_dir,
            &format!("transcoder-{}", std::process::id()),
        )?;
        Ok(Self {
            binary: config.ffmpeg.clone(),
            scratch,
        })
    }

    /// Loader for [`crate::transcoder::TranscoderRuntime::init`].
    pub async fn load(config: TranscoderConfig) -> CutroomResult<Arc<dyn Transcoder>> {
        let binary = config.ffmpeg.clone();
        let available = tokio::task::spawn_blocking(move || command_exists(&binary))
            .await
            .unwrap_or(false);
        if !available {
            return Err(CutroomError::transcode(format!(
                "'{}' not found in PATH",
                config.ffmpeg
            )));
        }
        let transcoder = tokio::task::spawn_blocking(move || Self::new(&config))
            .await
            .map_err(|e| CutroomError::transcode(format!("Transcoder setup failed: {e}")))??;
        Ok(Arc::new(transcoder))
    }

    pub fn work_dir(&self) -> &Path {
        self.scratch.path()
    }

    fn path_of(&self, name: &str) -> CutroomResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(CutroomError::transcode(format!("Invalid working file name '{name}'")));
        }
        Ok(self.scratch.join(name))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn write_file(&self, name: &str, bytes: Vec<u8>) -> CutroomResult<()> {
        tokio::fs::write(self.path_of(name)?, bytes).await?;
        Ok(())
    }

    async fn exec(
        &self,
        args: Vec<String>,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> CutroomResult<()> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let binary = self.binary.clone();
        let work_dir = self.work_dir().to_path_buf();
        let task = tokio::task::spawn_blocking(move || {
            run_ffmpeg(&binary, &work_dir, &args, |secs| {
                let _ = tx.send(secs);
            })
        });

        while let Some(secs) = rx.recv().await {
            on_progress(secs);
        }
        task.await
            .map_err(|e| CutroomError::transcode(format!("ffmpeg task failed: {e}")))?
    }

    async fn read_file(&self, name: &str) -> CutroomResult<Vec<u8>> {
        let path = self.path_of(name)?;
        tokio::fs::read(&path).await.map_err(|e| {
            CutroomError::transcode(format!("Cannot read {}: {e}", path.display()))
        })
    }

    async fn remove_file(&self, name: &str) -> CutroomResult<()> {
        match tokio::fs::remove_file(self.path_of(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_state_parses_out_time() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "2500000");
        assert!((state.out_time_secs - 2.5).abs() < 1e-9);
        state.update("out_time_ms", "4000000");
        assert!((state.out_time_secs - 4.0).abs() < 1e-9);
        state.update("progress", "continue");
        assert!(!state.complete);
        state.update("progress", "end");
        assert!(state.complete);
    }

    #[test]
    fn garbage_progress_values_are_ignored() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "N/A");
        state.update("speed", "1.0x");
        assert_eq!(state.out_time_secs, 0.0);
    }

    fn scratch_config(tag: &str) -> TranscoderConfig {
        TranscoderConfig {
            work_dir: std::env::temp_dir().join(format!("cutroom-{tag}-{}", std::process::id())),
            ..TranscoderConfig::default()
        }
    }

    #[test]
    fn working_file_names_cannot_escape() {
        let t = FfmpegTranscoder::new(&scratch_config("names")).unwrap();
        assert!(t.path_of("../etc/passwd").is_err());
        assert!(t.path_of("").is_err());
        assert!(t.path_of("cutroom-1-input.mp4").is_ok());
    }

    #[tokio::test]
    async fn dropping_transcoder_removes_working_files() {
        let t = FfmpegTranscoder::new(&scratch_config("scratch")).unwrap();
        let dir = t.work_dir().to_path_buf();
        t.write_file("leftover.mp4", b"partial".to_vec()).await.unwrap();
        assert!(dir.join("leftover.mp4").exists());

        drop(t);
        assert!(!dir.exists());
    }
}
