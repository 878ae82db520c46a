//! Stream-copy export through an external transcoder.
//!
//! The transcoder is an opaque collaborator with a file-and-command
//! interface. It is loaded once per process by [`TranscoderRuntime`], and the
//! selector only offers stream copy after the runtime's readiness gate opens.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use cutroom_common::error::{CutroomError, CutroomResult};
use cutroom_media_model::job::{ExportJob, OutputArtifact, StrategyKind};

use crate::progress::{ExportStage, ProgressReporter};
use crate::strategy::ExportStrategy;

/// Command-style transcoder with its own working filesystem.
#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    async fn write_file(&self, name: &str, bytes: Vec<u8>) -> CutroomResult<()>;

    /// Run one command. `on_progress` receives the output timestamp, in seconds.
    async fn exec(
        &self,
        args: Vec<String>,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> CutroomResult<()>;

    async fn read_file(&self, name: &str) -> CutroomResult<Vec<u8>>;

    async fn remove_file(&self, name: &str) -> CutroomResult<()>;
}

/// Lifecycle of the process-wide transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscoderState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
    TornDown,
}

static GLOBAL_RUNTIME: OnceLock<Arc<TranscoderRuntime>> = OnceLock::new();

/// Lazily initialized transcoder with an explicit readiness gate.
pub struct TranscoderRuntime {
    state: watch::Sender<TranscoderState>,
    transcoder: Mutex<Option<Arc<dyn Transcoder>>>,
}

impl Default for TranscoderRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscoderRuntime {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TranscoderState::Uninitialized);
        Self {
            state,
            transcoder: Mutex::new(None),
        }
    }

    /// The process-wide runtime.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_RUNTIME.get_or_init(|| Arc::new(Self::new())))
    }

    pub fn state(&self) -> TranscoderState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == TranscoderState::Ready
    }

    /// Load the transcoder. A no-op when already ready or loading.
    pub async fn init<F, Fut>(&self, loader: F) -> CutroomResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CutroomResult<Arc<dyn Transcoder>>>,
    {
        let claimed = self.state.send_if_modified(|state| match state {
            TranscoderState::Ready | TranscoderState::Loading => false,
            _ => {
                *state = TranscoderState::Loading;
                true
            }
        });
        if !claimed {
            return Ok(());
        }

        match loader().await {
            Ok(transcoder) => {
                tracing::info!(transcoder = transcoder.name(), "Transcoder ready");
                *self.slot() = Some(transcoder);
                self.state.send_replace(TranscoderState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transcoder failed to load");
                self.state
                    .send_replace(TranscoderState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Drop the loaded transcoder and close the gate.
    pub fn teardown(&self) {
        self.slot().take();
        self.state.send_replace(TranscoderState::TornDown);
        tracing::debug!("Transcoder torn down");
    }

    /// Wait up to `timeout` for the gate to open.
    ///
    /// Returns `None` immediately when nobody is loading the transcoder.
    pub async fn wait_ready(&self, timeout: Duration) -> Option<Arc<dyn Transcoder>> {
        let mut rx = self.state.subscribe();
        let wait = async {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    TranscoderState::Ready => return true,
                    TranscoderState::Loading => {}
                    _ => return false,
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(true) => self.slot().clone(),
            Ok(false) => None,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Transcoder not ready in time");
                None
            }
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn Transcoder>>> {
        match self.transcoder.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stream-copy trim: no re-encode, cut points may snap to keyframes.
pub struct ExternalTranscoderStrategy {
    transcoder: Arc<dyn Transcoder>,
}

impl ExternalTranscoderStrategy {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Arguments for a stream-copy trim between absolute source timestamps.
    pub fn trim_args(start: f64, end: f64, input: &str, output: &str) -> Vec<String> {
        vec![
            "-ss".to_string(),
            format!("{start:.3}"),
            "-to".to_string(),
            format!("{end:.3}"),
            "-i".to_string(),
            input.to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            output.to_string(),
        ]
    }

    async fn run(
        &self,
        job: &ExportJob,
        input: &str,
        output: &str,
        progress: &ProgressReporter,
    ) -> CutroomResult<Vec<u8>> {
        let source_bytes = tokio::fs::read(&job.source.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CutroomError::FileNotFound {
                    path: job.source.path.clone(),
                }
            } else {
                CutroomError::Io(e)
            }
        })?;
        self.transcoder.write_file(input, source_bytes).await?;

        let len = job.range.len_secs();
        let args = Self::trim_args(job.range.start(), job.range.end(), input, output);
        tracing::debug!(args = ?args, "Running stream-copy trim");

        progress.report(ExportStage::Encoding, 0.0);
        let on_progress = |out_time_secs: f64| {
            if len > 0.0 {
                progress.report(ExportStage::Encoding, out_time_secs / len);
            }
        };
        self.transcoder.exec(args, &on_progress).await?;

        progress.stage(ExportStage::Finalizing);
        let bytes = self.transcoder.read_file(output).await?;
        if bytes.is_empty() {
            return Err(CutroomError::transcode("Transcoder produced an empty file"));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ExportStrategy for ExternalTranscoderStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExternalTranscoder
    }

    async fn export(
        &mut self,
        job: &ExportJob,
        progress: &ProgressReporter,
    ) -> CutroomResult<OutputArtifact> {
        let container = job.source.container;
        let id = JOB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let input = format!("cutroom-{}-{id}-input.{}", std::process::id(), container.extension());
        let output = format!("cutroom-{}-{id}-output.{}", std::process::id(), container.extension());

        progress.stage(ExportStage::Preparing);
        tracing::info!(
            transcoder = self.transcoder.name(),
            start = job.range.start(),
            end = job.range.end(),
            "Starting stream-copy export"
        );

        let result = self.run(job, &input, &output, progress).await;

        for name in [&input, &output] {
            if let Err(e) = self.transcoder.remove_file(name).await {
                tracing::debug!(file = %name, error = %e, "Transcoder scratch file not removed");
            }
        }

        let bytes = result.map_err(|e| match e {
            CutroomError::ExternalTranscodeFailed { .. } | CutroomError::FileNotFound { .. } => e,
            other => CutroomError::transcode(other.to_string()),
        })?;
        Ok(OutputArtifact::new(
            bytes,
            container,
            job.suggested_file_name(container, false),
        ))
    }
}
