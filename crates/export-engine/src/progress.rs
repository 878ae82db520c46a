//! Export progress reporting.

use std::sync::Mutex;

use serde::Serialize;

use cutroom_common::clock::JobClock;

/// Progress callback for export jobs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Stages of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Seeking,
    Capturing,
    Decoding,
    Encoding,
    Flushing,
    Finalizing,
    Complete,
    Failed,
}

impl ExportStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Percent complete in `[0, 100]`, when the strategy can measure it.
    pub percent: Option<f64>,

    /// Current stage.
    pub stage: ExportStage,

    /// Frames handed to the encoder so far.
    pub frames_encoded: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,
}

#[derive(Debug, Default)]
struct ReporterState {
    last_percent: f64,
    frames_encoded: u64,
}

/// Turns strategy-level fractions into monotonic [`ExportProgress`] reports.
///
/// Percent is clamped to `[0, 100]` and never moves backwards within a job.
pub struct ProgressReporter {
    clock: JobClock,
    callback: Option<ProgressCallback>,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            clock: JobClock::start(),
            callback,
            state: Mutex::new(ReporterState::default()),
        }
    }

    /// A reporter that only logs.
    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn clock(&self) -> &JobClock {
        &self.clock
    }

    /// Report a measured completion fraction.
    pub fn report(&self, stage: ExportStage, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (percent, frames_encoded) = {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.last_percent = state.last_percent.max(fraction * 100.0);
            (state.last_percent, state.frames_encoded)
        };
        self.emit(ExportProgress {
            percent: Some(percent),
            stage,
            frames_encoded,
            eta_secs: self.clock.eta_secs(percent / 100.0),
        });
    }

    /// Report a coarse state change with no measurable percent.
    pub fn stage(&self, stage: ExportStage) {
        let (percent, frames_encoded) = {
            let state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let percent = match stage {
                ExportStage::Complete => Some(100.0),
                _ if state.last_percent > 0.0 => Some(state.last_percent),
                _ => None,
            };
            (percent, state.frames_encoded)
        };
        self.emit(ExportProgress {
            percent,
            stage,
            frames_encoded,
            eta_secs: 0.0,
        });
    }

    /// Record that `n` more frames reached the encoder.
    pub fn add_frames(&self, n: u64) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.frames_encoded += n;
    }

    pub fn frames_encoded(&self) -> u64 {
        match self.state.lock() {
            Ok(guard) => guard.frames_encoded,
            Err(poisoned) => poisoned.into_inner().frames_encoded,
        }
    }

    fn emit(&self, progress: ExportProgress) {
        tracing::trace!(
            stage = ?progress.stage,
            percent = progress.percent,
            frames = progress.frames_encoded,
            "Export progress"
        );
        if let Some(cb) = &self.callback {
            cb(progress);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
