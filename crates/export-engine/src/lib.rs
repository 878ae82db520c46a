//! Cutroom Export Engine
//!
//! Turns a source file plus a trim window into a new, playable container.
//! Three interchangeable strategies are selected once per job:
//!
//! ```text
//!                 ┌── ExternalTranscoder (stream copy, keyframe-accurate)
//! ExportJob ──────┼── CodecPipeline      (decode → filter → encode → mux)
//!   select once   └── CanvasCapture      (rasterize → record, real-time)
//!                                │
//!                                ▼
//!                          OutputArtifact
//! ```
//!
//! Decoded frames are leased from a [`frame::FrameLedger`]; codec and
//! recorder handles live in [`resources::Closing`] guards, so every exit
//! path releases them.

pub mod canvas;
pub mod codec;
pub mod ffmpeg;
pub mod frame;
pub mod probe;
pub mod progress;
pub mod resources;
pub mod runner;
pub mod strategy;
pub mod surface;
pub mod transcoder;

pub use canvas::{CanvasCaptureStrategy, CaptureBackend, Recorder, RecorderConfig, SourceSurface};
pub use codec::{CodecBackend, CodecPipelineStrategy, EncoderConfig, VideoDecoder, VideoEncoder};
pub use progress::{ExportProgress, ExportStage, ProgressCallback, ProgressReporter};
pub use runner::{run_export, ExportOutcome, ExportSummary, ExportToolkit};
pub use strategy::{select_strategy, Capabilities, ExportStrategy};
pub use transcoder::{ExternalTranscoderStrategy, Transcoder, TranscoderRuntime, TranscoderState};
