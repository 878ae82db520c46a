//! Cutroom Media Model
//!
//! Plain data shared by the preview controller and the export engine:
//!
//! - `range`: the validated `[start, end]` trim window
//! - `source`: loaded source metadata, containers, and output resolutions
//! - `job`: export requests and the artifacts they produce
//! - `estimate`: output size projection and human-readable sizes

pub mod estimate;
pub mod job;
pub mod range;
pub mod source;

pub use estimate::{estimate_encoded_size, estimate_trimmed_size, estimated_size_label, format_bytes};
pub use job::{ExportJob, OutputArtifact, StrategyChoice, StrategyKind};
pub use range::TimeRange;
pub use source::{MediaContainer, Resolution, SourceMedia, SourceMetadata, RESOLUTION_PRESETS};
