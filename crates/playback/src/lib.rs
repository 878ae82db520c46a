//! Cutroom Playback
//!
//! Drives a preview media element inside the selected trim range: loops back
//! to the range start when playback runs past the end, clamps out-of-range
//! seeks, and steps frame by frame with asynchronous seek confirmation.

pub mod controller;
pub mod element;

pub use controller::{PlaybackController, PlaybackState, COARSE_STEP_FRAMES};
pub use element::{MediaElement, PlaybackEvent};
