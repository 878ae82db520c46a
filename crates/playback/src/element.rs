//! Media element contract for preview playback.
//!
//! The element is the preview handle onto the loaded source. Requests are
//! fire-and-forget; their outcomes come back as [`PlaybackEvent`]s from the
//! element's native timing signals.

use cutroom_common::error::CutroomResult;

/// Signals emitted by a media element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// Native position update while the element advances or after a seek.
    TimeUpdate(f64),
    /// A previously requested seek has completed at this position.
    Seeked(f64),
    /// The whole file finished playing.
    Ended,
}

/// A seekable, playable preview surface.
pub trait MediaElement: Send {
    /// Ask the element to move to `secs`. Completion is reported with
    /// [`PlaybackEvent::Seeked`]; callers must not assume it is synchronous.
    fn request_seek(&mut self, secs: f64);

    /// Start or resume playback.
    fn play(&mut self) -> CutroomResult<()>;

    /// Pause playback without moving.
    fn pause(&mut self);
}
