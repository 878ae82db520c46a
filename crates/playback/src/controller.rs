//! Range-bounded preview controller.

use tokio::sync::mpsc;

use cutroom_common::clock::FrameClock;
use cutroom_common::error::CutroomResult;
use cutroom_media_model::range::TimeRange;

use crate::element::{MediaElement, PlaybackEvent};

/// Frames skipped by the coarse step buttons.
pub const COARSE_STEP_FRAMES: i64 = 10;

/// Playback state of the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSeek {
    target_secs: f64,
    /// Set when the seek came from frame stepping.
    frame: Option<i64>,
}

/// Keeps a preview element inside the trim range.
///
/// Every position update is checked against the range: positions before
/// `start` or after `end` snap back to `start`, and overrunning `end` while
/// playing also pauses, so preview loops back without auto-replaying.
pub struct PlaybackController<E: MediaElement> {
    element: E,
    range: TimeRange,
    clock: FrameClock,
    state: PlaybackState,
    position: f64,
    current_frame: i64,
    pending_seek: Option<PendingSeek>,
}

impl<E: MediaElement> PlaybackController<E> {
    /// Attach to a freshly loaded source; the range spans the whole file.
    pub fn new(element: E, duration_secs: f64, fps: u32) -> CutroomResult<Self> {
        Ok(Self {
            element,
            range: TimeRange::new(duration_secs, fps)?,
            clock: FrameClock::new(fps),
            state: PlaybackState::Paused,
            position: 0.0,
            current_frame: 0,
            pending_seek: None,
        })
    }

    /// Replace the source. The previous range is discarded.
    pub fn load(&mut self, duration_secs: f64, fps: u32) -> CutroomResult<()> {
        self.element.pause();
        self.range = TimeRange::new(duration_secs, fps)?;
        self.clock = FrameClock::new(fps);
        self.state = PlaybackState::Paused;
        self.position = 0.0;
        self.current_frame = 0;
        self.pending_seek = None;
        Ok(())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn current_frame(&self) -> i64 {
        self.current_frame
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count(self.range.duration())
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    /// Edit the range; the preview jumps to the new start.
    ///
    /// Playback is not paused: the next position update re-evaluates bounds.
    pub fn set_range(&mut self, start: f64, end: f64) -> TimeRange {
        let stored = self.range.set_range(start, end);
        self.seek(stored.start(), None);
        stored
    }

    /// Set the range start to the current position.
    pub fn mark_start(&mut self) -> TimeRange {
        self.range.mark_start(self.position)
    }

    /// Set the range end to the current position.
    pub fn mark_end(&mut self) -> TimeRange {
        self.range.mark_end(self.position)
    }

    pub fn play(&mut self) -> CutroomResult<()> {
        if !self.range.contains(self.position) {
            self.snap_to_start();
        }
        self.element.play()?;
        self.state = PlaybackState::Playing;
        tracing::debug!(position = self.position, "Preview playing");
        Ok(())
    }

    pub fn pause(&mut self) {
        self.element.pause();
        self.state = PlaybackState::Paused;
        tracing::debug!(position = self.position, "Preview paused");
    }

    pub fn toggle(&mut self) -> CutroomResult<()> {
        match self.state {
            PlaybackState::Playing => {
                self.pause();
                Ok(())
            }
            PlaybackState::Paused => self.play(),
        }
    }

    /// Seek to frame `n`. Targets outside `[0, duration]` are ignored.
    ///
    /// Returns whether a seek was issued. The frame counter only moves once
    /// the element confirms the seek.
    pub fn seek_to_frame(&mut self, frame: i64) -> bool {
        let target = self.clock.time_of_frame(frame);
        if target < 0.0 || target > self.range.duration() {
            return false;
        }
        self.seek(target, Some(frame));
        true
    }

    pub fn next_frame(&mut self) -> bool {
        self.seek_to_frame(self.current_frame + 1)
    }

    pub fn previous_frame(&mut self) -> bool {
        self.seek_to_frame(self.current_frame - 1)
    }

    pub fn step_forward(&mut self) -> bool {
        self.seek_to_frame(self.current_frame + COARSE_STEP_FRAMES)
    }

    pub fn step_backward(&mut self) -> bool {
        self.seek_to_frame(self.current_frame - COARSE_STEP_FRAMES)
    }

    /// Apply one element signal.
    pub fn handle_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::TimeUpdate(position) => self.on_time_update(position),
            PlaybackEvent::Seeked(position) => self.on_seeked(position),
            PlaybackEvent::Ended => {
                self.snap_to_start();
                self.pause();
            }
        }
    }

    /// Consume element signals until the sender side closes.
    pub async fn drive(&mut self, mut events: mpsc::Receiver<PlaybackEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
    }

    fn on_time_update(&mut self, position: f64) {
        self.position = position;

        let out_of_range = position < self.range.start() || position > self.range.end();
        if out_of_range {
            // A snap is already in flight; stale positions would re-issue it.
            if self.pending_seek.is_some() {
                return;
            }
            let overran_end = position > self.range.end();
            self.snap_to_start();
            if overran_end && self.state == PlaybackState::Playing {
                self.pause();
            }
            return;
        }

        if !matches!(self.pending_seek, Some(PendingSeek { frame: Some(_), .. })) {
            self.current_frame = self.clock.frame_at(position);
        }
    }

    fn on_seeked(&mut self, position: f64) {
        self.position = position;
        match self.pending_seek.take() {
            Some(PendingSeek {
                frame: Some(frame), ..
            }) => self.current_frame = frame,
            Some(PendingSeek { target_secs, .. }) => {
                tracing::trace!(target_secs, position, "Seek confirmed");
                self.current_frame = self.clock.frame_at(position);
            }
            None => self.current_frame = self.clock.frame_at(position),
        }
    }

    fn snap_to_start(&mut self) {
        let start = self.range.start();
        tracing::debug!(from = self.position, to = start, "Snapping preview to range start");
        self.seek(start, None);
    }

    fn seek(&mut self, target_secs: f64, frame: Option<i64>) {
        self.element.request_seek(target_secs);
        self.position = target_secs;
        self.pending_seek = Some(PendingSeek { target_secs, frame });
    }
}
