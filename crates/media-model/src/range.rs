//! Validated trim window over a source of known duration.

use serde::Serialize;

use cutroom_common::clock::FrameClock;
use cutroom_common::error::{CutroomError, CutroomResult};

/// The `[start, end]` window selected for export, in seconds.
///
/// Invariant: `0 <= start < end <= duration`. The only mutators are
/// [`TimeRange::set_range`] and the `mark_*` helpers built on it, and they
/// collapse inverted edits to a minimal window instead of rejecting them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    start: f64,
    end: f64,
    duration: f64,

    /// Smallest admissible window (one frame).
    #[serde(skip)]
    min_window: f64,
}

impl TimeRange {
    /// Full-length range for a freshly loaded source.
    pub fn new(duration_secs: f64, fps: u32) -> CutroomResult<Self> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(CutroomError::invalid_range(format!(
                "source duration must be positive, got {duration_secs}"
            )));
        }
        let min_window = FrameClock::new(fps)
            .frame_interval_secs()
            .min(duration_secs);
        Ok(Self {
            start: 0.0,
            end: duration_secs,
            duration: duration_secs,
            min_window,
        })
    }

    /// Range for a one-shot export request such as a command-line job.
    ///
    /// A window lying wholly outside the source has no frames to export and
    /// fails with `NoFramesInRange` instead of being clamped onto the last
    /// frame. Partial overlaps and inverted bounds go through
    /// [`TimeRange::set_range`] as interactive edits do.
    pub fn requested(duration_secs: f64, fps: u32, start: f64, end: f64) -> CutroomResult<Self> {
        let mut range = Self::new(duration_secs, fps)?;
        if start >= duration_secs || end <= 0.0 {
            return Err(CutroomError::NoFramesInRange {
                start_secs: start,
                end_secs: end,
            });
        }
        range.set_range(start, end);
        Ok(range)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Length of the window, `end - start`.
    pub fn len_secs(&self) -> f64 {
        self.end - self.start
    }

    /// Fraction of the source covered by the window.
    pub fn ratio(&self) -> f64 {
        (self.len_secs() / self.duration).clamp(0.0, 1.0)
    }

    /// Whether the window spans the whole source.
    pub fn is_full(&self) -> bool {
        self.start <= 0.0 && self.end >= self.duration
    }

    /// Boundary-inclusive membership test.
    pub fn contains(&self, secs: f64) -> bool {
        secs >= self.start && secs <= self.end
    }

    /// Clamp both bounds into `[0, duration]` and store the result.
    ///
    /// When `start >= end` after clamping, the window collapses to one frame
    /// anchored at the proposed start, shifted left if it would overrun the
    /// source. Returns the stored range.
    pub fn set_range(&mut self, proposed_start: f64, proposed_end: f64) -> TimeRange {
        let start = clamp_or(proposed_start, 0.0, self.duration, 0.0);
        let end = clamp_or(proposed_end, 0.0, self.duration, self.duration);

        if start < end {
            self.start = start;
            self.end = end;
        } else {
            let mut collapsed_start = start;
            let mut collapsed_end = start + self.min_window;
            if collapsed_end > self.duration {
                collapsed_end = self.duration;
                collapsed_start = (self.duration - self.min_window).max(0.0);
            }
            tracing::debug!(
                proposed_start,
                proposed_end,
                start = collapsed_start,
                end = collapsed_end,
                "Inverted trim range collapsed to minimal window"
            );
            self.start = collapsed_start;
            self.end = collapsed_end;
        }

        *self
    }

    /// Move the start bound to the current playback position.
    pub fn mark_start(&mut self, current_secs: f64) -> TimeRange {
        let end = self.end;
        self.set_range(current_secs, end)
    }

    /// Move the end bound to the current playback position.
    pub fn mark_end(&mut self, current_secs: f64) -> TimeRange {
        let start = self.start;
        self.set_range(start, current_secs)
    }
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}
