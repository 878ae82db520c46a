//! Clock and timing utilities.
//!
//! - [`JobClock`] anchors an export job to a monotonic epoch plus the
//!   wall-clock time it started, for elapsed/ETA reporting.
//! - [`FrameClock`] converts between seconds and frame indices at a fixed rate.
//! - [`format_timestamp`] renders seconds as `MM:SS.mmm`.

use std::time::Instant;

/// Frame rate used when a source does not report one.
pub const DEFAULT_FPS: u32 = 30;

/// A job clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the job started).
#[derive(Debug, Clone)]
pub struct JobClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl JobClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the job started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Milliseconds elapsed since the job started.
    pub fn elapsed_ms(&self) -> u128 {
        self.epoch.elapsed().as_millis()
    }

    /// Wall-clock time at job start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Current wall-clock time, RFC 3339.
    pub fn now_wall() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// Remaining time estimate given a completion fraction in `[0, 1]`.
    pub fn eta_secs(&self, fraction: f64) -> f64 {
        if fraction <= 0.0 {
            return 0.0;
        }
        let elapsed = self.elapsed_secs();
        ((elapsed / fraction) - elapsed).max(0.0)
    }
}

/// Seconds <-> frame index conversion at a fixed frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock; a zero rate falls back to [`DEFAULT_FPS`].
    pub fn new(fps: u32) -> Self {
        Self {
            fps: if fps == 0 { DEFAULT_FPS } else { fps },
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Duration of one frame in seconds.
    pub fn frame_interval_secs(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Time of frame `index`. Negative indices map to negative times.
    pub fn time_of_frame(&self, index: i64) -> f64 {
        index as f64 / self.fps as f64
    }

    /// Frame index containing `secs` (floor).
    pub fn frame_at(&self, secs: f64) -> i64 {
        (secs * self.fps as f64).floor() as i64
    }

    /// Number of whole frames in `duration_secs`.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        (duration_secs.max(0.0) * self.fps as f64).floor() as u64
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

/// Format seconds as `MM:SS.mmm`. Minutes are not folded into hours.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor() as u64;
    let whole_secs = (seconds % 60.0).floor() as u64;
    let millis = ((seconds % 1.0) * 1000.0).floor() as u64;
    format!("{minutes:02}:{whole_secs:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_clock_elapsed() {
        let clock = JobClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_eta_zero_fraction() {
        let clock = JobClock::start();
        assert_eq!(clock.eta_secs(0.0), 0.0);
    }

    #[test]
    fn test_frame_clock_zero_fps_defaults() {
        assert_eq!(FrameClock::new(0).fps(), DEFAULT_FPS);
    }

    #[test]
    fn test_frame_conversions() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.frame_at(1.0), 30);
        assert_eq!(clock.frame_at(1.999), 59);
        assert!((clock.time_of_frame(45) - 1.5).abs() < 1e-9);
        assert_eq!(clock.frame_count(10.5), 315);
        assert_eq!(clock.frame_count(-1.0), 0);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00.000");
        assert_eq!(format_timestamp(65.25), "01:05.250");
        assert_eq!(format_timestamp(3600.5), "60:00.500");
    }
}
