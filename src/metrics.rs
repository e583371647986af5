//! Run counters and per-stage timing
//!
//! Processing is frame-sequential, so the counters are plain fields owned by
//! the processing session rather than shared atomics.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

/// Cumulative time spent in each per-frame stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub transform_ms: f64,
    pub inference_ms: f64,
    pub decode_ms: f64,
    pub mitigate_ms: f64,
}

impl StageTimings {
    pub fn total_ms(&self) -> f64 {
        self.transform_ms + self.inference_ms + self.decode_ms + self.mitigate_ms
    }
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub frames_processed: u64,
    pub frames_mitigated: u64,
    /// Detections surviving suppression, across all frames
    pub detections: u64,
    pub regions_blurred: u64,
    /// Rule-enabled regions skipped because they did not fit the frame
    pub regions_skipped: u64,
    pub timings: StageTimings,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Average processing time per frame, excluding decode and encode
    pub fn avg_frame_time_ms(&self) -> f64 {
        if self.frames_processed == 0 {
            return 0.0;
        }
        self.timings.total_ms() / self.frames_processed as f64
    }

    /// Share of processed frames that were blurred, in percent
    pub fn mitigation_rate(&self) -> f64 {
        if self.frames_processed == 0 {
            return 0.0;
        }
        self.frames_mitigated as f64 / self.frames_processed as f64 * 100.0
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Frames: {} | Mitigated: {} ({:.1}%) | Detections: {} | Blurred: {} | Skipped: {} | Avg: {:.1}ms (transform {:.1}, infer {:.1}, decode {:.1}, blur {:.1})",
            self.frames_processed,
            self.frames_mitigated,
            self.mitigation_rate(),
            self.detections,
            self.regions_blurred,
            self.regions_skipped,
            self.avg_frame_time_ms(),
            self.timings.transform_ms,
            self.timings.inference_ms,
            self.timings.decode_ms,
            self.timings.mitigate_ms
        )
    }

    pub fn log_summary(&self) {
        info!("{}", self.format_summary());
    }
}

/// Splits one frame's processing time into stages
#[derive(Debug)]
pub struct FrameTimer {
    start_time: Instant,
    lap_time: Instant,
}

impl FrameTimer {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            lap_time: now,
        }
    }

    /// Time since the previous lap, restarting the lap clock
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.lap_time);
        self.lap_time = now;
        elapsed
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

pub(crate) fn as_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
