// src/pipeline/metrics.rs
//
// Per-run counters. One instance per run, mutated only by the thread
// feeding that run's frames.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub frames: u64,
    pub observations: u64,
    pub below_confidence: u64,
    pub missing_anchor: u64,
    pub outside_calibrated_area: u64,
    pub estimates_attempted: u64,
    pub no_estimate: u64,
    pub implausible_rejected: u64,
    pub samples_accepted: u64,
    pub tracks_evicted: u64,
    pub started_at: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            frames: 0,
            observations: 0,
            below_confidence: 0,
            missing_anchor: 0,
            outside_calibrated_area: 0,
            estimates_attempted: 0,
            no_estimate: 0,
            implausible_rejected: 0,
            samples_accepted: 0,
            tracks_evicted: 0,
            started_at: Instant::now(),
        }
    }

    /// Frames processed per wall-clock second
    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames: self.frames,
            observations: self.observations,
            below_confidence: self.below_confidence,
            missing_anchor: self.missing_anchor,
            outside_calibrated_area: self.outside_calibrated_area,
            estimates_attempted: self.estimates_attempted,
            no_estimate: self.no_estimate,
            implausible_rejected: self.implausible_rejected,
            samples_accepted: self.samples_accepted,
            tracks_evicted: self.tracks_evicted,
            processing_fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub frames: u64,
    pub observations: u64,
    pub below_confidence: u64,
    pub missing_anchor: u64,
    pub outside_calibrated_area: u64,
    pub estimates_attempted: u64,
    pub no_estimate: u64,
    pub implausible_rejected: u64,
    pub samples_accepted: u64,
    pub tracks_evicted: u64,
    pub processing_fps: f64,
    pub elapsed_secs: f64,
}
