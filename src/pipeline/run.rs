// src/pipeline/run.rs
//
// One video, one SpeedRun. Per frame:
//
//   tracker (track_id, anchor) → gating (confidence, calibrated area)
//     → TrajectoryStore → [warm] SpeedEstimator → SpeedAggregator
//
// The run owns every piece of state; concurrent videos use separate runs.

use super::metrics::RunMetrics;
use super::report::RunReport;
use crate::aggregator::SpeedAggregator;
use crate::calibration::{rescale, CalibratedRegion, CalibrationModel};
use crate::speed::{run_calibration, SpeedEstimator};
use crate::trajectory::TrajectoryStore;
use crate::types::{FrameObservations, ProcessingConfig, SourceGeometry};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Called with `(processed_frames, total_frames)`
pub type ProgressCallback = Box<dyn FnMut(u64, Option<u64>)>;

/// Per-track result for one frame, e.g. for label rendering
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub track_id: u32,
    pub speed_kmh: Option<f64>,
    pub is_speeding: bool,
}

impl FrameOutcome {
    pub fn label(&self) -> String {
        match self.speed_kmh {
            Some(speed) => format!("#{} {} km/h", self.track_id, speed as i64),
            None => format!("#{}", self.track_id),
        }
    }
}

/// Progress percentage: 100 once complete, 0 while the total is unknown.
pub fn progress_percent(processed: u64, total: Option<u64>, completed: bool) -> u8 {
    if completed {
        return 100;
    }
    match total {
        Some(total) if total > 0 && processed > 0 => ((processed.min(total) * 100) / total) as u8,
        _ => 0,
    }
}

pub struct SpeedRun {
    config: ProcessingConfig,
    source: SourceGeometry,
    scale_factor: f64,
    calibration: CalibrationModel,
    region: Option<CalibratedRegion>,
    estimator: Option<SpeedEstimator>,
    trajectories: TrajectoryStore,
    aggregator: SpeedAggregator,
    tracks_seen: BTreeSet<u32>,
    metrics: RunMetrics,
    progress: Option<ProgressCallback>,
}

impl SpeedRun {
    /// Anchor points fed to `process_frame` are in the processing frame,
    /// i.e. after the `max_width` resize.
    pub fn new(
        calibration_record: Option<&Value>,
        source: SourceGeometry,
        config: ProcessingConfig,
    ) -> Self {
        let scale_factor = source.scale_factor(config.max_width);
        if scale_factor != 1.0 {
            let (width, height) = processing_size(&source, scale_factor);
            info!(
                "Resizing for processing: {}x{} -> {}x{} (scale={:.2})",
                source.width, source.height, width, height, scale_factor
            );
        }

        let model = calibration_record
            .map(CalibrationModel::from_record)
            .unwrap_or(CalibrationModel::Uncalibrated);

        let (calibration, estimator) = if config.enable_speed_calculation {
            let applied = run_calibration(&model, scale_factor);
            let estimator = SpeedEstimator::new(&applied);
            (applied, Some(estimator))
        } else {
            info!("Speed calculation disabled - skipping speed estimation");
            (rescale(&model, scale_factor), None)
        };

        // Gating only applies to runs that measure speed
        let region = match estimator {
            Some(_) if config.restrict_to_calibrated_area => CalibratedRegion::from_model(&calibration),
            _ => None,
        };
        if region.is_some() {
            info!("Restricting speed measurement to the calibrated area");
        }

        if source.fps <= 0.0 {
            warn!("Source reports fps={}, no speeds can be estimated", source.fps);
        }

        Self {
            trajectories: TrajectoryStore::new(source.fps),
            config,
            source,
            scale_factor,
            calibration,
            region,
            estimator,
            aggregator: SpeedAggregator::new(),
            tracks_seen: BTreeSet::new(),
            metrics: RunMetrics::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn process_frame(&mut self, frame: &FrameObservations) -> Vec<FrameOutcome> {
        self.metrics.frames += 1;
        let fps = self.source.fps;
        let timestamp_s = if fps > 0.0 {
            frame.frame_number as f64 / fps
        } else {
            0.0
        };

        let mut live = HashSet::with_capacity(frame.tracks.len());
        let mut outcomes = Vec::with_capacity(frame.tracks.len());

        for obs in &frame.tracks {
            self.metrics.observations += 1;

            if obs.confidence.map_or(false, |c| c <= self.config.min_confidence) {
                self.metrics.below_confidence += 1;
                continue;
            }
            let Some(point) = obs.anchor_point() else {
                self.metrics.missing_anchor += 1;
                continue;
            };
            if let Some(region) = &self.region {
                if !region.contains(&point) {
                    self.metrics.outside_calibrated_area += 1;
                    continue;
                }
            }

            let track_id = obs.track_id;
            self.tracks_seen.insert(track_id);
            live.insert(track_id);
            self.trajectories.record(track_id, point);

            let mut outcome = FrameOutcome {
                track_id,
                speed_kmh: None,
                is_speeding: false,
            };

            if let Some(estimator) = &self.estimator {
                if self.trajectories.ready(track_id, fps) {
                    self.metrics.estimates_attempted += 1;
                    let window = self.trajectories.window_for(track_id);
                    let estimate = estimator.estimate(&window, fps);
                    if estimate.is_none() {
                        self.metrics.no_estimate += 1;
                    }

                    match self.aggregator.observe(
                        track_id,
                        estimate,
                        frame.frame_number,
                        timestamp_s,
                        self.config.speed_limit_kmh,
                    ) {
                        Some(sample) => {
                            self.metrics.samples_accepted += 1;
                            outcome.speed_kmh = Some(sample.speed_kmh);
                            outcome.is_speeding = sample.is_speeding;
                        }
                        None if estimate.is_some() => self.metrics.implausible_rejected += 1,
                        None => {}
                    }
                }
            }

            outcomes.push(outcome);
        }

        let evicted = self.trajectories.retain_live(&live);
        if evicted > 0 {
            debug!("Frame {}: dropped {} lost track(s)", frame.frame_number, evicted);
            self.metrics.tracks_evicted += evicted as u64;
        }

        let interval = self.config.progress_interval_frames;
        if interval > 0 && self.metrics.frames % interval == 0 {
            if let Some(callback) = self.progress.as_mut() {
                callback(self.metrics.frames, self.source.total_frames);
            }
        }

        outcomes
    }

    pub fn frames_processed(&self) -> u64 {
        self.metrics.frames
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Calibration applied to this run (rescaled, or the flat fallback)
    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.as_ref().map_or("disabled", SpeedEstimator::name)
    }

    pub fn aggregator(&self) -> &SpeedAggregator {
        &self.aggregator
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn finish(self, source_name: &str) -> RunReport {
        let summary = self.aggregator.finalize();
        let speed_enabled = self.estimator.is_some();
        let total_frames = self.source.total_frames.unwrap_or(self.metrics.frames);
        let duration_s = if self.source.fps > 0.0 {
            total_frames as f64 / self.source.fps
        } else {
            0.0
        };
        let (processing_width, processing_height) = processing_size(&self.source, self.scale_factor);

        let report = RunReport {
            source: source_name.to_string(),
            processed_at: chrono::Utc::now().to_rfc3339(),
            estimator: self.estimator_name().to_string(),
            scale_factor: self.scale_factor,
            processing_width,
            processing_height,
            fps: self.source.fps,
            total_frames,
            duration_s,
            frames_processed: self.metrics.frames,
            vehicle_count: summary.statistics.unique_vehicle_count,
            tracks_seen: self.tracks_seen.len(),
            avg_speed: summary.statistics.avg.filter(|_| speed_enabled),
            max_speed: summary.statistics.max.filter(|_| speed_enabled),
            min_speed: summary.statistics.min.filter(|_| speed_enabled),
            speeds_calculated: if speed_enabled { summary.statistics.count } else { 0 },
            speed_limit_kmh: self.config.speed_limit_kmh,
            calibration: self.calibration.to_record(),
            vehicle_detections: summary.detection_records(),
            metrics: self.metrics.summary(),
        };

        info!(
            "Processing complete: {} vehicles, {} speed measurements, avg speed: {} km/h",
            report.vehicle_count,
            report.speeds_calculated,
            report
                .avg_speed
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "N/A".to_string())
        );
        report
    }
}

fn processing_size(source: &SourceGeometry, scale_factor: f64) -> (u32, u32) {
    (
        (source.width as f64 * scale_factor) as u32,
        (source.height as f64 * scale_factor) as u32,
    )
}
