// src/speed/estimator.rs
//
// Pixel trajectory + calibration → km/h.
//
// The variant is picked once per run from the calibration model; the
// per-frame path only calls `estimate`. `None` means "no estimate"
// (too few points, uncalibrated, degenerate timing or geometry) and must
// never be read as a stationary vehicle.
//
// Elapsed time is `points.len() / fps` for every variant, i.e. one frame
// interval longer than the span actually covered by the points. Speeds are
// biased low by that factor; downstream limits were tuned against it, so it
// stays.

use super::homography::Homography;
use crate::calibration::{rescale, CalibrationModel, Zone, FALLBACK_PIXELS_PER_METER};
use crate::types::Point;
use tracing::{debug, info, warn};

const MS_TO_KMH: f64 = 3.6;

/// Seconds covered by `samples` frames; `None` for unusable fps.
fn elapsed_secs(samples: usize, fps: f64) -> Option<f64> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    let seconds = samples as f64 / fps;
    if seconds > 0.0 {
        Some(seconds)
    } else {
        None
    }
}

fn to_kmh(distance_m: f64, seconds: f64) -> Option<f64> {
    let speed = distance_m / seconds * MS_TO_KMH;
    speed.is_finite().then_some(speed)
}

// ============================================================================
// ZONES
// ============================================================================

#[derive(Debug, Clone)]
pub struct ZoneEstimator {
    zones: Vec<Zone>,
}

impl ZoneEstimator {
    /// `zones` must already be sorted by `y_min` (as `CalibrationModel::zone_based` guarantees).
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn is_calibrated(&self) -> bool {
        !self.zones.is_empty()
    }

    /// Pixels per meter at image row `y`.
    ///
    /// Inside a zone: that zone's scale (first in `y_min` order wins when
    /// zones overlap). Outside the covered range: the nearest end zone.
    /// In a gap between two zones: linear blend across the gap.
    pub fn scale_at(&self, y: f64) -> f64 {
        let (first, last) = match (self.zones.first(), self.zones.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                warn!("No zones configured, using default scale");
                return FALLBACK_PIXELS_PER_METER;
            }
        };

        if let Some(zone) = self.zones.iter().find(|z| z.contains(y)) {
            return zone.pixels_per_meter;
        }

        if y < first.y_min {
            return first.pixels_per_meter;
        }
        if y > last.y_max {
            return last.pixels_per_meter;
        }

        for pair in self.zones.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            if upper.y_max <= y && y <= lower.y_min {
                let gap = lower.y_min - upper.y_max;
                let ratio = if gap > 0.0 { (y - upper.y_max) / gap } else { 0.0 };
                return upper.pixels_per_meter * (1.0 - ratio) + lower.pixels_per_meter * ratio;
            }
        }

        // Only reachable with overlapping zones
        first.pixels_per_meter
    }

    /// Sum of per-segment distances, each converted at its midpoint row.
    pub fn estimate(&self, points: &[Point], fps: f64) -> Option<f64> {
        if points.len() < 2 {
            return None;
        }
        if !self.is_calibrated() {
            warn!("Speed estimation attempted without calibration");
            return None;
        }

        let total_distance: f64 = points
            .windows(2)
            .map(|seg| {
                let mid_y = (seg[0].y + seg[1].y) / 2.0;
                seg[0].distance_to(&seg[1]) / self.scale_at(mid_y)
            })
            .sum();

        let seconds = elapsed_secs(points.len(), fps)?;
        let speed = to_kmh(total_distance, seconds)?;
        debug!(
            "Speed calculated: {:.2} km/h (distance: {:.2}m, time: {:.2}s)",
            speed, total_distance, seconds
        );
        Some(speed)
    }

    /// Straight-line estimate between two points `num_frames` apart.
    pub fn estimate_between(&self, start: Point, end: Point, num_frames: u32, fps: f64) -> Option<f64> {
        if !self.is_calibrated() {
            return None;
        }
        let scale = self.scale_at((start.y + end.y) / 2.0);
        let distance_m = start.distance_to(&end) / scale;
        let seconds = elapsed_secs(num_frames as usize, fps)?;
        to_kmh(distance_m, seconds)
    }
}

// ============================================================================
// FOUR-POINT HOMOGRAPHY
// ============================================================================

/// Measures travel along the projected rectangle's height axis only.
#[derive(Debug, Clone)]
pub struct FourPointEstimator {
    homography: Homography,
    meters_per_pixel: f64,
}

impl FourPointEstimator {
    pub fn new(quad: &[Point; 4], reference_distance_m: f64, target_width: u32, target_height: u32) -> Option<Self> {
        if target_height == 0 || !reference_distance_m.is_finite() || reference_distance_m <= 0.0 {
            return None;
        }
        let homography = Homography::onto_rectangle(quad, target_width, target_height)?;
        let meters_per_pixel = reference_distance_m / target_height as f64;
        info!(
            "Four-point estimator initialized: reference_distance={:.2}, target_width={}, target_height={}",
            reference_distance_m, target_width, target_height
        );
        Some(Self {
            homography,
            meters_per_pixel,
        })
    }

    pub fn meters_per_pixel(&self) -> f64 {
        self.meters_per_pixel
    }

    /// Net height-axis displacement between first and last projected point.
    /// Lateral motion and intermediate wobble are ignored.
    pub fn estimate(&self, points: &[Point], fps: f64) -> Option<f64> {
        if points.len() < 2 {
            return None;
        }
        let seconds = elapsed_secs(points.len(), fps)?;

        let mut projected = Vec::with_capacity(points.len());
        for p in points {
            match self.homography.project(p) {
                Some(q) => projected.push(q),
                None => {
                    debug!("Point ({:.1}, {:.1}) projects to infinity", p.x, p.y);
                    return None;
                }
            }
        }

        let start_y = projected.first()?.y;
        let end_y = projected.last()?.y;
        let distance_m = (end_y - start_y).abs() * self.meters_per_pixel;
        to_kmh(distance_m, seconds)
    }
}

// ============================================================================
// FLAT FALLBACK
// ============================================================================

#[derive(Debug, Clone)]
pub struct FlatEstimator {
    pixels_per_meter: f64,
}

impl FlatEstimator {
    pub fn new(pixels_per_meter: f64) -> Self {
        info!("Fallback estimator initialized: {:.2} px/m", pixels_per_meter);
        Self { pixels_per_meter }
    }

    pub fn estimate(&self, points: &[Point], fps: f64) -> Option<f64> {
        let (start, end) = match points {
            [start, .., end] => (start, end),
            _ => return None,
        };
        if !self.pixels_per_meter.is_finite() || self.pixels_per_meter <= 0.0 {
            return None;
        }
        let distance_m = start.distance_to(end) / self.pixels_per_meter;
        let seconds = elapsed_secs(points.len(), fps)?;
        to_kmh(distance_m, seconds)
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

#[derive(Debug, Clone)]
pub enum SpeedEstimator {
    Uncalibrated,
    Zoned(ZoneEstimator),
    FourPoint(FourPointEstimator),
    Flat(FlatEstimator),
}

impl SpeedEstimator {
    /// Estimator for exactly this model; `Uncalibrated` never estimates.
    pub fn new(model: &CalibrationModel) -> Self {
        match model {
            CalibrationModel::Uncalibrated => Self::Uncalibrated,
            CalibrationModel::ZoneBased { zones } => {
                info!("Using zone-based speed estimation ({} zones)", zones.len());
                Self::Zoned(ZoneEstimator::new(zones.clone()))
            }
            CalibrationModel::FourPoint {
                quad,
                reference_distance_m,
                target_width,
                target_height,
            } => {
                match FourPointEstimator::new(quad, *reference_distance_m, *target_width, *target_height) {
                    Some(estimator) => {
                        info!("Using 4-point homography-based speed estimation");
                        Self::FourPoint(estimator)
                    }
                    None => {
                        warn!("Four-point calibration could not build a perspective transform");
                        Self::Uncalibrated
                    }
                }
            }
            CalibrationModel::FlatFallback { pixels_per_meter } => {
                Self::Flat(FlatEstimator::new(*pixels_per_meter))
            }
        }
    }

    /// Estimator for a run on a frame resized by `scale_factor`, falling back
    /// to a flat scale when the video is uncalibrated.
    pub fn for_run(model: &CalibrationModel, scale_factor: f64) -> Self {
        Self::new(&run_calibration(model, scale_factor))
    }

    pub fn estimate(&self, points: &[Point], fps: f64) -> Option<f64> {
        match self {
            Self::Uncalibrated => None,
            Self::Zoned(e) => e.estimate(points, fps),
            Self::FourPoint(e) => e.estimate(points, fps),
            Self::Flat(e) => e.estimate(points, fps),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uncalibrated => "uncalibrated",
            Self::Zoned(_) => "zones",
            Self::FourPoint(_) => "four_point",
            Self::Flat(_) => "flat",
        }
    }
}

/// The calibration actually applied to a run: the model rescaled to the
/// working frame, or a flat fallback when nothing usable was calibrated.
pub fn run_calibration(model: &CalibrationModel, scale_factor: f64) -> CalibrationModel {
    if model.is_calibrated() {
        return rescale(model, scale_factor);
    }
    warn!("No calibration data - using fallback estimator");
    let fallback = CalibrationModel::FlatFallback {
        pixels_per_meter: FALLBACK_PIXELS_PER_METER,
    };
    rescale(&fallback, scale_factor)
}
