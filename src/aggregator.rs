// src/aggregator.rs
//
// Folds per-frame speed samples into run statistics and one peak record
// per vehicle. Statistics are derived from the raw sample list at the end
// of the run rather than maintained incrementally.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Physical plausibility window, exclusive on both ends (km/h)
pub const MIN_PLAUSIBLE_KMH: f64 = 0.0;
pub const MAX_PLAUSIBLE_KMH: f64 = 200.0;

pub fn is_plausible(speed_kmh: f64) -> bool {
    speed_kmh > MIN_PLAUSIBLE_KMH && speed_kmh < MAX_PLAUSIBLE_KMH
}

/// A sample that passed the plausibility filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedSample {
    pub track_id: u32,
    pub speed_kmh: f64,
    pub frame_number: u64,
    pub timestamp_s: f64,
    pub is_speeding: bool,
}

/// Highest accepted speed for a vehicle and where it was observed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerVehiclePeak {
    pub track_id: u32,
    pub speed_kmh: f64,
    pub frame_number: u64,
    pub timestamp_s: f64,
    pub is_speeding: bool,
}

/// Row-level persistence shape for one vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub track_id: u32,
    pub timestamp: f64,
    pub frame_number: u64,
    pub speed: f64,
    pub is_speeding: bool,
}

impl From<&PerVehiclePeak> for DetectionRecord {
    fn from(peak: &PerVehiclePeak) -> Self {
        Self {
            track_id: peak.track_id,
            timestamp: peak.timestamp_s,
            frame_number: peak.frame_number,
            speed: peak.speed_kmh,
            is_speeding: peak.is_speeding,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub unique_vehicle_count: usize,
    pub speed_samples: Vec<f64>,
}

impl RunStatistics {
    pub fn count(&self) -> usize {
        self.speed_samples.len()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.speed_samples.is_empty() {
            return None;
        }
        Some(self.speed_samples.iter().sum::<f64>() / self.speed_samples.len() as f64)
    }

    pub fn max(&self) -> Option<f64> {
        self.speed_samples.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.speed_samples.iter().copied().reduce(f64::min)
    }

    pub fn summary(&self) -> SpeedSummary {
        SpeedSummary {
            count: self.count(),
            unique_vehicle_count: self.unique_vehicle_count,
            avg: self.avg(),
            max: self.max(),
            min: self.min(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedSummary {
    pub count: usize,
    pub unique_vehicle_count: usize,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub statistics: SpeedSummary,
    pub peaks: BTreeMap<u32, PerVehiclePeak>,
}

impl RunSummary {
    pub fn detection_records(&self) -> Vec<DetectionRecord> {
        self.peaks.values().map(DetectionRecord::from).collect()
    }
}

#[derive(Debug, Default)]
pub struct SpeedAggregator {
    samples: Vec<f64>,
    vehicles: BTreeSet<u32>,
    peaks: BTreeMap<u32, PerVehiclePeak>,
}

impl SpeedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one estimate into the run. `None` and implausible speeds leave
    /// all state untouched and return `None`.
    pub fn observe(
        &mut self,
        track_id: u32,
        speed_kmh: Option<f64>,
        frame_number: u64,
        timestamp_s: f64,
        speed_limit_kmh: f64,
    ) -> Option<SpeedSample> {
        let speed_kmh = speed_kmh?;
        if !is_plausible(speed_kmh) {
            debug!(
                "Track #{}: dropping implausible speed {:.1} km/h at frame {}",
                track_id, speed_kmh, frame_number
            );
            return None;
        }

        let sample = SpeedSample {
            track_id,
            speed_kmh,
            frame_number,
            timestamp_s,
            is_speeding: speed_kmh > speed_limit_kmh,
        };

        self.samples.push(speed_kmh);
        self.vehicles.insert(track_id);

        let is_new_peak = self
            .peaks
            .get(&track_id)
            .map_or(true, |peak| speed_kmh > peak.speed_kmh);
        if is_new_peak {
            self.peaks.insert(
                track_id,
                PerVehiclePeak {
                    track_id,
                    speed_kmh,
                    frame_number,
                    timestamp_s,
                    is_speeding: sample.is_speeding,
                },
            );
        }

        Some(sample)
    }

    pub fn statistics(&self) -> RunStatistics {
        RunStatistics {
            unique_vehicle_count: self.vehicles.len(),
            speed_samples: self.samples.clone(),
        }
    }

    pub fn peak_for(&self, track_id: u32) -> Option<&PerVehiclePeak> {
        self.peaks.get(&track_id)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn finalize(&self) -> RunSummary {
        RunSummary {
            statistics: self.statistics().summary(),
            peaks: self.peaks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: f64 = 80.0;

    #[test]
    fn test_peak_not_latest() {
        let mut agg = SpeedAggregator::new();
        agg.observe(7, Some(60.0), 10, 0.4, LIMIT);
        agg.observe(7, Some(85.0), 11, 0.44, LIMIT);
        agg.observe(7, Some(40.0), 12, 0.48, LIMIT);

        let peak = agg.peak_for(7).unwrap();
        assert_eq!(peak.speed_kmh, 85.0);
        assert_eq!(peak.frame_number, 11);
        assert_eq!(peak.timestamp_s, 0.44);
        assert!(peak.is_speeding);
        assert_eq!(agg.sample_count(), 3);
    }

    #[test]
    fn test_boundaries_excluded() {
        let mut agg = SpeedAggregator::new();
        assert!(agg.observe(1, Some(0.0), 1, 0.0, LIMIT).is_none());
        assert!(agg.observe(1, Some(200.0), 2, 0.1, LIMIT).is_none());
        assert!(agg.observe(1, Some(-5.0), 3, 0.2, LIMIT).is_none());
        assert!(agg.observe(1, Some(f64::NAN), 4, 0.3, LIMIT).is_none());
        assert!(agg.observe(1, None, 5, 0.4, LIMIT).is_none());

        let summary = agg.finalize();
        assert_eq!(summary.statistics.count, 0);
        assert_eq!(summary.statistics.unique_vehicle_count, 0);
        assert_eq!(summary.statistics.avg, None);
        assert_eq!(summary.statistics.max, None);
        assert_eq!(summary.statistics.min, None);
        assert!(summary.peaks.is_empty());
    }

    #[test]
    fn test_just_inside_boundaries_accepted() {
        let mut agg = SpeedAggregator::new();
        assert!(agg.observe(1, Some(0.001), 1, 0.0, LIMIT).is_some());
        assert!(agg.observe(2, Some(199.999), 1, 0.0, LIMIT).is_some());
        assert_eq!(agg.finalize().statistics.unique_vehicle_count, 2);
    }

    #[test]
    fn test_speeding_flag_does_not_change_aggregation() {
        let mut agg = SpeedAggregator::new();
        let slow = agg.observe(1, Some(50.0), 1, 0.04, LIMIT).unwrap();
        let fast = agg.observe(2, Some(120.0), 1, 0.04, LIMIT).unwrap();
        assert!(!slow.is_speeding);
        assert!(fast.is_speeding);
        assert!(!agg.observe(3, Some(80.0), 1, 0.04, LIMIT).unwrap().is_speeding);
        assert_eq!(agg.sample_count(), 3);
    }

    #[test]
    fn test_summary_and_records() {
        let mut agg = SpeedAggregator::new();
        agg.observe(3, Some(30.0), 5, 0.2, LIMIT);
        agg.observe(1, Some(90.0), 6, 0.24, LIMIT);
        agg.observe(3, Some(60.0), 7, 0.28, LIMIT);

        let summary = agg.finalize();
        assert_eq!(summary.statistics.count, 3);
        assert_eq!(summary.statistics.unique_vehicle_count, 2);
        assert_eq!(summary.statistics.avg, Some(60.0));
        assert_eq!(summary.statistics.max, Some(90.0));
        assert_eq!(summary.statistics.min, Some(30.0));

        let records = summary.detection_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].track_id, 1);
        assert!(records[0].is_speeding);
        assert_eq!(records[1].track_id, 3);
        assert_eq!(records[1].speed, 60.0);
        assert_eq!(records[1].frame_number, 7);
    }
}
