// src/pipeline/report.rs

use super::metrics::MetricsSummary;
use crate::aggregator::DetectionRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything a run hands to persistence
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub processed_at: String,
    pub estimator: String,
    pub scale_factor: f64,
    pub processing_width: u32,
    pub processing_height: u32,
    pub fps: f64,
    pub total_frames: u64,
    pub duration_s: f64,
    pub frames_processed: u64,
    /// Vehicles with at least one accepted speed sample
    pub vehicle_count: usize,
    /// Every track-id that passed gating, measured or not
    pub tracks_seen: usize,
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub min_speed: Option<f64>,
    pub speeds_calculated: usize,
    pub speed_limit_kmh: f64,
    /// Calibration actually applied (after rescaling / fallback)
    pub calibration: Value,
    pub vehicle_detections: Vec<DetectionRecord>,
    pub metrics: MetricsSummary,
}

impl RunReport {
    pub fn speeding_count(&self) -> usize {
        self.vehicle_detections.iter().filter(|d| d.is_speeding).count()
    }
}

/// Write `<stem>_detections.jsonl` and `<stem>_report.json` into `output_dir`.
pub fn write_report(report: &RunReport, output_dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir {}", output_dir.display()))?;

    let detections_path = output_dir.join(format!("{}_detections.jsonl", stem));
    let file = File::create(&detections_path)
        .with_context(|| format!("Failed to create {}", detections_path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in &report.vehicle_detections {
        writeln!(writer, "{}", serde_json::to_string(record)?)?;
    }
    writer.flush()?;

    let report_path = output_dir.join(format!("{}_report.json", stem));
    fs::write(&report_path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    info!(
        "Saved {} vehicle detection(s) to {}",
        report.vehicle_detections.len(),
        detections_path.display()
    );
    Ok((detections_path, report_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunMetrics;

    fn report() -> RunReport {
        RunReport {
            source: "cam1.json".to_string(),
            processed_at: "2026-01-01T00:00:00+00:00".to_string(),
            estimator: "flat".to_string(),
            scale_factor: 1.0,
            processing_width: 1280,
            processing_height: 720,
            fps: 25.0,
            total_frames: 250,
            duration_s: 10.0,
            frames_processed: 250,
            vehicle_count: 2,
            tracks_seen: 3,
            avg_speed: Some(70.0),
            max_speed: Some(95.0),
            min_speed: Some(45.0),
            speeds_calculated: 40,
            speed_limit_kmh: 80.0,
            calibration: serde_json::json!({ "mode": "flat", "pixels_per_meter": 25.0, "calibrated": true }),
            vehicle_detections: vec![
                DetectionRecord {
                    track_id: 1,
                    timestamp: 2.0,
                    frame_number: 50,
                    speed: 95.0,
                    is_speeding: true,
                },
                DetectionRecord {
                    track_id: 2,
                    timestamp: 4.0,
                    frame_number: 100,
                    speed: 60.0,
                    is_speeding: false,
                },
            ],
            metrics: RunMetrics::new().summary(),
        }
    }

    #[test]
    fn test_write_report_files() {
        let dir = std::env::temp_dir().join(format!("traffic-speed-report-{}", std::process::id()));
        let (detections, summary) = write_report(&report(), &dir, "cam1").unwrap();

        let lines: Vec<Value> = fs::read_to_string(&detections)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["track_id"], 1);
        assert_eq!(lines[0]["is_speeding"], true);

        let parsed: Value = serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(parsed["vehicle_count"], 2);
        assert_eq!(parsed["calibration"]["mode"], "flat");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_speeding_count() {
        assert_eq!(report().speeding_count(), 1);
    }
}
