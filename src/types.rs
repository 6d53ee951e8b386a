// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory scanned recursively for tracker output files
    #[serde(default = "default_input_dir")]
    pub dir: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_true")]
    pub write_reports: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_reports: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Frames wider than this are processed at this width (aspect preserved)
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_speed_limit")]
    pub speed_limit_kmh: f64,
    #[serde(default = "default_true")]
    pub enable_speed_calculation: bool,
    /// Observations below this detector confidence are ignored
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Ignore anchors outside the four-point calibration quad
    #[serde(default = "default_true")]
    pub restrict_to_calibrated_area: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_frames: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            speed_limit_kmh: default_speed_limit(),
            enable_speed_calculation: true,
            min_confidence: default_min_confidence(),
            restrict_to_calibrated_area: true,
            progress_interval_frames: default_progress_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_input_dir() -> String {
    "tracks".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_max_width() -> u32 {
    1280
}

fn default_speed_limit() -> f64 {
    80.0
}

fn default_min_confidence() -> f32 {
    0.3
}

fn default_progress_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// GEOMETRY & TRACKER INPUT
// ============================================================================

/// Pixel-space point (x right, y down)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn scaled(&self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point::new(x, y)
    }
}

/// One tracked object on one frame, as reported by the external tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackObservation {
    pub track_id: u32,
    /// Anchor point; takes precedence over `bbox` when both are present
    #[serde(default)]
    pub anchor: Option<[f64; 2]>,
    /// [x1, y1, x2, y2] pixels
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub class_id: Option<u32>,
}

impl TrackObservation {
    pub fn at(track_id: u32, point: Point) -> Self {
        Self {
            track_id,
            anchor: Some([point.x, point.y]),
            bbox: None,
            confidence: None,
            class_id: None,
        }
    }

    /// Anchor point in the source frame: explicit anchor, else bbox bottom-center
    pub fn anchor_point(&self) -> Option<Point> {
        if let Some(anchor) = self.anchor {
            return Some(Point::from(anchor));
        }
        self.bbox.map(|b| Point::new((b[0] + b[2]) * 0.5, b[3]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservations {
    pub frame_number: u64,
    #[serde(default)]
    pub tracks: Vec<TrackObservation>,
}

/// Geometry and timing of the source video
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default)]
    pub total_frames: Option<u64>,
}

impl SourceGeometry {
    /// Factor applied to pixel quantities when the frame is capped to `max_width`
    pub fn scale_factor(&self, max_width: u32) -> f64 {
        if max_width > 0 && self.width > max_width {
            max_width as f64 / self.width as f64
        } else {
            1.0
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        if self.fps > 0.0 {
            self.total_frames.map(|n| n as f64 / self.fps)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_prefers_explicit_point() {
        let obs = TrackObservation {
            track_id: 1,
            anchor: Some([10.0, 20.0]),
            bbox: Some([0.0, 0.0, 100.0, 50.0]),
            confidence: None,
            class_id: None,
        };
        assert_eq!(obs.anchor_point(), Some(Point::new(10.0, 20.0)));
    }

    #[test]
    fn test_anchor_from_bbox_bottom_center() {
        let obs = TrackObservation {
            track_id: 1,
            anchor: None,
            bbox: Some([100.0, 200.0, 300.0, 260.0]),
            confidence: Some(0.9),
            class_id: Some(2),
        };
        assert_eq!(obs.anchor_point(), Some(Point::new(200.0, 260.0)));
    }

    #[test]
    fn test_scale_factor_only_when_wider_than_cap() {
        let geometry = SourceGeometry {
            width: 3840,
            height: 2160,
            fps: 30.0,
            total_frames: Some(300),
        };
        assert!((geometry.scale_factor(1280) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(geometry.duration_secs(), Some(10.0));

        let small = SourceGeometry {
            width: 1280,
            ..geometry
        };
        assert_eq!(small.scale_factor(1280), 1.0);
    }
}
