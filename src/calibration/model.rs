// src/calibration/model.rs

use super::region;
use super::{DEFAULT_TARGET_HEIGHT, DEFAULT_TARGET_WIDTH};
use crate::types::Point;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const MIN_TARGET_SIDE: u32 = 2;

// ============================================================================
// ZONE
// ============================================================================

/// Horizontal band of the image with its own pixels-per-meter scale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub name: String,
    pub y_min: f64,
    pub y_max: f64,
    pub pixels_per_meter: f64,
}

impl Zone {
    /// Validated constructor: `y_min <= y_max`, positive finite scale.
    pub fn new(name: impl Into<String>, y_min: f64, y_max: f64, pixels_per_meter: f64) -> Option<Self> {
        if !(y_min.is_finite() && y_max.is_finite()) || y_min > y_max {
            return None;
        }
        if !pixels_per_meter.is_finite() || pixels_per_meter <= 0.0 {
            return None;
        }
        Some(Self {
            name: name.into(),
            y_min,
            y_max,
            pixels_per_meter,
        })
    }

    /// Manual calibration: two image points a known real distance apart.
    pub fn from_reference(
        name: impl Into<String>,
        y_min: f64,
        y_max: f64,
        p1: Point,
        p2: Point,
        real_distance_m: f64,
    ) -> Option<Self> {
        if !real_distance_m.is_finite() || real_distance_m <= 0.0 {
            return None;
        }
        let pixels_per_meter = p1.distance_to(&p2) / real_distance_m;
        let zone = Self::new(name, y_min, y_max, pixels_per_meter)?;
        info!(
            "Zone '{}' calibrated: y={:.0}-{:.0}, scale={:.2} px/m",
            zone.name, zone.y_min, zone.y_max, zone.pixels_per_meter
        );
        Some(zone)
    }

    pub fn contains(&self, y: f64) -> bool {
        self.y_min <= y && y <= self.y_max
    }

    fn to_record(&self) -> Value {
        json!({
            "name": self.name,
            "y_range": [self.y_min, self.y_max],
            "pixels_per_meter": self.pixels_per_meter,
        })
    }
}

/// Persisted zone shape. `y_range` is the stored form; `y_min`/`y_max` are accepted too.
#[derive(Debug, Deserialize)]
struct ZoneRecord {
    #[serde(default = "default_zone_name")]
    name: String,
    #[serde(default)]
    y_range: Option<[f64; 2]>,
    #[serde(default)]
    y_min: Option<f64>,
    #[serde(default)]
    y_max: Option<f64>,
    pixels_per_meter: f64,
}

fn default_zone_name() -> String {
    "zone".to_string()
}

impl ZoneRecord {
    fn into_zone(self) -> Option<Zone> {
        let (y_min, y_max) = match (self.y_range, self.y_min, self.y_max) {
            (Some([lo, hi]), _, _) => (lo, hi),
            (None, Some(lo), Some(hi)) => (lo, hi),
            _ => return None,
        };
        Zone::new(self.name, y_min, y_max, self.pixels_per_meter)
    }
}

// ============================================================================
// CALIBRATION MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationModel {
    /// No conversion possible
    Uncalibrated,
    /// Piecewise scale by vertical band; zones sorted ascending by `y_min`
    ZoneBased { zones: Vec<Zone> },
    /// Planar homography from an image quad onto a synthetic rectangle
    FourPoint {
        quad: [Point; 4],
        reference_distance_m: f64,
        target_width: u32,
        target_height: u32,
    },
    /// Single scale for the whole frame
    FlatFallback { pixels_per_meter: f64 },
}

impl CalibrationModel {
    /// Zone model with zones sorted by `y_min`. Order among equal `y_min` is kept.
    pub fn zone_based(mut zones: Vec<Zone>) -> Self {
        zones.sort_by(|a, b| {
            a.y_min
                .partial_cmp(&b.y_min)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self::ZoneBased { zones }
    }

    /// Four-point model. `target_height` of `None` derives it from the reference distance.
    pub fn four_point(
        quad: [Point; 4],
        reference_distance_m: f64,
        target_width: u32,
        target_height: Option<u32>,
    ) -> Option<Self> {
        if !reference_distance_m.is_finite() || reference_distance_m <= 0.0 {
            return None;
        }
        let target_height = match target_height {
            Some(h) if h > 0 => h,
            _ => default_target_height(reference_distance_m),
        };
        // Projection rectangle spans [0, side-1]; a side of 1 collapses it to a line
        if target_width < MIN_TARGET_SIDE || target_height < MIN_TARGET_SIDE {
            warn!(
                "Four-point target {}x{} is too small to project onto",
                target_width, target_height
            );
            return None;
        }
        if !region::is_valid_quad(&quad) {
            return None;
        }
        Some(Self::FourPoint {
            quad,
            reference_distance_m,
            target_width,
            target_height,
        })
    }

    pub fn flat(pixels_per_meter: f64) -> Option<Self> {
        if pixels_per_meter.is_finite() && pixels_per_meter > 0.0 {
            Some(Self::FlatFallback { pixels_per_meter })
        } else {
            None
        }
    }

    /// Parse a persisted calibration record. Never fails: anything unusable
    /// degrades to `Uncalibrated` with a warning.
    pub fn from_record(record: &Value) -> Self {
        if !record.is_object() {
            warn!("Calibration record is not an object - treating video as uncalibrated");
            return Self::Uncalibrated;
        }

        if record.get("calibrated").and_then(Value::as_bool) != Some(true) {
            debug!("Calibration record not marked calibrated");
            return Self::Uncalibrated;
        }

        let mode = record.get("mode").and_then(Value::as_str);
        let has_zones = record
            .get("zones")
            .and_then(Value::as_array)
            .map(|zones| !zones.is_empty())
            .unwrap_or(false);

        let parsed = if mode == Some("four_point") && !has_zones {
            parse_four_point(record)
        } else if has_zones {
            parse_zones(record)
        } else if mode == Some("flat") {
            record
                .get("pixels_per_meter")
                .and_then(Value::as_f64)
                .and_then(Self::flat)
        } else {
            warn!("Calibrated flag set but no four-point or zone data");
            None
        };

        match parsed {
            Some(model) => {
                info!("Calibration loaded: {}", model.describe());
                model
            }
            None => {
                warn!(
                    "Invalid {} calibration record - treating video as uncalibrated",
                    mode.unwrap_or("zones")
                );
                Self::Uncalibrated
            }
        }
    }

    /// Export in the persisted record shape (`from_record(to_record(m)) == m`).
    pub fn to_record(&self) -> Value {
        match self {
            Self::Uncalibrated => json!({ "calibrated": false }),
            Self::ZoneBased { zones } => json!({
                "mode": "zones",
                "zones": zones.iter().map(Zone::to_record).collect::<Vec<_>>(),
                "calibrated": !zones.is_empty(),
            }),
            Self::FourPoint {
                quad,
                reference_distance_m,
                target_width,
                target_height,
            } => json!({
                "mode": "four_point",
                "points": quad.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
                "reference_distance": reference_distance_m,
                "target_width": target_width,
                "target_height": target_height,
                "calibrated": true,
            }),
            Self::FlatFallback { pixels_per_meter } => json!({
                "mode": "flat",
                "pixels_per_meter": pixels_per_meter,
                "calibrated": true,
            }),
        }
    }

    /// Return a new model with `zone` added in `y_min` order.
    pub fn with_zone(&self, zone: Zone) -> Self {
        let mut zones = match self {
            Self::ZoneBased { zones } => zones.clone(),
            Self::Uncalibrated => Vec::new(),
            other => {
                warn!(
                    "Cannot add zone '{}' to a {} calibration",
                    zone.name,
                    other.mode_name()
                );
                return other.clone();
            }
        };
        zones.push(zone);
        Self::zone_based(zones)
    }

    pub fn is_calibrated(&self) -> bool {
        match self {
            Self::Uncalibrated => false,
            Self::ZoneBased { zones } => !zones.is_empty(),
            Self::FourPoint { .. } | Self::FlatFallback { .. } => true,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Uncalibrated => "uncalibrated",
            Self::ZoneBased { .. } => "zones",
            Self::FourPoint { .. } => "four_point",
            Self::FlatFallback { .. } => "flat",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Uncalibrated => "uncalibrated".to_string(),
            Self::ZoneBased { zones } => format!("{} zone(s)", zones.len()),
            Self::FourPoint {
                reference_distance_m,
                target_width,
                target_height,
                ..
            } => format!(
                "four-point, reference_distance={:.2}m, target={}x{}",
                reference_distance_m, target_width, target_height
            ),
            Self::FlatFallback { pixels_per_meter } => {
                format!("flat {:.2} px/m", pixels_per_meter)
            }
        }
    }
}

/// `round(reference_distance * 10)`, or the fixed default when that is not positive
fn default_target_height(reference_distance_m: f64) -> u32 {
    let derived = (reference_distance_m * 10.0).round();
    if derived >= 1.0 && derived <= u32::MAX as f64 {
        derived as u32
    } else {
        DEFAULT_TARGET_HEIGHT
    }
}

fn parse_zones(record: &Value) -> Option<CalibrationModel> {
    let raw = record.get("zones")?.as_array()?;
    let mut zones = Vec::with_capacity(raw.len());
    for entry in raw {
        let zone = serde_json::from_value::<ZoneRecord>(entry.clone())
            .ok()
            .and_then(ZoneRecord::into_zone);
        match zone {
            Some(zone) => {
                debug!(
                    "Loaded zone: {}, y_range: ({:.1}, {:.1}), scale: {:.2} px/m",
                    zone.name, zone.y_min, zone.y_max, zone.pixels_per_meter
                );
                zones.push(zone);
            }
            None => {
                warn!("Malformed calibration zone: {}", entry);
                return None;
            }
        }
    }
    Some(CalibrationModel::zone_based(zones))
}

fn parse_four_point(record: &Value) -> Option<CalibrationModel> {
    let points = record.get("points")?.as_array()?;
    if points.len() != 4 {
        warn!("Four-point calibration needs exactly 4 points, got {}", points.len());
        return None;
    }
    let mut quad = [Point::default(); 4];
    for (slot, raw) in quad.iter_mut().zip(points) {
        let xy = raw.as_array()?;
        if xy.len() != 2 {
            return None;
        }
        *slot = Point::new(xy[0].as_f64()?, xy[1].as_f64()?);
    }

    let reference_distance = record.get("reference_distance")?.as_f64()?;
    if reference_distance <= 0.0 {
        warn!("Four-point calibration has non-positive reference_distance");
        return None;
    }

    let target_width = match record.get("target_width") {
        None | Some(Value::Null) => DEFAULT_TARGET_WIDTH as i64,
        Some(v) => as_integer(v)?,
    };
    if target_width <= 0 {
        return None;
    }
    let target_height = match record.get("target_height") {
        None | Some(Value::Null) => None,
        Some(v) => Some(as_integer(v)?),
    };

    CalibrationModel::four_point(
        quad,
        reference_distance,
        u32::try_from(target_width).ok()?,
        target_height.and_then(|h| u32::try_from(h).ok()),
    )
}

/// Integer field that may have been stored as a float
fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_quad() -> Value {
        json!([[0.0, 0.0], [99.0, 0.0], [99.0, 249.0], [0.0, 249.0]])
    }

    #[test]
    fn test_zone_record_parsed_and_sorted() {
        let record = json!({
            "calibrated": true,
            "zones": [
                { "name": "near", "y_range": [500.0, 700.0], "pixels_per_meter": 40.0 },
                { "name": "far", "y_range": [100.0, 300.0], "pixels_per_meter": 10.0 },
            ]
        });
        match CalibrationModel::from_record(&record) {
            CalibrationModel::ZoneBased { zones } => {
                assert_eq!(zones.len(), 2);
                assert_eq!(zones[0].name, "far");
                assert_eq!(zones[1].name, "near");
            }
            other => panic!("expected zones, got {:?}", other),
        }
    }

    #[test]
    fn test_zone_accepts_y_min_y_max_and_default_name() {
        let record = json!({
            "calibrated": true,
            "zones": [{ "y_min": 0.0, "y_max": 10.0, "pixels_per_meter": 5.0 }]
        });
        match CalibrationModel::from_record(&record) {
            CalibrationModel::ZoneBased { zones } => assert_eq!(zones[0].name, "zone"),
            other => panic!("expected zones, got {:?}", other),
        }
    }

    #[test]
    fn test_not_calibrated_flag_is_uncalibrated() {
        let record = json!({
            "zones": [{ "y_range": [0.0, 10.0], "pixels_per_meter": 5.0 }]
        });
        assert_eq!(CalibrationModel::from_record(&record), CalibrationModel::Uncalibrated);
        assert_eq!(CalibrationModel::from_record(&json!(null)), CalibrationModel::Uncalibrated);
    }

    #[test]
    fn test_malformed_zone_degrades() {
        let bad_scale = json!({
            "calibrated": true,
            "zones": [{ "y_range": [0.0, 10.0], "pixels_per_meter": 0.0 }]
        });
        assert_eq!(CalibrationModel::from_record(&bad_scale), CalibrationModel::Uncalibrated);

        let non_numeric = json!({
            "calibrated": true,
            "zones": [{ "y_range": [0.0, 10.0], "pixels_per_meter": "fast" }]
        });
        assert_eq!(CalibrationModel::from_record(&non_numeric), CalibrationModel::Uncalibrated);
    }

    #[test]
    fn test_four_point_defaults() {
        let record = json!({
            "mode": "four_point",
            "calibrated": true,
            "points": square_quad(),
            "reference_distance": 25.0,
        });
        match CalibrationModel::from_record(&record) {
            CalibrationModel::FourPoint {
                target_width,
                target_height,
                reference_distance_m,
                ..
            } => {
                assert_eq!(target_width, DEFAULT_TARGET_WIDTH);
                assert_eq!(target_height, 250);
                assert_eq!(reference_distance_m, 25.0);
            }
            other => panic!("expected four point, got {:?}", other),
        }
    }

    #[test]
    fn test_four_point_height_rounds_reference_distance() {
        let model = CalibrationModel::four_point(
            [
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
            12.46,
            25,
            None,
        );
        match model {
            Some(CalibrationModel::FourPoint { target_height, .. }) => assert_eq!(target_height, 125),
            other => panic!("expected four point, got {:?}", other),
        }

        // round(0.1 * 10) = 1 leaves no height to project onto
        let short = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(CalibrationModel::four_point(short, 0.1, 25, None).is_none());
        assert!(CalibrationModel::four_point(short, 0.1, 25, Some(1)).is_none());
        assert!(CalibrationModel::four_point(short, 0.2, 2, None).is_some());
    }

    #[test]
    fn test_four_point_invalid_inputs() {
        let base = |points: Value, distance: f64, width: Value| {
            json!({
                "mode": "four_point",
                "calibrated": true,
                "points": points,
                "reference_distance": distance,
                "target_width": width,
            })
        };
        let three = json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        let collinear = json!([[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);

        for record in [
            base(three, 10.0, json!(25)),
            base(square_quad(), 0.0, json!(25)),
            base(square_quad(), -3.0, json!(25)),
            base(square_quad(), 10.0, json!(0)),
            base(collinear, 10.0, json!(25)),
            base(square_quad(), 10.0, json!(1)),
            base(square_quad(), 0.1, json!(25)),
        ] {
            assert_eq!(CalibrationModel::from_record(&record), CalibrationModel::Uncalibrated);
        }
    }

    #[test]
    fn test_export_round_trip() {
        let zones = CalibrationModel::zone_based(vec![
            Zone::new("far", 100.0, 300.0, 10.0).unwrap(),
            Zone::new("near", 400.0, 700.0, 30.0).unwrap(),
        ]);
        assert_eq!(CalibrationModel::from_record(&zones.to_record()), zones);

        let record = json!({
            "mode": "four_point",
            "calibrated": true,
            "points": square_quad(),
            "reference_distance": 25.0,
            "target_width": 25,
            "target_height": 250,
        });
        let four = CalibrationModel::from_record(&record);
        assert!(four.is_calibrated());
        assert_eq!(CalibrationModel::from_record(&four.to_record()), four);

        let flat = CalibrationModel::flat(12.5).unwrap();
        assert_eq!(CalibrationModel::from_record(&flat.to_record()), flat);
    }

    #[test]
    fn test_manual_zone_from_reference() {
        let zone = Zone::from_reference(
            "middle",
            200.0,
            400.0,
            Point::new(0.0, 300.0),
            Point::new(30.0, 340.0),
            2.0,
        )
        .unwrap();
        assert!((zone.pixels_per_meter - 25.0).abs() < 1e-12);

        assert!(Zone::from_reference("x", 0.0, 1.0, Point::default(), Point::default(), 0.0).is_none());
        assert!(Zone::from_reference("x", 0.0, 1.0, Point::default(), Point::default(), 1.0).is_none());
    }

    #[test]
    fn test_with_zone_keeps_order() {
        let model = CalibrationModel::Uncalibrated
            .with_zone(Zone::new("near", 500.0, 700.0, 40.0).unwrap())
            .with_zone(Zone::new("far", 0.0, 200.0, 10.0).unwrap());
        match model {
            CalibrationModel::ZoneBased { zones } => {
                assert_eq!(zones[0].name, "far");
                assert_eq!(zones[1].name, "near");
            }
            other => panic!("expected zones, got {:?}", other),
        }

        let flat = CalibrationModel::flat(20.0).unwrap();
        assert_eq!(flat.with_zone(Zone::new("z", 0.0, 1.0, 1.0).unwrap()), flat);
    }
}
