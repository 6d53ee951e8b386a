// src/calibration/scale.rs
//
// Calibration captured on the original frame, processing done on a resized
// one: every pixel-space quantity follows the frame by `scale_factor`
// (new_width / original_width, same on both axes). Physical quantities and
// the synthetic projection rectangle are left alone.

use super::model::{CalibrationModel, Zone};
use tracing::{info, warn};

/// Pure rescale; returns a new model of the same variant.
pub fn rescale(model: &CalibrationModel, scale_factor: f64) -> CalibrationModel {
    if scale_factor == 1.0 {
        return model.clone();
    }
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
        warn!(
            "Ignoring invalid calibration scale factor {}, keeping original calibration",
            scale_factor
        );
        return model.clone();
    }

    let scaled = match model {
        CalibrationModel::Uncalibrated => CalibrationModel::Uncalibrated,
        CalibrationModel::ZoneBased { zones } => CalibrationModel::ZoneBased {
            zones: zones
                .iter()
                .map(|z| Zone {
                    name: z.name.clone(),
                    y_min: z.y_min * scale_factor,
                    y_max: z.y_max * scale_factor,
                    pixels_per_meter: z.pixels_per_meter * scale_factor,
                })
                .collect(),
        },
        CalibrationModel::FourPoint {
            quad,
            reference_distance_m,
            target_width,
            target_height,
        } => CalibrationModel::FourPoint {
            quad: quad.map(|p| p.scaled(scale_factor)),
            reference_distance_m: *reference_distance_m,
            target_width: *target_width,
            target_height: *target_height,
        },
        CalibrationModel::FlatFallback { pixels_per_meter } => CalibrationModel::FlatFallback {
            pixels_per_meter: pixels_per_meter * scale_factor,
        },
    };

    info!(
        "Scaled {} calibration for resized frame (scale={:.2})",
        model.mode_name(),
        scale_factor
    );
    scaled
}

impl CalibrationModel {
    pub fn rescaled(&self, scale_factor: f64) -> CalibrationModel {
        rescale(self, scale_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn zones() -> CalibrationModel {
        CalibrationModel::zone_based(vec![
            Zone::new("far", 120.0, 360.0, 12.0).unwrap(),
            Zone::new("near", 600.0, 1080.0, 48.0).unwrap(),
        ])
    }

    #[test]
    fn test_identity_at_one() {
        assert_eq!(rescale(&zones(), 1.0), zones());
    }

    #[test]
    fn test_zone_round_trip_restores_values() {
        let original = zones();
        for factor in [0.5, 1.0 / 3.0, 0.6667, 2.0] {
            let restored = rescale(&rescale(&original, factor), 1.0 / factor);
            match (&original, &restored) {
                (CalibrationModel::ZoneBased { zones: a }, CalibrationModel::ZoneBased { zones: b }) => {
                    for (za, zb) in a.iter().zip(b) {
                        assert!((za.y_min - zb.y_min).abs() < 1e-9);
                        assert!((za.y_max - zb.y_max).abs() < 1e-9);
                        assert!((za.pixels_per_meter - zb.pixels_per_meter).abs() < 1e-9);
                        assert_eq!(za.name, zb.name);
                    }
                }
                _ => panic!("variant changed"),
            }
        }
    }

    #[test]
    fn test_four_point_scales_quad_only() {
        let model = CalibrationModel::four_point(
            [
                Point::new(400.0, 200.0),
                Point::new(800.0, 200.0),
                Point::new(1000.0, 900.0),
                Point::new(200.0, 900.0),
            ],
            30.0,
            25,
            None,
        )
        .unwrap();
        match rescale(&model, 0.5) {
            CalibrationModel::FourPoint {
                quad,
                reference_distance_m,
                target_width,
                target_height,
            } => {
                assert_eq!(quad[0], Point::new(200.0, 100.0));
                assert_eq!(quad[2], Point::new(500.0, 450.0));
                assert_eq!(reference_distance_m, 30.0);
                assert_eq!(target_width, 25);
                assert_eq!(target_height, 300);
            }
            other => panic!("expected four point, got {:?}", other),
        }
    }

    #[test]
    fn test_flat_and_invalid_factor() {
        let flat = CalibrationModel::flat(25.0).unwrap();
        assert_eq!(
            rescale(&flat, 0.5),
            CalibrationModel::FlatFallback { pixels_per_meter: 12.5 }
        );
        assert_eq!(rescale(&flat, 0.0), flat);
        assert_eq!(rescale(&flat, f64::NAN), flat);
        assert_eq!(rescale(&CalibrationModel::Uncalibrated, 0.5), CalibrationModel::Uncalibrated);
    }
}
