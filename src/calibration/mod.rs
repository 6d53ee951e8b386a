// src/calibration/mod.rs
//
// Pixel → meter calibration for a fixed traffic camera.
//
//   persisted record (JSON) → CalibrationModel::from_record
//                           → scale::rescale (frame resized for processing)
//                           → speed::SpeedEstimator
//
// Models are immutable values; rescaling produces a new model so the
// calibration stored with the run is never aliased with the working copy.

pub mod model;
pub mod region;
pub mod scale;

pub use model::{CalibrationModel, Zone};
pub use region::CalibratedRegion;
pub use scale::rescale;

/// Scale used when nothing better is known (typical highway camera).
pub const FALLBACK_PIXELS_PER_METER: f64 = 25.0;

/// Projection rectangle width when the record does not specify one
pub const DEFAULT_TARGET_WIDTH: u32 = 25;

/// Projection rectangle height when `reference_distance * 10` is unusable
pub const DEFAULT_TARGET_HEIGHT: u32 = 250;
