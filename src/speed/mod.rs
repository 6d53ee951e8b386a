// src/speed/mod.rs

pub mod estimator;
pub mod homography;

pub use estimator::{
    run_calibration, FlatEstimator, FourPointEstimator, SpeedEstimator, ZoneEstimator,
};
pub use homography::Homography;
