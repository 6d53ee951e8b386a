// src/lib.rs
//
// Vehicle speed estimation from tracked pixel trajectories.
//
//   calibration record ─→ calibration::CalibrationModel ─→ scale::rescale
//                                                              │
//   tracker (id, anchor) ─→ trajectory::TrajectoryStore ─→ speed::SpeedEstimator
//                                                              │
//                                      aggregator::SpeedAggregator ─→ report
//
// Orchestrated per video by pipeline::SpeedRun.

pub mod aggregator;
pub mod calibration;
pub mod config;
pub mod pipeline;
pub mod replay;
pub mod speed;
pub mod trajectory;
pub mod types;

pub use aggregator::{DetectionRecord, PerVehiclePeak, RunStatistics, SpeedAggregator, SpeedSample};
pub use calibration::{CalibrationModel, Zone};
pub use pipeline::{RunReport, SpeedRun};
pub use speed::SpeedEstimator;
pub use trajectory::TrajectoryStore;
pub use types::{Config, Point};
