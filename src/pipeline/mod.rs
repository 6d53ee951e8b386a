// src/pipeline/mod.rs

pub mod metrics;
pub mod report;
pub mod run;

pub use metrics::{MetricsSummary, RunMetrics};
pub use report::{write_report, RunReport};
pub use run::{progress_percent, FrameOutcome, ProgressCallback, SpeedRun};
