// src/main.rs

use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use traffic_speed::pipeline::{progress_percent, write_report, RunReport, SpeedRun};
use traffic_speed::replay::ReplaySource;
use traffic_speed::types::Config;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("traffic_speed={}", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Traffic speed estimation starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Processing: max_width={}, speed_limit={:.0} km/h, speed_calculation={}",
        config.processing.max_width,
        config.processing.speed_limit_kmh,
        config.processing.enable_speed_calculation
    );

    let source = ReplaySource::new(config.input.clone());
    let track_files = source.find_track_files()?;

    if track_files.is_empty() {
        error!("No track files found in {}", config.input.dir);
        return Ok(());
    }

    for (idx, path) in track_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing run {}/{}: {}",
            idx + 1,
            track_files.len(),
            path.display()
        );

        let started = Instant::now();
        match process_track_file(path, &source, &config) {
            Ok(report) => {
                info!("✓ Run processed in {:.2}s", started.elapsed().as_secs_f64());
                log_report(&report);
            }
            Err(e) => {
                error!("Failed to process {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(())
}

fn process_track_file(path: &Path, source: &ReplaySource, config: &Config) -> Result<RunReport> {
    let replay = source.open(path)?;
    let name = path.to_string_lossy().to_string();

    let mut run = SpeedRun::new(
        replay.calibration.as_ref(),
        replay.source,
        config.processing.clone(),
    )
    .with_progress(Box::new(|done, total| {
        info!(
            "  Progress: {} frames ({}%)",
            done,
            progress_percent(done, total, false)
        );
    }));

    for frame in &replay.frames {
        run.process_frame(frame);
    }

    let report = run.finish(&name);

    if config.output.write_reports {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("run");
        write_report(&report, Path::new(&config.output.dir), stem)?;
    }

    Ok(report)
}

fn log_report(report: &RunReport) {
    let fmt_speed = |s: Option<f64>| {
        s.map(|v| format!("{:.1} km/h", v))
            .unwrap_or_else(|| "N/A".to_string())
    };

    info!("  Estimator: {} (scale={:.2})", report.estimator, report.scale_factor);
    info!(
        "  Frames: {} processed / {} total ({:.1}s of video)",
        report.frames_processed, report.total_frames, report.duration_s
    );
    info!("  🔢 Tracks seen: {}", report.tracks_seen);
    info!("  🚙 Vehicles measured: {}", report.vehicle_count);
    info!("  Speed samples: {}", report.speeds_calculated);
    info!(
        "  Speeds: avg {}, max {}, min {}",
        fmt_speed(report.avg_speed),
        fmt_speed(report.max_speed),
        fmt_speed(report.min_speed)
    );

    let speeding = report.speeding_count();
    if speeding > 0 {
        warn!(
            "  🚨 {} vehicle(s) above {:.0} km/h",
            speeding, report.speed_limit_kmh
        );
    } else {
        info!("  Vehicles above limit: 0");
    }

    let m = &report.metrics;
    if m.outside_calibrated_area + m.below_confidence + m.missing_anchor > 0 {
        info!(
            "  Ignored observations: {} outside calibrated area, {} low confidence, {} without anchor",
            m.outside_calibrated_area, m.below_confidence, m.missing_anchor
        );
    }
    info!(
        "  Estimates: {} attempted, {} without estimate, {} implausible",
        m.estimates_attempted, m.no_estimate, m.implausible_rejected
    );
    info!("  Processing Speed: {:.1} FPS", m.processing_fps);
}
