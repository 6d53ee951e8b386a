// src/replay.rs
//
// Tracker output recorded to disk: source geometry, optional calibration
// record and per-frame (track_id, anchor|bbox) observations. Coordinates
// are in the processing frame the detector and tracker ran on.

use crate::types::{FrameObservations, InputConfig, SourceGeometry};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackReplay {
    pub source: SourceGeometry,
    #[serde(default)]
    pub calibration: Option<Value>,
    #[serde(default)]
    pub frames: Vec<FrameObservations>,
}

impl TrackReplay {
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut replay: TrackReplay =
            serde_json::from_str(contents).context("Invalid track replay document")?;

        if !replay.source.fps.is_finite() || replay.source.fps <= 0.0 {
            anyhow::bail!("Track replay has invalid fps {}", replay.source.fps);
        }

        let ordered = replay
            .frames
            .windows(2)
            .all(|w| w[0].frame_number < w[1].frame_number);
        if !ordered {
            warn!("Frames out of order in track replay, sorting by frame number");
            replay.frames.sort_by_key(|f| f.frame_number);
        }
        Ok(replay)
    }

    pub fn observation_count(&self) -> usize {
        self.frames.iter().map(|f| f.tracks.len()).sum()
    }
}

pub struct ReplaySource {
    config: InputConfig,
}

impl ReplaySource {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    pub fn find_track_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.config.dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    self.config
                        .extensions
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
                })
                .unwrap_or(false);
            if matches {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        info!("Found {} track file(s)", files.len());
        Ok(files)
    }

    pub fn open(&self, path: &Path) -> Result<TrackReplay> {
        info!("Opening track replay: {}", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let replay = TrackReplay::from_json(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        info!(
            "Replay properties: {}x{} @ {:.1} FPS, {} frames, {} observations",
            replay.source.width,
            replay.source.height,
            replay.source.fps,
            replay.frames.len(),
            replay.observation_count()
        );
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "source": { "width": 1920, "height": 1080, "fps": 30.0, "total_frames": 3 },
        "calibration": { "calibrated": true, "mode": "flat", "pixels_per_meter": 20.0 },
        "frames": [
            { "frame_number": 2, "tracks": [{ "track_id": 4, "bbox": [100, 100, 140, 180], "confidence": 0.8 }] },
            { "frame_number": 1, "tracks": [{ "track_id": 4, "anchor": [120, 170] }] },
            { "frame_number": 3 }
        ]
    }"#;

    #[test]
    fn test_parse_and_sort_frames() {
        let replay = TrackReplay::from_json(SAMPLE).unwrap();
        assert_eq!(replay.frames.len(), 3);
        assert_eq!(replay.frames[0].frame_number, 1);
        assert_eq!(replay.frames[2].frame_number, 3);
        assert!(replay.frames[2].tracks.is_empty());
        assert_eq!(replay.observation_count(), 2);
        assert!(replay.calibration.is_some());
        assert_eq!(replay.source.total_frames, Some(3));
    }

    #[test]
    fn test_rejects_bad_fps() {
        let doc = r#"{ "source": { "width": 640, "height": 480, "fps": 0.0 }, "frames": [] }"#;
        assert!(TrackReplay::from_json(doc).is_err());
        assert!(TrackReplay::from_json("not json").is_err());
    }

    #[test]
    fn test_find_track_files_filters_extensions() {
        let dir = std::env::temp_dir().join(format!("traffic-speed-replay-{}", std::process::id()));
        let nested = dir.join("cam2");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.join("cam1.json"), SAMPLE).unwrap();
        fs::write(nested.join("cam2.JSON"), SAMPLE).unwrap();
        fs::write(dir.join("notes.txt"), "skip").unwrap();

        let source = ReplaySource::new(InputConfig {
            dir: dir.to_string_lossy().to_string(),
            extensions: vec!["json".to_string()],
        });
        let files = source.find_track_files().unwrap();
        assert_eq!(files.len(), 2);

        let replay = source.open(&dir.join("cam1.json")).unwrap();
        assert_eq!(replay.source.width, 1920);

        fs::remove_dir_all(&dir).ok();
    }
}
