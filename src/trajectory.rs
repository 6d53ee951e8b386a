// src/trajectory.rs

use crate::types::Point;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Fraction of a second of history required before a track is estimated
const WARMUP_SECONDS: f64 = 0.25;

/// Per-track sliding window of recent anchor points (~1 s of history).
///
/// The store never drops a track on its own; callers decide which
/// track-ids are still alive (`remove` / `retain_live`).
pub struct TrajectoryStore {
    windows: HashMap<u32, VecDeque<Point>>,
    capacity: usize,
}

impl TrajectoryStore {
    /// Window capacity is the frame rate rounded to whole samples.
    pub fn new(fps: f64) -> Self {
        let capacity = if fps.is_finite() && fps > 0.0 {
            fps.round() as usize
        } else {
            1
        };
        Self::with_capacity(capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a point, evicting the oldest once the window is full
    pub fn record(&mut self, track_id: u32, point: Point) {
        let capacity = self.capacity;
        let window = self.windows.entry(track_id).or_insert_with(|| {
            debug!("New trajectory for track #{}", track_id);
            VecDeque::with_capacity(capacity)
        });
        window.push_back(point);
        if window.len() > capacity {
            window.pop_front();
        }
    }

    /// Oldest-first copy of the window (empty for unseen tracks)
    pub fn window_for(&self, track_id: u32) -> Vec<Point> {
        self.windows
            .get(&track_id)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len_for(&self, track_id: u32) -> usize {
        self.windows.get(&track_id).map(VecDeque::len).unwrap_or(0)
    }

    /// True once the window holds at least `fps / 4` points
    pub fn ready(&self, track_id: u32, fps: f64) -> bool {
        let len = self.len_for(track_id);
        len > 0 && len as f64 >= fps * WARMUP_SECONDS
    }

    pub fn remove(&mut self, track_id: u32) -> bool {
        self.windows.remove(&track_id).is_some()
    }

    /// Drop every track not in `live`; returns how many were dropped
    pub fn retain_live(&mut self, live: &HashSet<u32>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|id, _| live.contains(id));
        before - self.windows.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn track_count(&self) -> usize {
        self.windows.len()
    }
}
