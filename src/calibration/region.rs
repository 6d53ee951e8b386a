// src/calibration/region.rs
//
// The four-point quad doubles as the area where speeds are trustworthy.
// Anchors outside it are dropped before they reach a trajectory.

use super::model::CalibrationModel;
use crate::types::Point;

/// Minimum |cross product| (px²) for three quad corners to count as non-collinear
const MIN_CORNER_AREA: f64 = 1e-6;

/// Twice the signed area of triangle (a, b, c)
fn cross(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Shoelace area, sign follows winding order
pub fn signed_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in vertices.iter().enumerate() {
        let b = &vertices[(i + 1) % vertices.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// A quad is usable when all coordinates are finite and no three corners are collinear.
pub fn is_valid_quad(quad: &[Point; 4]) -> bool {
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return false;
    }
    (0..4).all(|i| {
        let a = &quad[i];
        let b = &quad[(i + 1) % 4];
        let c = &quad[(i + 2) % 4];
        cross(a, b, c).abs() > MIN_CORNER_AREA
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedRegion {
    vertices: Vec<Point>,
}

impl CalibratedRegion {
    pub fn new(vertices: Vec<Point>) -> Option<Self> {
        if vertices.len() < 3 || signed_area(&vertices).abs() <= MIN_CORNER_AREA {
            return None;
        }
        Some(Self { vertices })
    }

    /// Region of a four-point calibration; other modes have none.
    pub fn from_model(model: &CalibrationModel) -> Option<Self> {
        match model {
            CalibrationModel::FourPoint { quad, .. } => Self::new(quad.to_vec()),
            _ => None,
        }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Point-in-polygon (even-odd rule); points on an edge count as inside.
    pub fn contains(&self, p: &Point) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[j];

            if on_segment(a, b, p) {
                return true;
            }

            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
    if cross(a, b, p).abs() > 1e-9 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}
