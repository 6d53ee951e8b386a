// src/speed/homography.rs
//
// Planar projective transform from four point correspondences.
// Solved as the usual 8-unknown linear system with h33 fixed to 1.

use crate::calibration::region::is_valid_quad;
use crate::types::Point;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// Below this |w| a projected point is at (or near) the line at infinity
const MIN_HOMOGENEOUS_W: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Transform mapping `src[i]` onto `dst[i]`. `None` when the system is singular.
    pub fn from_correspondences(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        if !is_valid_quad(src) || !is_valid_quad(dst) {
            return None;
        }

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
            let r = 2 * i;
            a[(r, 0)] = s.x;
            a[(r, 1)] = s.y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -d.x * s.x;
            a[(r, 7)] = -d.x * s.y;
            b[r] = d.x;

            a[(r + 1, 3)] = s.x;
            a[(r + 1, 4)] = s.y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -d.y * s.x;
            a[(r + 1, 7)] = -d.y * s.y;
            b[r + 1] = d.y;
        }

        let h = a.lu().solve(&b)?;
        if h.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        if matrix.determinant().abs() < f64::EPSILON {
            return None;
        }
        Some(Self { matrix })
    }

    /// Map `src` onto the rectangle `[0, width-1] x [0, height-1]`
    /// (corners in order top-left, top-right, bottom-right, bottom-left).
    pub fn onto_rectangle(src: &[Point; 4], width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let w = (width - 1) as f64;
        let h = (height - 1) as f64;
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ];
        Self::from_correspondences(src, &dst)
    }

    pub fn project(&self, p: &Point) -> Option<Point> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        if !v.z.is_finite() || v.z.abs() < MIN_HOMOGENEOUS_W {
            return None;
        }
        let out = Point::new(v.x / v.z, v.y / v.z);
        if out.x.is_finite() && out.y.is_finite() {
            Some(out)
        } else {
            None
        }
    }
}
