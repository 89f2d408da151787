//! Arc-length resampling of polylines.
//!
//! Painted strokes arrive as irregularly spaced points, each with a direction
//! (the surface normal under the cursor). [`uniform_sample`] re-spaces such a
//! stroke at a fixed arc-length step.

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, Result};

/// A polyline with a direction at every point, parametrised by arc length.
#[derive(Debug, Clone)]
pub struct LinearCurve {
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    /// Cumulative arc length at each point; `distances[0] == 0`.
    distances: Vec<f64>,
}

impl LinearCurve {
    /// Build a curve from matching point and normal lists.
    ///
    /// # Errors
    /// An invalid-parameter error if the lists are empty or differ in length.
    pub fn new(points: Vec<Point3<f64>>, normals: Vec<Vector3<f64>>) -> Result<Self> {
        if points.is_empty() {
            return Err(MeshError::invalid_param("points", 0, "curve needs at least one point"));
        }
        if points.len() != normals.len() {
            return Err(MeshError::invalid_param(
                "normals",
                normals.len(),
                "must match the number of points",
            ));
        }

        let mut distances = Vec::with_capacity(points.len());
        let mut total = 0.0;
        distances.push(total);
        for pair in points.windows(2) {
            total += (pair[1] - pair[0]).norm();
            distances.push(total);
        }

        Ok(Self {
            points,
            normals,
            distances,
        })
    }

    /// Number of input points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a curve has at least one point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arc length from the first to the last point.
    pub fn total_distance(&self) -> f64 {
        self.distances[self.distances.len() - 1]
    }

    /// Cumulative arc length at each input point.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Point and normal at arc length `distance`.
    ///
    /// Distances past the end return the last point; negative distances
    /// return the first. Normals are interpolated linearly and not
    /// re-normalised.
    pub fn sample(&self, distance: f64) -> (Point3<f64>, Vector3<f64>) {
        let last = self.points.len() - 1;
        let next = match self.distances.iter().position(|&d| d > distance) {
            None => return (self.points[last], self.normals[last]),
            Some(0) => return (self.points[0], self.normals[0]),
            Some(i) => i,
        };
        let prev = next - 1;

        let t = (distance - self.distances[prev]) / (self.distances[next] - self.distances[prev]);
        let point = self.points[prev] + (self.points[next] - self.points[prev]) * t;
        let normal = self.normals[prev].lerp(&self.normals[next], t);
        (point, normal)
    }
}

/// Resample a polyline at arc lengths `0, delta_s, 2 * delta_s, ...` up to
/// and including its total length.
///
/// The output has `floor(total / delta_s) + 1` points.
///
/// # Errors
/// An invalid-parameter error if `delta_s` is not positive or the input is
/// not a valid [`LinearCurve`].
pub fn uniform_sample(
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    delta_s: f64,
) -> Result<(Vec<Point3<f64>>, Vec<Vector3<f64>>)> {
    if !(delta_s > 0.0) {
        return Err(MeshError::invalid_param("delta_s", delta_s, "must be positive"));
    }
    let curve = LinearCurve::new(points.to_vec(), normals.to_vec())?;
    let total = curve.total_distance();

    let mut out_points = Vec::new();
    let mut out_normals = Vec::new();
    let mut k = 0usize;
    loop {
        let s = k as f64 * delta_s;
        if s > total {
            break;
        }
        let (p, n) = curve.sample(s);
        out_points.push(p);
        out_normals.push(n);
        k += 1;
    }
    Ok((out_points, out_normals))
}

/// Total length of a polyline.
pub fn polyline_length(points: &[Point3<f64>]) -> f64 {
    points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up(n: usize) -> Vec<Vector3<f64>> {
        vec![Vector3::z(); n]
    }

    #[test]
    fn test_distances() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(3.0, 4.0, 0.0),
        ];
        let curve = LinearCurve::new(points, up(3)).unwrap();
        assert_eq!(curve.distances(), &[0.0, 3.0, 7.0]);
        assert_eq!(curve.total_distance(), 7.0);
    }

    #[test]
    fn test_sample() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
        let normals = vec![Vector3::z(), Vector3::y()];
        let curve = LinearCurve::new(points, normals).unwrap();

        let (p, n) = curve.sample(0.5);
        assert!((p - Point3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
        assert!((n - Vector3::new(0.0, 0.25, 0.75)).norm() < 1e-12);

        // Past the end clamps to the last point
        let (p, n) = curve.sample(10.0);
        assert_eq!(p, Point3::new(2.0, 0.0, 0.0));
        assert_eq!(n, Vector3::y());

        let (p, _) = curve.sample(-1.0);
        assert_eq!(p, Point3::origin());
    }

    #[test]
    fn test_single_point_curve() {
        let curve = LinearCurve::new(vec![Point3::new(1.0, 2.0, 3.0)], up(1)).unwrap();
        assert_eq!(curve.total_distance(), 0.0);
        for d in [0.0, 0.5, 100.0] {
            assert_eq!(curve.sample(d).0, Point3::new(1.0, 2.0, 3.0));
        }
        let (points, _) = uniform_sample(&[Point3::new(1.0, 2.0, 3.0)], &up(1), 0.1).unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_repeated_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let curve = LinearCurve::new(points, up(3)).unwrap();
        let (p, n) = curve.sample(0.0);
        assert!(p.coords.iter().all(|c| c.is_finite()));
        assert_eq!(n, Vector3::z());
    }

    #[test]
    fn test_uniform_sample_segment() {
        let len = 2.0;
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(len, 0.0, 0.0)];
        let (out, normals) = uniform_sample(&points, &up(2), len / 4.0).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(normals.len(), 5);
        for (i, p) in out.iter().enumerate() {
            assert!((p.x - i as f64 * len / 4.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uniform_sample_preserves_length() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
            Point3::new(1.0, 0.1, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.5, 1.5, 0.0),
        ];
        let delta_s = 0.05;
        let total = polyline_length(&points);
        let (out, _) = uniform_sample(&points, &up(points.len()), delta_s).unwrap();

        assert_eq!(out.len(), (total / delta_s).floor() as usize + 1);
        assert!((polyline_length(&out) - total).abs() < delta_s);

        // Samples are spaced by at most the step
        for w in out.windows(2) {
            assert!((w[1] - w[0]).norm() <= delta_s + 1e-12);
        }
    }

    #[test]
    fn test_invalid_input() {
        let points = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(uniform_sample(&points, &up(2), 0.0).is_err());
        assert!(uniform_sample(&points, &up(2), -0.1).is_err());
        assert!(uniform_sample(&points, &up(1), 0.1).is_err());
        assert!(LinearCurve::new(Vec::new(), Vec::new()).is_err());
    }
}
