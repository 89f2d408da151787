//! Swept point/triangle collision.
//!
//! A [`CollisionTriangle`] caches a triangle's plane and three inward-facing
//! edge half-planes, so testing a moving point against it costs a handful of
//! dot products. [`continuous_collision`] sweeps a point over a whole array
//! of triangles and keeps the nearest hit.
//!
//! Triangles carry no identity of their own: the index of a triangle in the
//! slice passed to [`continuous_collision`] is the triangle index reported in
//! the [`RayHit`].

use nalgebra::{Matrix4, Point3, Vector3};

/// A triangle prepared for swept intersection tests.
///
/// A coplanar point lies inside the triangle iff its signed distance to all
/// three edge half-planes is at most zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionTriangle {
    /// Centroid of the triangle.
    pub center: Point3<f64>,
    /// Unit normal, following the counter-clockwise winding of the corners.
    pub normal: Vector3<f64>,
    /// The three corners.
    pub edge_vertices: [Point3<f64>; 3],
    /// Outward unit normal of each edge, lying in the triangle's plane.
    ///
    /// `edge_normals[i]` belongs to the edge starting at `edge_vertices[i]`.
    pub edge_normals: [Vector3<f64>; 3],
}

impl Default for CollisionTriangle {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            normal: Vector3::zeros(),
            edge_vertices: [Point3::origin(); 3],
            edge_normals: [Vector3::zeros(); 3],
        }
    }
}

impl CollisionTriangle {
    /// Build the collision record for the triangle `p0, p1, p2`.
    pub fn new(p0: Point3<f64>, p1: Point3<f64>, p2: Point3<f64>) -> Self {
        let mut triangle = Self::default();
        triangle.update(p0, p1, p2);
        triangle
    }

    /// Recompute this record in place for new corner positions.
    ///
    /// Degenerate triangles end up with a zero normal and never report hits.
    pub fn update(&mut self, p0: Point3<f64>, p1: Point3<f64>, p2: Point3<f64>) {
        let e0 = unit_or_zero(p1 - p0);
        let e1 = unit_or_zero(p2 - p1);
        let e2 = unit_or_zero(p0 - p2);

        self.center = Point3::from((p0.coords + p1.coords + p2.coords) / 3.0);
        self.normal = unit_or_zero(e0.cross(&e1));
        self.edge_vertices = [p0, p1, p2];
        self.edge_normals = [
            unit_or_zero(e0.cross(&self.normal)),
            unit_or_zero(e1.cross(&self.normal)),
            unit_or_zero(e2.cross(&self.normal)),
        ];
    }

    /// Return a copy of this triangle moved by a model matrix.
    ///
    /// Points go through the full affine transform; the face and edge normals
    /// go through its linear part and are re-normalised.
    pub fn transformed(&self, model: &Matrix4<f64>) -> Self {
        let point = |p: &Point3<f64>| model.transform_point(p);
        let direction = |v: &Vector3<f64>| unit_or_zero(model.transform_vector(v));
        Self {
            center: point(&self.center),
            normal: direction(&self.normal),
            edge_vertices: [
                point(&self.edge_vertices[0]),
                point(&self.edge_vertices[1]),
                point(&self.edge_vertices[2]),
            ],
            edge_normals: [
                direction(&self.edge_normals[0]),
                direction(&self.edge_normals[1]),
                direction(&self.edge_normals[2]),
            ],
        }
    }

    /// Test whether a point already known to lie in the triangle's plane is
    /// inside the triangle (edges included).
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|i| self.edge_normals[i].dot(&(point - self.edge_vertices[i])) <= 0.0)
    }
}

fn unit_or_zero(v: Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// A point where a swept segment crosses a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptHit {
    /// Intersection point.
    pub position: Point3<f64>,
    /// Distance travelled from the (extended) start of the sweep.
    pub time: f64,
}

/// Nearest triangle crossed by a swept point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Index of the triangle in the slice that was searched.
    pub triangle: usize,
    /// Intersection point.
    pub position: Point3<f64>,
    /// Unit normal of the triangle that was hit.
    pub normal: Vector3<f64>,
    /// Distance from the start of the sweep to the intersection.
    pub time: f64,
}

/// Test a point moving from `prev_pos` to `curr_pos` against one triangle.
///
/// The segment is lengthened by `epsilon` at both ends along its direction so
/// that grazing sweeps that end exactly on the plane still register. With
/// `check_back_face` unset, a sweep that starts behind the triangle is
/// ignored. Returns `None` when there is no crossing, including for a
/// zero-length sweep or one parallel to the plane.
pub fn swept_triangle_intersect(
    triangle: &CollisionTriangle,
    prev_pos: &Point3<f64>,
    curr_pos: &Point3<f64>,
    epsilon: f64,
    check_back_face: bool,
) -> Option<SweptHit> {
    let movement = curr_pos - prev_pos;
    let magnitude = movement.norm();
    if magnitude == 0.0 {
        return None;
    }
    let direction = movement / magnitude;

    let prev = prev_pos - direction * epsilon;
    let curr = curr_pos + direction * epsilon;
    let magnitude = magnitude + 2.0 * epsilon;

    let prev_front = (prev - triangle.center).dot(&triangle.normal) >= 0.0;
    let curr_front = (curr - triangle.center).dot(&triangle.normal) >= 0.0;

    if prev_front == curr_front {
        return None;
    }
    if !check_back_face && !prev_front {
        return None;
    }

    let bottom = direction.dot(&triangle.normal);
    if bottom == 0.0 {
        return None;
    }

    let time = (triangle.center - prev).dot(&triangle.normal) / bottom;
    if time < 0.0 || time > magnitude {
        return None;
    }

    let position = prev + direction * time;
    if !triangle.contains(&position) {
        return None;
    }

    Some(SweptHit { position, time })
}

/// Sweep a point across every triangle and return the nearest crossing.
///
/// The hit with the smallest travel time wins; on equal times the triangle
/// found first in slice order is kept.
pub fn continuous_collision(
    triangles: &[CollisionTriangle],
    prev_pos: &Point3<f64>,
    curr_pos: &Point3<f64>,
    check_back_face: bool,
) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;
    for (i, triangle) in triangles.iter().enumerate() {
        let Some(hit) = swept_triangle_intersect(triangle, prev_pos, curr_pos, 0.0, check_back_face) else {
            continue;
        };
        if best.map_or(true, |b| hit.time < b.time) {
            best = Some(RayHit {
                triangle: i,
                position: hit.position,
                normal: triangle.normal,
                time: hit.time,
            });
        }
    }
    best
}
