//! Curtain strips.
//!
//! A curtain is a ruled surface standing on a stroke painted over a mesh:
//! every stroke point is extruded along its surface normal by the curtain
//! height. The user paints a second stroke on the curtain, and that stroke is
//! dropped back onto the mesh along the same normals.
//!
//! For `n` stroke points the curtain has `2n` vertices: vertex `i` is stroke
//! point `i` and vertex `i + n` sits above it. Segment `i` is covered by the
//! triangles `2i = (i, i+1, i+n)` and `2i+1 = (i+n, i+1+n, i+1)`.

use nalgebra::{Point3, Vector3};

use crate::collision::CollisionTriangle;
use crate::error::{MeshError, Result};
use crate::view::{submit, BufferDirty, DrawInstance, MeshBuffers, RenderSink, RenderVertex};

/// Lowest allowed curtain height.
pub const MIN_HEIGHT: f64 = 0.01;
/// Highest allowed curtain height.
pub const MAX_HEIGHT: f64 = 10.0;

/// Clamp a requested curtain height into `[MIN_HEIGHT, MAX_HEIGHT]`.
pub fn clamp_height(height: f64) -> f64 {
    let clamped = height.clamp(MIN_HEIGHT, MAX_HEIGHT);
    if clamped != height {
        log::debug!("curtain height {} clamped to {}", height, clamped);
    }
    clamped
}

/// A strip surface extruded from a stroke.
#[derive(Debug, Clone)]
pub struct Curtain {
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    height: f64,

    vertices: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    indices: Vec<u32>,
    collision: Vec<CollisionTriangle>,
    render_vertices: Vec<RenderVertex>,
    dirty: BufferDirty,
}

impl Curtain {
    /// Build a curtain over `points`, extruded along `normals`.
    ///
    /// # Errors
    /// An invalid-parameter error for fewer than two points or mismatched
    /// lengths.
    pub fn new(points: Vec<Point3<f64>>, normals: Vec<Vector3<f64>>, height: f64) -> Result<Self> {
        let mut curtain = Self {
            points: Vec::new(),
            normals: Vec::new(),
            height: clamp_height(height),
            vertices: Vec::new(),
            triangles: Vec::new(),
            indices: Vec::new(),
            collision: Vec::new(),
            render_vertices: Vec::new(),
            dirty: BufferDirty::default(),
        };
        curtain.update(points, normals, height)?;
        Ok(curtain)
    }

    /// Replace the stroke and height and rebuild.
    pub fn update(&mut self, points: Vec<Point3<f64>>, normals: Vec<Vector3<f64>>, height: f64) -> Result<()> {
        if points.len() < 2 {
            return Err(MeshError::invalid_param(
                "points",
                points.len(),
                "curtain needs at least two points",
            ));
        }
        if points.len() != normals.len() {
            return Err(MeshError::invalid_param(
                "normals",
                normals.len(),
                "must match the number of points",
            ));
        }
        self.points = points;
        self.normals = normals;
        self.height = clamp_height(height);
        self.rebuild();
        Ok(())
    }

    /// Change the height, keeping the stroke.
    pub fn set_height(&mut self, height: f64) {
        self.height = clamp_height(height);
        self.rebuild();
    }

    /// Extrusion height.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// The stroke the curtain stands on.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Extrusion direction at each stroke point.
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    /// Number of strip vertices, twice the number of points.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of strip triangles, two per segment.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Position of a strip vertex. The first half lie on the stroke, the
    /// second half are extruded.
    pub fn vertex_position(&self, v: usize) -> &Point3<f64> {
        &self.vertices[v]
    }

    /// Strip triangles; triangle `t` belongs to segment `t / 2`.
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Collision triangles, indexed like [`Curtain::triangles`].
    pub fn collision_triangles(&self) -> &[CollisionTriangle] {
        &self.collision
    }

    /// Vertex and index arrays for rendering.
    pub fn buffers(&self) -> MeshBuffers<'_> {
        MeshBuffers::new(&self.render_vertices, &self.indices)
    }

    /// Whether the next [`Curtain::render`] uploads the buffers.
    pub fn needs_upload(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Submit the curtain, uploading its buffers first if they changed.
    pub fn render(&mut self, sink: &mut dyn RenderSink, instance: &DrawInstance) -> bool {
        let buffers = MeshBuffers::new(&self.render_vertices, &self.indices);
        submit(sink, &mut self.dirty, &buffers, std::slice::from_ref(instance))
    }

    /// Extrusion direction under a point on a curtain triangle.
    ///
    /// The normals of the triangle's segment are blended by where `position`
    /// falls along the segment. `None` for an unknown triangle.
    pub fn direction_at(&self, triangle: usize, position: &Point3<f64>) -> Option<Vector3<f64>> {
        if triangle >= self.triangles.len() {
            return None;
        }
        let segment = triangle / 2;
        let a = self.points[segment];
        let b = self.points[segment + 1];
        let along = b - a;
        let length_sq = along.norm_squared();
        let t = if length_sq > 0.0 {
            ((position - a).dot(&along) / length_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let n = self.normals[segment].lerp(&self.normals[segment + 1], t);
        Some(n.try_normalize(0.0).unwrap_or(self.normals[segment]))
    }

    fn rebuild(&mut self) {
        let n = self.points.len();

        self.vertices.clear();
        self.vertices.extend_from_slice(&self.points);
        for (p, normal) in self.points.iter().zip(&self.normals) {
            self.vertices.push(p + normal * self.height);
        }

        self.triangles.clear();
        for i in 0..n - 1 {
            self.triangles.push([i, i + 1, i + n]);
            self.triangles.push([i + n, i + 1 + n, i + 1]);
        }
        self.indices = self
            .triangles
            .iter()
            .flat_map(|t| t.iter().map(|&v| v as u32))
            .collect();

        self.collision = self
            .triangles
            .iter()
            .map(|&[a, b, c]| CollisionTriangle::new(self.vertices[a], self.vertices[b], self.vertices[c]))
            .collect();

        let mut vertex_normals = vec![Vector3::zeros(); self.vertices.len()];
        for (tri, collision) in self.triangles.iter().zip(&self.collision) {
            for &v in tri {
                vertex_normals[v] += collision.normal;
            }
        }
        self.render_vertices = self
            .vertices
            .iter()
            .zip(&vertex_normals)
            .map(|(p, normal)| RenderVertex::new(p, &normal.try_normalize(0.0).unwrap_or_else(Vector3::zeros)))
            .collect();

        self.dirty.mark();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::continuous_collision;
    use crate::view::RecordingSink;
    use nalgebra::Matrix4;

    fn straight(n: usize) -> (Vec<Point3<f64>>, Vec<Vector3<f64>>) {
        let points = (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        (points, vec![Vector3::z(); n])
    }

    #[test]
    fn test_layout() {
        let (points, normals) = straight(3);
        let curtain = Curtain::new(points, normals, 2.0).unwrap();
        assert_eq!(curtain.num_vertices(), 6);
        assert_eq!(curtain.num_triangles(), 4);
        assert_eq!(curtain.triangles()[0], [0, 1, 3]);
        assert_eq!(curtain.triangles()[1], [3, 4, 1]);
        assert_eq!(curtain.triangles()[3], [4, 5, 2]);
        assert_eq!(*curtain.vertex_position(4), Point3::new(1.0, 0.0, 2.0));
        assert_eq!(curtain.buffers().indices.len(), 12);
        assert_eq!(curtain.collision_triangles().len(), 4);
    }

    #[test]
    fn test_height_clamped() {
        let (points, normals) = straight(2);
        let mut curtain = Curtain::new(points, normals, 100.0).unwrap();
        assert_eq!(curtain.height(), MAX_HEIGHT);
        curtain.set_height(0.0);
        assert_eq!(curtain.height(), MIN_HEIGHT);
        assert!((curtain.vertex_position(2).z - MIN_HEIGHT).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_points() {
        let (points, normals) = straight(1);
        assert!(Curtain::new(points, normals, 1.0).is_err());
        let (points, _) = straight(3);
        assert!(Curtain::new(points, vec![Vector3::z(); 2], 1.0).is_err());
    }

    #[test]
    fn test_ray_hits_both_sides() {
        let (points, normals) = straight(3);
        let curtain = Curtain::new(points, normals, 1.0).unwrap();
        let tris = curtain.collision_triangles();

        let from_front = continuous_collision(
            tris,
            &Point3::new(0.25, -5.0, 0.25),
            &Point3::new(0.25, 5.0, 0.25),
            true,
        );
        let from_back = continuous_collision(
            tris,
            &Point3::new(1.5, 5.0, 0.75),
            &Point3::new(1.5, -5.0, 0.75),
            true,
        );
        let hit = from_front.unwrap();
        assert_eq!(hit.triangle, 0);
        assert!((hit.position - Point3::new(0.25, 0.0, 0.25)).norm() < 1e-9);
        assert_eq!(from_back.unwrap().triangle, 3);
    }

    #[test]
    fn test_direction_at_blends_segment_normals() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let normals = vec![Vector3::z(), Vector3::y()];
        let curtain = Curtain::new(points, normals, 1.0).unwrap();

        let d = curtain.direction_at(1, &Point3::new(0.5, 0.3, 0.3)).unwrap();
        assert!((d - Vector3::new(0.0, 1.0, 1.0).normalize()).norm() < 1e-12);
        assert_eq!(curtain.direction_at(0, &Point3::new(-1.0, 0.0, 0.0)).unwrap(), Vector3::z());
        assert!(curtain.direction_at(2, &Point3::origin()).is_none());
    }

    #[test]
    fn test_rebuild_marks_dirty() {
        let (points, normals) = straight(2);
        let mut curtain = Curtain::new(points, normals, 1.0).unwrap();
        let mut sink = RecordingSink::default();
        let instance = DrawInstance::new(Matrix4::identity(), [1.0; 4]);
        while curtain.render(&mut sink, &instance) {}
        assert!(!curtain.needs_upload());
        assert_eq!(sink.uploads[0], (4, 6));

        curtain.set_height(2.0);
        assert!(curtain.needs_upload());
    }
}
