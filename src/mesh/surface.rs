//! One subdivision level's mesh together with the data derived from it.
//!
//! [`SurfaceMesh`] owns a [`HalfEdgeMesh`] and keeps a triangulation, vertex
//! adjacency, normals, render buffers and collision triangles consistent with
//! it. Topology changes go through [`SurfaceMesh::replace`]; position edits
//! are followed by an explicit [`SurfaceMesh::update_geometry`].

use std::collections::BTreeSet;

use nalgebra::{Matrix4, Point3, Vector3};
use rayon::prelude::*;

use super::halfedge::HalfEdgeMesh;
use super::index::VertexId;
use crate::collision::CollisionTriangle;
use crate::error::{MeshError, Result};
use crate::view::RenderVertex;

/// A mesh with derived per-vertex and per-triangle data.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    mesh: HalfEdgeMesh,
    parallel: bool,

    // Topology-derived
    triangles: Vec<[usize; 3]>,
    indices: Vec<u32>,
    vertex_triangles: Vec<Vec<usize>>,
    vertex_neighbors: Vec<BTreeSet<usize>>,

    // Geometry-derived
    triangle_normals: Vec<Vector3<f64>>,
    vertex_normals: Vec<Vector3<f64>>,
    collision: Vec<CollisionTriangle>,
    render_vertices: Vec<RenderVertex>,
}

impl SurfaceMesh {
    /// Wrap a mesh and derive everything from it.
    pub fn new(mesh: HalfEdgeMesh) -> Self {
        let mut surface = Self {
            mesh,
            parallel: true,
            triangles: Vec::new(),
            indices: Vec::new(),
            vertex_triangles: Vec::new(),
            vertex_neighbors: Vec::new(),
            triangle_normals: Vec::new(),
            vertex_normals: Vec::new(),
            collision: Vec::new(),
            render_vertices: Vec::new(),
        };
        surface.rebuild_topology();
        surface.update_geometry();
        surface
    }

    /// Set whether per-triangle work fans out over the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Swap in a whole new mesh and re-derive everything.
    pub fn replace(&mut self, mesh: HalfEdgeMesh) {
        self.mesh = mesh;
        self.rebuild_topology();
        self.update_geometry();
    }

    /// The underlying half-edge mesh.
    pub fn mesh(&self) -> &HalfEdgeMesh {
        &self.mesh
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.mesh.num_vertices()
    }

    /// Number of triangles in the triangulation.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Number of polygon faces.
    pub fn num_faces(&self) -> usize {
        self.mesh.num_faces()
    }

    /// The triangulation, as vertex index triples.
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// The three vertex indices of a triangle.
    ///
    /// # Errors
    /// [`MeshError::InvalidTriangleIndex`] if `triangle` is out of range.
    pub fn vertex_indices(&self, triangle: usize) -> Result<[usize; 3]> {
        self.triangles
            .get(triangle)
            .copied()
            .ok_or(MeshError::InvalidTriangleIndex {
                index: triangle,
                count: self.triangles.len(),
            })
    }

    /// Position of a vertex.
    ///
    /// # Panics
    /// If `v` is out of range.
    pub fn vertex_position(&self, v: usize) -> &Point3<f64> {
        self.mesh.position(VertexId::new(v))
    }

    /// All vertex positions, in index order.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.mesh.positions()
    }

    /// Move a vertex. Derived geometry is stale until [`Self::update_geometry`].
    pub fn set_vertex_position(&mut self, v: usize, position: Point3<f64>) {
        self.mesh.set_position(VertexId::new(v), position);
    }

    /// Offset a vertex. Derived geometry is stale until [`Self::update_geometry`].
    pub fn translate_vertex(&mut self, v: usize, offset: &Vector3<f64>) {
        let id = VertexId::new(v);
        let p = *self.mesh.position(id) + offset;
        self.mesh.set_position(id, p);
    }

    /// Vertices sharing an edge with `v`.
    pub fn vertex_neighbors(&self, v: usize) -> &BTreeSet<usize> {
        &self.vertex_neighbors[v]
    }

    /// Triangles that use `v` as a corner.
    pub fn vertex_triangles(&self, v: usize) -> &[usize] {
        &self.vertex_triangles[v]
    }

    /// Unit normal of a triangle (zero if degenerate).
    pub fn triangle_normal(&self, triangle: usize) -> &Vector3<f64> {
        &self.triangle_normals[triangle]
    }

    /// Normalised sum of the normals of the triangles around `v`.
    pub fn vertex_normal(&self, v: usize) -> &Vector3<f64> {
        &self.vertex_normals[v]
    }

    /// Find a vertex within `epsilon` of `position` on every axis.
    pub fn vertex_index_at(&self, position: &Point3<f64>, epsilon: f64) -> Option<usize> {
        self.mesh
            .vertex_ids()
            .find(|&v| {
                let p = self.mesh.position(v);
                (0..3).all(|k| (p[k] - position[k]).abs() <= epsilon)
            })
            .map(|v| v.index())
    }

    /// Collision triangles in mesh-local coordinates, one per triangle.
    pub fn local_collision_triangles(&self) -> &[CollisionTriangle] {
        &self.collision
    }

    /// A copy of the collision triangles moved by `model`.
    pub fn collision_triangles(&self, model: &Matrix4<f64>) -> Vec<CollisionTriangle> {
        if self.parallel {
            self.collision.par_iter().map(|t| t.transformed(model)).collect()
        } else {
            self.collision.iter().map(|t| t.transformed(model)).collect()
        }
    }

    /// Interleaved position and normal buffer for rendering.
    pub fn render_vertices(&self) -> &[RenderVertex] {
        &self.render_vertices
    }

    /// Triangle index buffer for rendering.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    fn rebuild_topology(&mut self) {
        let mesh = &self.mesh;
        let n = mesh.num_vertices();

        let mut triangles = Vec::with_capacity(mesh.num_faces() * 2);
        for f in mesh.face_ids() {
            let c: Vec<usize> = mesh.face_vertices(f).map(|v| v.index()).collect();
            match c.len() {
                3 => triangles.push([c[0], c[1], c[2]]),
                4 => {
                    triangles.push([c[0], c[1], c[2]]);
                    triangles.push([c[2], c[3], c[0]]);
                }
                // Fan for larger polygons
                _ => triangles.extend((1..c.len() - 1).map(|i| [c[0], c[i], c[i + 1]])),
            }
        }

        let mut vertex_triangles = vec![Vec::new(); n];
        for (t, tri) in triangles.iter().enumerate() {
            for &v in tri {
                vertex_triangles[v].push(t);
            }
        }

        let vertex_neighbors = mesh
            .vertex_ids()
            .map(|v| mesh.vertex_neighbors(v).map(|u| u.index()).collect())
            .collect();

        self.indices = triangles.iter().flatten().map(|&v| v as u32).collect();
        self.triangles = triangles;
        self.vertex_triangles = vertex_triangles;
        self.vertex_neighbors = vertex_neighbors;
    }

    /// Recompute normals, collision triangles and render buffers from the
    /// current vertex positions.
    pub fn update_geometry(&mut self) {
        let mesh = &self.mesh;
        let corners = |tri: &[usize; 3]| {
            (
                *mesh.position(VertexId::new(tri[0])),
                *mesh.position(VertexId::new(tri[1])),
                *mesh.position(VertexId::new(tri[2])),
            )
        };
        let build = |tri: &[usize; 3]| {
            let (p0, p1, p2) = corners(tri);
            CollisionTriangle::new(p0, p1, p2)
        };

        self.collision = if self.parallel {
            self.triangles.par_iter().map(build).collect()
        } else {
            self.triangles.iter().map(build).collect()
        };
        self.triangle_normals = self.collision.iter().map(|t| t.normal).collect();

        self.vertex_normals = self
            .vertex_triangles
            .iter()
            .map(|tris| {
                let sum: Vector3<f64> = tris.iter().map(|&t| self.triangle_normals[t]).sum();
                sum.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
            })
            .collect();

        self.render_vertices = mesh
            .vertex_ids()
            .map(|v| RenderVertex::new(mesh.position(v), &self.vertex_normals[v.index()]))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::continuous_collision;
    use crate::mesh::{build_from_polygons, primitives};

    #[test]
    fn test_cube_derived_data() {
        let surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        assert_eq!(surface.num_vertices(), 8);
        assert_eq!(surface.num_triangles(), 12);
        assert_eq!(surface.indices().len(), 36);
        assert_eq!(surface.local_collision_triangles().len(), 12);
        assert_eq!(surface.render_vertices().len(), 8);

        // Quad (0, 3, 2, 1) splits into (0, 3, 2) and (2, 1, 0)
        assert_eq!(surface.vertex_indices(0).unwrap(), [0, 3, 2]);
        assert_eq!(surface.vertex_indices(1).unwrap(), [2, 1, 0]);
        assert!(surface.vertex_indices(12).is_err());

        // Neighbours follow edges, not quad diagonals
        let n: Vec<usize> = surface.vertex_neighbors(0).iter().copied().collect();
        assert_eq!(n, vec![1, 3, 4]);

        // Corner normal points diagonally outwards
        let normal = surface.vertex_normal(6);
        assert!(normal.x > 0.0 && normal.y > 0.0 && normal.z > 0.0);
        assert!((normal.norm() - 1.0).abs() < 1e-12);

        assert!((surface.triangle_normal(0) - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_pentagon_fan() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.5, 1.0, 0.0),
            Point3::new(0.5, 1.8, 0.0),
            Point3::new(-0.5, 1.0, 0.0),
        ];
        let mesh = build_from_polygons(&vertices, &[vec![0, 1, 2, 3, 4]]).unwrap();
        let surface = SurfaceMesh::new(mesh);
        assert_eq!(surface.num_triangles(), 3);
        assert_eq!(surface.vertex_triangles(0).len(), 3);
    }

    #[test]
    fn test_vertex_index_at() {
        let surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        assert_eq!(surface.vertex_index_at(&Point3::new(1.0, 1.0, 1.0), 1e-6), Some(6));
        assert_eq!(surface.vertex_index_at(&Point3::new(1.0, 1.0, 1.001), 1e-2), Some(6));
        assert_eq!(surface.vertex_index_at(&Point3::new(0.0, 0.0, 0.0), 1e-6), None);
    }

    #[test]
    fn test_update_after_edit() {
        let mut surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        surface.translate_vertex(6, &Vector3::new(1.0, 1.0, 1.0));
        // Stale until refreshed
        assert_eq!(surface.render_vertices()[6].position, [1.0, 1.0, 1.0]);
        surface.update_geometry();
        assert_eq!(surface.render_vertices()[6].position, [2.0, 2.0, 2.0]);
        assert_eq!(*surface.vertex_position(6), Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_collision_copies() {
        let surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        let model = Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0));
        let moved = surface.collision_triangles(&model);
        assert_eq!(moved.len(), 12);

        let prev = Point3::new(10.0, 0.2, 5.0);
        let curr = Point3::new(10.0, 0.2, -5.0);
        let hit = continuous_collision(&moved, &prev, &curr, false).unwrap();
        assert!((hit.position.z - 1.0).abs() < 1e-12);
        assert!((hit.normal - Vector3::z()).norm() < 1e-12);

        // The local triangles are untouched
        assert!(continuous_collision(surface.local_collision_triangles(), &prev, &curr, false).is_none());
    }

    #[test]
    fn test_replace() {
        let mut surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        surface.replace(primitives::quad_grid(2, 2, 1.0).unwrap());
        assert_eq!(surface.num_vertices(), 9);
        assert_eq!(surface.num_triangles(), 8);
        assert_eq!(surface.vertex_neighbors(4).len(), 4);
    }
}
