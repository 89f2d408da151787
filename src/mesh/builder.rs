//! Mesh construction utilities.
//!
//! Builds half-edge meshes from face-vertex lists. Faces may be polygons of
//! any degree; consistent winding across shared edges is required.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::{Face, HalfEdge, HalfEdgeMesh};
use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::{MeshError, Result};

/// Build a half-edge mesh from vertices and polygon faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of faces, each a list of at least three vertex indices
///   in counter-clockwise order
///
/// # Errors
/// Returns an error if a face is degenerate or references a missing vertex,
/// or if the faces do not form a manifold surface with consistent winding.
///
/// # Example
/// ```
/// use subdiv_curtain::mesh::build_from_polygons;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mesh = build_from_polygons(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
/// assert_eq!(mesh.num_faces(), 1);
/// assert_eq!(mesh.num_halfedges(), 8);
/// ```
pub fn build_from_polygons(vertices: &[Point3<f64>], faces: &[Vec<usize>]) -> Result<HalfEdgeMesh> {
    if faces.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        if face.len() < 3 {
            return Err(MeshError::DegenerateFace { face: fi });
        }
        for (k, &vi) in face.iter().enumerate() {
            if vi >= vertices.len() {
                return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
            }
            if face[..k].contains(&vi) {
                return Err(MeshError::DegenerateFace { face: fi });
            }
        }
    }

    let corner_count: usize = faces.iter().map(Vec::len).sum();
    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), corner_count * 2, faces.len());

    let vertex_ids: Vec<VertexId> = vertices.iter().map(|&pos| mesh.add_vertex(pos)).collect();

    // Directed edge (v0, v1) -> half-edge
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::with_capacity(corner_count);

    // First pass: interior half-edges and faces
    for face in faces {
        let face_id = FaceId::new(mesh.num_faces());
        let base = mesh.num_halfedges();
        let n = face.len();

        mesh.faces.push(Face {
            halfedge: HalfEdgeId::new(base),
        });

        for (k, &v) in face.iter().enumerate() {
            let he = HalfEdgeId::new(base + k);
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[v],
                twin: HalfEdgeId::invalid(),
                next: HalfEdgeId::new(base + (k + 1) % n),
                prev: HalfEdgeId::new(base + (k + n - 1) % n),
                face: face_id,
            });
            mesh.vertex_mut(vertex_ids[v]).halfedge = he;

            let w = face[(k + 1) % n];
            if edge_map.insert((v, w), he).is_some() {
                return Err(MeshError::NonManifoldEdge { v0: v, v1: w });
            }
        }
    }

    // Second pass: link twins, creating boundary half-edges where needed.
    // Iterate in half-edge order so the result does not depend on hash order.
    let interior_count = mesh.num_halfedges();
    for i in 0..interior_count {
        let he = HalfEdgeId::new(i);
        if mesh.twin(he).is_valid() {
            continue;
        }
        let v0 = mesh.origin(he).index();
        let v1 = mesh.origin(mesh.next(he)).index();

        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
            mesh.halfedge_mut(twin).twin = he;
        } else {
            let boundary = HalfEdgeId::new(mesh.num_halfedges());
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[v1],
                twin: he,
                ..HalfEdge::default()
            });
            mesh.halfedge_mut(he).twin = boundary;
        }
    }

    link_boundary_loops(&mut mesh)?;
    fix_boundary_vertex_halfedges(&mut mesh);

    Ok(mesh)
}

/// Build a half-edge mesh from vertices and quad faces.
pub fn build_from_quads(vertices: &[Point3<f64>], faces: &[[usize; 4]]) -> Result<HalfEdgeMesh> {
    let faces: Vec<Vec<usize>> = faces.iter().map(|f| f.to_vec()).collect();
    build_from_polygons(vertices, &faces)
}

/// Build a half-edge mesh from vertices and triangle faces.
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<HalfEdgeMesh> {
    let faces: Vec<Vec<usize>> = faces.iter().map(|f| f.to_vec()).collect();
    build_from_polygons(vertices, &faces)
}

/// Link boundary half-edges into loops.
///
/// A vertex with more than one outgoing boundary half-edge joins two separate
/// fans and is rejected as non-manifold.
fn link_boundary_loops(mesh: &mut HalfEdgeMesh) -> Result<()> {
    let boundary: Vec<HalfEdgeId> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();

    let mut outgoing: HashMap<usize, HalfEdgeId> = HashMap::with_capacity(boundary.len());
    for &he in &boundary {
        let origin = mesh.origin(he).index();
        if outgoing.insert(origin, he).is_some() {
            return Err(MeshError::NonManifold {
                details: format!("vertex {} joins more than one boundary fan", origin),
            });
        }
    }

    for &he in &boundary {
        let dest = mesh.dest(he).index();
        let next = outgoing.get(&dest).copied().ok_or_else(|| MeshError::NonManifold {
            details: format!("boundary loop is open at vertex {}", dest),
        })?;
        mesh.halfedge_mut(he).next = next;
        mesh.halfedge_mut(next).prev = he;
    }

    Ok(())
}

/// Make boundary vertices point at their outgoing boundary half-edge, so that
/// walking around the vertex visits every incident face.
fn fix_boundary_vertex_halfedges(mesh: &mut HalfEdgeMesh) {
    let boundary: Vec<HalfEdgeId> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();
    for he in boundary {
        let origin = mesh.origin(he);
        mesh.vertex_mut(origin).halfedge = he;
    }
}

/// Convert a half-edge mesh back to a face-vertex representation.
pub fn to_face_vertex(mesh: &HalfEdgeMesh) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let vertices = mesh.positions();
    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(|v| v.index()).collect())
        .collect();
    (vertices, faces)
}
