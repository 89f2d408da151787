//! Catmull-Clark subdivision for polygon meshes with contribution tracking.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, FaceId, HalfEdgeId, HalfEdgeMesh, VertexId};

use super::{ContributionMap, SubdivideOptions};

/// Affine weights of coarse vertices, `(vertex index, weight)`.
type Weights = Vec<(usize, f64)>;

/// The result of one Catmull-Clark step.
#[derive(Debug, Clone)]
pub struct Subdivision {
    /// The refined mesh. Every face is a quad.
    pub mesh: HalfEdgeMesh,
    /// How each refined vertex is built from the input vertices.
    pub contributions: ContributionMap,
}

/// Performs one step of Catmull-Clark subdivision.
///
/// Faces may have any degree; the output is all quads. Every new vertex is an
/// affine combination of input vertices and that combination is returned in
/// the [`ContributionMap`], so the refined positions can be reproduced exactly
/// from the coarse ones.
///
/// # Vertex Layout
///
/// The refined mesh numbers its vertices as
/// - `0..V`: updated input vertices (same index as in the input)
/// - `V..V+F`: face points, in face order
/// - `V+F..`: edge points, in [`HalfEdgeMesh::edge_halfedges`] order
///
/// # Vertex Rules
///
/// - **Face point**: centroid of the face's corners
/// - **Edge point**: average of the two adjacent face points
/// - **Vertex point**: (Q + 2R + (n-3)S) / n where
///   - Q = average of adjacent face points
///   - R = average of adjacent edge points
///   - S = original position
///   - n = valence
///
/// With `preserve_boundary`, boundary edges split at their midpoint, boundary
/// vertices move to 3/4 S + 1/8 of each boundary neighbour, and corners (a
/// single incident face, or an irregular boundary fan) stay put. Without it,
/// boundary edges still split at the midpoint and boundary vertices use the
/// interior rule over the faces they have, except vertices with fewer than
/// three edges, which stay put.
///
/// # Errors
/// [`MeshError::EmptyMesh`] for a mesh without faces, or any error from
/// rebuilding the refined connectivity.
pub fn catmull_clark_subdivide(mesh: &HalfEdgeMesh, options: &SubdivideOptions) -> Result<Subdivision> {
    let num_vertices = mesh.num_vertices();
    let num_faces = mesh.num_faces();
    if num_faces == 0 {
        return Err(MeshError::EmptyMesh);
    }

    // Number every full edge and map both of its half-edges to that number.
    let mut edge_of = vec![usize::MAX; mesh.num_halfedges()];
    let mut edges: Vec<HalfEdgeId> = Vec::with_capacity(mesh.num_edges());
    for he in mesh.edge_halfedges() {
        edge_of[he.index()] = edges.len();
        edge_of[mesh.twin(he).index()] = edges.len();
        edges.push(he);
    }

    let face_weights: Vec<Weights> = collect_indexed(num_faces, options.parallel, |f| {
        face_point_weights(mesh, FaceId::new(f))
    });

    let edge_weights: Vec<Weights> = collect_indexed(edges.len(), options.parallel, |e| {
        edge_point_weights(mesh, edges[e], &face_weights)
    });

    let vertex_weights: Vec<Weights> = collect_indexed(num_vertices, options.parallel, |v| {
        vertex_point_weights(
            mesh,
            VertexId::new(v),
            &face_weights,
            &edge_weights,
            &edge_of,
            options.preserve_boundary,
        )
    });

    let all_weights: Vec<&Weights> = vertex_weights
        .iter()
        .chain(face_weights.iter())
        .chain(edge_weights.iter())
        .collect();

    let new_positions: Vec<Point3<f64>> = if options.parallel {
        all_weights.par_iter().map(|w| evaluate(mesh, w)).collect()
    } else {
        all_weights.iter().map(|w| evaluate(mesh, w)).collect()
    };

    let mut contributions = ContributionMap::new(num_vertices, all_weights.len());
    for (next, weights) in all_weights.iter().enumerate() {
        for &(prev, amount) in weights.iter() {
            contributions.add(prev, next, amount);
        }
    }

    let face_base = num_vertices;
    let edge_base = num_vertices + num_faces;
    let mut new_faces: Vec<Vec<usize>> = Vec::new();
    for f in mesh.face_ids() {
        let fp = face_base + f.index();
        let hes: Vec<HalfEdgeId> = mesh.face_halfedges(f).collect();
        let degree = hes.len();
        for i in 0..degree {
            let corner = mesh.origin(hes[i]).index();
            let outgoing = edge_base + edge_of[hes[i].index()];
            let incoming = edge_base + edge_of[hes[(i + degree - 1) % degree].index()];
            new_faces.push(vec![corner, outgoing, fp, incoming]);
        }
    }

    let refined = build_from_polygons(&new_positions, &new_faces)?;

    log::debug!(
        "Catmull-Clark: {} -> {} vertices, {} -> {} faces, {} contributions",
        num_vertices,
        refined.num_vertices(),
        num_faces,
        refined.num_faces(),
        contributions.len()
    );

    Ok(Subdivision {
        mesh: refined,
        contributions,
    })
}

/// Applies Catmull-Clark `iterations` times, keeping every intermediate step.
///
/// Element `i` of the result holds the mesh after `i + 1` steps together with
/// the contributions from the mesh before it.
pub fn catmull_clark_subdivide_with_progress(
    mesh: &HalfEdgeMesh,
    iterations: usize,
    options: &SubdivideOptions,
    progress: &Progress,
) -> Result<Vec<Subdivision>> {
    let mut steps: Vec<Subdivision> = Vec::with_capacity(iterations);
    for iter in 0..iterations {
        progress.report(iter, iterations, "Catmull-Clark subdivision");
        let source = steps.last().map_or(mesh, |s| &s.mesh);
        let step = catmull_clark_subdivide(source, options)?;
        steps.push(step);
    }
    progress.report(iterations, iterations, "Catmull-Clark subdivision");
    Ok(steps)
}

fn collect_indexed<T, F>(count: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        (0..count).into_par_iter().map(f).collect()
    } else {
        (0..count).map(f).collect()
    }
}

/// Add `scale * source` into `target`, merging repeated vertices.
fn accumulate(target: &mut Weights, source: &[(usize, f64)], scale: f64) {
    for &(v, w) in source {
        match target.iter_mut().find(|(u, _)| *u == v) {
            Some(entry) => entry.1 += w * scale,
            None => target.push((v, w * scale)),
        }
    }
}

fn evaluate(mesh: &HalfEdgeMesh, weights: &[(usize, f64)]) -> Point3<f64> {
    let sum: Vector3<f64> = weights
        .iter()
        .map(|&(v, w)| mesh.position(VertexId::new(v)).coords * w)
        .sum();
    Point3::from(sum)
}

fn face_point_weights(mesh: &HalfEdgeMesh, f: FaceId) -> Weights {
    let corners: Vec<VertexId> = mesh.face_vertices(f).collect();
    let w = 1.0 / corners.len() as f64;
    corners.into_iter().map(|v| (v.index(), w)).collect()
}

fn edge_point_weights(mesh: &HalfEdgeMesh, he: HalfEdgeId, face_weights: &[Weights]) -> Weights {
    let twin = mesh.twin(he);
    let f0 = mesh.face_of(he);
    let f1 = mesh.face_of(twin);

    if !f0.is_valid() || !f1.is_valid() {
        return vec![(mesh.origin(he).index(), 0.5), (mesh.dest(he).index(), 0.5)];
    }

    let mut weights = Weights::new();
    accumulate(&mut weights, &face_weights[f0.index()], 0.5);
    accumulate(&mut weights, &face_weights[f1.index()], 0.5);
    weights
}

fn vertex_point_weights(
    mesh: &HalfEdgeMesh,
    v: VertexId,
    face_weights: &[Weights],
    edge_weights: &[Weights],
    edge_of: &[usize],
    preserve_boundary: bool,
) -> Weights {
    let s = v.index();
    let outgoing: Vec<HalfEdgeId> = mesh.vertex_halfedges(v).collect();
    if outgoing.is_empty() {
        return vec![(s, 1.0)];
    }

    if preserve_boundary && mesh.is_boundary_vertex(v) {
        let boundary_neighbors: Vec<usize> = outgoing
            .iter()
            .filter(|&&he| mesh.is_boundary_edge(he))
            .map(|&he| mesh.dest(he).index())
            .collect();
        if boundary_neighbors.len() == 2 && outgoing.len() > 2 {
            return vec![
                (s, 0.75),
                (boundary_neighbors[0], 0.125),
                (boundary_neighbors[1], 0.125),
            ];
        }
        return vec![(s, 1.0)];
    }

    // Two-edge corners stay put
    if outgoing.len() < 3 {
        return vec![(s, 1.0)];
    }

    let d = outgoing.len() as f64;
    let faces: Vec<FaceId> = mesh.vertex_faces(v).collect();

    let mut weights: Weights = vec![(s, (d - 3.0) / d)];

    // 2R / n, with R the mean of the n edge points
    for &he in &outgoing {
        accumulate(&mut weights, &edge_weights[edge_of[he.index()]], 2.0 / (d * d));
    }

    // Q / n, with Q the mean of the adjacent face points
    if !faces.is_empty() {
        let scale = 1.0 / (d * faces.len() as f64);
        for f in faces {
            accumulate(&mut weights, &face_weights[f.index()], scale);
        }
    }

    weights
}
