//! Core mesh data structures.
//!
//! # Overview
//!
//! [`HalfEdgeMesh`] stores the topology and positions of one polygon mesh
//! using a half-edge (doubly-connected edge list) structure, which answers
//! adjacency queries in O(1). Faces may have any degree; Catmull-Clark
//! output is all quads.
//!
//! [`SurfaceMesh`] wraps a half-edge mesh with everything derived from it
//! that the rest of the crate needs: a triangulation, vertex adjacency,
//! normals, collision triangles and render buffers.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`HalfEdgeId`] - Identifies a half-edge
//! - [`FaceId`] - Identifies a face
//!
//! # Construction
//!
//! Meshes are built from face-vertex lists or taken from [`primitives`]:
//!
//! ```
//! use subdiv_curtain::mesh::{build_from_quads, HalfEdgeMesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2, 3]];
//!
//! let mesh: HalfEdgeMesh = build_from_quads(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_faces(), 1);
//! ```

mod builder;
mod halfedge;
mod index;
pub mod primitives;
mod surface;

pub use builder::{build_from_polygons, build_from_quads, build_from_triangles, to_face_vertex};
pub use halfedge::{Face, FaceHalfEdgeIter, HalfEdge, HalfEdgeMesh, Vertex, VertexHalfEdgeIter};
pub use index::{FaceId, HalfEdgeId, VertexId};
pub use surface::SurfaceMesh;
