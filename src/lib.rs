//! # subdiv-curtain
//!
//! Curve-driven editing of Catmull-Clark subdivision surfaces.
//!
//! A base polygon mesh is refined on demand into a stack of subdivision
//! levels. The user paints a stroke on the surface, which raises a
//! [`Curtain`](curtain::Curtain) along the surface normals; a second stroke
//! painted on the curtain is resampled, dropped back onto the surface and used
//! as the target of a Laplacian-regularised least-squares deformation. The
//! deformation is solved on a coarser level and carried to the finer ones
//! through the subdivision contribution weights.
//!
//! ## Features
//!
//! - **Polygon half-edge mesh**: O(1) adjacency queries with type-safe indices
//! - **Catmull-Clark subdivision** that records the weight of every coarse
//!   vertex in every fine vertex
//! - **Swept collision** of moving points against triangle arrays
//! - **Arc-length resampling** of painted strokes
//! - **Multi-level deformation** with an SVD least-squares solve
//! - **Intent-driven session** tying the pieces together for an interactive
//!   host
//!
//! ## Quick Start
//!
//! ```
//! use subdiv_curtain::prelude::*;
//!
//! let cube = primitives::cube(2.0).unwrap();
//! let mut session = Session::new(cube, SessionConfig::default());
//!
//! let outcome = session.dispatch(Intent::SubdivisionLevelChanged(2)).unwrap();
//! assert!(matches!(outcome, Outcome::LevelReady { faces: 96, .. }));
//! ```
//!
//! ## Subdivision and Contributions
//!
//! ```
//! use subdiv_curtain::prelude::*;
//!
//! let cube = primitives::cube(2.0).unwrap();
//! let step = catmull_clark_subdivide(&cube, &SubdivideOptions::default()).unwrap();
//! assert_eq!(step.mesh.num_vertices(), 26);
//!
//! // Every fine vertex is an affine combination of coarse vertices
//! for v in 0..step.mesh.num_vertices() {
//!     assert!((step.contributions.weight_sum(v) - 1.0).abs() < 1e-9);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod collision;
pub mod curtain;
pub mod curve;
pub mod error;
pub mod levels;
pub mod mesh;
pub mod session;
pub mod view;

/// Prelude module for convenient imports.
///
/// ```
/// use subdiv_curtain::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::deform::{deform, DeformOptions, TargetPoint};
    pub use crate::algo::subdivide::{catmull_clark_subdivide, ContributionMap, SubdivideOptions};
    pub use crate::algo::Progress;
    pub use crate::collision::{continuous_collision, swept_triangle_intersect, CollisionTriangle, RayHit};
    pub use crate::curtain::Curtain;
    pub use crate::curve::{uniform_sample, LinearCurve};
    pub use crate::error::{MeshError, Result};
    pub use crate::levels::{LevelStack, LevelState};
    pub use crate::mesh::{
        build_from_polygons, build_from_quads, build_from_triangles, primitives, to_face_vertex,
        FaceId, HalfEdgeId, HalfEdgeMesh, SurfaceMesh, VertexId,
    };
    pub use crate::session::{Intent, Outcome, Session, SessionConfig};
    pub use crate::view::{OrbitCamera, Ray, RenderSink};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
