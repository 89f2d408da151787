//! Mesh processing algorithms.
//!
//! - **Subdivision**: Catmull-Clark refinement with per-vertex contribution
//!   weights
//! - **Deformation**: least-squares fitting of a surface to target points,
//!   regularised by the discrete Laplacian
//! - **Sparse**: the CSR matrix the deformation system is assembled from

pub mod deform;
pub mod progress;
pub mod sparse;
pub mod subdivide;

pub use progress::Progress;
