//! Catmull-Clark subdivision with contribution tracking.
//!
//! Catmull-Clark subdivision (Catmull & Clark, 1978) is an approximating
//! scheme for polygon meshes. Each step:
//!
//! 1. Creates a face point at each face centroid
//! 2. Creates an edge point for each edge from its two face points
//! 3. Moves original vertices to a weighted average of their neighbourhood
//! 4. Connects everything into quads, one per face corner
//!
//! Every refined vertex is an affine combination of coarse vertices. The step
//! records those combinations in a [`ContributionMap`] so that a change made
//! on a coarse level can be traced to the finer levels and back again.
//!
//! # Example
//!
//! ```
//! use subdiv_curtain::algo::subdivide::{catmull_clark_subdivide, SubdivideOptions};
//! use subdiv_curtain::mesh::primitives;
//!
//! let cube = primitives::cube(1.0).unwrap();
//! let step = catmull_clark_subdivide(&cube, &SubdivideOptions::default()).unwrap();
//!
//! assert_eq!(step.mesh.num_vertices(), 26);
//! let weights = step.contributions.prev_level_contributions(0).unwrap();
//! let total: f64 = weights.iter().map(|c| c.amount).sum();
//! assert!((total - 1.0).abs() < 1e-9);
//! ```
//!
//! # References
//!
//! - Catmull, E. & Clark, J. (1978). "Recursively generated B-spline surfaces
//!   on arbitrary topological meshes." Computer-Aided Design, 10(6), 350-355.

mod catmull_clark;
mod contribution;

pub use catmull_clark::{catmull_clark_subdivide, catmull_clark_subdivide_with_progress, Subdivision};
pub use contribution::{Contribution, ContributionMap};

/// Options for Catmull-Clark subdivision.
#[derive(Debug, Clone)]
pub struct SubdivideOptions {
    /// Whether to use the boundary rules on open meshes.
    /// If false, boundary vertices use the interior rule.
    pub preserve_boundary: bool,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for SubdivideOptions {
    fn default() -> Self {
        Self {
            preserve_boundary: true,
            parallel: true,
        }
    }
}

impl SubdivideOptions {
    /// Set whether to use the boundary rules.
    pub fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}
