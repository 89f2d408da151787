//! Error types for subdiv-curtain.
//!
//! Broken preconditions (non-manifold input, out-of-range levels, lookups that
//! miss a contribution map) surface as [`MeshError`] values. Results that are
//! merely empty, such as a ray that hits nothing, are reported with `Option`.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Which side of a contribution map a lookup was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSide {
    /// The coarser level (the level that was subdivided).
    Previous,
    /// The finer level (the level produced by subdivision).
    Next,
}

impl std::fmt::Display for LevelSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelSide::Previous => write!(f, "previous"),
            LevelSide::Next => write!(f, "next"),
        }
    }
}

/// Errors that can occur during mesh, subdivision and deformation operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has fewer than three corners or repeats a vertex.
    #[error("face {face} is degenerate")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// A directed edge is used by more than one face.
    #[error("edge ({v0}, {v1}) is shared by more than two faces or has inconsistent winding")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// The mesh has non-manifold topology.
    #[error("mesh has non-manifold topology: {details}")]
    NonManifold {
        /// Description of the non-manifold condition.
        details: String,
    },

    /// A subdivision level was requested that does not exist.
    #[error("subdivision level {requested} is out of range ({available} levels available)")]
    LevelOutOfRange {
        /// The requested level.
        requested: usize,
        /// Number of levels that can be addressed.
        available: usize,
    },

    /// A vertex has no entry in a contribution map.
    #[error("vertex {vertex} has no contributions on the {side} level")]
    MissingContribution {
        /// The vertex index that was looked up.
        vertex: usize,
        /// Which level the index belongs to.
        side: LevelSide,
    },

    /// A triangle index is outside the triangulated mesh.
    #[error("triangle index {index} is out of range ({count} triangles)")]
    InvalidTriangleIndex {
        /// The requested triangle.
        index: usize,
        /// Number of triangles.
        count: usize,
    },

    /// The least-squares system has no rows or no unknowns.
    #[error("deformation system is empty")]
    EmptySystem,

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = MeshError::LevelOutOfRange {
            requested: 4,
            available: 2,
        };
        assert_eq!(
            e.to_string(),
            "subdivision level 4 is out of range (2 levels available)"
        );

        let e = MeshError::MissingContribution {
            vertex: 7,
            side: LevelSide::Next,
        };
        assert_eq!(e.to_string(), "vertex 7 has no contributions on the next level");
    }

    #[test]
    fn test_invalid_param() {
        let e = MeshError::invalid_param("delta_s", -1.0, "must be positive");
        assert_eq!(
            e.to_string(),
            "invalid parameter: delta_s = -1 (must be positive)"
        );
    }
}
