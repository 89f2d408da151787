//! Least-squares deformation through subdivision levels.
//!
//! Target points sit on a fine level's surface, each inside a known triangle.
//! Their barycentric weights tie them to the fine vertices, and the
//! subdivision [`ContributionMap`]s tie those back to the vertices of a coarser
//! level. Moving the coarse vertices and re-subdividing then moves the target
//! points linearly, which turns "drag the surface onto these points" into a
//! linear least-squares problem:
//!
//! ```text
//! A   = (1 - w) BᵗB + w YᵗY
//! rhs = (1 - w) Bᵗ (target - projected) + w Yᵗ (-L)
//! ```
//!
//! `B` maps coarse displacements to target point displacements, `Y` maps them
//! to changes of the discrete Laplacian around the moved region, `L` is the
//! current Laplacian and `w` the Laplacian weight. The x, y and z axes are
//! solved independently with an SVD, so rank-deficient systems yield the
//! minimum-norm solution.

use std::collections::{BTreeMap, HashMap, VecDeque};

use nalgebra::{DMatrix, DVector, Point3, Vector3};

use super::sparse::CsrMatrix;
use super::subdivide::ContributionMap;
use super::Progress;
use crate::error::{MeshError, Result};
use crate::levels::LevelStack;
use crate::mesh::SurfaceMesh;

/// Options for the deformation solver.
#[derive(Debug, Clone)]
pub struct DeformOptions {
    /// Weight of the Laplacian term, in `[0, 1]`. Zero interpolates the
    /// targets as closely as possible; one only smooths.
    pub laplacian_weight: f64,

    /// How many rings around the moved vertices take part in the Laplacian
    /// term.
    pub laplacian_distance: usize,

    /// How many levels below the edited level are actually moved.
    pub effect_levels: usize,

    /// Singular values below this are treated as zero.
    pub svd_epsilon: f64,
}

impl Default for DeformOptions {
    fn default() -> Self {
        Self {
            laplacian_weight: 0.9,
            laplacian_distance: 2,
            effect_levels: 1,
            svd_epsilon: 1e-10,
        }
    }
}

impl DeformOptions {
    /// Set the Laplacian weight (clamped to [0, 1]).
    pub fn with_laplacian_weight(mut self, weight: f64) -> Self {
        self.laplacian_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Set the Laplacian ring distance.
    pub fn with_laplacian_distance(mut self, distance: usize) -> Self {
        self.laplacian_distance = distance;
        self
    }

    /// Set the number of coarser levels the edit reaches down to.
    pub fn with_effect_levels(mut self, levels: usize) -> Self {
        self.effect_levels = levels;
        self
    }

    /// Set the SVD cut-off.
    pub fn with_svd_epsilon(mut self, epsilon: f64) -> Self {
        self.svd_epsilon = epsilon;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.laplacian_weight) {
            return Err(MeshError::invalid_param(
                "laplacian_weight",
                self.laplacian_weight,
                "must be in [0, 1]",
            ));
        }
        if !(self.svd_epsilon >= 0.0) {
            return Err(MeshError::invalid_param(
                "svd_epsilon",
                self.svd_epsilon,
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

/// A point the surface should be pulled onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoint {
    /// Where the surface should end up.
    pub target: Point3<f64>,
    /// The point on the current surface that should move there.
    pub projected: Point3<f64>,
    /// Triangle of the edited level containing `projected`.
    pub triangle: usize,
}

/// Weight of a vertex in the position of a target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointWeight {
    /// Vertex index on the level the weights refer to.
    pub vertex: usize,
    /// Index into the target point list.
    pub point: usize,
    /// Linear weight of the vertex.
    pub weight: f64,
}

/// Displacements solved for a set of vertices on one level.
#[derive(Debug, Clone, Default)]
pub struct Displacement {
    /// Moved vertex indices, ascending.
    pub vertices: Vec<usize>,
    /// Offset for each entry of `vertices`.
    pub offsets: Vec<Vector3<f64>>,
}

impl Displacement {
    /// Number of moved vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// True if no vertex is moved.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Iterate over `(vertex, offset)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Vector3<f64>)> + '_ {
        self.vertices.iter().copied().zip(self.offsets.iter())
    }

    /// Largest offset length.
    pub fn max_offset(&self) -> f64 {
        self.offsets.iter().map(|d| d.norm()).fold(0.0, f64::max)
    }
}

/// Summary of an applied deformation.
#[derive(Debug, Clone)]
pub struct DeformReport {
    /// The level whose vertices were moved.
    pub coarse_level: usize,
    /// The level the target points were given on.
    pub level: usize,
    /// The solved displacement on `coarse_level`.
    pub displacement: Displacement,
}

/// Barycentric coordinates of `p` with respect to the triangle `a, b, c`.
///
/// `p` is projected onto the triangle's plane. Returns `None` for a
/// degenerate triangle.
pub fn barycentric(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f64::EPSILON * d00 * d11 || denom == 0.0 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some([1.0 - v - w, v, w])
}

/// Weights of the surface's vertices in each target point's position.
///
/// Produces three entries per target, one per triangle corner, skipping
/// corners whose barycentric weight is zero.
///
/// # Errors
/// [`MeshError::InvalidTriangleIndex`] for a bad triangle reference and
/// [`MeshError::DegenerateFace`] if a target lies in a degenerate triangle.
pub fn calc_vertex_to_point_contribution(
    surface: &SurfaceMesh,
    targets: &[TargetPoint],
) -> Result<Vec<PointWeight>> {
    let mut weights = Vec::with_capacity(targets.len() * 3);
    for (point, t) in targets.iter().enumerate() {
        let tri = surface.vertex_indices(t.triangle)?;
        let bary = barycentric(
            &t.projected,
            surface.vertex_position(tri[0]),
            surface.vertex_position(tri[1]),
            surface.vertex_position(tri[2]),
        )
        .ok_or(MeshError::DegenerateFace { face: t.triangle })?;

        for (&vertex, &weight) in tri.iter().zip(bary.iter()) {
            if weight.abs() > 1e-12 {
                weights.push(PointWeight { vertex, point, weight });
            }
        }
    }
    Ok(weights)
}

/// Re-express point weights given on a finer level in terms of the coarser
/// level that `contributions` was recorded from.
///
/// Entries for the same coarse vertex and point are merged; the output is
/// sorted by vertex, then point.
///
/// # Errors
/// [`MeshError::MissingContribution`] if a vertex has no coarse sources.
pub fn pull_back(weights: &[PointWeight], contributions: &ContributionMap) -> Result<Vec<PointWeight>> {
    let mut merged: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for w in weights {
        for c in contributions.prev_level_contributions(w.vertex)? {
            *merged.entry((c.prev_level_vertex, w.point)).or_insert(0.0) += w.weight * c.amount;
        }
    }
    Ok(merged
        .into_iter()
        .filter(|&(_, weight)| weight.abs() > 1e-12)
        .map(|((vertex, point), weight)| PointWeight { vertex, point, weight })
        .collect())
}

/// The Laplacian term of the deformation system.
#[derive(Debug, Clone)]
pub struct LaplacianSystem {
    /// Vertices whose Laplacian is constrained: the movable vertices first,
    /// then the surrounding rings in breadth-first order.
    pub ring: Vec<usize>,
    /// `ring.len() x movable.len()` matrix mapping movable displacements to
    /// changes of the ring vertices' Laplacians.
    pub matrix: CsrMatrix,
    /// Current Laplacian of each ring vertex.
    pub laplacian: Vec<Vector3<f64>>,
}

/// Discrete Laplacian of a vertex: its position minus the mean of its
/// neighbours. Zero for an isolated vertex.
pub fn vertex_laplacian(surface: &SurfaceMesh, v: usize) -> Vector3<f64> {
    let neighbors = surface.vertex_neighbors(v);
    if neighbors.is_empty() {
        return Vector3::zeros();
    }
    let mean: Vector3<f64> = neighbors
        .iter()
        .map(|&u| surface.vertex_position(u).coords)
        .sum::<Vector3<f64>>()
        / neighbors.len() as f64;
    surface.vertex_position(v).coords - mean
}

/// Build the Laplacian rows for the movable vertices and the rings
/// `distance` hops around them. Ring vertices that are not movable act as
/// fixed boundary.
pub fn calc_laplacian_contribution(surface: &SurfaceMesh, movable: &[usize], distance: usize) -> LaplacianSystem {
    let column: HashMap<usize, usize> = movable.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let mut ring: Vec<usize> = movable.to_vec();
    let mut hops: HashMap<usize, usize> = movable.iter().map(|&v| (v, 0)).collect();
    let mut queue: VecDeque<usize> = movable.iter().copied().collect();
    while let Some(v) = queue.pop_front() {
        let d = hops[&v];
        if d >= distance {
            continue;
        }
        for &u in surface.vertex_neighbors(v) {
            if !hops.contains_key(&u) {
                hops.insert(u, d + 1);
                ring.push(u);
                queue.push_back(u);
            }
        }
    }

    let mut triplets = Vec::new();
    let mut laplacian = Vec::with_capacity(ring.len());
    for (row, &v) in ring.iter().enumerate() {
        laplacian.push(vertex_laplacian(surface, v));
        let neighbors = surface.vertex_neighbors(v);
        if neighbors.is_empty() {
            continue;
        }
        if let Some(&col) = column.get(&v) {
            triplets.push((row, col, 1.0));
        }
        let share = -1.0 / neighbors.len() as f64;
        for u in neighbors {
            if let Some(&col) = column.get(u) {
                triplets.push((row, col, share));
            }
        }
    }

    LaplacianSystem {
        matrix: CsrMatrix::from_triplets(ring.len(), movable.len(), triplets),
        ring,
        laplacian,
    }
}

/// Solve for the displacement of `surface`'s vertices that best moves the
/// targets, given point weights expressed on `surface`'s level.
///
/// # Errors
/// [`MeshError::EmptySystem`] if there are no targets or no weights, or an
/// invalid-parameter error for bad options.
pub fn solve_displacement(
    surface: &SurfaceMesh,
    weights: &[PointWeight],
    targets: &[TargetPoint],
    options: &DeformOptions,
) -> Result<Displacement> {
    options.validate()?;
    if targets.is_empty() || weights.is_empty() {
        return Err(MeshError::EmptySystem);
    }

    let mut movable: Vec<usize> = weights.iter().map(|w| w.vertex).collect();
    movable.sort_unstable();
    movable.dedup();
    let column: HashMap<usize, usize> = movable.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let b = CsrMatrix::from_triplets(
        targets.len(),
        movable.len(),
        weights
            .iter()
            .filter(|w| w.point < targets.len())
            .map(|w| (w.point, column[&w.vertex], w.weight))
            .collect(),
    );
    let lap = calc_laplacian_contribution(surface, &movable, options.laplacian_distance);

    let w = options.laplacian_weight;
    let a: DMatrix<f64> = b.gram() * (1.0 - w) + lap.matrix.gram() * w;

    let mut rhs = DMatrix::zeros(movable.len(), 3);
    for axis in 0..3 {
        let residual = DVector::from_iterator(targets.len(), targets.iter().map(|t| t.target[axis] - t.projected[axis]));
        let smooth = DVector::from_iterator(lap.ring.len(), lap.laplacian.iter().map(|l| -l[axis]));
        let axis_rhs = b.transpose_mul_vec(&residual) * (1.0 - w) + lap.matrix.transpose_mul_vec(&smooth) * w;
        rhs.set_column(axis, &axis_rhs);
    }

    log::debug!(
        "deformation system: {} targets, {} movable vertices, {} Laplacian rows, w = {}",
        targets.len(),
        movable.len(),
        lap.ring.len(),
        w
    );

    let solution = a
        .svd(true, true)
        .solve(&rhs, options.svd_epsilon)
        .map_err(|reason| MeshError::invalid_param("svd_epsilon", options.svd_epsilon, reason))?;

    let offsets = (0..movable.len())
        .map(|i| Vector3::new(solution[(i, 0)], solution[(i, 1)], solution[(i, 2)]))
        .collect();

    Ok(Displacement {
        vertices: movable,
        offsets,
    })
}

/// Pull the surface of `level` onto `targets`, moving the vertices of the
/// level `options.effect_levels` below it and regenerating the levels in
/// between.
///
/// Dirty levels up to `level` are regenerated before anything is read, so
/// targets are measured against the current surface.
///
/// # Errors
/// [`MeshError::LevelOutOfRange`] if `level` is not cached or there are not
/// enough levels below it, [`MeshError::EmptySystem`] without targets, and
/// any lookup error from the contribution maps.
pub fn deform(
    levels: &mut LevelStack,
    level: usize,
    targets: &[TargetPoint],
    options: &DeformOptions,
    progress: &Progress,
) -> Result<DeformReport> {
    options.validate()?;
    if level >= levels.len() {
        return Err(MeshError::LevelOutOfRange {
            requested: level,
            available: levels.len(),
        });
    }
    if options.effect_levels > level {
        return Err(MeshError::LevelOutOfRange {
            requested: options.effect_levels,
            available: level,
        });
    }
    if targets.is_empty() {
        return Err(MeshError::EmptySystem);
    }
    levels.request_level(level, progress)?;

    let mut weights = calc_vertex_to_point_contribution(levels.surface(level)?, targets)?;
    let coarse_level = level - options.effect_levels;
    for k in (coarse_level + 1..=level).rev() {
        weights = pull_back(&weights, levels.contributions(k)?)?;
    }

    let displacement = solve_displacement(levels.surface(coarse_level)?, &weights, targets, options)?;
    log::info!(
        "deforming level {} through level {}: {} vertices, max offset {:.4}",
        level,
        coarse_level,
        displacement.len(),
        displacement.max_offset()
    );

    levels.apply_deformation(coarse_level, &displacement)?;
    levels.request_level(level, progress)?;

    Ok(DeformReport {
        coarse_level,
        level,
        displacement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::subdivide::SubdivideOptions;
    use crate::mesh::primitives;

    fn target_at_vertex(surface: &SurfaceMesh, v: usize, offset: Vector3<f64>) -> TargetPoint {
        let triangle = surface.vertex_triangles(v)[0];
        let p = *surface.vertex_position(v);
        TargetPoint {
            target: p + offset,
            projected: p,
            triangle,
        }
    }

    #[test]
    fn test_barycentric() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let w = barycentric(&Point3::new(0.25, 0.5, 0.0), &a, &b, &c).unwrap();
        assert!((w[0] - 0.25).abs() < 1e-12);
        assert!((w[1] - 0.25).abs() < 1e-12);
        assert!((w[2] - 0.5).abs() < 1e-12);

        assert_eq!(barycentric(&b, &a, &b, &c).unwrap(), [0.0, 1.0, 0.0]);
        assert!(barycentric(&a, &a, &b, &Point3::new(2.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_point_contribution() {
        let surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        let centre = TargetPoint {
            target: Point3::new(0.0, 0.0, 2.0),
            projected: Point3::new(0.2, 0.1, 1.0),
            triangle: surface.vertex_triangles(6)[0],
        };
        let weights = calc_vertex_to_point_contribution(&surface, &[centre]).unwrap();
        let total: f64 = weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(weights.iter().all(|w| w.point == 0));

        let bad = TargetPoint { triangle: 99, ..centre };
        assert!(matches!(
            calc_vertex_to_point_contribution(&surface, &[bad]),
            Err(MeshError::InvalidTriangleIndex { index: 99, .. })
        ));
    }

    #[test]
    fn test_pull_back_preserves_total_weight() {
        let mut levels = LevelStack::new(primitives::cube(2.0).unwrap(), SubdivideOptions::default());
        levels.request_level(1, &Progress::none()).unwrap();

        let fine = levels.surface(1).unwrap();
        let targets: Vec<TargetPoint> = (0..fine.num_vertices())
            .step_by(5)
            .map(|v| target_at_vertex(fine, v, Vector3::zeros()))
            .collect();
        let weights = calc_vertex_to_point_contribution(fine, &targets).unwrap();
        let coarse = pull_back(&weights, levels.contributions(1).unwrap()).unwrap();

        for point in 0..targets.len() {
            let total: f64 = coarse.iter().filter(|w| w.point == point).map(|w| w.weight).sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        assert!(coarse.iter().all(|w| w.vertex < 8));
    }

    #[test]
    fn test_laplacian_rows() {
        let surface = SurfaceMesh::new(primitives::quad_grid(4, 4, 1.0).unwrap());
        // Centre vertex of the 5x5 lattice
        let lap = calc_laplacian_contribution(&surface, &[12], 1);
        assert_eq!(lap.ring.len(), 5);
        assert_eq!(lap.ring[0], 12);
        assert_eq!(lap.matrix.nrows(), 5);
        assert_eq!(lap.matrix.ncols(), 1);
        // Flat regular grid: zero Laplacian
        for l in &lap.laplacian {
            assert!(l.norm() < 1e-12);
        }
        let dense = lap.matrix.to_dense();
        assert_eq!(dense[(0, 0)], 1.0);
        for row in 1..5 {
            assert!((dense[(row, 0)] + 0.25).abs() < 1e-12);
        }

        let wider = calc_laplacian_contribution(&surface, &[12], 2);
        assert_eq!(wider.ring.len(), 13);
    }

    #[test]
    fn test_zero_weight_reaches_target() {
        let surface = SurfaceMesh::new(primitives::cube(2.0).unwrap());
        let offset = Vector3::new(0.1, 0.2, 0.3);
        let target = target_at_vertex(&surface, 6, offset);
        let weights = calc_vertex_to_point_contribution(&surface, &[target]).unwrap();
        assert_eq!(weights.len(), 1);

        let options = DeformOptions::default().with_laplacian_weight(0.0).with_effect_levels(0);
        let d = solve_displacement(&surface, &weights, &[target], &options).unwrap();
        assert_eq!(d.vertices, vec![6]);
        assert!((d.offsets[0] - offset).norm() < 1e-12);
    }

    #[test]
    fn test_zero_weight_through_one_level() {
        let mut levels = LevelStack::new(primitives::cube(2.0).unwrap(), SubdivideOptions::default());
        levels.request_level(1, &Progress::none()).unwrap();

        // Face point of the +z face
        let v = 9;
        let before = *levels.surface(1).unwrap().vertex_position(v);
        let target = target_at_vertex(levels.surface(1).unwrap(), v, Vector3::new(0.0, 0.0, 0.5));

        let options = DeformOptions::default().with_laplacian_weight(0.0).with_effect_levels(1);
        let report = deform(&mut levels, 1, &[target], &options, &Progress::none()).unwrap();
        assert_eq!(report.coarse_level, 0);
        assert_eq!(report.displacement.len(), 4);

        let after = *levels.surface(1).unwrap().vertex_position(v);
        assert!((after - target.target).norm() < 1e-9);
        assert!((after - before - Vector3::new(0.0, 0.0, 0.5)).norm() < 1e-9);

        // Topology is untouched
        assert_eq!(levels.surface(1).unwrap().num_vertices(), 26);
        assert_eq!(levels.surface(0).unwrap().num_vertices(), 8);
    }

    #[test]
    fn test_deform_regenerates_dirty_levels_first() {
        let mut levels = LevelStack::new(primitives::cube(2.0).unwrap(), SubdivideOptions::default());
        levels.request_level(2, &Progress::none()).unwrap();

        // Lift the top of the base cube; levels 1 and 2 are now stale
        let top = Displacement {
            vertices: vec![4, 5, 6, 7],
            offsets: vec![Vector3::new(0.0, 0.0, 0.5); 4],
        };
        levels.apply_deformation(0, &top).unwrap();
        assert_eq!(levels.state(2).unwrap(), crate::levels::LevelState::Dirty);

        // Target measured on the up-to-date level 2
        let mut fresh = levels.clone();
        fresh.request_level(2, &Progress::none()).unwrap();
        let target = target_at_vertex(fresh.surface(2).unwrap(), 0, Vector3::new(0.0, 0.0, 0.1));

        let options = DeformOptions::default().with_laplacian_weight(0.0).with_effect_levels(1);
        deform(&mut levels, 2, &[target], &options, &Progress::none()).unwrap();

        let after = *levels.surface(2).unwrap().vertex_position(0);
        assert!((after - target.target).norm() < 1e-9, "vertex 0 ended at {}", after);
        assert_eq!(levels.state(2).unwrap(), crate::levels::LevelState::Clean);
    }

    #[test]
    fn test_smoothing_pulls_partway() {
        let surface = SurfaceMesh::new(primitives::quad_grid(6, 6, 1.0).unwrap());
        // Lift three vertices in the middle of the 7x7 lattice
        let targets: Vec<TargetPoint> = [23, 24, 25]
            .iter()
            .map(|&v| target_at_vertex(&surface, v, Vector3::new(0.0, 0.0, 1.0)))
            .collect();
        let weights = calc_vertex_to_point_contribution(&surface, &targets).unwrap();
        let options = DeformOptions::default().with_laplacian_weight(0.5).with_laplacian_distance(1);
        let d = solve_displacement(&surface, &weights, &targets, &options).unwrap();

        // Flat grid: the solve only trades fit against smoothness, so every
        // lifted vertex rises but not all the way.
        for (_, offset) in d.iter() {
            assert!(offset.x.abs() < 1e-9 && offset.y.abs() < 1e-9);
        }
        for (v, offset) in d.iter() {
            if [23, 24, 25].contains(&v) {
                assert!(offset.z > 0.0 && offset.z < 1.0, "vertex {} moved {}", v, offset.z);
            }
        }
    }

    #[test]
    fn test_invalid_requests() {
        let mut levels = LevelStack::new(primitives::cube(2.0).unwrap(), SubdivideOptions::default());
        let target = target_at_vertex(levels.surface(0).unwrap(), 0, Vector3::zeros());

        // Effect levels beyond what lies below level 0
        let options = DeformOptions::default().with_effect_levels(1);
        assert!(matches!(
            deform(&mut levels, 0, &[target], &options, &Progress::none()),
            Err(MeshError::LevelOutOfRange { requested: 1, available: 0 })
        ));

        // Level not generated yet
        assert!(matches!(
            deform(&mut levels, 3, &[target], &options, &Progress::none()),
            Err(MeshError::LevelOutOfRange { requested: 3, .. })
        ));

        let options = DeformOptions::default().with_effect_levels(0);
        assert!(matches!(
            deform(&mut levels, 0, &[], &options, &Progress::none()),
            Err(MeshError::EmptySystem)
        ));

        let bad = DeformOptions {
            laplacian_weight: 2.0,
            ..DeformOptions::default()
        };
        assert!(solve_displacement(levels.surface(0).unwrap(), &[], &[target], &bad).is_err());
    }
}
