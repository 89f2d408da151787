//! The cached stack of subdivision levels.
//!
//! Level 0 is the base mesh; level `k` is level `k - 1` refined once. Each
//! level keeps the [`ContributionMap`] from the step that produced it and a
//! record of the displacements applied directly to it, so that it can be
//! regenerated from the level below without losing edits.
//!
//! Every level is either [`LevelState::Clean`] or [`LevelState::Dirty`]. A
//! deformation marks all finer levels dirty; [`LevelStack::request_level`]
//! regenerates dirty levels on the way up to the requested one.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::algo::deform::Displacement;
use crate::algo::subdivide::{catmull_clark_subdivide, ContributionMap, SubdivideOptions};
use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, SurfaceMesh, VertexId};

/// Whether a cached level matches the levels below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelState {
    /// Up to date.
    Clean,
    /// A coarser level changed since this one was generated.
    Dirty,
}

/// One cached subdivision level.
#[derive(Debug, Clone)]
pub struct Level {
    surface: SurfaceMesh,
    contributions: Option<ContributionMap>,
    deformation: HashMap<usize, Vector3<f64>>,
    state: LevelState,
}

impl Level {
    fn new(surface: SurfaceMesh, contributions: Option<ContributionMap>) -> Self {
        Self {
            surface,
            contributions,
            deformation: HashMap::new(),
            state: LevelState::Clean,
        }
    }

    /// The level's mesh.
    pub fn surface(&self) -> &SurfaceMesh {
        &self.surface
    }

    /// Contributions from the level below, `None` for the base level.
    pub fn contributions(&self) -> Option<&ContributionMap> {
        self.contributions.as_ref()
    }

    /// Accumulated displacement per vertex applied at this level.
    pub fn deformation(&self) -> &HashMap<usize, Vector3<f64>> {
        &self.deformation
    }

    /// Current state.
    pub fn state(&self) -> LevelState {
        self.state
    }
}

/// The base mesh and every level generated from it so far.
#[derive(Debug, Clone)]
pub struct LevelStack {
    levels: Vec<Level>,
    options: SubdivideOptions,
}

impl LevelStack {
    /// Start a stack from a base mesh.
    pub fn new(base: HalfEdgeMesh, options: SubdivideOptions) -> Self {
        let surface = SurfaceMesh::new(base).with_parallel(options.parallel);
        Self {
            levels: vec![Level::new(surface, None)],
            options,
        }
    }

    /// Number of cached levels (at least one).
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false; the base level is never removed.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Options used when generating levels.
    pub fn options(&self) -> &SubdivideOptions {
        &self.options
    }

    /// A cached level.
    ///
    /// # Errors
    /// [`MeshError::LevelOutOfRange`] if it has not been generated.
    pub fn level(&self, level: usize) -> Result<&Level> {
        self.levels.get(level).ok_or(MeshError::LevelOutOfRange {
            requested: level,
            available: self.levels.len(),
        })
    }

    /// The mesh of a cached level.
    pub fn surface(&self, level: usize) -> Result<&SurfaceMesh> {
        self.level(level).map(Level::surface)
    }

    /// The contributions from `level - 1` to `level`.
    ///
    /// # Errors
    /// [`MeshError::LevelOutOfRange`] for level 0 or an uncached level.
    pub fn contributions(&self, level: usize) -> Result<&ContributionMap> {
        self.level(level)?
            .contributions()
            .ok_or(MeshError::LevelOutOfRange {
                requested: level,
                available: self.levels.len(),
            })
    }

    /// State of a cached level.
    pub fn state(&self, level: usize) -> Result<LevelState> {
        self.level(level).map(Level::state)
    }

    /// Make sure levels `0..=level` exist and are clean, generating or
    /// regenerating as needed.
    pub fn request_level(&mut self, level: usize, progress: &Progress) -> Result<&SurfaceMesh> {
        let work: Vec<usize> = (1..=level)
            .filter(|&k| k >= self.levels.len() || self.levels[k].state == LevelState::Dirty)
            .collect();

        for (step, &k) in work.iter().enumerate() {
            progress.report(step, work.len(), "subdividing");
            self.regenerate(k)?;
        }
        if !work.is_empty() {
            progress.report(work.len(), work.len(), "subdividing");
        }

        self.surface(level)
    }

    /// Rebuild level `k` from level `k - 1` and re-apply its own record.
    fn regenerate(&mut self, k: usize) -> Result<()> {
        let step = catmull_clark_subdivide(self.levels[k - 1].surface.mesh(), &self.options)?;
        let mut mesh = step.mesh;

        if k < self.levels.len() {
            for (&v, offset) in &self.levels[k].deformation {
                let id = VertexId::new(v);
                let p = *mesh.position(id) + offset;
                mesh.set_position(id, p);
            }
            let level = &mut self.levels[k];
            level.surface.replace(mesh);
            level.contributions = Some(step.contributions);
            level.state = LevelState::Clean;
            log::debug!(
                "regenerated level {} ({} recorded offsets)",
                k,
                level.deformation.len()
            );
        } else {
            let surface = SurfaceMesh::new(mesh).with_parallel(self.options.parallel);
            log::debug!(
                "generated level {}: {} vertices, {} faces",
                k,
                surface.num_vertices(),
                surface.num_faces()
            );
            self.levels.push(Level::new(surface, Some(step.contributions)));
        }
        Ok(())
    }

    /// Move vertices of `level`, add the offsets to its record and mark every
    /// finer level dirty.
    ///
    /// # Errors
    /// [`MeshError::LevelOutOfRange`] for an uncached level and
    /// [`MeshError::InvalidParameter`] for a vertex outside it.
    pub fn apply_deformation(&mut self, level: usize, displacement: &Displacement) -> Result<()> {
        let available = self.levels.len();
        let target = self.levels.get_mut(level).ok_or(MeshError::LevelOutOfRange {
            requested: level,
            available,
        })?;

        let num_vertices = target.surface.num_vertices();
        if let Some(&bad) = displacement.vertices.iter().find(|&&v| v >= num_vertices) {
            return Err(MeshError::invalid_param("vertex", bad, "outside the level"));
        }

        for (v, offset) in displacement.iter() {
            target.surface.translate_vertex(v, offset);
            *target.deformation.entry(v).or_insert_with(Vector3::zeros) += offset;
        }
        target.surface.update_geometry();

        for finer in &mut self.levels[level + 1..] {
            finer.state = LevelState::Dirty;
        }
        Ok(())
    }

    /// Drop all recorded deformation and rebuild every level from the
    /// original base positions.
    pub fn reset(&mut self, base: HalfEdgeMesh, progress: &Progress) -> Result<()> {
        let top = self.levels.len() - 1;
        *self = Self::new(base, self.options.clone());
        self.request_level(top, progress)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives;
    use nalgebra::Point3;

    fn stack() -> LevelStack {
        LevelStack::new(primitives::cube(2.0).unwrap(), SubdivideOptions::default())
    }

    fn lift(vertices: &[usize], dz: f64) -> Displacement {
        Displacement {
            vertices: vertices.to_vec(),
            offsets: vec![Vector3::new(0.0, 0.0, dz); vertices.len()],
        }
    }

    #[test]
    fn test_request_generates_levels() {
        let mut levels = stack();
        assert_eq!(levels.len(), 1);
        assert!(levels.contributions(0).is_err());

        let surface = levels.request_level(2, &Progress::none()).unwrap();
        assert_eq!(surface.num_faces(), 96);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels.surface(1).unwrap().num_vertices(), 26);
        assert!(levels.contributions(2).is_ok());
        assert_eq!(levels.state(2).unwrap(), LevelState::Clean);

        // Requesting a lower level keeps the cache
        levels.request_level(1, &Progress::none()).unwrap();
        assert_eq!(levels.len(), 3);
        assert!(levels.surface(3).is_err());
    }

    #[test]
    fn test_deformation_marks_finer_dirty() {
        let mut levels = stack();
        levels.request_level(2, &Progress::none()).unwrap();

        levels.apply_deformation(0, &lift(&[4, 5, 6, 7], 0.5)).unwrap();
        assert_eq!(levels.state(0).unwrap(), LevelState::Clean);
        assert_eq!(levels.state(1).unwrap(), LevelState::Dirty);
        assert_eq!(levels.state(2).unwrap(), LevelState::Dirty);
        assert_eq!(*levels.surface(0).unwrap().vertex_position(6), Point3::new(1.0, 1.0, 1.5));

        // Only level 1 is regenerated
        levels.request_level(1, &Progress::none()).unwrap();
        assert_eq!(levels.state(1).unwrap(), LevelState::Clean);
        assert_eq!(levels.state(2).unwrap(), LevelState::Dirty);

        // Face point of the lifted top face
        let fp = levels.surface(1).unwrap().vertex_position(9);
        assert!((fp - Point3::new(0.0, 0.0, 1.5)).norm() < 1e-12);
    }

    #[test]
    fn test_records_survive_regeneration() {
        let mut levels = stack();
        levels.request_level(1, &Progress::none()).unwrap();

        // Edit level 1 directly, then disturb level 0
        levels.apply_deformation(1, &lift(&[9], 0.25)).unwrap();
        levels.apply_deformation(1, &lift(&[9], 0.25)).unwrap();
        assert!((levels.level(1).unwrap().deformation()[&9].z - 0.5).abs() < 1e-12);

        levels.apply_deformation(0, &lift(&[0], -0.1)).unwrap();
        levels.request_level(1, &Progress::none()).unwrap();

        // The +z face point is untouched by vertex 0 and keeps its own offset
        let fp = levels.surface(1).unwrap().vertex_position(9);
        assert!((fp - Point3::new(0.0, 0.0, 1.5)).norm() < 1e-12);
    }

    #[test]
    fn test_progress_counts_regenerated_levels() {
        use std::sync::{Arc, Mutex};

        let mut levels = stack();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let progress = Progress::new(move |current, total, _| sink.lock().unwrap().push((current, total)));
        levels.request_level(2, &progress).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_bad_deformation() {
        let mut levels = stack();
        assert!(matches!(
            levels.apply_deformation(3, &lift(&[0], 1.0)),
            Err(MeshError::LevelOutOfRange { requested: 3, available: 1 })
        ));
        assert!(levels.apply_deformation(0, &lift(&[8], 1.0)).is_err());
        // Nothing moved
        assert!(levels.level(0).unwrap().deformation().is_empty());
    }

    #[test]
    fn test_reset() {
        let mut levels = stack();
        levels.request_level(1, &Progress::none()).unwrap();
        levels.apply_deformation(0, &lift(&[6], 1.0)).unwrap();
        levels.reset(primitives::cube(2.0).unwrap(), &Progress::none()).unwrap();
        assert_eq!(levels.len(), 2);
        assert!(levels.level(0).unwrap().deformation().is_empty());
        assert_eq!(*levels.surface(0).unwrap().vertex_position(6), Point3::new(1.0, 1.0, 1.0));
    }
}
