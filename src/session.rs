//! Interactive editing session.
//!
//! A [`Session`] owns the level stack, the curtain and the stroke being
//! painted. The host application turns its input into [`Intent`]s and feeds
//! them to [`Session::dispatch`] one at a time, between frames.
//!
//! Editing takes two strokes:
//!
//! 1. A stroke painted on the surface is resampled and becomes a
//!    [`Curtain`] standing on the surface.
//! 2. A stroke painted on the curtain is resampled, each sample is dropped
//!    onto the surface along the curtain direction, and the surface is
//!    deformed so that it passes through the samples.
//!
//! Gestures that cannot produce an edit (a ray that misses, a stroke that is
//! too short) are logged and reported as [`Outcome::Ignored`]; they are not
//! errors.

use std::fmt;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::algo::deform::{deform, DeformOptions, DeformReport, TargetPoint};
use crate::algo::subdivide::SubdivideOptions;
use crate::algo::Progress;
use crate::collision::{continuous_collision, CollisionTriangle, RayHit};
use crate::curtain::{clamp_height, Curtain};
use crate::curve::uniform_sample;
use crate::error::{MeshError, Result};
use crate::levels::LevelStack;
use crate::mesh::{HalfEdgeMesh, SurfaceMesh};
use crate::view::{submit, BufferDirty, DrawInstance, LightParams, MeshBuffers, Ray, RenderSink};

/// Smallest resampling step.
pub const MIN_DELTA_S: f64 = 1e-4;

/// Live-tunable session parameters.
///
/// Setters clamp out-of-range values instead of rejecting them.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Extrusion height of new curtains.
    pub curtain_height: f64,
    /// Arc-length step used when resampling strokes.
    pub delta_s: f64,
    /// Rings around the moved vertices that take part in smoothing.
    pub laplacian_distance: usize,
    /// Weight of the smoothing term, in `[0, 1]`.
    pub laplacian_weight: f64,
    /// How many levels below the current one an edit moves.
    pub effect_levels: usize,
    /// Length of pick and projection rays.
    pub ray_length: f64,
    /// Use multiple threads where available.
    pub parallel: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            curtain_height: 1.0,
            delta_s: 0.05,
            laplacian_distance: 2,
            laplacian_weight: 0.9,
            effect_levels: 1,
            ray_length: 100.0,
            parallel: true,
        }
    }
}

fn clamp_logged(name: &str, value: f64, lo: f64, hi: f64) -> f64 {
    let clamped = if value.is_nan() { lo } else { value.clamp(lo, hi) };
    if clamped != value {
        log::debug!("{} {} clamped to {}", name, value, clamped);
    }
    clamped
}

impl SessionConfig {
    /// Set the curtain height, clamped to `[0.01, 10]`.
    pub fn set_curtain_height(&mut self, height: f64) {
        self.curtain_height = clamp_height(height);
    }

    /// Set the resampling step, at least [`MIN_DELTA_S`].
    pub fn set_delta_s(&mut self, delta_s: f64) {
        self.delta_s = clamp_logged("delta_s", delta_s, MIN_DELTA_S, f64::MAX);
    }

    /// Set the Laplacian ring distance, at least one.
    pub fn set_laplacian_distance(&mut self, distance: usize) {
        self.laplacian_distance = distance.max(1);
    }

    /// Set the Laplacian weight, clamped to `[0, 1]`.
    pub fn set_laplacian_weight(&mut self, weight: f64) {
        self.laplacian_weight = clamp_logged("laplacian_weight", weight, 0.0, 1.0);
    }

    /// Set how many levels below the edited one move, at least one.
    pub fn set_effect_levels(&mut self, levels: usize) {
        self.effect_levels = levels.max(1);
    }

    /// Set how far raycasts and projections reach.
    pub fn set_ray_length(&mut self, length: f64) {
        self.ray_length = clamp_logged("ray_length", length, 1e-6, f64::MAX);
    }

    /// Set the curtain height (clamped to `[0.01, 10]`).
    pub fn with_curtain_height(mut self, height: f64) -> Self {
        self.set_curtain_height(height);
        self
    }

    /// Set the resampling step (at least `MIN_DELTA_S`).
    pub fn with_delta_s(mut self, delta_s: f64) -> Self {
        self.set_delta_s(delta_s);
        self
    }

    /// Set the smoothing ring distance (at least 1).
    pub fn with_laplacian_distance(mut self, distance: usize) -> Self {
        self.set_laplacian_distance(distance);
        self
    }

    /// Set the smoothing weight (clamped to `[0, 1]`).
    pub fn with_laplacian_weight(mut self, weight: f64) -> Self {
        self.set_laplacian_weight(weight);
        self
    }

    /// Set the number of effect levels (at least 1).
    pub fn with_effect_levels(mut self, levels: usize) -> Self {
        self.set_effect_levels(levels);
        self
    }

    /// Set the pick ray length.
    pub fn with_ray_length(mut self, length: f64) -> Self {
        self.set_ray_length(length);
        self
    }

    /// Enable or disable parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Solver options for an edit on `level`.
    ///
    /// The effect levels are capped at `level`, so a base-level edit moves
    /// the base vertices directly.
    pub fn deform_options(&self, level: usize) -> DeformOptions {
        let effect_levels = self.effect_levels.min(level);
        if effect_levels != self.effect_levels {
            log::debug!(
                "effect levels {} capped to {} on level {}",
                self.effect_levels,
                effect_levels,
                level
            );
        }
        DeformOptions::default()
            .with_laplacian_weight(self.laplacian_weight)
            .with_laplacian_distance(self.laplacian_distance)
            .with_effect_levels(effect_levels)
    }
}

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Show (generating if needed) a subdivision level.
    SubdivisionLevelChanged(usize),
    /// Start painting. Paints on the curtain if there is one, otherwise on
    /// the surface.
    StrokeBegan,
    /// Cast a world-space ray and add the hit to the current stroke.
    RaycastRequested {
        /// Ray start in world space.
        origin: Point3<f64>,
        /// Ray direction in world space; need not be normalised.
        direction: Vector3<f64>,
    },
    /// Finish the current stroke.
    StrokeEnded,
    /// Remove the curtain.
    CurtainCleared,
    /// New curtain height. Rebuilds the current curtain.
    CurtainHeightChanged(f64),
    /// New arc-length resampling step.
    DeltaSChanged(f64),
    /// New Laplacian ring distance.
    LaplacianDistanceChanged(usize),
    /// New Laplacian weight.
    LaplacianWeightChanged(f64),
    /// New number of levels a deformation reaches down.
    EffectLevelsChanged(usize),
    /// Drop every edit and rebuild from the base mesh.
    Reset,
}

impl Intent {
    /// A raycast along a picking ray.
    pub fn raycast(ray: Ray) -> Self {
        Self::RaycastRequested {
            origin: ray.origin,
            direction: ray.direction,
        }
    }
}

/// Why a gesture produced no change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A raycast arrived while no stroke was in progress.
    NoStroke,
    /// The ray direction had zero length.
    DegenerateRay,
    /// The ray hit nothing paintable.
    Miss,
    /// The stroke resampled to fewer than two points.
    TooFewPoints,
    /// Fewer than two curtain samples landed on the surface.
    TooFewProjected,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IgnoreReason::NoStroke => "no stroke in progress",
            IgnoreReason::DegenerateRay => "ray has no direction",
            IgnoreReason::Miss => "ray missed",
            IgnoreReason::TooFewPoints => "stroke too short",
            IgnoreReason::TooFewProjected => "too few points landed on the surface",
        };
        f.write_str(text)
    }
}

/// What [`Session::dispatch`] did.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The requested level is generated and shown.
    LevelReady {
        /// Level now shown.
        level: usize,
        /// Its vertex count.
        vertices: usize,
        /// Its face count.
        faces: usize,
    },
    /// A stroke began.
    StrokeStarted {
        /// Whether it paints on the curtain rather than the surface.
        on_curtain: bool,
    },
    /// A hit was added to the stroke, in mesh coordinates.
    PointAdded {
        /// The hit.
        position: Point3<f64>,
        /// Points in the stroke so far.
        count: usize,
    },
    /// A surface stroke became the curtain.
    CurtainBuilt {
        /// Resampled points the curtain stands on.
        points: usize,
    },
    /// A curtain stroke deformed the surface.
    Deformed(DeformReport),
    /// The curtain was removed.
    CurtainCleared,
    /// A knob changed.
    ConfigUpdated,
    /// All edits were dropped.
    Reset,
    /// The gesture changed nothing.
    Ignored(IgnoreReason),
}

/// Colours and light used by [`Session::render`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    /// Fill colour of the surface.
    pub surface_color: [f32; 4],
    /// Edge colour of the surface, if edges are drawn.
    pub surface_wireframe: Option<[f32; 4]>,
    /// Fill colour of the curtain.
    pub curtain_color: [f32; 4],
    /// Edge colour of the curtain, if edges are drawn.
    pub curtain_wireframe: Option<[f32; 4]>,
    /// Light shared by both.
    pub light: LightParams,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            surface_color: [0.7, 0.7, 0.75, 1.0],
            surface_wireframe: Some([0.1, 0.1, 0.1, 1.0]),
            curtain_color: [0.9, 0.4, 0.2, 0.5],
            curtain_wireframe: Some([0.0, 0.0, 0.0, 1.0]),
            light: LightParams::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Polyline {
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
}

#[derive(Debug, Clone, Default)]
enum Stroke {
    #[default]
    Idle,
    Surface(Polyline),
    Curtain(Polyline),
}

/// One mesh being edited.
#[derive(Debug)]
pub struct Session {
    base: HalfEdgeMesh,
    levels: LevelStack,
    level: usize,
    config: SessionConfig,
    model: Matrix4<f64>,
    inverse_model: Matrix4<f64>,
    curtain: Option<Curtain>,
    stroke: Stroke,
    surface_dirty: BufferDirty,
    progress: Progress,
}

impl Session {
    /// Start editing `base` at level 0.
    pub fn new(base: HalfEdgeMesh, config: SessionConfig) -> Self {
        let options = SubdivideOptions::default().with_parallel(config.parallel);
        let levels = LevelStack::new(base.clone(), options);
        Self {
            base,
            levels,
            level: 0,
            config,
            model: Matrix4::identity(),
            inverse_model: Matrix4::identity(),
            curtain: None,
            stroke: Stroke::Idle,
            surface_dirty: BufferDirty::default(),
            progress: Progress::logging(),
        }
    }

    /// Replace the progress reporter used when generating levels.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Current knob values.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The level being shown and edited.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Every cached level.
    pub fn levels(&self) -> &LevelStack {
        &self.levels
    }

    /// Mesh of the current level.
    pub fn surface(&self) -> Result<&SurfaceMesh> {
        self.levels.surface(self.level)
    }

    /// The curtain, if one has been built.
    pub fn curtain(&self) -> Option<&Curtain> {
        self.curtain.as_ref()
    }

    /// True between [`Intent::StrokeBegan`] and [`Intent::StrokeEnded`].
    pub fn is_stroking(&self) -> bool {
        !matches!(self.stroke, Stroke::Idle)
    }

    /// Mesh to world transform.
    pub fn model(&self) -> &Matrix4<f64> {
        &self.model
    }

    /// Place the mesh in the world. Ray hits are mapped back through the
    /// inverse.
    ///
    /// # Errors
    /// An invalid-parameter error if `model` is not invertible.
    pub fn set_model(&mut self, model: Matrix4<f64>) -> Result<()> {
        let inverse = model
            .try_inverse()
            .ok_or_else(|| MeshError::invalid_param("model", "singular matrix", "must be invertible"))?;
        self.model = model;
        self.inverse_model = inverse;
        Ok(())
    }

    /// Handle one intent.
    ///
    /// # Errors
    /// Only broken invariants (for example a contribution lookup miss) are
    /// errors; gestures that cannot apply return [`Outcome::Ignored`].
    pub fn dispatch(&mut self, intent: Intent) -> Result<Outcome> {
        match intent {
            Intent::SubdivisionLevelChanged(level) => self.change_level(level),
            Intent::StrokeBegan => {
                let on_curtain = self.curtain.is_some();
                self.stroke = if on_curtain {
                    Stroke::Curtain(Polyline::default())
                } else {
                    Stroke::Surface(Polyline::default())
                };
                Ok(Outcome::StrokeStarted { on_curtain })
            }
            Intent::RaycastRequested { origin, direction } => self.raycast(origin, direction),
            Intent::StrokeEnded => self.end_stroke(),
            Intent::CurtainCleared => {
                self.curtain = None;
                self.stroke = Stroke::Idle;
                Ok(Outcome::CurtainCleared)
            }
            Intent::CurtainHeightChanged(height) => {
                self.config.set_curtain_height(height);
                if let Some(curtain) = &mut self.curtain {
                    curtain.set_height(self.config.curtain_height);
                }
                Ok(Outcome::ConfigUpdated)
            }
            Intent::DeltaSChanged(delta_s) => {
                self.config.set_delta_s(delta_s);
                Ok(Outcome::ConfigUpdated)
            }
            Intent::LaplacianDistanceChanged(distance) => {
                self.config.set_laplacian_distance(distance);
                Ok(Outcome::ConfigUpdated)
            }
            Intent::LaplacianWeightChanged(weight) => {
                self.config.set_laplacian_weight(weight);
                Ok(Outcome::ConfigUpdated)
            }
            Intent::EffectLevelsChanged(levels) => {
                self.config.set_effect_levels(levels);
                Ok(Outcome::ConfigUpdated)
            }
            Intent::Reset => {
                self.levels.reset(self.base.clone(), &self.progress)?;
                self.curtain = None;
                self.stroke = Stroke::Idle;
                self.surface_dirty.mark();
                Ok(Outcome::Reset)
            }
        }
    }

    /// Submit the surface and the curtain to a renderer.
    pub fn render(&mut self, sink: &mut dyn RenderSink, style: &RenderStyle) -> Result<()> {
        let surface = self.levels.surface(self.level)?;
        let mut instance = DrawInstance::new(self.model, style.surface_color).with_light(style.light);
        instance.wireframe_color = style.surface_wireframe;
        let buffers = MeshBuffers::new(surface.render_vertices(), surface.indices());
        submit(sink, &mut self.surface_dirty, &buffers, &[instance]);

        if let Some(curtain) = &mut self.curtain {
            let mut instance = DrawInstance::new(self.model, style.curtain_color).with_light(style.light);
            instance.wireframe_color = style.curtain_wireframe;
            curtain.render(sink, &instance);
        }
        Ok(())
    }

    fn change_level(&mut self, level: usize) -> Result<Outcome> {
        let surface = self.levels.request_level(level, &self.progress)?;
        let outcome = Outcome::LevelReady {
            level,
            vertices: surface.num_vertices(),
            faces: surface.num_faces(),
        };
        log::info!(
            "showing level {}: {} vertices, {} faces",
            level,
            surface.num_vertices(),
            surface.num_faces()
        );
        self.level = level;
        self.surface_dirty.mark();
        Ok(outcome)
    }

    fn raycast(&mut self, origin: Point3<f64>, direction: Vector3<f64>) -> Result<Outcome> {
        if !self.is_stroking() {
            return Ok(ignored(IgnoreReason::NoStroke));
        }
        let Some(direction) = direction.try_normalize(0.0) else {
            return Ok(ignored(IgnoreReason::DegenerateRay));
        };
        let end = origin + direction * self.config.ray_length;

        let hit = match &self.stroke {
            Stroke::Surface(_) => {
                let surface = self.levels.surface(self.level)?;
                let triangles = surface.collision_triangles(&self.model);
                continuous_collision(&triangles, &origin, &end, false).map(|hit| {
                    let position = self.inverse_model.transform_point(&hit.position);
                    (position, *surface.triangle_normal(hit.triangle))
                })
            }
            Stroke::Curtain(_) => self.curtain.as_ref().and_then(|curtain| {
                let triangles: Vec<CollisionTriangle> = curtain
                    .collision_triangles()
                    .iter()
                    .map(|t| t.transformed(&self.model))
                    .collect();
                let hit = continuous_collision(&triangles, &origin, &end, true)?;
                let position = self.inverse_model.transform_point(&hit.position);
                curtain
                    .direction_at(hit.triangle, &position)
                    .map(|normal| (position, normal))
            }),
            Stroke::Idle => None,
        };

        let Some((position, normal)) = hit else {
            return Ok(ignored(IgnoreReason::Miss));
        };
        let polyline = match &mut self.stroke {
            Stroke::Surface(polyline) | Stroke::Curtain(polyline) => polyline,
            Stroke::Idle => return Ok(ignored(IgnoreReason::NoStroke)),
        };
        polyline.points.push(position);
        polyline.normals.push(normal);
        Ok(Outcome::PointAdded {
            position,
            count: polyline.points.len(),
        })
    }

    fn end_stroke(&mut self) -> Result<Outcome> {
        match std::mem::take(&mut self.stroke) {
            Stroke::Idle => Ok(ignored(IgnoreReason::NoStroke)),
            Stroke::Surface(polyline) => {
                let Some((points, normals)) = self.resample(&polyline)? else {
                    return Ok(ignored(IgnoreReason::TooFewPoints));
                };
                let count = points.len();
                self.curtain = Some(Curtain::new(points, normals, self.config.curtain_height)?);
                log::info!("curtain built from {} points", count);
                Ok(Outcome::CurtainBuilt { points: count })
            }
            Stroke::Curtain(polyline) => {
                let Some((points, normals)) = self.resample(&polyline)? else {
                    return Ok(ignored(IgnoreReason::TooFewPoints));
                };
                let surface = self.levels.surface(self.level)?;
                let targets = project_targets(
                    surface.local_collision_triangles(),
                    &points,
                    &normals,
                    self.config.ray_length,
                );
                if targets.len() < 2 {
                    return Ok(ignored(IgnoreReason::TooFewProjected));
                }

                let options = self.config.deform_options(self.level);
                let report = deform(&mut self.levels, self.level, &targets, &options, &self.progress)?;
                self.surface_dirty.mark();
                Ok(Outcome::Deformed(report))
            }
        }
    }

    fn resample(&self, polyline: &Polyline) -> Result<Option<(Vec<Point3<f64>>, Vec<Vector3<f64>>)>> {
        if polyline.points.len() < 2 {
            return Ok(None);
        }
        let (points, normals) = uniform_sample(&polyline.points, &polyline.normals, self.config.delta_s)?;
        if points.len() < 2 {
            return Ok(None);
        }
        Ok(Some((points, normals)))
    }
}

fn ignored(reason: IgnoreReason) -> Outcome {
    log::warn!("gesture ignored: {}", reason);
    Outcome::Ignored(reason)
}

/// Drop each point onto the surface against its direction, falling back to
/// a sweep along it (from below the surface) when that misses.
///
/// Points that land nowhere are skipped.
pub fn project_targets(
    triangles: &[CollisionTriangle],
    points: &[Point3<f64>],
    directions: &[Vector3<f64>],
    ray_length: f64,
) -> Vec<TargetPoint> {
    points
        .iter()
        .zip(directions)
        .filter_map(|(p, n)| {
            let hit: RayHit = continuous_collision(triangles, p, &(p - n * ray_length), false)
                .or_else(|| continuous_collision(triangles, p, &(p + n * ray_length), true))?;
            Some(TargetPoint {
                target: *p,
                projected: hit.position,
                triangle: hit.triangle,
            })
        })
        .collect()
}
