//! Orbit camera and pixel-to-ray unprojection.

use std::f64::consts::PI;

use nalgebra::{Matrix4, Point3, Point4, Vector3};

/// A half-line in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point, on the near clip plane.
    pub origin: Point3<f64>,
    /// Unit direction.
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

/// Orbit camera that rotates around a target point.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Target point to orbit around.
    pub target: Point3<f64>,
    /// Distance from target.
    pub distance: f64,
    /// Horizontal angle (radians).
    pub azimuth: f64,
    /// Vertical angle (radians), clamped short of the poles.
    pub elevation: f64,
    /// Vertical field of view in radians.
    pub fov: f64,
    /// Near clip plane.
    pub near: f64,
    /// Far clip plane.
    pub far: f64,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            distance: 3.0,
            azimuth: 0.0,
            elevation: 0.3,
            fov: PI / 4.0,
            near: 0.01,
            far: 100.0,
        }
    }
}

impl OrbitCamera {
    /// Create a camera looking at `target` from `distance` away.
    pub fn new(target: Point3<f64>, distance: f64) -> Self {
        Self {
            target,
            distance,
            ..Default::default()
        }
    }

    /// The camera's eye position in world space.
    pub fn eye_position(&self) -> Point3<f64> {
        let (sin_elev, cos_elev) = self.elevation.sin_cos();
        let (sin_azim, cos_azim) = self.azimuth.sin_cos();
        self.target
            + Vector3::new(
                self.distance * cos_elev * sin_azim,
                self.distance * sin_elev,
                self.distance * cos_elev * cos_azim,
            )
    }

    /// World to camera transform.
    pub fn view_matrix(&self) -> Matrix4<f64> {
        Matrix4::look_at_rh(&self.eye_position(), &self.target, &Vector3::y())
    }

    /// Perspective projection for a viewport of the given aspect ratio.
    pub fn projection_matrix(&self, aspect: f64) -> Matrix4<f64> {
        Matrix4::new_perspective(aspect, self.fov, self.near, self.far)
    }

    /// Combined projection * view.
    pub fn view_projection_matrix(&self, aspect: f64) -> Matrix4<f64> {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Rotate by the given deltas (radians).
    pub fn rotate(&mut self, delta_azimuth: f64, delta_elevation: f64) {
        self.azimuth += delta_azimuth;
        let limit = PI / 2.0 - 0.01;
        self.elevation = (self.elevation + delta_elevation).clamp(-limit, limit);
    }

    /// Scale the orbit distance.
    pub fn zoom(&mut self, factor: f64) {
        self.distance = (self.distance * factor).clamp(0.1, 100.0);
    }

    /// Re-centre on a new target.
    pub fn reset(&mut self, target: Point3<f64>, distance: f64) {
        self.target = target;
        self.distance = distance;
        self.azimuth = 0.0;
        self.elevation = 0.3;
    }

    /// Ray through a pixel of a `width x height` viewport.
    ///
    /// Pixel `(0, 0)` is the top-left corner.
    pub fn pixel_ray(&self, x: f64, y: f64, width: f64, height: f64) -> Option<Ray> {
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        unproject_ray(
            x,
            y,
            width,
            height,
            &self.view_matrix(),
            &self.projection_matrix(width / height),
        )
    }
}

/// Ray through a pixel, given the view and projection matrices.
///
/// Unprojects the pixel at the near and far clip planes (OpenGL depth range)
/// and returns the ray from the near point towards the far point. `None` if
/// the matrices are not invertible.
pub fn unproject_ray(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    view: &Matrix4<f64>,
    projection: &Matrix4<f64>,
) -> Option<Ray> {
    let inverse = (projection * view).try_inverse()?;
    let ndc_x = 2.0 * x / width - 1.0;
    let ndc_y = 1.0 - 2.0 * y / height;

    let unproject = |depth: f64| -> Option<Point3<f64>> {
        let p = inverse * Point4::new(ndc_x, ndc_y, depth, 1.0);
        if p.w.abs() < f64::EPSILON {
            return None;
        }
        Some(Point3::new(p.x / p.w, p.y / p.w, p.z / p.w))
    };

    let near = unproject(-1.0)?;
    let far = unproject(1.0)?;
    let direction = (far - near).try_normalize(0.0)?;
    Some(Ray {
        origin: near,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_position() {
        let mut camera = OrbitCamera::new(Point3::new(1.0, 0.0, 0.0), 2.0);
        camera.elevation = 0.0;
        assert!((camera.eye_position() - Point3::new(1.0, 0.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn test_centre_pixel_looks_at_target() {
        let camera = OrbitCamera::default();
        let ray = camera.pixel_ray(400.0, 300.0, 800.0, 600.0).unwrap();
        let expected = (camera.target - camera.eye_position()).normalize();
        assert!((ray.direction - expected).norm() < 1e-9);
        assert!((ray.origin - camera.eye_position()).norm() < camera.near * 1.01);
    }

    #[test]
    fn test_corner_pixels_diverge() {
        let mut camera = OrbitCamera::default();
        camera.elevation = 0.0;
        let left = camera.pixel_ray(0.0, 300.0, 800.0, 600.0).unwrap();
        let right = camera.pixel_ray(800.0, 300.0, 800.0, 600.0).unwrap();
        let top = camera.pixel_ray(400.0, 0.0, 800.0, 600.0).unwrap();
        assert!(left.direction.x < 0.0);
        assert!(right.direction.x > 0.0);
        assert!(top.direction.y > 0.0);
        assert!((left.direction.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_clamped() {
        let mut camera = OrbitCamera::default();
        camera.rotate(0.0, 10.0);
        assert!(camera.elevation < PI / 2.0);
        camera.zoom(1e6);
        assert_eq!(camera.distance, 100.0);
    }

    #[test]
    fn test_degenerate_viewport() {
        assert!(OrbitCamera::default().pixel_ray(0.0, 0.0, 0.0, 10.0).is_none());
        assert!(unproject_ray(0.0, 0.0, 1.0, 1.0, &Matrix4::zeros(), &Matrix4::identity()).is_none());
    }

    #[test]
    fn test_ray_at() {
        let ray = Ray {
            origin: Point3::origin(),
            direction: Vector3::x(),
        };
        assert_eq!(ray.at(2.0), Point3::new(2.0, 0.0, 0.0));
    }
}
