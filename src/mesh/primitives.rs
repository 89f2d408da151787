//! Procedural base meshes.

use std::collections::HashMap;

use nalgebra::Point3;

use super::builder::build_from_polygons;
use super::halfedge::HalfEdgeMesh;
use crate::error::{MeshError, Result};

/// An axis-aligned cube of edge length `size` centred at the origin.
///
/// 8 vertices and 6 outward-facing quads.
pub fn cube(size: f64) -> Result<HalfEdgeMesh> {
    if !(size > 0.0) {
        return Err(MeshError::invalid_param("size", size, "must be positive"));
    }
    let h = size * 0.5;
    let vertices = vec![
        Point3::new(-h, -h, -h), // 0
        Point3::new(h, -h, -h),  // 1
        Point3::new(h, h, -h),   // 2
        Point3::new(-h, h, -h),  // 3
        Point3::new(-h, -h, h),  // 4
        Point3::new(h, -h, h),   // 5
        Point3::new(h, h, h),    // 6
        Point3::new(-h, h, h),   // 7
    ];
    let faces = vec![
        vec![0, 3, 2, 1], // -z
        vec![4, 5, 6, 7], // +z
        vec![0, 1, 5, 4], // -y
        vec![2, 3, 7, 6], // +y
        vec![0, 4, 7, 3], // -x
        vec![1, 2, 6, 5], // +x
    ];
    build_from_polygons(&vertices, &faces)
}

/// A cube of edge length `size` centred at the origin whose sides are each
/// split into a `segments` by `segments` grid of quads.
///
/// Shared edges and corners are welded, so the result is closed with
/// `6 * segments^2 + 2` vertices.
pub fn cube_grid(size: f64, segments: usize) -> Result<HalfEdgeMesh> {
    if !(size > 0.0) {
        return Err(MeshError::invalid_param("size", size, "must be positive"));
    }
    if segments == 0 {
        return Err(MeshError::invalid_param("segments", segments, "must be at least 1"));
    }

    // (fixed axis, fixed at max?, u axis, v axis) with u x v pointing outwards
    const SIDES: [(usize, bool, usize, usize); 6] = [
        (0, true, 1, 2),
        (0, false, 2, 1),
        (1, true, 2, 0),
        (1, false, 0, 2),
        (2, true, 0, 1),
        (2, false, 1, 0),
    ];

    let n = segments;
    let mut lookup: HashMap<[usize; 3], usize> = HashMap::new();
    let mut vertices: Vec<Point3<f64>> = Vec::with_capacity(6 * n * n + 2);
    let mut vertex_at = |lattice: [usize; 3]| -> usize {
        *lookup.entry(lattice).or_insert_with(|| {
            let coord = |k: usize| (lattice[k] as f64 / n as f64 - 0.5) * size;
            vertices.push(Point3::new(coord(0), coord(1), coord(2)));
            vertices.len() - 1
        })
    };

    let mut faces: Vec<Vec<usize>> = Vec::with_capacity(6 * n * n);
    for &(axis, at_max, u, v) in &SIDES {
        let corner = |a: usize, b: usize| {
            let mut lattice = [0usize; 3];
            lattice[axis] = if at_max { n } else { 0 };
            lattice[u] = a;
            lattice[v] = b;
            lattice
        };
        for b in 0..n {
            for a in 0..n {
                faces.push(vec![
                    vertex_at(corner(a, b)),
                    vertex_at(corner(a + 1, b)),
                    vertex_at(corner(a + 1, b + 1)),
                    vertex_at(corner(a, b + 1)),
                ]);
            }
        }
    }

    build_from_polygons(&vertices, &faces)
}

/// A flat `nx` by `ny` grid of quads in the z = 0 plane, facing +z.
///
/// The grid spans `[0, nx * spacing] x [0, ny * spacing]`.
pub fn quad_grid(nx: usize, ny: usize, spacing: f64) -> Result<HalfEdgeMesh> {
    if nx == 0 || ny == 0 {
        return Err(MeshError::EmptyMesh);
    }
    if !(spacing > 0.0) {
        return Err(MeshError::invalid_param("spacing", spacing, "must be positive"));
    }

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point3::new(i as f64 * spacing, j as f64 * spacing, 0.0));
        }
    }

    let mut faces = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let v00 = j * (nx + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + nx + 1;
            let v11 = v01 + 1;
            faces.push(vec![v00, v10, v11, v01]);
        }
    }

    build_from_polygons(&vertices, &faces)
}
