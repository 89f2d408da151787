//! Benchmarks for subdivision, collision and deformation.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{Point3, Vector3};
use subdiv_curtain::algo::deform::TargetPoint;
use subdiv_curtain::prelude::*;

fn bench_subdivision(c: &mut Criterion) {
    let cube = primitives::cube_grid(2.0, 8).unwrap();

    c.bench_function("catmull_clark_cube_grid_8", |b| {
        let options = SubdivideOptions::default();
        b.iter(|| catmull_clark_subdivide(&cube, &options).unwrap());
    });

    c.bench_function("catmull_clark_cube_grid_8_sequential", |b| {
        let options = SubdivideOptions::default().sequential();
        b.iter(|| catmull_clark_subdivide(&cube, &options).unwrap());
    });
}

fn bench_collision(c: &mut Criterion) {
    let mut levels = LevelStack::new(primitives::cube_grid(2.0, 8).unwrap(), SubdivideOptions::default());
    let surface = levels.request_level(2, &Progress::none()).unwrap().clone();
    let triangles = surface.local_collision_triangles();

    c.bench_function("continuous_collision_level_2", |b| {
        let from = Point3::new(0.13, 0.07, 5.0);
        let to = Point3::new(0.13, 0.07, -5.0);
        b.iter(|| continuous_collision(triangles, &from, &to, false));
    });

    c.bench_function("collision_triangles_transformed", |b| {
        let model = nalgebra::Matrix4::new_translation(&Vector3::new(0.0, 0.0, 1.0));
        b.iter(|| surface.collision_triangles(&model));
    });
}

fn bench_deform(c: &mut Criterion) {
    let mut base = LevelStack::new(primitives::cube_grid(2.0, 8).unwrap(), SubdivideOptions::default());
    base.request_level(2, &Progress::none()).unwrap();

    let surface = base.surface(2).unwrap();
    let targets: Vec<TargetPoint> = (0..5)
        .filter_map(|i| {
            let x = -0.23 + 0.1 * i as f64;
            let from = Point3::new(x, 0.04, 5.0);
            let hit = continuous_collision(surface.local_collision_triangles(), &from, &Point3::new(x, 0.04, -5.0), false)?;
            Some(TargetPoint {
                target: hit.position + Vector3::new(0.0, 0.0, 0.15),
                projected: hit.position,
                triangle: hit.triangle,
            })
        })
        .collect();

    c.bench_function("deform_level_2_one_effect_level", |b| {
        let options = DeformOptions::default();
        b.iter(|| {
            let mut levels = base.clone();
            deform(&mut levels, 2, &targets, &options, &Progress::none()).unwrap()
        });
    });
}

criterion_group!(benches, bench_subdivision, bench_collision, bench_deform);
criterion_main!(benches);
