use std::{num::NonZeroUsize, thread, time::Instant};

use log::info;
use minibvh::{
    BuildSettings, Scene, TlasBuildPolicy, TlasStack,
    geometry::{HitRecord, Ray, Triangle, WorldPoint, WorldTransform, WorldTriangle, WorldVector},
    scene::TraversalStats,
};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng, rngs::SmallRng};

const MESH_COUNT: usize = 8;
const TRIANGLES_PER_MESH: usize = 2000;
const INSTANCE_COUNT: usize = 1000;
const SCENE_SIZE: f32 = 200.0;
const GRID_RESOLUTION: usize = 512;

fn random_unit(rng: &mut SmallRng) -> WorldVector {
    loop {
        let v = WorldVector::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        if let Some(v) = v.try_normalize(1e-3) {
            return v;
        }
    }
}

/// Triangles scattered over a unit sphere
fn random_blob(rng: &mut SmallRng, count: usize) -> Vec<WorldTriangle> {
    (0..count)
        .map(|_| {
            let center = WorldPoint::origin() + random_unit(rng);
            Triangle::new(
                center + 0.05 * random_unit(rng),
                center + 0.05 * random_unit(rng),
                center + 0.05 * random_unit(rng),
            )
        })
        .collect()
}

fn random_placement(rng: &mut SmallRng) -> WorldTransform {
    let half = SCENE_SIZE / 2.0;
    let offset = Vector3::new(
        rng.random_range(-half..half),
        rng.random_range(-half..half),
        rng.random_range(-half..half),
    );
    let rotation = Vector3::new(
        rng.random_range(-3.0..3.0),
        rng.random_range(-3.0..3.0),
        rng.random_range(-3.0..3.0),
    );
    WorldTransform::new_translation(&offset)
        * WorldTransform::new_rotation(rotation)
        * WorldTransform::new_scaling(rng.random_range(1.0..5.0))
}

struct TraceSummary {
    hits: usize,
    stats: TraversalStats,
}

/// Orthographic grid of rays along +z, rows split between worker threads.
fn trace_grid(scene: &Scene, workers: NonZeroUsize) -> TraceSummary {
    let rows_per_worker = GRID_RESOLUTION.div_ceil(workers.get());
    let step = SCENE_SIZE / GRID_RESOLUTION as f32;

    let trace_rows = |rows: std::ops::Range<usize>| {
        let mut stack = TlasStack::default();
        let mut summary = TraceSummary {
            hits: 0,
            stats: TraversalStats::default(),
        };
        for row in rows {
            for column in 0..GRID_RESOLUTION {
                let origin = WorldPoint::new(
                    (column as f32 + 0.5) * step - SCENE_SIZE / 2.0,
                    (row as f32 + 0.5) * step - SCENE_SIZE / 2.0,
                    -SCENE_SIZE,
                );
                let ray = Ray::new(origin, WorldVector::new(0.0, 0.0, 1.0));
                let mut hit = HitRecord::default();
                if scene.intersect_observed(&ray, &mut hit, &mut stack, &mut summary.stats) {
                    summary.hits += 1;
                }
            }
        }
        summary
    };

    thread::scope(|s| {
        let handles: Vec<_> = (0..GRID_RESOLUTION)
            .step_by(rows_per_worker)
            .map(|start| {
                let end = (start + rows_per_worker).min(GRID_RESOLUTION);
                s.spawn(move || trace_rows(start..end))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("Tracing thread panicked"))
            .fold(
                TraceSummary {
                    hits: 0,
                    stats: TraversalStats::default(),
                },
                |mut acc, summary| {
                    acc.hits += summary.hits;
                    acc.stats.inner_nodes += summary.stats.inner_nodes;
                    acc.stats.leaves += summary.stats.leaves;
                    acc.stats.primitive_tests += summary.stats.primitive_tests;
                    acc
                },
            )
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut rng = SmallRng::seed_from_u64(0x6276_6821);
    let mut scene = Scene::new(BuildSettings::default());

    let start = Instant::now();
    let meshes = (0..MESH_COUNT)
        .map(|_| scene.add_mesh(random_blob(&mut rng, TRIANGLES_PER_MESH)))
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        "Built {MESH_COUNT} meshes of {TRIANGLES_PER_MESH} triangles in {:?}",
        start.elapsed()
    );

    for _ in 0..INSTANCE_COUNT {
        let mesh = meshes[rng.random_range(0..meshes.len())];
        scene.add_instance(mesh, random_placement(&mut rng))?;
    }

    let workers = thread::available_parallelism()?;
    let ray_count = GRID_RESOLUTION * GRID_RESOLUTION;

    for policy in [
        TlasBuildPolicy::Agglomerative,
        TlasBuildPolicy::Quick,
        TlasBuildPolicy::Clustered,
    ] {
        let start = Instant::now();
        scene.rebuild_with(policy)?;
        info!(
            "{policy:?}: built TLAS over {INSTANCE_COUNT} instances in {:?} ({})",
            start.elapsed(),
            scene.tlas().statistics()
        );

        let start = Instant::now();
        let summary = trace_grid(&scene, workers);
        let elapsed = start.elapsed();
        info!(
            "{policy:?}: {ray_count} rays on {workers} threads in {elapsed:?}, {} hits, \
             {:.1} inner nodes / {:.1} leaves / {:.1} triangle tests per ray, {:.2} Mrays/s",
            summary.hits,
            summary.stats.inner_nodes as f64 / ray_count as f64,
            summary.stats.leaves as f64 / ray_count as f64,
            summary.stats.primitive_tests as f64 / ray_count as f64,
            ray_count as f64 / elapsed.as_secs_f64() / 1e6
        );
    }

    Ok(())
}
