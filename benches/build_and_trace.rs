use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use minibvh::{
    BuildSettings, Scene, TlasBuildPolicy, TlasStack,
    geometry::{HitRecord, Ray, Triangle, WorldPoint, WorldTransform, WorldTriangle, WorldVector},
};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng, rngs::SmallRng};

const POLICIES: [TlasBuildPolicy; 3] = [
    TlasBuildPolicy::Agglomerative,
    TlasBuildPolicy::Quick,
    TlasBuildPolicy::Clustered,
];

fn random_point(rng: &mut SmallRng, half_size: f32) -> WorldPoint {
    WorldPoint::new(
        rng.random_range(-half_size..half_size),
        rng.random_range(-half_size..half_size),
        rng.random_range(-half_size..half_size),
    )
}

fn random_triangles(rng: &mut SmallRng, count: usize) -> Vec<WorldTriangle> {
    (0..count)
        .map(|_| {
            let a = random_point(rng, 1.0);
            Triangle::new(
                a,
                a + random_point(rng, 0.05).coords,
                a + random_point(rng, 0.05).coords,
            )
        })
        .collect()
}

fn random_scene(instance_count: usize) -> Scene {
    let mut rng = SmallRng::seed_from_u64(1234);
    let mut scene = Scene::new(BuildSettings::default());
    let mesh = scene.add_mesh(random_triangles(&mut rng, 1000)).unwrap();
    for _ in 0..instance_count {
        let offset: Vector3<f32> = random_point(&mut rng, 100.0).coords;
        scene
            .add_instance(mesh, WorldTransform::new_translation(&offset))
            .unwrap();
    }
    scene
}

fn blas_build(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(5678);
    let mut group = c.benchmark_group("blas_build");
    for count in [1_000, 10_000, 100_000] {
        let triangles = random_triangles(&mut rng, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &triangles, |b, t| {
            b.iter(|| minibvh::scene::blas::Blas::build(t).unwrap())
        });
    }
    group.finish();
}

fn tlas_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tlas_build");
    for instance_count in [100, 1000] {
        let mut scene = random_scene(instance_count);
        for policy in POLICIES {
            group.bench_function(BenchmarkId::new(format!("{policy:?}"), instance_count), |b| {
                b.iter(|| scene.rebuild_with(policy).unwrap())
            });
        }
    }
    group.finish();
}

fn trace(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(9012);
    let rays: Vec<_> = (0..10_000)
        .map(|_| {
            let direction = random_point(&mut rng, 1.0).coords + WorldVector::new(0.0, 0.0, 2.0);
            Ray::new(random_point(&mut rng, 100.0) - WorldVector::new(0.0, 0.0, 150.0), direction)
        })
        .collect();

    let mut group = c.benchmark_group("trace_10k_rays");
    let mut scene = random_scene(1000);
    for policy in POLICIES {
        scene.rebuild_with(policy).unwrap();
        let mut stack = TlasStack::default();
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter(|| {
                rays.iter()
                    .filter(|ray| {
                        let mut hit = HitRecord::default();
                        scene.intersect(ray, &mut hit, &mut stack)
                    })
                    .count()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, blas_build, tlas_build, trace);
criterion_main!(benches);
