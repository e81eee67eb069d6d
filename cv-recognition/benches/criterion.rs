use criterion::{criterion_group, criterion_main, Criterion};
use cv_recognition::nalgebra::{IsometryMatrix3, Point3, Rotation3, Translation3, Vector3};
use cv_recognition::{ObjRecRansac, Octree, OrientedPoint, RecognitionSettings};
use rand::SeedableRng;
use rand_pcg::Pcg64;

fn surface() -> Vec<OrientedPoint> {
    (0..40)
        .flat_map(|i| (0..30).map(move |j| (i as f64 + 0.5, j as f64 + 0.5)))
        .map(|(x, y)| {
            let z = 4.0 * (0.2 * x).sin() + 3.0 * (0.25 * y).cos();
            let normal = Vector3::new(0.8 * (0.2 * x).cos(), -0.75 * (0.25 * y).sin(), -1.0);
            OrientedPoint::new(Point3::new(x, y, z), normal.normalize())
        })
        .collect()
}

fn scene() -> Vec<OrientedPoint> {
    let pose = IsometryMatrix3::from_parts(
        Translation3::new(50.0, 3.0, 10.0),
        Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7),
    );
    surface()
        .iter()
        .map(|p| OrientedPoint::new(pose * p.point, pose * p.normal))
        .collect()
}

fn build_octree(c: &mut Criterion) {
    let scene = scene();
    c.bench_function("build_octree", |b| b.iter(|| Octree::build(&scene, 1.0)));
}

fn add_model(c: &mut Criterion) {
    let model = surface();
    c.bench_function("add_model", |b| {
        b.iter(|| {
            let mut recognizer =
                ObjRecRansac::new(RecognitionSettings::new(8.0, 1.0), Pcg64::seed_from_u64(0))
                    .unwrap();
            recognizer.add_model("waves", &model, ()).unwrap();
        })
    });
}

fn recognize(c: &mut Criterion) {
    let scene = scene();
    let mut recognizer =
        ObjRecRansac::new(RecognitionSettings::new(8.0, 1.0), Pcg64::seed_from_u64(0)).unwrap();
    recognizer.add_model("waves", &surface(), ()).unwrap();
    c.bench_function("recognize", |b| b.iter(|| recognizer.recognize(&scene, 0.99)));
}

criterion_group!(
    name = recognition;
    config = Criterion::default().sample_size(10);
    targets = build_octree, add_model, recognize
);

criterion_main!(recognition);
