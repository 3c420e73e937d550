//! Benchmarks pour la classification et les conversions vecteur

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::{Path, PathBuf};

use geo::{point, Geometry};
use geoformat::types::{Feature, FieldDef, FieldType, FieldValue, GeometryType, SpatialRef};
use geoformat::vector::{geojson, gpkg};
use geoformat::{classify, convert_vector, Layer, TargetFormat};

fn build_layer(n: usize) -> Layer {
    let mut layer = Layer::new("bench", GeometryType::Point, SpatialRef::wgs84());
    layer.fields = vec![
        FieldDef::new("id", FieldType::Integer),
        FieldDef::new("label", FieldType::String),
    ];
    layer.features = (0..n)
        .map(|i| Feature {
            geometry: Some(Geometry::Point(point!(
                x: 5.0 + i as f64 * 1e-4,
                y: 45.0 + i as f64 * 1e-4
            ))),
            attributes: vec![
                FieldValue::Integer(i as i64),
                FieldValue::String(format!("point {}", i)),
            ],
        })
        .collect();
    layer
}

/// Un fichier par catégorie, dans un répertoire temporaire
fn fixtures(dir: &Path) -> Vec<(&'static str, PathBuf)> {
    let layer = build_layer(1_000);

    let geojson_path = dir.join("points.geojson");
    geojson::write(&layer, &geojson_path).unwrap();

    let gpkg_path = dir.join("points.gpkg");
    gpkg::write(&layer, &gpkg_path).unwrap();

    let csv_path = dir.join("points.csv");
    let mut csv = String::from("x,y,label\n");
    for i in 0..1_000 {
        csv.push_str(&format!("{},{},p{}\n", 5.0 + i as f64 * 1e-4, 45.0, i));
    }
    std::fs::write(&csv_path, csv).unwrap();

    let unknown_path = dir.join("notes.txt");
    std::fs::write(&unknown_path, "nothing geospatial here").unwrap();

    vec![
        ("geojson", geojson_path),
        ("gpkg", gpkg_path),
        ("csv", csv_path),
        ("unsupported", unknown_path),
    ]
}

fn bench_classify(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let files = fixtures(dir.path());

    let mut group = c.benchmark_group("classify");
    for (name, path) in &files {
        group.bench_with_input(BenchmarkId::from_parameter(name), path, |b, path| {
            b.iter(|| black_box(classify(black_box(path))))
        });
    }
    group.finish();
}

fn bench_convert_vector(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("points.gpkg");
    gpkg::write(&build_layer(5_000), &input).unwrap();
    let size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);

    let mut group = c.benchmark_group("convert_vector");
    group.throughput(Throughput::Bytes(size));
    group.sample_size(10);

    for target in [TargetFormat::GeoJson, TargetFormat::Gpkg, TargetFormat::Kml] {
        let output = dir.path().join(format!("converted.{}", target.name().to_lowercase()));
        group.bench_function(target.name(), |b| {
            b.iter(|| convert_vector(black_box(&input), &output, target).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_classify, bench_convert_vector);
criterion_main!(benches);
