//! Tests d'intégration : classification et conversions de bout en bout

use std::fs::File;
use std::path::{Path, PathBuf};

use geo::{point, Geometry};
use geoformat::archive::{bundle_shapefile, SHAPEFILE_ARCHIVE};
use geoformat::types::{Feature, FieldDef, FieldType, FieldValue, GeometryType, SpatialRef};
use geoformat::vector::{geojson, gpkg, kml, shp, VectorDataset};
use geoformat::{
    classify, csv_to_vector, convert_point_cloud, convert_vector, Dispatcher, FormatCategory,
    InputArtifact, Layer, PointColumns, TargetFormat,
};

fn sample_layer() -> Layer {
    let mut layer = Layer::new("communes", GeometryType::Point, SpatialRef::wgs84());
    layer.fields = vec![
        FieldDef::new("nom", FieldType::String),
        FieldDef::new("population", FieldType::Integer),
        FieldDef::new("surface", FieldType::Real),
    ];
    let rows = [
        ("Grenoble", 158_198, 18.13, (5.7245, 45.1885)),
        ("Échirolles", 37_110, 7.85, (5.7196, 45.1436)),
        ("Meylan", 17_958, 12.26, (5.7786, 45.2096)),
    ];
    layer.features = rows
        .iter()
        .map(|(nom, pop, surface, (x, y))| Feature {
            geometry: Some(Geometry::Point(point!(x: *x, y: *y))),
            attributes: vec![
                FieldValue::String(nom.to_string()),
                FieldValue::Integer(*pop),
                FieldValue::Real(*surface),
            ],
        })
        .collect();
    layer
}

fn zip_members(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn companions(folder: &Path, base: &str) -> Vec<PathBuf> {
    let pattern = format!("{}/{}.*", folder.display(), base);
    glob::glob(&pattern).unwrap().filter_map(|p| p.ok()).collect()
}

/// Relit la sortie d'une conversion vecteur (le .shp pour un shapefile)
fn reread(output: &Path) -> Layer {
    VectorDataset::open(output).unwrap().into_first_layer().unwrap()
}

#[test]
fn test_vector_conversions_keep_features_and_fields() {
    let dir = tempfile::tempdir().unwrap();
    let layer = sample_layer();
    let input = dir.path().join("communes.gpkg");
    gpkg::write(&layer, &input).unwrap();

    let targets = [
        (TargetFormat::GeoJson, "converted.geojson"),
        (TargetFormat::Gpkg, "converted.gpkg"),
        (TargetFormat::EsriShapefile, "converted.shp"),
        (TargetFormat::Kml, "converted.kml"),
    ];
    for (target, name) in targets {
        let out_dir = dir.path().join(target.name().replace(' ', "_"));
        std::fs::create_dir_all(&out_dir).unwrap();
        let output = out_dir.join(name);

        convert_vector(&input, &output, target).unwrap();
        let back = reread(&output);

        assert_eq!(back.features.len(), layer.features.len(), "{}", target);
        assert_eq!(back.fields, layer.fields, "{}", target);
        for (a, b) in back.features.iter().zip(&layer.features) {
            assert_eq!(a.geometry, b.geometry, "{}", target);
            assert_eq!(a.attributes, b.attributes, "{}", target);
        }
    }
}

#[test]
fn test_shapefile_output_is_bundled() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("communes.geojson");
    geojson::write(&sample_layer(), &input).unwrap();

    let out_dir = dir.path().join("output");
    std::fs::create_dir_all(&out_dir).unwrap();
    let artifact =
        convert_vector(&input, &out_dir.join("converted.shp"), TargetFormat::EsriShapefile)
            .unwrap();

    assert_eq!(artifact.path, out_dir.join(SHAPEFILE_ARCHIVE));
    assert_eq!(companions(&out_dir, "converted").len(), 5);
    assert_eq!(
        zip_members(&artifact.path),
        vec![
            "converted.shp",
            "converted.shx",
            "converted.dbf",
            "converted.prj",
            "converted.cpg"
        ]
    );
}

#[test]
fn test_only_first_layer_is_converted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("deux.kml");
    std::fs::write(
        &input,
        r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
<Folder><name>a</name><Placemark><name>p1</name><Point><coordinates>1,2</coordinates></Point></Placemark></Folder>
<Folder><name>b</name><Placemark><name>p2</name><Point><coordinates>3,4</coordinates></Point></Placemark>
<Placemark><name>p3</name><Point><coordinates>5,6</coordinates></Point></Placemark></Folder>
</Document></kml>"#,
    )
    .unwrap();
    assert_eq!(kml::read(&input).unwrap().len(), 2);

    let output = dir.path().join("converted.geojson");
    convert_vector(&input, &output, TargetFormat::GeoJson).unwrap();

    let back = reread(&output);
    assert_eq!(back.features.len(), 1);
    assert_eq!(back.name, "a");
}

#[test]
fn test_point_cloud_csv_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.las");
    let mut writer = las::Writer::from_path(&input, las::Header::default()).unwrap();
    for i in 0..25 {
        let point = las::Point {
            x: 1.0 + i as f64,
            y: 2.0 * i as f64,
            z: 0.5,
            ..Default::default()
        };
        writer.write_point(point).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(classify(&input), FormatCategory::PointCloud);

    let output = dir.path().join("converted.csv");
    convert_point_cloud(&input, &output, TargetFormat::Csv).unwrap();

    let content = std::fs::read_to_string(&output).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("x,y,z"));
    assert_eq!(lines.count(), 25);
}

#[test]
fn test_las_roundtrip_keeps_points() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.las");
    let mut builder = las::Builder::from((1, 2));
    builder.transforms = las::Vector {
        x: las::Transform { scale: 0.01, offset: 912_000.0 },
        y: las::Transform { scale: 0.01, offset: 6_457_000.0 },
        z: las::Transform { scale: 0.01, offset: 0.0 },
    };
    let header = builder.into_header().unwrap();
    let mut writer = las::Writer::from_path(&input, header).unwrap();
    for i in 0..7 {
        let point = las::Point {
            x: 912_000.0 + i as f64,
            y: 6_457_000.0 - i as f64,
            z: 215.25,
            ..Default::default()
        };
        writer.write_point(point).unwrap();
    }
    writer.close().unwrap();

    let output = dir.path().join("converted.las");
    convert_point_cloud(&input, &output, TargetFormat::Las).unwrap();

    let xyz = |path: &Path| -> Vec<(f64, f64, f64)> {
        let mut reader = las::Reader::from_path(path).unwrap();
        reader
            .points()
            .map(|p| p.unwrap())
            .map(|p| (p.x, p.y, p.z))
            .collect()
    };
    assert_eq!(xyz(&output), xyz(&input));
    assert_eq!(xyz(&output).len(), 7);
}

#[test]
fn test_csv_to_shapefile_schema() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("points.csv");
    std::fs::write(&input, "x,y,a,b\n5.5,45.25,un,deux\n6.0,44.75,trois,quatre\n").unwrap();
    let out = dir.path().join("shp_output");

    let artifact = csv_to_vector(&input, &out, &PointColumns::default()).unwrap();
    assert_eq!(artifact.file_name(), SHAPEFILE_ARCHIVE);

    let layer = shp::read(&out.join("points.shp")).unwrap().remove(0);
    assert_eq!(
        layer.fields,
        vec![
            FieldDef::new("a", FieldType::String),
            FieldDef::new("b", FieldType::String)
        ]
    );
    assert_eq!(layer.srs.epsg, Some(4326));
    assert_eq!(
        layer.features[0].geometry,
        Some(Geometry::Point(point!(x: 5.5, y: 45.25)))
    );
    assert_eq!(
        layer.features[1].attributes,
        vec![
            FieldValue::String("trois".into()),
            FieldValue::String("quatre".into())
        ]
    );

    let prj = std::fs::read_to_string(out.join("points.prj")).unwrap();
    assert!(prj.contains("WGS_1984"));
}

#[test]
fn test_zero_layer_geopackage_classification() {
    let dir = tempfile::tempdir().unwrap();

    let as_csv = dir.path().join("vide.csv");
    drop(gpkg::create(&as_csv).unwrap());
    assert_eq!(classify(&as_csv), FormatCategory::DelimitedText);

    let as_gpkg = dir.path().join("vide.gpkg");
    drop(gpkg::create(&as_gpkg).unwrap());
    assert_eq!(classify(&as_gpkg), FormatCategory::Unsupported);
}

#[test]
fn test_classification_order() {
    let dir = tempfile::tempdir().unwrap();

    // Un GeoJSON nommé .csv reste du vecteur : la sonde vecteur passe avant
    let geojson_csv = dir.path().join("trompeur.csv");
    geojson::write(&sample_layer(), &geojson_csv).unwrap();
    assert_eq!(classify(&geojson_csv), FormatCategory::Vector);

    let tif = dir.path().join("ortho.tif");
    let raster = geoformat::raster::Raster::new(
        4,
        4,
        1,
        geoformat::raster::RasterSamples::U8(vec![7; 16]),
    )
    .unwrap();
    geoformat::raster::gtiff::write(&raster, &tif).unwrap();
    assert_eq!(classify(&tif), FormatCategory::Raster);
}

#[test]
fn test_bundle_without_cpg() {
    let dir = tempfile::tempdir().unwrap();
    for ext in ["shp", "shx", "dbf", "prj"] {
        std::fs::write(dir.path().join(format!("points.{}", ext)), b"data").unwrap();
    }
    let zip_path = dir.path().join(SHAPEFILE_ARCHIVE);

    let members = bundle_shapefile(dir.path(), "points", &zip_path).unwrap();

    assert_eq!(members.len(), 4);
    assert_eq!(
        zip_members(&zip_path),
        vec!["points.shp", "points.shx", "points.dbf", "points.prj"]
    );
}

#[test]
fn test_dispatcher_end_to_end_raster() {
    let tif = tempfile::NamedTempFile::new().unwrap();
    let raster = geoformat::raster::Raster::new(
        300,
        300,
        3,
        geoformat::raster::RasterSamples::U8((0..300 * 300 * 3).map(|i| (i % 256) as u8).collect()),
    )
    .unwrap();
    geoformat::raster::gtiff::write(&raster, tif.path()).unwrap();

    let input = InputArtifact::new("ortho.tif", std::fs::read(tif.path()).unwrap());
    let converted = Dispatcher::default()
        .process(&input, Some(TargetFormat::Cog))
        .unwrap();

    assert_eq!(converted.category, FormatCategory::Raster);
    assert_eq!(converted.file_name, "converted.tif");
    assert!(converted.bytes.starts_with(b"II*\0"));
}
