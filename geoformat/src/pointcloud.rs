//! Nuages de points LAS/LAZ

use std::path::Path;

use las::{Reader, Writer};
use tracing::info;

use crate::drivers::POINT_CLOUD_DRIVERS;
use crate::sandbox::remove_existing;
use crate::types::{FormatCategory, OutputArtifact, TargetFormat};
use crate::FormatError;

/// En-tête de l'export CSV
pub const XYZ_HEADER: [&str; 3] = ["x", "y", "z"];

/// Ouvre le fichier et retourne le nombre de points annoncé par l'en-tête
pub fn probe(path: &Path) -> Result<u64, FormatError> {
    let reader = Reader::from_path(path)?;
    Ok(reader.header().number_of_points())
}

/// Convertit un nuage de points vers csv, las ou laz
///
/// La compression LAZ est choisie par le writer d'après l'extension de `output`.
pub fn convert_point_cloud(
    input: &Path,
    output: &Path,
    target: TargetFormat,
) -> Result<OutputArtifact, FormatError> {
    let spec = POINT_CLOUD_DRIVERS.lookup(target)?;
    remove_existing(output)?;

    let written = match target {
        TargetFormat::Csv => write_xyz_csv(input, output)?,
        TargetFormat::Las | TargetFormat::Laz => rewrite(input, output)?,
        other => {
            return Err(FormatError::UnsupportedTarget {
                category: FormatCategory::PointCloud,
                target: other,
            })
        }
    };

    info!(
        input = %input.display(),
        target = spec.driver,
        points = written,
        "Point cloud converted"
    );
    Ok(OutputArtifact::single(output.to_path_buf()))
}

/// Exporte x, y, z de chaque point dans l'ordre du fichier
///
/// Les coordonnées sont écrites avec la précision aller-retour de `f64`.
pub fn write_xyz_csv(input: &Path, output: &Path) -> Result<u64, FormatError> {
    let mut reader = Reader::from_path(input)?;
    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(XYZ_HEADER)?;

    let mut count = 0u64;
    for point in reader.points() {
        let point = point?;
        writer.write_record([
            format!("{:?}", point.x),
            format!("{:?}", point.y),
            format!("{:?}", point.z),
        ])?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Réécrit tous les points avec l'en-tête d'origine
fn rewrite(input: &Path, output: &Path) -> Result<u64, FormatError> {
    let mut reader = Reader::from_path(input)?;
    let header = reader.header().clone();
    let mut writer = Writer::from_path(output, header)?;

    let mut count = 0u64;
    for point in reader.points() {
        writer.write_point(point?)?;
        count += 1;
    }
    writer.close()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use las::{Builder, Point, Transform, Vector};

    fn write_sample_las(path: &Path, n: usize) -> Vec<Point> {
        let mut builder = Builder::from((1, 2));
        builder.point_format = las::point::Format::new(0).unwrap();
        // Coordonnées Lambert-93 : décalage obligatoire pour tenir sur un i32
        builder.transforms = Vector {
            x: Transform { scale: 0.001, offset: 900_000.0 },
            y: Transform { scale: 0.001, offset: 6_400_000.0 },
            z: Transform { scale: 0.001, offset: 0.0 },
        };
        let header = builder.into_header().unwrap();

        let mut writer = Writer::from_path(path, header).unwrap();
        for i in 0..n {
            let point = Point {
                x: 900_000.0 + i as f64 * 0.25,
                y: 6_400_000.0 + i as f64 * 0.5,
                z: 200.0 + i as f64,
                ..Default::default()
            };
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();

        let mut reader = Reader::from_path(path).unwrap();
        reader.points().map(|p| p.unwrap()).collect()
    }

    fn xyz(points: &[Point]) -> Vec<(f64, f64, f64)> {
        points.iter().map(|p| (p.x, p.y, p.z)).collect()
    }

    #[test]
    fn test_probe_point_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.las");
        write_sample_las(&path, 5);
        assert_eq!(probe(&path).unwrap(), 5);
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.las");
        let points = write_sample_las(&input, 4);
        let output = dir.path().join("converted.csv");

        convert_point_cloud(&input, &output, TargetFormat::Csv).unwrap();

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(header, vec!["x", "y", "z"]);
        let rows: Vec<(f64, f64, f64)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].parse().unwrap(), r[1].parse().unwrap(), r[2].parse().unwrap())
            })
            .collect();
        assert_eq!(rows, xyz(&points));
    }

    #[test]
    fn test_las_to_las_and_laz() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.las");
        let points = write_sample_las(&input, 10);

        let targets = [
            ("converted.las", TargetFormat::Las),
            ("converted.laz", TargetFormat::Laz),
        ];
        for (name, target) in targets {
            let output = dir.path().join(name);
            convert_point_cloud(&input, &output, target).unwrap();

            let mut reader = Reader::from_path(&output).unwrap();
            assert_eq!(reader.header().number_of_points(), 10);
            let back: Vec<Point> = reader.points().map(|p| p.unwrap()).collect();
            assert_eq!(xyz(&back), xyz(&points));
        }
    }

    #[test]
    fn test_probe_rejects_other_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.las");
        std::fs::write(&path, b"not a point cloud").unwrap();
        assert!(probe(&path).is_err());
    }

    #[test]
    fn test_rewrite_keeps_transforms() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.las");
        write_sample_las(&input, 3);
        let output = dir.path().join("converted.laz");

        convert_point_cloud(&input, &output, TargetFormat::Laz).unwrap();

        let reader = Reader::from_path(&output).unwrap();
        let transforms = reader.header().transforms();
        assert_eq!(transforms.x.offset, 900_000.0);
        assert_eq!(transforms.y.offset, 6_400_000.0);
        assert_eq!(transforms.y.scale, 0.001);
    }
}
