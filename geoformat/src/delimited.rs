//! Conversion d'un CSV de points (colonnes x/y) en shapefile zippé
//!
//! Toutes les lignes sont lues et validées avant la moindre écriture : une
//! coordonnée invalide fait échouer la conversion sans sortie partielle.

use std::path::Path;

use encoding_rs::UTF_8;
use geo::{Geometry, Point};
use tracing::{info, warn};

use crate::archive::{self, SHAPEFILE_ARCHIVE};
use crate::types::{
    Feature, FieldDef, FieldType, FieldValue, GeometryType, Layer, OutputArtifact, SpatialRef,
};
use crate::vector::shp;
use crate::FormatError;

/// Nom de base des fichiers produits (`points.shp`, `points.dbf`...)
pub const POINTS_BASE_NAME: &str = "points";

/// Noms des colonnes de coordonnées
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointColumns {
    pub x: String,
    pub y: String,
}

impl Default for PointColumns {
    fn default() -> Self {
        Self {
            x: "x".to_string(),
            y: "y".to_string(),
        }
    }
}

impl PointColumns {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }

    /// Vrai pour une colonne de coordonnées (comparaison insensible à la casse)
    fn is_coordinate(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.x) || name.eq_ignore_ascii_case(&self.y)
    }
}

/// Décode le CSV en UTF-8 (BOM retiré, séquences invalides remplacées)
fn decode(bytes: &[u8]) -> String {
    let (text, _, had_errors) = UTF_8.decode(bytes);
    if had_errors {
        warn!("CSV contains invalid UTF-8, replaced");
    }
    text.into_owned()
}

fn parse_coordinate(raw: &str, line: u64, column: &str) -> Result<f64, FormatError> {
    fast_float::parse(raw.trim()).map_err(|_: fast_float::Error| FormatError::InvalidCoordinate {
        line,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Lit un CSV de points en couche `points` (EPSG:4326, champs texte)
pub fn read_points(csv_path: &Path, columns: &PointColumns) -> Result<Layer, FormatError> {
    let text = decode(&std::fs::read(csv_path)?);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let x_idx = headers
        .iter()
        .position(|h| h == columns.x)
        .ok_or_else(|| FormatError::MissingColumn(columns.x.clone()))?;
    let y_idx = headers
        .iter()
        .position(|h| h == columns.y)
        .ok_or_else(|| FormatError::MissingColumn(columns.y.clone()))?;

    let attr_indices: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !columns.is_coordinate(name))
        .map(|(i, _)| i)
        .collect();

    let mut layer = Layer::new(POINTS_BASE_NAME, GeometryType::Point, SpatialRef::wgs84());
    layer.fields = attr_indices
        .iter()
        .map(|&i| FieldDef::new(&headers[i], FieldType::String))
        .collect();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let x = parse_coordinate(record.get(x_idx).unwrap_or_default(), line, &columns.x)?;
        let y = parse_coordinate(record.get(y_idx).unwrap_or_default(), line, &columns.y)?;

        let attributes = attr_indices
            .iter()
            .map(|&i| {
                record
                    .get(i)
                    .map_or(FieldValue::Null, |v| FieldValue::String(v.to_string()))
            })
            .collect();
        layer.features.push(Feature {
            geometry: Some(Geometry::Point(Point::new(x, y))),
            attributes,
        });
    }

    Ok(layer)
}

/// Convertit un CSV de points en `points.*` dans `output_folder`, zippés dans
/// `output_folder/shapefile.zip`
pub fn csv_to_vector(
    csv_path: &Path,
    output_folder: &Path,
    columns: &PointColumns,
) -> Result<OutputArtifact, FormatError> {
    let layer = read_points(csv_path, columns)?;

    std::fs::create_dir_all(output_folder)?;
    let shp_path = output_folder.join(format!("{}.shp", POINTS_BASE_NAME));
    archive::remove_shapefile(&shp_path)?;
    shp::write(&layer, &shp_path)?;

    let zip_path = output_folder.join(SHAPEFILE_ARCHIVE);
    let members = archive::bundle_shapefile(output_folder, POINTS_BASE_NAME, &zip_path)?;

    info!(
        input = %csv_path.display(),
        points = layer.features.len(),
        fields = layer.fields.len(),
        archive = %zip_path.display(),
        "CSV points converted to shapefile"
    );
    Ok(OutputArtifact::bundle(zip_path, members))
}
