//! Lecture, écriture et conversion des données vecteur
//!
//! Drivers supportés en lecture comme en écriture : GeoJSON, GeoPackage,
//! ESRI Shapefile et KML. Le driver d'entrée est choisi par inspection du contenu.

pub mod geojson;
pub mod gpkg;
pub mod kml;
pub mod shp;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memchr::memmem;
use tracing::info;

use crate::archive::{self, SHAPEFILE_ARCHIVE};
use crate::drivers::VECTOR_DRIVERS;
use crate::sandbox::remove_existing;
use crate::types::{FormatCategory, Layer, OutputArtifact, TargetFormat};
use crate::FormatError;

/// Driver vecteur reconnu en entrée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDriver {
    GeoJson,
    Gpkg,
    Shapefile,
    Kml,
}

/// Jeu de données vecteur ouvert (toutes les couches en mémoire)
#[derive(Debug)]
pub struct VectorDataset {
    pub driver: VectorDriver,
    pub layers: Vec<Layer>,
}

impl VectorDataset {
    /// Ouvre un fichier vecteur en détectant son driver
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let driver = sniff(path)?;
        let layers = match driver {
            VectorDriver::GeoJson => geojson::read(path)?,
            VectorDriver::Gpkg => gpkg::read(path)?,
            VectorDriver::Shapefile => shp::read(path)?,
            VectorDriver::Kml => kml::read(path)?,
        };
        Ok(Self { driver, layers })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Première couche ; les suivantes sont ignorées
    pub fn into_first_layer(self) -> Option<Layer> {
        self.layers.into_iter().next()
    }
}

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const SHP_FILE_CODE: [u8; 4] = [0x00, 0x00, 0x27, 0x0a];

/// Détecte le driver d'entrée depuis les premiers octets du fichier
pub fn sniff(path: &Path) -> Result<VectorDriver, FormatError> {
    let mut head = Vec::with_capacity(1024);
    File::open(path)?.take(1024).read_to_end(&mut head)?;

    if head.starts_with(SQLITE_MAGIC) {
        return Ok(VectorDriver::Gpkg);
    }

    let has_shp_extension = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("shp"));
    if has_shp_extension && head.starts_with(&SHP_FILE_CODE) {
        return Ok(VectorDriver::Shapefile);
    }

    let text = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&head[..]);
    let first = text.iter().position(|b| !b.is_ascii_whitespace());
    if let Some(pos) = first {
        if text[pos] == b'{' {
            return Ok(VectorDriver::GeoJson);
        }
        if text[pos] == b'<' && memmem::find(text, b"<kml").is_some() {
            return Ok(VectorDriver::Kml);
        }
    }

    Err(FormatError::unrecognized(
        "vector",
        format!("{} matches no vector driver", path.display()),
    ))
}

/// Convertit la première couche de `input` vers `target`
///
/// Une sortie existante est supprimée avant écriture. Pour le shapefile, les
/// compagnons sont écrits à côté de `output` puis zippés dans `shapefile.zip`.
pub fn convert_vector(
    input: &Path,
    output: &Path,
    target: TargetFormat,
) -> Result<OutputArtifact, FormatError> {
    let spec = VECTOR_DRIVERS.lookup(target)?;

    let dataset = VectorDataset::open(input)?;
    let driver = dataset.driver;
    let layer = dataset
        .into_first_layer()
        .ok_or_else(|| FormatError::EmptyDataset(input.display().to_string()))?;

    info!(
        input = %input.display(),
        driver = ?driver,
        target = spec.driver,
        layer = %layer.name,
        features = layer.features.len(),
        fields = layer.fields.len(),
        "Converting vector layer"
    );

    match target {
        TargetFormat::EsriShapefile => return write_shapefile_bundle(&layer, output),
        TargetFormat::GeoJson => {
            remove_existing(output)?;
            geojson::write(&layer, output)?;
        }
        TargetFormat::Gpkg => {
            remove_existing(output)?;
            gpkg::write(&layer, output)?;
        }
        TargetFormat::Kml => {
            remove_existing(output)?;
            kml::write(&layer, output)?;
        }
        other => {
            return Err(FormatError::UnsupportedTarget {
                category: FormatCategory::Vector,
                target: other,
            })
        }
    }

    Ok(OutputArtifact::single(output.to_path_buf()))
}

/// Écrit les compagnons à côté de `output` puis les zippe dans `shapefile.zip`
fn write_shapefile_bundle(layer: &Layer, output: &Path) -> Result<OutputArtifact, FormatError> {
    archive::remove_shapefile(output)?;
    shp::write(layer, output)?;

    let folder = output.parent().unwrap_or_else(|| Path::new("."));
    let base_name = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("converted");
    let zip_path = folder.join(SHAPEFILE_ARCHIVE);
    let members = archive::bundle_shapefile(folder, base_name, &zip_path)?;
    Ok(OutputArtifact::bundle(zip_path, members))
}
