//! Types d'erreurs pour le crate geoformat

use thiserror::Error;

use crate::types::{FormatCategory, TargetFormat};

/// Erreurs pouvant survenir lors de la détection ou de la conversion
#[derive(Debug, Error)]
pub enum FormatError {
    /// Erreur d'I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format cible absent de la table des drivers de la catégorie
    #[error("Target format {target} is not available for {category} data")]
    UnsupportedTarget {
        category: FormatCategory,
        target: TargetFormat,
    },

    /// Identifiant de format cible inconnu
    #[error("Unknown target format: {0}")]
    UnknownTarget(String),

    /// Aucun lecteur ne reconnaît le contenu
    #[error("Unrecognized {kind} content: {reason}")]
    UnrecognizedFormat { kind: &'static str, reason: String },

    /// Jeu de données sans couche exploitable
    #[error("Dataset has no layer: {0}")]
    EmptyDataset(String),

    /// Colonne X/Y absente du CSV
    #[error("Missing column '{0}' in CSV header")]
    MissingColumn(String),

    /// Coordonnée non numérique dans une ligne CSV
    #[error("Invalid {column} value '{value}' at line {line}")]
    InvalidCoordinate {
        line: u64,
        column: String,
        value: String,
    },

    /// Champ ou géométrie non représentable par le driver cible
    #[error("Schema mismatch for {driver}: {reason}")]
    SchemaMismatch { driver: &'static str, reason: String },

    /// Combinaison bandes / type de pixel non supportée
    #[error("Unsupported sample layout for {driver}: {bands} band(s) of {sample}")]
    UnsupportedSampleLayout {
        driver: &'static str,
        bands: u16,
        sample: &'static str,
    },

    /// Raster trop volumineux pour un TIFF classique (offsets 32 bits)
    #[error("Raster too large for classic TIFF: {0} bytes")]
    RasterTooLarge(u64),

    /// Erreur de parsing d'un fichier
    #[error("Parse error in {file}: {reason}")]
    ParseError { file: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Geometry encoding error: {0}")]
    Geozero(#[from] geozero::error::GeozeroError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("DBF error: {0}")]
    Dbase(#[from] shapefile::dbase::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl FormatError {
    /// Crée une erreur de parsing avec contexte
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de schéma pour un driver
    pub fn schema_mismatch(driver: &'static str, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            driver,
            reason: reason.into(),
        }
    }

    pub fn unrecognized(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::UnrecognizedFormat {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
