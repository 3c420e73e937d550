//! Types de données pour le crate geoformat

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use geo::Geometry;
use serde::Serialize;

use crate::drivers::{self, OutputLayout};
use crate::FormatError;

/// Catégorie détectée pour un fichier d'entrée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FormatCategory {
    Vector,
    Raster,
    PointCloud,
    DelimitedText,
    Unsupported,
}

impl FormatCategory {
    /// Formats cibles autorisés pour la catégorie, dans l'ordre de présentation
    pub fn targets(self) -> Vec<TargetFormat> {
        drivers::table_for(self)
            .map(|table| table.targets().collect())
            .unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Raster => "raster",
            Self::PointCloud => "point cloud",
            Self::DelimitedText => "CSV point",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FormatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Format cible d'une conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetFormat {
    GeoJson,
    Gpkg,
    EsriShapefile,
    Kml,
    GTiff,
    Cog,
    Jpeg,
    Png,
    Csv,
    Las,
    Laz,
}

impl TargetFormat {
    /// Nom affiché (identique aux noms de drivers historiques)
    pub fn name(self) -> &'static str {
        match self {
            Self::GeoJson => "GeoJSON",
            Self::Gpkg => "GPKG",
            Self::EsriShapefile => "ESRI Shapefile",
            Self::Kml => "KML",
            Self::GTiff => "GTiff",
            Self::Cog => "COG",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Csv => "csv",
            Self::Las => "las",
            Self::Laz => "laz",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match key.as_str() {
            "geojson" | "json" => Ok(Self::GeoJson),
            "gpkg" | "geopackage" => Ok(Self::Gpkg),
            "esri shapefile" | "shapefile" | "shp" => Ok(Self::EsriShapefile),
            "kml" => Ok(Self::Kml),
            "gtiff" | "geotiff" | "tif" | "tiff" => Ok(Self::GTiff),
            "cog" => Ok(Self::Cog),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "csv" => Ok(Self::Csv),
            "las" => Ok(Self::Las),
            "laz" => Ok(Self::Laz),
            _ => Err(FormatError::UnknownTarget(s.to_string())),
        }
    }
}

/// Fichier reçu : nom d'origine et contenu brut
#[derive(Debug, Clone)]
pub struct InputArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl InputArtifact {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Nom de fichier réduit à son dernier composant (jamais de chemin)
    pub fn safe_file_name(&self) -> String {
        std::path::Path::new(&self.file_name)
            .file_name()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("upload")
            .to_string()
    }
}

/// Demande de conversion
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub category: FormatCategory,
    pub target: TargetFormat,
    pub source: PathBuf,
}

/// Résultat d'une conversion : un fichier, ou une archive de fichiers compagnons
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    /// Fichier à livrer (fichier converti ou archive zip)
    pub path: PathBuf,

    pub layout: OutputLayout,

    /// Noms des fichiers contenus (un seul pour `SingleFile`)
    pub members: Vec<String>,
}

impl OutputArtifact {
    pub fn single(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            layout: OutputLayout::SingleFile,
            members: vec![name],
        }
    }

    pub fn bundle(path: PathBuf, members: Vec<String>) -> Self {
        Self {
            path,
            layout: OutputLayout::Bundle,
            members,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Système de référence d'une couche
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialRef {
    /// Code EPSG si connu
    pub epsg: Option<u32>,

    /// Définition WKT si connue (.prj, gpkg_spatial_ref_sys)
    pub wkt: Option<String>,
}

/// WKT ESRI de WGS84, tel qu'écrit dans les .prj
pub const WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

impl SpatialRef {
    pub fn wgs84() -> Self {
        Self {
            epsg: Some(4326),
            wkt: Some(WGS84_WKT.to_string()),
        }
    }

    pub fn from_epsg(epsg: u32) -> Self {
        if epsg == 4326 {
            return Self::wgs84();
        }
        Self {
            epsg: Some(epsg),
            wkt: None,
        }
    }

    /// Reconnaît WGS84 dans un WKT (.prj), sinon conserve le texte tel quel
    pub fn from_wkt(wkt: &str) -> Self {
        let wkt = wkt.trim();
        let upper = wkt.to_ascii_uppercase();
        let geographic = upper.starts_with("GEOGCS");
        let wgs84 = upper.contains("WGS_1984") || upper.contains("WGS 84");
        Self {
            epsg: (geographic && wgs84).then_some(4326),
            wkt: Some(wkt.to_string()),
        }
    }

    /// WKT à écrire, avec repli sur la définition WGS84 connue
    pub fn wkt_or_known(&self) -> Option<&str> {
        match (&self.wkt, self.epsg) {
            (Some(wkt), _) => Some(wkt.as_str()),
            (None, Some(4326)) => Some(WGS84_WKT),
            _ => None,
        }
    }
}

/// Type de géométrie d'une couche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryType {
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    pub fn of(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Type commun à toutes les géométries non nulles, `Unknown` si mélange
    pub fn infer<'a>(geometries: impl IntoIterator<Item = &'a Geometry>) -> Self {
        let mut found = None;
        for geometry in geometries {
            let kind = Self::of(geometry);
            match found {
                None => found = Some(kind),
                Some(previous) if previous != kind => return Self::Unknown,
                Some(_) => {}
            }
        }
        found.unwrap_or(Self::Unknown)
    }

    /// Nom OGC (GeoPackage, KML)
    pub fn ogc_name(self) -> &'static str {
        match self {
            Self::Unknown => "GEOMETRY",
            Self::Point => "POINT",
            Self::LineString => "LINESTRING",
            Self::Polygon => "POLYGON",
            Self::MultiPoint => "MULTIPOINT",
            Self::MultiLineString => "MULTILINESTRING",
            Self::MultiPolygon => "MULTIPOLYGON",
            Self::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }

    pub fn from_ogc_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "POINT" => Self::Point,
            "LINESTRING" => Self::LineString,
            "POLYGON" => Self::Polygon,
            "MULTIPOINT" => Self::MultiPoint,
            "MULTILINESTRING" => Self::MultiLineString,
            "MULTIPOLYGON" => Self::MultiPolygon,
            "GEOMETRYCOLLECTION" => Self::GeometryCollection,
            _ => Self::Unknown,
        }
    }
}

/// Type d'un champ attributaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Integer,
    Real,
    String,
    Boolean,
    Date,
}

/// Définition d'un champ
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Date calendaire (champs DATE des GeoPackage et .dbf)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for Date {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FormatError::parse_error("date", format!("invalid date '{}'", s));
        // "YYYY-MM-DD", éventuellement suivi d'une heure
        let trimmed = s.trim();
        let date_part = trimmed.get(..10).unwrap_or(trimmed);
        let parts: Vec<u32> = date_part
            .split('-')
            .map(|p| p.parse().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        let [year, month, day] = parts[..] else {
            return Err(invalid());
        };
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(invalid());
        }
        Ok(Self { year, month, day })
    }
}

/// Valeur d'un attribut
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    String(String),
    Boolean(bool),
    Date(Date),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Représentation texte (None pour Null)
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(v) => Some(v.to_string()),
            Self::Real(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Boolean(v) => Some(v.to_string()),
            Self::Date(v) => Some(v.to_string()),
        }
    }
}

/// Une feature : géométrie optionnelle et attributs dans l'ordre du schéma
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub attributes: Vec<FieldValue>,
}

/// Une couche vecteur complète en mémoire
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub geometry_type: GeometryType,
    pub srs: SpatialRef,
    pub fields: Vec<FieldDef>,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>, geometry_type: GeometryType, srs: SpatialRef) -> Self {
        Self {
            name: name.into(),
            geometry_type,
            srs,
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Valeur d'un attribut par nom de champ
    pub fn value<'a>(&self, feature: &'a Feature, name: &str) -> Option<&'a FieldValue> {
        self.field_index(name)
            .and_then(|idx| feature.attributes.get(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point};

    #[test]
    fn test_target_format_from_str() {
        assert_eq!(
            "ESRI Shapefile".parse::<TargetFormat>().unwrap(),
            TargetFormat::EsriShapefile
        );
        assert_eq!("shp".parse::<TargetFormat>().unwrap(), TargetFormat::EsriShapefile);
        assert_eq!("geojson".parse::<TargetFormat>().unwrap(), TargetFormat::GeoJson);
        assert_eq!("jpg".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert_eq!("LAZ".parse::<TargetFormat>().unwrap(), TargetFormat::Laz);
        assert!("dxf".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn test_category_targets_order() {
        assert_eq!(
            FormatCategory::Vector.targets(),
            vec![
                TargetFormat::GeoJson,
                TargetFormat::Gpkg,
                TargetFormat::EsriShapefile,
                TargetFormat::Kml
            ]
        );
        assert_eq!(
            FormatCategory::DelimitedText.targets(),
            vec![TargetFormat::EsriShapefile]
        );
        assert!(FormatCategory::Unsupported.targets().is_empty());
    }

    #[test]
    fn test_safe_file_name() {
        let input = InputArtifact::new("../../etc/data.csv", vec![]);
        assert_eq!(input.safe_file_name(), "data.csv");
        let input = InputArtifact::new("", vec![]);
        assert_eq!(input.safe_file_name(), "upload");
    }

    #[test]
    fn test_geometry_type_infer() {
        let a = Geometry::Point(point!(x: 1.0, y: 2.0));
        let b = Geometry::Point(point!(x: 3.0, y: 4.0));
        let c = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        assert_eq!(GeometryType::infer([&a, &b]), GeometryType::Point);
        assert_eq!(GeometryType::infer([&a, &c]), GeometryType::Unknown);
        assert_eq!(GeometryType::infer([]), GeometryType::Unknown);
    }

    #[test]
    fn test_spatial_ref_from_wkt() {
        let srs = SpatialRef::from_wkt(WGS84_WKT);
        assert_eq!(srs.epsg, Some(4326));

        let lambert = SpatialRef::from_wkt(r#"PROJCS["RGF93_Lambert_93",GEOGCS["GCS_RGF_1993"]]"#);
        assert_eq!(lambert.epsg, None);
        assert!(lambert.wkt_or_known().is_some());
        assert_eq!(SpatialRef::default().wkt_or_known(), None);
    }

    #[test]
    fn test_date_roundtrip_text() {
        let date: Date = "2024-03-09".parse().unwrap();
        assert_eq!(date, Date { year: 2024, month: 3, day: 9 });
        assert_eq!(date.to_string(), "2024-03-09");
        assert!("2024-13-01".parse::<Date>().is_err());
        assert!("hello".parse::<Date>().is_err());
    }
}
