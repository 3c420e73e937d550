//! # geoformat
//!
//! Détection et conversion de fichiers géospatiaux : vecteur, raster, nuage de
//! points et CSV de points.
//!
//! ## Features
//!
//! - Classification par sondes ordonnées (vecteur, raster, nuage de points, CSV)
//! - Vecteur : GeoJSON, GeoPackage, ESRI Shapefile, KML en lecture et écriture
//! - Raster : GeoTIFF, COG, PNG, JPEG (tags GeoTIFF conservés entre TIFF)
//! - Nuages de points : LAS/LAZ vers LAS, LAZ ou CSV x,y,z
//! - Shapefile livré en archive `shapefile.zip`
//! - Répertoire de travail temporaire supprimé en fin de requête
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geoformat::{Dispatcher, InputArtifact, TargetFormat};
//!
//! let input = InputArtifact::new("communes.geojson", std::fs::read("communes.geojson")?);
//! let converted = Dispatcher::default().process(&input, Some(TargetFormat::Gpkg))?;
//! println!("{}: {} octets", converted.file_name, converted.bytes.len());
//! ```

pub mod archive;
pub mod delimited;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod pointcloud;
pub mod probe;
pub mod raster;
pub mod sandbox;
pub mod types;
pub mod vector;

pub use delimited::{csv_to_vector, PointColumns};
pub use dispatch::{ConvertedFile, Dispatcher};
pub use drivers::{DriverSpec, DriverTable, OutputLayout};
pub use error::FormatError;
pub use pointcloud::convert_point_cloud;
pub use probe::{classify, Classifier};
pub use raster::convert_raster;
pub use sandbox::Sandbox;
pub use types::{
    ConversionRequest, FormatCategory, InputArtifact, Layer, OutputArtifact, TargetFormat,
};
pub use vector::convert_vector;
