//! # geoconv
//!
//! Outil en ligne de commande pour détecter le type d'un fichier géospatial et le
//! convertir vers un format de la même famille.
//!
//! ## Features
//!
//! - Détection : vecteur, raster, nuage de points, CSV de points
//! - Conversion vecteur vers GeoJSON, GeoPackage, Shapefile (zip), KML
//! - Conversion raster vers GeoTIFF, COG, JPEG, PNG
//! - Nuages de points vers LAS, LAZ ou CSV x,y,z
//! - Rapport de conversion (checksum blake3, durée) en texte ou JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Détecter la catégorie d'un fichier
//! geoconv detect communes.gpkg
//!
//! # Convertir vers le premier format proposé
//! geoconv convert communes.gpkg --output ./out
//!
//! # CSV de points avec colonnes personnalisées, rapport JSON
//! geoconv convert gares.csv --x-column lon --y-column lat --report rapport.json
//!
//! # Lister les formats de sortie
//! geoconv formats
//! ```

pub mod config;
pub mod report;

pub use config::Config;
pub use report::{ConversionReport, ConversionStatus};
