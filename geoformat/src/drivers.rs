//! Tables des drivers de sortie par catégorie
//!
//! Chaque catégorie a sa table immuable, indexée par [`TargetFormat`]. L'ordre des
//! entrées est l'ordre de présentation des choix (le premier est le choix par défaut).

use serde::Serialize;

use crate::types::{FormatCategory, TargetFormat};
use crate::FormatError;

/// Forme de la sortie produite par un driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputLayout {
    /// Un seul fichier
    SingleFile,
    /// Plusieurs fichiers compagnons livrés en archive
    Bundle,
}

/// Description d'un driver de sortie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSpec {
    pub target: TargetFormat,

    /// Nom du driver
    pub driver: &'static str,

    /// Extension du fichier produit
    pub extension: &'static str,

    pub layout: OutputLayout,
}

/// Table immuable de drivers pour une catégorie
#[derive(Debug)]
pub struct DriverTable {
    pub category: FormatCategory,
    entries: &'static [DriverSpec],
}

impl DriverTable {
    /// Recherche le driver d'un format cible
    ///
    /// Un format absent de la table est une erreur de programmation côté appelant
    /// (les choix proposés viennent de cette même table).
    pub fn lookup(&self, target: TargetFormat) -> Result<&'static DriverSpec, FormatError> {
        self.entries
            .iter()
            .find(|spec| spec.target == target)
            .ok_or(FormatError::UnsupportedTarget {
                category: self.category,
                target,
            })
    }

    pub fn targets(&self) -> impl Iterator<Item = TargetFormat> + '_ {
        self.entries.iter().map(|spec| spec.target)
    }

    pub fn entries(&self) -> &'static [DriverSpec] {
        self.entries
    }
}

const fn spec(
    target: TargetFormat,
    driver: &'static str,
    extension: &'static str,
    layout: OutputLayout,
) -> DriverSpec {
    DriverSpec {
        target,
        driver,
        extension,
        layout,
    }
}

pub const VECTOR_DRIVERS: DriverTable = DriverTable {
    category: FormatCategory::Vector,
    entries: &[
        spec(TargetFormat::GeoJson, "GeoJSON", "geojson", OutputLayout::SingleFile),
        spec(TargetFormat::Gpkg, "GPKG", "gpkg", OutputLayout::SingleFile),
        spec(TargetFormat::EsriShapefile, "ESRI Shapefile", "shp", OutputLayout::Bundle),
        spec(TargetFormat::Kml, "KML", "kml", OutputLayout::SingleFile),
    ],
};

pub const RASTER_DRIVERS: DriverTable = DriverTable {
    category: FormatCategory::Raster,
    entries: &[
        spec(TargetFormat::GTiff, "GTiff", "tif", OutputLayout::SingleFile),
        spec(TargetFormat::Cog, "COG", "tif", OutputLayout::SingleFile),
        spec(TargetFormat::Jpeg, "JPEG", "jpg", OutputLayout::SingleFile),
        spec(TargetFormat::Png, "PNG", "png", OutputLayout::SingleFile),
    ],
};

pub const POINT_CLOUD_DRIVERS: DriverTable = DriverTable {
    category: FormatCategory::PointCloud,
    entries: &[
        spec(TargetFormat::Csv, "CSV", "csv", OutputLayout::SingleFile),
        spec(TargetFormat::Las, "LAS", "las", OutputLayout::SingleFile),
        spec(TargetFormat::Laz, "LAZ", "laz", OutputLayout::SingleFile),
    ],
};

pub const DELIMITED_DRIVERS: DriverTable = DriverTable {
    category: FormatCategory::DelimitedText,
    entries: &[spec(
        TargetFormat::EsriShapefile,
        "ESRI Shapefile",
        "shp",
        OutputLayout::Bundle,
    )],
};

/// Table de la catégorie (None pour `Unsupported`)
pub fn table_for(category: FormatCategory) -> Option<&'static DriverTable> {
    match category {
        FormatCategory::Vector => Some(&VECTOR_DRIVERS),
        FormatCategory::Raster => Some(&RASTER_DRIVERS),
        FormatCategory::PointCloud => Some(&POINT_CLOUD_DRIVERS),
        FormatCategory::DelimitedText => Some(&DELIMITED_DRIVERS),
        FormatCategory::Unsupported => None,
    }
}

/// Toutes les tables, dans l'ordre de priorité de détection
pub fn all_tables() -> [&'static DriverTable; 4] {
    [
        &VECTOR_DRIVERS,
        &RASTER_DRIVERS,
        &POINT_CLOUD_DRIVERS,
        &DELIMITED_DRIVERS,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_target() {
        let spec = VECTOR_DRIVERS.lookup(TargetFormat::EsriShapefile).unwrap();
        assert_eq!(spec.extension, "shp");
        assert_eq!(spec.layout, OutputLayout::Bundle);

        let spec = RASTER_DRIVERS.lookup(TargetFormat::Cog).unwrap();
        assert_eq!(spec.driver, "COG");
    }

    #[test]
    fn test_lookup_foreign_target_fails() {
        let result = RASTER_DRIVERS.lookup(TargetFormat::GeoJson);
        match result {
            Err(FormatError::UnsupportedTarget { category, target }) => {
                assert_eq!(category, FormatCategory::Raster);
                assert_eq!(target, TargetFormat::GeoJson);
            }
            _ => panic!("Expected UnsupportedTarget error"),
        }
    }

    #[test]
    fn test_tables_cover_categories() {
        for table in all_tables() {
            assert_eq!(table_for(table.category).unwrap().category, table.category);
            assert!(table.targets().count() > 0);
        }
        assert!(table_for(FormatCategory::Unsupported).is_none());
    }
}
