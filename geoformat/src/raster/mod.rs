//! Lecture et conversion raster
//!
//! Les rasters sont chargés entièrement en mémoire (pixels entrelacés, ligne par
//! ligne) puis réécrits dans le conteneur cible, sans rééchantillonnage ni sélection
//! de bandes. Les tags GeoTIFF sont conservés pour les sorties TIFF.

pub mod bitmap;
pub mod cog;
pub mod gtiff;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::drivers::RASTER_DRIVERS;
use crate::sandbox::remove_existing;
use crate::types::{FormatCategory, OutputArtifact, TargetFormat};
use crate::FormatError;

/// Échantillons d'un raster, entrelacés par pixel
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl RasterSamples {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Taille d'un échantillon en octets
    pub fn sample_size(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) | Self::I16(_) => 2,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 4,
            Self::F64(_) => 8,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::I16(_) => "i16",
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
        }
    }

    /// Valeur du tag TIFF SampleFormat (1 non signé, 2 signé, 3 flottant)
    pub fn sample_format(&self) -> u16 {
        match self {
            Self::U8(_) | Self::U16(_) | Self::U32(_) => 1,
            Self::I16(_) | Self::I32(_) => 2,
            Self::F32(_) | Self::F64(_) => 3,
        }
    }

    /// Octets little-endian de tous les échantillons
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::U8(v) => v.clone(),
            Self::U16(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
            Self::I16(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
            Self::U32(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
            Self::I32(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
            Self::F32(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
            Self::F64(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}

/// Tags de géoréférencement GeoTIFF, recopiés tels quels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoTags {
    pub pixel_scale: Option<Vec<f64>>,
    pub tiepoints: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub key_directory: Option<Vec<u16>>,
    pub double_params: Option<Vec<f64>>,
    pub ascii_params: Option<String>,
    pub nodata: Option<String>,
}

impl GeoTags {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Raster en mémoire
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub samples: RasterSamples,
    pub georef: Option<GeoTags>,
}

impl Raster {
    /// Vérifie la cohérence dimensions / nombre d'échantillons
    pub fn new(
        width: u32,
        height: u32,
        bands: u16,
        samples: RasterSamples,
    ) -> Result<Self, FormatError> {
        let expected = width as usize * height as usize * bands as usize;
        if samples.len() != expected {
            return Err(FormatError::parse_error(
                "raster",
                format!(
                    "{} samples for {}x{}x{} raster",
                    samples.len(),
                    width,
                    height,
                    bands
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            bands,
            samples,
            georef: None,
        })
    }

    pub fn with_georef(mut self, georef: Option<GeoTags>) -> Self {
        self.georef = georef.filter(|g| !g.is_empty());
        self
    }

    /// Ouvre un raster TIFF ou image
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        match sniff(path)? {
            RasterDriver::Tiff => gtiff::read(path),
            RasterDriver::Image => bitmap::read(path),
        }
    }
}

/// Famille de décodeur pour un fichier raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterDriver {
    Tiff,
    Image,
}

const TIFF_MAGICS: [[u8; 4]; 4] = [
    [b'I', b'I', 42, 0],
    [b'M', b'M', 0, 42],
    [b'I', b'I', 43, 0],
    [b'M', b'M', 0, 43],
];

/// Choisit le décodeur d'après les premiers octets
pub fn sniff(path: &Path) -> Result<RasterDriver, FormatError> {
    let mut head = [0u8; 4];
    let read = File::open(path)?.read(&mut head)?;
    if read == 4 && TIFF_MAGICS.contains(&head) {
        Ok(RasterDriver::Tiff)
    } else {
        Ok(RasterDriver::Image)
    }
}

/// Dimensions d'un raster sans décoder les pixels
pub fn probe(path: &Path) -> Result<(u32, u32), FormatError> {
    match sniff(path)? {
        RasterDriver::Tiff => gtiff::dimensions(path),
        RasterDriver::Image => bitmap::dimensions(path),
    }
}

/// Convertit `input` vers le conteneur `target`
pub fn convert_raster(
    input: &Path,
    output: &Path,
    target: TargetFormat,
) -> Result<OutputArtifact, FormatError> {
    let spec = RASTER_DRIVERS.lookup(target)?;
    let raster = Raster::open(input)?;

    info!(
        input = %input.display(),
        target = spec.driver,
        width = raster.width,
        height = raster.height,
        bands = raster.bands,
        sample = raster.samples.type_name(),
        georeferenced = raster.georef.is_some(),
        "Converting raster"
    );

    remove_existing(output)?;
    match target {
        TargetFormat::GTiff => gtiff::write(&raster, output)?,
        TargetFormat::Cog => cog::write(&raster, output)?,
        TargetFormat::Jpeg => bitmap::write(&raster, output, image::ImageFormat::Jpeg)?,
        TargetFormat::Png => bitmap::write(&raster, output, image::ImageFormat::Png)?,
        other => {
            return Err(FormatError::UnsupportedTarget {
                category: FormatCategory::Raster,
                target: other,
            })
        }
    }

    Ok(OutputArtifact::single(output.to_path_buf()))
}
