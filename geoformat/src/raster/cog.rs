//! Cloud Optimized GeoTIFF
//!
//! Le crate tiff n'écrit que des strips : la variante tuilée est écrite à la main.
//! Disposition du fichier (little-endian, TIFF classique) :
//!
//! ```text
//! header (8) | IFD | valeurs hors IFD | tuiles 256x256 ligne par ligne
//! ```
//!
//! L'IFD précède les données pour qu'un lecteur HTTP puisse lire toutes les
//! métadonnées en une requête. Pas d'overviews, pas de compression.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::Raster;
use crate::FormatError;

/// Côté des tuiles en pixels
pub const TILE_SIZE: u32 = 256;

const DRIVER: &str = "COG";

// Types de champs TIFF
const SHORT: u16 = 3;
const LONG: u16 = 4;
const ASCII: u16 = 2;
const DOUBLE: u16 = 12;

const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC: u16 = 262;
const SAMPLES_PER_PIXEL: u16 = 277;
const PLANAR_CONFIGURATION: u16 = 284;
const TILE_WIDTH: u16 = 322;
const TILE_LENGTH: u16 = 323;
const TILE_OFFSETS: u16 = 324;
const TILE_BYTE_COUNTS: u16 = 325;
const EXTRA_SAMPLES: u16 = 338;
const SAMPLE_FORMAT: u16 = 339;
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

/// Entrée d'IFD avec ses valeurs déjà sérialisées
struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn shorts(tag: u16, values: &[u16]) -> Self {
        Self {
            tag,
            kind: SHORT,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn longs(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            kind: LONG,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn doubles(tag: u16, values: &[f64]) -> Self {
        Self {
            tag,
            kind: DOUBLE,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            kind: ASCII,
            count: data.len() as u32,
            data,
        }
    }

    /// Les valeurs de 4 octets ou moins tiennent dans l'entrée
    fn is_inline(&self) -> bool {
        self.data.len() <= 4
    }
}

/// Découpage en tuiles d'un raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub across: u32,
    pub down: u32,
    /// Octets d'une tuile complète
    pub tile_bytes: u64,
}

impl TileGrid {
    pub fn for_raster(raster: &Raster) -> Self {
        let across = raster.width.div_ceil(TILE_SIZE);
        let down = raster.height.div_ceil(TILE_SIZE);
        let pixel_bytes = raster.bands as u64 * raster.samples.sample_size() as u64;
        Self {
            across,
            down,
            tile_bytes: TILE_SIZE as u64 * TILE_SIZE as u64 * pixel_bytes,
        }
    }

    pub fn count(&self) -> u32 {
        self.across * self.down
    }
}

fn build_entries(raster: &Raster, grid: &TileGrid) -> Vec<Entry> {
    let bands = raster.bands as usize;
    let bits = (raster.samples.sample_size() * 8) as u16;
    let photometric = if raster.bands >= 3 { 2 } else { 1 };

    let mut entries = vec![
        Entry::longs(IMAGE_WIDTH, &[raster.width]),
        Entry::longs(IMAGE_LENGTH, &[raster.height]),
        Entry::shorts(BITS_PER_SAMPLE, &vec![bits; bands]),
        Entry::shorts(COMPRESSION, &[1]),
        Entry::shorts(PHOTOMETRIC, &[photometric]),
        Entry::shorts(SAMPLES_PER_PIXEL, &[raster.bands]),
        Entry::shorts(PLANAR_CONFIGURATION, &[1]),
        Entry::shorts(TILE_WIDTH, &[TILE_SIZE as u16]),
        Entry::shorts(TILE_LENGTH, &[TILE_SIZE as u16]),
        // Offsets remplis une fois la disposition connue
        Entry::longs(TILE_OFFSETS, &vec![0; grid.count() as usize]),
        Entry::longs(TILE_BYTE_COUNTS, &vec![grid.tile_bytes as u32; grid.count() as usize]),
    ];
    if raster.bands == 2 || raster.bands == 4 {
        // Alpha non associé
        entries.push(Entry::shorts(EXTRA_SAMPLES, &[2]));
    }
    entries.push(Entry::shorts(
        SAMPLE_FORMAT,
        &vec![raster.samples.sample_format(); bands],
    ));

    if let Some(georef) = &raster.georef {
        if let Some(v) = &georef.pixel_scale {
            entries.push(Entry::doubles(MODEL_PIXEL_SCALE, v));
        }
        if let Some(v) = &georef.tiepoints {
            entries.push(Entry::doubles(MODEL_TIEPOINT, v));
        }
        if let Some(v) = &georef.transformation {
            entries.push(Entry::doubles(MODEL_TRANSFORMATION, v));
        }
        if let Some(v) = &georef.key_directory {
            entries.push(Entry::shorts(GEO_KEY_DIRECTORY, v));
        }
        if let Some(v) = &georef.double_params {
            entries.push(Entry::doubles(GEO_DOUBLE_PARAMS, v));
        }
        if let Some(v) = &georef.ascii_params {
            entries.push(Entry::ascii(GEO_ASCII_PARAMS, v));
        }
        if let Some(v) = &georef.nodata {
            entries.push(Entry::ascii(GDAL_NODATA, v));
        }
    }

    entries.sort_by_key(|e| e.tag);
    entries
}

/// Octets d'une tuile, complétée par des zéros hors de l'image
fn tile_bytes(raw: &[u8], raster: &Raster, grid: &TileGrid, col: u32, row: u32) -> Vec<u8> {
    let pixel_bytes = raster.bands as usize * raster.samples.sample_size();
    let row_bytes = raster.width as usize * pixel_bytes;
    let tile_row_bytes = TILE_SIZE as usize * pixel_bytes;
    let mut tile = vec![0u8; grid.tile_bytes as usize];

    let x0 = (col * TILE_SIZE) as usize;
    let y0 = (row * TILE_SIZE) as usize;
    let width = (raster.width as usize - x0).min(TILE_SIZE as usize);
    let height = (raster.height as usize - y0).min(TILE_SIZE as usize);

    for y in 0..height {
        let src = (y0 + y) * row_bytes + x0 * pixel_bytes;
        let dst = y * tile_row_bytes;
        let len = width * pixel_bytes;
        tile[dst..dst + len].copy_from_slice(&raw[src..src + len]);
    }
    tile
}

/// Écrit un COG tuilé, IFD en tête de fichier
pub fn write(raster: &Raster, output_path: &Path) -> Result<(), FormatError> {
    if !matches!(raster.bands, 1..=4) {
        return Err(FormatError::UnsupportedSampleLayout {
            driver: DRIVER,
            bands: raster.bands,
            sample: raster.samples.type_name(),
        });
    }

    let grid = TileGrid::for_raster(raster);
    let mut entries = build_entries(raster, &grid);

    // Disposition : header, IFD, valeurs hors IFD (alignées sur 2), tuiles
    let ifd_size = 2 + 12 * entries.len() as u64 + 4;
    let mut cursor = 8 + ifd_size;
    let mut value_offsets = Vec::with_capacity(entries.len());
    for entry in &entries {
        if entry.is_inline() {
            value_offsets.push(None);
        } else {
            cursor += cursor % 2;
            value_offsets.push(Some(cursor));
            cursor += entry.data.len() as u64;
        }
    }
    cursor += cursor % 2;
    let data_start = cursor;

    let total = data_start + grid.tile_bytes * grid.count() as u64;
    if total > u32::MAX as u64 {
        return Err(FormatError::RasterTooLarge(total));
    }

    if let Some(offsets) = entries.iter_mut().find(|e| e.tag == TILE_OFFSETS) {
        offsets.data = (0..grid.count() as u64)
            .flat_map(|i| ((data_start + i * grid.tile_bytes) as u32).to_le_bytes())
            .collect();
    }

    let file = File::create(output_path)?;
    let mut out = PositionedWriter::new(BufWriter::new(file));

    out.put(b"II")?;
    out.put(&42u16.to_le_bytes())?;
    out.put(&8u32.to_le_bytes())?;

    out.put(&(entries.len() as u16).to_le_bytes())?;
    for (entry, offset) in entries.iter().zip(&value_offsets) {
        out.put(&entry.tag.to_le_bytes())?;
        out.put(&entry.kind.to_le_bytes())?;
        out.put(&entry.count.to_le_bytes())?;
        match offset {
            Some(offset) => out.put(&(*offset as u32).to_le_bytes())?,
            None => {
                let mut inline = [0u8; 4];
                inline[..entry.data.len()].copy_from_slice(&entry.data);
                out.put(&inline)?;
            }
        }
    }
    // Pas d'IFD suivant
    out.put(&0u32.to_le_bytes())?;

    for (entry, offset) in entries.iter().zip(&value_offsets) {
        if let Some(offset) = offset {
            out.pad_to(*offset)?;
            out.put(&entry.data)?;
        }
    }
    out.pad_to(data_start)?;

    let raw = raster.samples.to_le_bytes();
    for row in 0..grid.down {
        for col in 0..grid.across {
            out.put(&tile_bytes(&raw, raster, &grid, col, row))?;
        }
    }
    out.finish()?;

    debug!(
        path = %output_path.display(),
        tiles = grid.count(),
        bytes = total,
        "COG written"
    );
    Ok(())
}

/// Writer qui suit la position courante pour aligner les blocs
struct PositionedWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> PositionedWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), FormatError> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Complète par des zéros jusqu'à `offset`
    fn pad_to(&mut self, offset: u64) -> Result<(), FormatError> {
        if offset > self.position {
            let padding = vec![0u8; (offset - self.position) as usize];
            self.put(&padding)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), FormatError> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::gradient;
    use crate::raster::{gtiff, GeoTags, RasterSamples};
    use tiff::decoder::{ChunkType, Decoder, DecodingResult};
    use tiff::tags::Tag;

    #[test]
    fn test_tile_grid() {
        let raster = gradient(300, 10, 3);
        let grid = TileGrid::for_raster(&raster);
        assert_eq!((grid.across, grid.down), (2, 1));
        assert_eq!(grid.tile_bytes, 256 * 256 * 3);
    }

    #[test]
    fn test_cog_is_readable_as_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted.tif");
        let georef = GeoTags {
            pixel_scale: Some(vec![10.0, 10.0, 0.0]),
            tiepoints: Some(vec![0.0, 0.0, 0.0, 500_000.0, 6_000_000.0, 0.0]),
            key_directory: Some(vec![1, 1, 0, 1, 3072, 0, 1, 2154]),
            ascii_params: Some("RGF93 / Lambert-93|".to_string()),
            ..GeoTags::default()
        };
        let raster = gradient(300, 270, 3).with_georef(Some(georef));

        write(&raster, &path).unwrap();

        let back = gtiff::read(&path).unwrap();
        assert_eq!(back, raster);
    }

    #[test]
    fn test_cog_ifd_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.tif");
        write(&gradient(8, 8, 1), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"II*\0");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 8);
    }

    #[test]
    fn test_cog_u16_and_float() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("u16.tif");
        let samples = (0..(260 * 3)).map(|i| (i * 200) as u16).collect();
        let raster = Raster::new(260, 3, 1, RasterSamples::U16(samples)).unwrap();
        write(&raster, &path).unwrap();
        assert_eq!(gtiff::read(&path).unwrap().samples, raster.samples);

        let path = dir.path().join("f32.tif");
        let samples = (0..16).map(|i| i as f32 / 4.0).collect();
        let raster = Raster::new(4, 4, 1, RasterSamples::F32(samples)).unwrap();
        write(&raster, &path).unwrap();
        assert_eq!(gtiff::read(&path).unwrap().samples, raster.samples);
    }

    #[test]
    fn test_edge_tile_offsets_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.tif");
        let raster = gradient(300, 270, 1);
        write(&raster, &path).unwrap();

        let file = File::open(&path).unwrap();
        let mut decoder = Decoder::new(std::io::BufReader::new(file)).unwrap();
        assert_eq!(decoder.get_chunk_type(), ChunkType::Tile);
        assert_eq!(decoder.chunk_dimensions(), (TILE_SIZE, TILE_SIZE));

        let offsets = decoder.get_tag_u64_vec(Tag::TileOffsets).unwrap();
        let tile = 256 * 256;
        assert_eq!(offsets.len(), 4);
        assert_eq!(offsets[0] % 2, 0);
        for (i, offset) in offsets.iter().enumerate() {
            assert_eq!(*offset, offsets[0] + i as u64 * tile);
        }
        let file_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(file_len, offsets[0] + 4 * tile);

        // Tuile en bas à droite : 44 x 14 pixels utiles
        assert_eq!(decoder.chunk_data_dimensions(3), (44, 14));
        let DecodingResult::U8(chunk) = decoder.read_chunk(3).unwrap() else {
            panic!("Expected u8 tile");
        };
        let RasterSamples::U8(source) = &raster.samples else {
            panic!("Expected u8 raster");
        };
        for y in 0..14usize {
            for x in 0..44usize {
                assert_eq!(chunk[y * 44 + x], source[(256 + y) * 300 + 256 + x]);
            }
        }
    }

    #[test]
    fn test_cog_signed_and_double() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("srtm.tif");
        let samples = (0..(257 * 2)).map(|i| i as i16 - 100).collect();
        let raster = Raster::new(257, 2, 1, RasterSamples::I16(samples)).unwrap();
        write(&raster, &path).unwrap();
        assert_eq!(gtiff::read(&path).unwrap().samples, raster.samples);

        let path = dir.path().join("f64.tif");
        let samples = (0..9).map(|i| i as f64 * 0.125).collect();
        let raster = Raster::new(3, 3, 1, RasterSamples::F64(samples)).unwrap();
        write(&raster, &path).unwrap();
        assert_eq!(gtiff::read(&path).unwrap().samples, raster.samples);
    }
}
