//! GeoTIFF : décodage via le crate tiff, écriture en bandes (strips)

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::{PhotometricInterpretation, SampleFormat, Tag};
use tiff::ColorType;

use super::{GeoTags, Raster, RasterSamples};
use crate::FormatError;

const DRIVER: &str = "GTiff";

/// Valeur ExtraSamples d'un alpha non associé
const UNASSOCIATED_ALPHA: u16 = 2;

/// Gris + alpha 8 bits, absent des types de couleur du crate tiff
struct GrayAlpha8;

impl colortype::ColorType for GrayAlpha8 {
    type Inner = u8;
    const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
    const BITS_PER_SAMPLE: &'static [u16] = &[8, 8];
    const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::Uint, SampleFormat::Uint];
}

struct GrayAlpha16;

impl colortype::ColorType for GrayAlpha16 {
    type Inner = u16;
    const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
    const BITS_PER_SAMPLE: &'static [u16] = &[16, 16];
    const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::Uint, SampleFormat::Uint];
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, FormatError> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?)
}

pub fn dimensions(path: &Path) -> Result<(u32, u32), FormatError> {
    Ok(open_decoder(path)?.dimensions()?)
}

fn band_count(color: ColorType) -> Option<u16> {
    match color {
        ColorType::Gray(_) => Some(1),
        ColorType::GrayA(_) => Some(2),
        ColorType::RGB(_) => Some(3),
        ColorType::RGBA(_) => Some(4),
        _ => None,
    }
}

fn read_f64s<R: std::io::Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<f64>>, FormatError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()?)
}

fn read_ascii<R: std::io::Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<String>, FormatError> {
    Ok(decoder
        .find_tag(tag)?
        .map(|v| v.into_string())
        .transpose()?
        .map(|s| s.trim_end_matches('\0').to_string()))
}

/// Tags GeoTIFF de la première image
pub fn read_georef<R: std::io::Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTags, FormatError> {
    Ok(GeoTags {
        pixel_scale: read_f64s(decoder, Tag::ModelPixelScaleTag)?,
        tiepoints: read_f64s(decoder, Tag::ModelTiepointTag)?,
        transformation: read_f64s(decoder, Tag::ModelTransformationTag)?,
        key_directory: decoder.find_tag_unsigned_vec::<u16>(Tag::GeoKeyDirectoryTag)?,
        double_params: read_f64s(decoder, Tag::GeoDoubleParamsTag)?,
        ascii_params: read_ascii(decoder, Tag::GeoAsciiParamsTag)?,
        nodata: read_ascii(decoder, Tag::GdalNodata)?,
    })
}

fn decoded_type_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::I8(_) => "i8",
        DecodingResult::U64(_) => "u64",
        DecodingResult::I64(_) => "i64",
        _ => "unknown",
    }
}

/// Lit la première image d'un TIFF
pub fn read(path: &Path) -> Result<Raster, FormatError> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;
    let georef = read_georef(&mut decoder)?;

    let samples = match decoder.read_image()? {
        DecodingResult::U8(v) => RasterSamples::U8(v),
        DecodingResult::U16(v) => RasterSamples::U16(v),
        DecodingResult::I16(v) => RasterSamples::I16(v),
        DecodingResult::U32(v) => RasterSamples::U32(v),
        DecodingResult::I32(v) => RasterSamples::I32(v),
        DecodingResult::F32(v) => RasterSamples::F32(v),
        DecodingResult::F64(v) => RasterSamples::F64(v),
        other => {
            return Err(FormatError::UnsupportedSampleLayout {
                driver: DRIVER,
                bands: band_count(color).unwrap_or(0),
                sample: decoded_type_name(&other),
            })
        }
    };
    let bands = band_count(color).ok_or(FormatError::UnsupportedSampleLayout {
        driver: DRIVER,
        bands: 0,
        sample: samples.type_name(),
    })?;

    Ok(Raster::new(width, height, bands, samples)?.with_georef(Some(georef)))
}

fn write_geo_tags<W: Write + Seek, C: colortype::ColorType, K: TiffKind>(
    image: &mut ImageEncoder<'_, W, C, K>,
    georef: &GeoTags,
) -> Result<(), FormatError> {
    let encoder = image.encoder();
    if let Some(v) = &georef.pixel_scale {
        encoder.write_tag(Tag::ModelPixelScaleTag, &v[..])?;
    }
    if let Some(v) = &georef.tiepoints {
        encoder.write_tag(Tag::ModelTiepointTag, &v[..])?;
    }
    if let Some(v) = &georef.transformation {
        encoder.write_tag(Tag::ModelTransformationTag, &v[..])?;
    }
    if let Some(v) = &georef.key_directory {
        encoder.write_tag(Tag::GeoKeyDirectoryTag, &v[..])?;
    }
    if let Some(v) = &georef.double_params {
        encoder.write_tag(Tag::GeoDoubleParamsTag, &v[..])?;
    }
    if let Some(v) = &georef.ascii_params {
        encoder.write_tag(Tag::GeoAsciiParamsTag, v.as_str())?;
    }
    if let Some(v) = &georef.nodata {
        encoder.write_tag(Tag::GdalNodata, v.as_str())?;
    }
    Ok(())
}

fn write_image<W: Write + Seek, C: colortype::ColorType>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster,
    data: &[C::Inner],
) -> Result<(), FormatError>
where
    [C::Inner]: tiff::encoder::TiffValue,
{
    let mut image = encoder.new_image::<C>(raster.width, raster.height)?;
    if raster.bands == 2 || raster.bands == 4 {
        image
            .encoder()
            .write_tag(Tag::ExtraSamples, UNASSOCIATED_ALPHA)?;
    }
    if let Some(georef) = &raster.georef {
        write_geo_tags(&mut image, georef)?;
    }
    image.write_data(data)?;
    Ok(())
}

fn unsupported(raster: &Raster) -> FormatError {
    FormatError::UnsupportedSampleLayout {
        driver: DRIVER,
        bands: raster.bands,
        sample: raster.samples.type_name(),
    }
}

/// Écrit un GeoTIFF non compressé, une image, tags géo recopiés
pub fn write(raster: &Raster, output_path: &Path) -> Result<(), FormatError> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(&mut writer)?;

    match (&raster.samples, raster.bands) {
        (RasterSamples::U8(v), 1) => write_image::<_, colortype::Gray8>(&mut encoder, raster, v)?,
        (RasterSamples::U8(v), 2) => write_image::<_, GrayAlpha8>(&mut encoder, raster, v)?,
        (RasterSamples::U8(v), 3) => write_image::<_, colortype::RGB8>(&mut encoder, raster, v)?,
        (RasterSamples::U8(v), 4) => write_image::<_, colortype::RGBA8>(&mut encoder, raster, v)?,
        (RasterSamples::U16(v), 1) => write_image::<_, colortype::Gray16>(&mut encoder, raster, v)?,
        (RasterSamples::U16(v), 2) => write_image::<_, GrayAlpha16>(&mut encoder, raster, v)?,
        (RasterSamples::U16(v), 3) => write_image::<_, colortype::RGB16>(&mut encoder, raster, v)?,
        (RasterSamples::U16(v), 4) => {
            write_image::<_, colortype::RGBA16>(&mut encoder, raster, v)?
        }
        (RasterSamples::I16(v), 1) => {
            write_image::<_, colortype::GrayI16>(&mut encoder, raster, v)?
        }
        (RasterSamples::U32(v), 1) => write_image::<_, colortype::Gray32>(&mut encoder, raster, v)?,
        (RasterSamples::U32(v), 3) => write_image::<_, colortype::RGB32>(&mut encoder, raster, v)?,
        (RasterSamples::U32(v), 4) => {
            write_image::<_, colortype::RGBA32>(&mut encoder, raster, v)?
        }
        (RasterSamples::I32(v), 1) => {
            write_image::<_, colortype::GrayI32>(&mut encoder, raster, v)?
        }
        (RasterSamples::F32(v), 1) => {
            write_image::<_, colortype::Gray32Float>(&mut encoder, raster, v)?
        }
        (RasterSamples::F32(v), 3) => {
            write_image::<_, colortype::RGB32Float>(&mut encoder, raster, v)?
        }
        (RasterSamples::F32(v), 4) => {
            write_image::<_, colortype::RGBA32Float>(&mut encoder, raster, v)?
        }
        (RasterSamples::F64(v), 1) => {
            write_image::<_, colortype::Gray64Float>(&mut encoder, raster, v)?
        }
        (RasterSamples::F64(v), 3) => {
            write_image::<_, colortype::RGB64Float>(&mut encoder, raster, v)?
        }
        (RasterSamples::F64(v), 4) => {
            write_image::<_, colortype::RGBA64Float>(&mut encoder, raster, v)?
        }
        _ => return Err(unsupported(raster)),
    }
    drop(encoder);
    writer.flush()?;
    Ok(())
}
