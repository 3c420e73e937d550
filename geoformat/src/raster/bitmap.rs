//! Images non géoréférencées (PNG, JPEG, GIF, BMP) via le crate image

use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader};

use super::{Raster, RasterSamples};
use crate::FormatError;

/// Formats d'image acceptés en entrée
const READABLE: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

fn reader(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, FormatError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    match reader.format() {
        Some(format) if READABLE.contains(&format) => Ok(reader),
        _ => Err(FormatError::unrecognized(
            "raster",
            format!("{} is not a supported image", path.display()),
        )),
    }
}

pub fn dimensions(path: &Path) -> Result<(u32, u32), FormatError> {
    Ok(reader(path)?.into_dimensions()?)
}

/// Décode l'image ; les formats exotiques sont ramenés en RGBA 8 bits
pub fn read(path: &Path) -> Result<Raster, FormatError> {
    let image = reader(path)?.decode()?;
    let (width, height) = (image.width(), image.height());

    let (bands, samples) = match image {
        DynamicImage::ImageLuma8(buf) => (1, RasterSamples::U8(buf.into_raw())),
        DynamicImage::ImageLumaA8(buf) => (2, RasterSamples::U8(buf.into_raw())),
        DynamicImage::ImageRgb8(buf) => (3, RasterSamples::U8(buf.into_raw())),
        DynamicImage::ImageRgba8(buf) => (4, RasterSamples::U8(buf.into_raw())),
        DynamicImage::ImageLuma16(buf) => (1, RasterSamples::U16(buf.into_raw())),
        DynamicImage::ImageLumaA16(buf) => (2, RasterSamples::U16(buf.into_raw())),
        DynamicImage::ImageRgb16(buf) => (3, RasterSamples::U16(buf.into_raw())),
        DynamicImage::ImageRgba16(buf) => (4, RasterSamples::U16(buf.into_raw())),
        DynamicImage::ImageRgb32F(buf) => (3, RasterSamples::F32(buf.into_raw())),
        DynamicImage::ImageRgba32F(buf) => (4, RasterSamples::F32(buf.into_raw())),
        other => (4, RasterSamples::U8(other.to_rgba8().into_raw())),
    };

    Raster::new(width, height, bands, samples)
}

fn unsupported(raster: &Raster, format: ImageFormat) -> FormatError {
    FormatError::UnsupportedSampleLayout {
        driver: format.extensions_str().first().copied().unwrap_or("image"),
        bands: raster.bands,
        sample: raster.samples.type_name(),
    }
}

/// Reconstruit une `DynamicImage` depuis les échantillons entrelacés
fn to_dynamic(raster: &Raster) -> Option<DynamicImage> {
    let (w, h) = (raster.width, raster.height);
    let image = match (&raster.samples, raster.bands) {
        (RasterSamples::U8(v), 1) => DynamicImage::ImageLuma8(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U8(v), 2) => DynamicImage::ImageLumaA8(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U8(v), 3) => DynamicImage::ImageRgb8(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U8(v), 4) => DynamicImage::ImageRgba8(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U16(v), 1) => DynamicImage::ImageLuma16(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U16(v), 2) => DynamicImage::ImageLumaA16(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U16(v), 3) => DynamicImage::ImageRgb16(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::U16(v), 4) => DynamicImage::ImageRgba16(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::F32(v), 3) => DynamicImage::ImageRgb32F(ImageBuffer::from_raw(w, h, v.clone())?),
        (RasterSamples::F32(v), 4) => DynamicImage::ImageRgba32F(ImageBuffer::from_raw(w, h, v.clone())?),
        _ => return None,
    };
    Some(image)
}

/// Encode le raster en PNG ou JPEG ; le géoréférencement est perdu
///
/// Les combinaisons que le codec ne sait pas porter (alpha ou 16 bits en JPEG,
/// flottants) échouent via l'erreur de l'encodeur.
pub fn write(raster: &Raster, output_path: &Path, format: ImageFormat) -> Result<(), FormatError> {
    let image = to_dynamic(raster).ok_or_else(|| unsupported(raster, format))?;
    image.save_with_format(output_path, format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::gradient;

    #[test]
    fn test_png_roundtrip_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let raster = gradient(12, 7, 4);

        write(&raster, &path, ImageFormat::Png).unwrap();

        assert_eq!(dimensions(&path).unwrap(), (12, 7));
        assert_eq!(read(&path).unwrap(), raster);
    }

    #[test]
    fn test_jpeg_rgb_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        write(&gradient(32, 16, 3), &path, ImageFormat::Jpeg).unwrap();

        let back = read(&path).unwrap();
        assert_eq!((back.width, back.height, back.bands), (32, 16, 3));
    }

    #[test]
    fn test_float_gray_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let raster = Raster::new(2, 2, 1, RasterSamples::F32(vec![0.0; 4])).unwrap();
        let result = write(&raster, &dir.path().join("dem.png"), ImageFormat::Png);
        assert!(matches!(
            result,
            Err(FormatError::UnsupportedSampleLayout { bands: 1, .. })
        ));
    }

    #[test]
    fn test_reader_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "x,y\n1,2\n").unwrap();
        assert!(dimensions(&path).is_err());
    }
}
