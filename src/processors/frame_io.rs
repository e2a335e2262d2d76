//! Decode/encode helpers shared by the built-in processors.

use anyhow::{Context, Result};
use image::io::Reader;
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use std::path::Path;
use tempfile::NamedTempFile;

/// Opens `path` with the decoder matching its content, not its extension
fn reader(path: &Path) -> Result<Reader<std::io::BufReader<std::fs::File>>> {
    Reader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .with_context(|| format!("failed to open {}", path.display()))
}

pub(crate) fn load(path: &Path) -> Result<DynamicImage> {
    reader(path)?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))
}

/// Width and height read from the image header
pub(crate) fn dimensions(path: &Path) -> Result<(u32, u32)> {
    reader(path)?
        .into_dimensions()
        .with_context(|| format!("failed to decode {}", path.display()))
}

/// Writes `image` to `path` through a sibling temp file, so a reader never
/// observes a half-written frame
pub(crate) fn save(image: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unknown image format for {}", path.display()))?;
    let output_format = match format {
        ImageFormat::Jpeg => ImageOutputFormat::Jpeg(jpeg_quality(quality)),
        other => ImageOutputFormat::from(other),
    };

    let dir = path.parent().unwrap_or(Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage {}", path.display()))?;

    // jpeg and png carry no alpha requirements here
    let encodable = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image.clone(),
    };
    encodable
        .write_to(staged.as_file_mut(), output_format)
        .with_context(|| format!("failed to encode {}", path.display()))?;

    staged
        .persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// 0 = best on the pipeline scale, 100 = best for the jpeg encoder
fn jpeg_quality(quality: u8) -> u8 {
    100u8.saturating_sub(quality.min(99))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_load_ignores_a_misleading_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("really-a-png.jpg");
        let mut bytes = std::io::Cursor::new(Vec::new());
        RgbImage::from_pixel(5, 2, Rgb([1, 2, 3]))
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        std::fs::write(&path, bytes.into_inner()).unwrap();

        assert_eq!(dimensions(&path).unwrap(), (5, 2));
        assert_eq!(*load(&path).unwrap().to_rgb8().get_pixel(4, 1), Rgb([1, 2, 3]));
    }

    #[test]
    fn test_dimensions_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(dimensions(&path).is_err());
    }

    #[test]
    fn test_save_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000001.png");
        std::fs::write(&path, b"not an image").unwrap();

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])));
        save(&image, &path, 0).unwrap();

        let reloaded = load(&path).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (4, 3));
        assert_eq!(reloaded.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_jpeg_quality_scale() {
        assert_eq!(jpeg_quality(0), 100);
        assert_eq!(jpeg_quality(35), 65);
        assert_eq!(jpeg_quality(100), 1);
    }
}
