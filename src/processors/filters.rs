//! Per-pixel filters that need nothing but the target frames.

use super::{for_each_frame, frame_io, FrameProcessor, ProcessorContext};
use anyhow::Result;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Grayscale,
    Invert,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Grayscale => "grayscale",
            FilterKind::Invert => "invert",
        }
    }

    fn apply(&self, image: DynamicImage) -> DynamicImage {
        match self {
            // kept as rgb so every frame of a sequence shares one pixel layout
            FilterKind::Grayscale => DynamicImage::ImageRgb8(image.grayscale().to_rgb8()),
            FilterKind::Invert => {
                let mut image = image;
                image.invert();
                image
            }
        }
    }
}

/// Frame processor wrapping a [`FilterKind`]
#[derive(Debug, Clone)]
pub struct PixelFilter {
    kind: FilterKind,
    context: ProcessorContext,
}

impl PixelFilter {
    pub fn new(kind: FilterKind, context: ProcessorContext) -> Self {
        Self { kind, context }
    }

    fn filter_file(&self, input: &Path, output: &Path) -> Result<()> {
        let image = frame_io::load(input)?;
        frame_io::save(&self.kind.apply(image), output, self.context.temp_frame_quality)
    }
}

impl FrameProcessor for PixelFilter {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn process_image(&self, _source: &Path, target: &Path, output: &Path) -> Result<()> {
        debug!("{}: {} -> {}", self.name(), target.display(), output.display());
        self.filter_file(target, output)
    }

    fn process_video(&self, _source: &Path, frames: &[PathBuf]) -> Result<()> {
        for_each_frame(frames, &self.context, self.name(), |frame| {
            self.filter_file(frame, frame)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_context;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_frame(path: &Path, color: [u8; 3]) {
        RgbImage::from_pixel(8, 8, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_invert_image_into_output() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_frame(&target, [10, 200, 30]);

        let filter = PixelFilter::new(FilterKind::Invert, test_context());
        filter.process_image(Path::new("unused"), &target, &output).unwrap();

        let inverted = image::open(&output).unwrap().to_rgb8();
        assert_eq!(inverted.get_pixel(3, 3), &Rgb([245, 55, 225]));
        let original = image::open(&target).unwrap().to_rgb8();
        assert_eq!(original.get_pixel(3, 3), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_grayscale_video_frames_in_place() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<PathBuf> = (1..=5).map(|i| dir.path().join(format!("{:06}.png", i))).collect();
        for frame in &frames {
            write_frame(frame, [255, 0, 0]);
        }

        let filter = PixelFilter::new(FilterKind::Grayscale, test_context());
        filter.process_video(Path::new("unused"), &frames).unwrap();

        for frame in &frames {
            let pixel = *image::open(frame).unwrap().to_rgb8().get_pixel(0, 0);
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn test_unreadable_frame_fails_the_sequence() {
        let dir = TempDir::new().unwrap();
        let frame = dir.path().join("000001.png");
        std::fs::write(&frame, b"garbage").unwrap();

        let filter = PixelFilter::new(FilterKind::Invert, test_context());
        assert!(filter.process_video(Path::new("unused"), &[frame]).is_err());
    }
}
