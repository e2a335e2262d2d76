//! # Overlay Processor
//!
//! Compone l'immagine source, scalata a un quarto della larghezza del frame,
//! nell'angolo in basso a destra di ogni frame del target.
//!
//! ## Responsabilità:
//! - `pre_start` rifiuta un source che non sia un'immagine decodificabile
//! - Il source decodificato resta in cache per tutto il run (una decodifica
//!   sola anche con migliaia di frame), versioni scalate keyed per larghezza
//! - `post_process` svuota la cache

use super::{for_each_frame, frame_io, FrameProcessor, ProcessorContext};
use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Overlay width as a fraction of the frame width
const SCALE_DIVISOR: u32 = 4;

/// Distance from the frame border, as a fraction of the frame width
const MARGIN_DIVISOR: u32 = 40;

pub struct Overlay {
    context: ProcessorContext,
    source: Mutex<Option<Arc<RgbaImage>>>,
    scaled: Mutex<HashMap<u32, Arc<RgbaImage>>>,
}

impl Overlay {
    pub fn new(context: ProcessorContext) -> Self {
        Self {
            context,
            source: Mutex::new(None),
            scaled: Mutex::new(HashMap::new()),
        }
    }

    fn source_image(&self, source: &Path) -> Result<Arc<RgbaImage>> {
        let mut cached = self
            .source
            .lock()
            .map_err(|_| anyhow!("overlay source cache poisoned"))?;
        if let Some(ref image) = *cached {
            return Ok(Arc::clone(image));
        }
        let image = Arc::new(frame_io::load(source)?.to_rgba8());
        *cached = Some(Arc::clone(&image));
        Ok(image)
    }

    fn scaled_for(&self, source: &Path, frame_width: u32) -> Result<Arc<RgbaImage>> {
        if let Some(scaled) = self
            .scaled
            .lock()
            .map_err(|_| anyhow!("overlay scale cache poisoned"))?
            .get(&frame_width)
        {
            return Ok(Arc::clone(scaled));
        }

        let original = self.source_image(source)?;
        let width = (frame_width / SCALE_DIVISOR).max(1);
        let height = ((u64::from(original.height()) * u64::from(width)) / u64::from(original.width().max(1)))
            .max(1) as u32;
        let scaled = Arc::new(imageops::resize(original.as_ref(), width, height, FilterType::Triangle));

        self.scaled
            .lock()
            .map_err(|_| anyhow!("overlay scale cache poisoned"))?
            .insert(frame_width, Arc::clone(&scaled));
        Ok(scaled)
    }

    fn compose(&self, source: &Path, input: &Path, output: &Path) -> Result<()> {
        let mut frame = frame_io::load(input)?.to_rgba8();
        let (width, height) = frame.dimensions();
        let overlay = self.scaled_for(source, width)?;

        let margin = i64::from(width / MARGIN_DIVISOR);
        let x = i64::from(width) - i64::from(overlay.width()) - margin;
        let y = i64::from(height) - i64::from(overlay.height()) - margin;
        imageops::overlay(&mut frame, overlay.as_ref(), x.max(0), y.max(0));

        frame_io::save(
            &DynamicImage::ImageRgba8(frame),
            output,
            self.context.temp_frame_quality,
        )
    }
}

impl FrameProcessor for Overlay {
    fn name(&self) -> &str {
        "overlay"
    }

    fn pre_start(&self, source: &Path, _target: &Path) -> bool {
        match frame_io::dimensions(source) {
            Ok((width, height)) => {
                debug!("Overlay source {} is {}x{}", source.display(), width, height);
                true
            }
            Err(e) => {
                error!("Select an image for source path ({:#})", e);
                false
            }
        }
    }

    fn process_image(&self, source: &Path, target: &Path, output: &Path) -> Result<()> {
        self.compose(source, target, output)
    }

    fn process_video(&self, source: &Path, frames: &[PathBuf]) -> Result<()> {
        for_each_frame(frames, &self.context, self.name(), |frame| {
            self.compose(source, frame, frame)
        })
    }

    fn post_process(&self) {
        if let Ok(mut source) = self.source.lock() {
            *source = None;
        }
        if let Ok(mut scaled) = self.scaled.lock() {
            scaled.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_context;
    use image::{Rgb, RgbImage, Rgba};
    use tempfile::TempDir;

    fn fixture(dir: &Path) -> (PathBuf, PathBuf) {
        let source = dir.join("logo.png");
        RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])).save(&source).unwrap();
        let target = dir.join("frame.png");
        RgbImage::from_pixel(80, 40, Rgb([0, 0, 255])).save(&target).unwrap();
        (source, target)
    }

    #[test]
    fn test_pre_start_requires_an_image_source() {
        let dir = TempDir::new().unwrap();
        let (source, target) = fixture(dir.path());
        let overlay = Overlay::new(test_context());
        assert!(overlay.pre_start(&source, &target));

        let bogus = dir.path().join("notes.txt");
        std::fs::write(&bogus, b"hello").unwrap();
        assert!(!overlay.pre_start(&bogus, &target));
        assert!(!overlay.pre_start(&dir.path().join("missing.png"), &target));
    }

    #[test]
    fn test_overlay_lands_bottom_right() {
        let dir = TempDir::new().unwrap();
        let (source, target) = fixture(dir.path());
        let output = dir.path().join("out.png");

        let overlay = Overlay::new(test_context());
        overlay.process_image(&source, &target, &output).unwrap();

        let composed = image::open(&output).unwrap().to_rgba8();
        assert_eq!(composed.dimensions(), (80, 40));
        // width 80 -> overlay 20x20, margin 2
        assert_eq!(composed.get_pixel(68, 28), &Rgba([255, 0, 0, 255]));
        assert_eq!(composed.get_pixel(5, 5), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_post_process_clears_caches() {
        let dir = TempDir::new().unwrap();
        let (source, target) = fixture(dir.path());
        let overlay = Overlay::new(test_context());
        overlay.process_video(&source, &[target]).unwrap();
        assert!(overlay.source.lock().unwrap().is_some());

        overlay.post_process();
        assert!(overlay.source.lock().unwrap().is_none());
        assert!(overlay.scaled.lock().unwrap().is_empty());
    }
}
