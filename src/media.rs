//! # Media Classification Module
//!
//! Questo modulo decide come trattare il target: immagine, video o animazione.
//!
//! ## Responsabilità:
//! - Classificazione tramite estensione (case-insensitive)
//! - Ispezione del contenuto per i casi ambigui:
//!   - PNG con chunk `acTL` (APNG) → animazione
//!   - WebP con flag di animazione nel chunk `VP8X` → animazione
//!   - File senza estensione nota: magic bytes (immagini via `image::guess_format`,
//!     container video ISO-BMFF / Matroska / AVI)
//! - Nessun side effect: solo letture del file, stesso input → stesso risultato
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP
//! - **Video**: MP4, M4V, MOV, AVI, MKV, WebM
//! - **Animazioni**: GIF, APNG, WebP animato

use crate::error::PipelineError;
use image::ImageFormat;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Extensions of the video containers the pipeline reads and writes
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "avi", "mkv", "webm"];

/// Case-insensitive membership in [`VIDEO_EXTENSIONS`]
pub fn is_video_extension(extension: &str) -> bool {
    VIDEO_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(extension))
}

/// Container written when reassembling an animated target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimatedContainer {
    Gif,
    WebP,
    Apng,
}

impl AnimatedContainer {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Apng => "png",
        }
    }
}

/// What the controller does with a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "container", rename_all = "snake_case")]
pub enum MediaKind {
    StillImage,
    Video,
    AnimatedSequence(AnimatedContainer),
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StillImage => f.write_str("image"),
            Self::Video => f.write_str("video"),
            Self::AnimatedSequence(AnimatedContainer::Gif) => f.write_str("gif"),
            Self::AnimatedSequence(container) => write!(f, "animated {}", container.extension()),
        }
    }
}

/// Classify a target path by extension and, where needed, by content
pub fn classify(path: &Path) -> Result<MediaKind, PipelineError> {
    let unsupported = |reason: String| PipelineError::UnsupportedMedia {
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_file() {
        return Err(unsupported("target is not a readable file".to_string()));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let inspect = |result: io::Result<bool>| {
        result.map_err(|e| unsupported(format!("unable to inspect content: {}", e)))
    };

    match extension.as_str() {
        "jpg" | "jpeg" => Ok(MediaKind::StillImage),
        "png" => Ok(if inspect(is_animated_png(path))? {
            MediaKind::AnimatedSequence(AnimatedContainer::Apng)
        } else {
            MediaKind::StillImage
        }),
        "webp" => Ok(if inspect(is_animated_webp(path))? {
            MediaKind::AnimatedSequence(AnimatedContainer::WebP)
        } else {
            MediaKind::StillImage
        }),
        "gif" => Ok(MediaKind::AnimatedSequence(AnimatedContainer::Gif)),
        ext if is_video_extension(ext) => Ok(MediaKind::Video),
        _ => sniff(path).map_err(|e| unsupported(format!("unable to inspect content: {}", e)))?
            .ok_or_else(|| unsupported(format!("unrecognized format '{}'", extension))),
    }
}

/// Classification from magic bytes, for unknown or missing extensions
fn sniff(path: &Path) -> io::Result<Option<MediaKind>> {
    let header = read_header(path, 32)?;

    if let Ok(format) = image::guess_format(&header) {
        return Ok(match format {
            ImageFormat::Jpeg => Some(MediaKind::StillImage),
            ImageFormat::Gif => Some(MediaKind::AnimatedSequence(AnimatedContainer::Gif)),
            ImageFormat::Png if is_animated_png(path)? => {
                Some(MediaKind::AnimatedSequence(AnimatedContainer::Apng))
            }
            ImageFormat::Png => Some(MediaKind::StillImage),
            ImageFormat::WebP if webp_header_is_animated(&header) => {
                Some(MediaKind::AnimatedSequence(AnimatedContainer::WebP))
            }
            ImageFormat::WebP => Some(MediaKind::StillImage),
            _ => None,
        });
    }

    let is_iso_bmff = header.len() >= 8 && &header[4..8] == b"ftyp";
    let is_matroska = header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]);
    let is_avi = header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"AVI ";

    Ok((is_iso_bmff || is_matroska || is_avi).then_some(MediaKind::Video))
}

fn read_header(path: &Path, len: u64) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(len as usize);
    File::open(path)?.take(len).read_to_end(&mut header)?;
    Ok(header)
}

fn webp_header_is_animated(header: &[u8]) -> bool {
    const ANIMATION_FLAG: u8 = 0x02;
    header.len() >= 21
        && &header[0..4] == b"RIFF"
        && &header[8..12] == b"WEBP"
        && &header[12..16] == b"VP8X"
        && header[20] & ANIMATION_FLAG != 0
}

fn is_animated_webp(path: &Path) -> io::Result<bool> {
    Ok(webp_header_is_animated(&read_header(path, 32)?))
}

/// Walks PNG chunks until image data; an `acTL` chunk before `IDAT` marks APNG
fn is_animated_png(path: &Path) -> io::Result<bool> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    let mut file = File::open(path)?;
    let mut signature = [0u8; 8];
    if file.read_exact(&mut signature).is_err() || signature != SIGNATURE {
        return Ok(false);
    }

    let mut chunk_header = [0u8; 8];
    loop {
        if file.read_exact(&mut chunk_header).is_err() {
            return Ok(false);
        }
        let length = u32::from_be_bytes([chunk_header[0], chunk_header[1], chunk_header[2], chunk_header[3]]);
        match &chunk_header[4..8] {
            b"acTL" => return Ok(true),
            b"IDAT" | b"IEND" => return Ok(false),
            _ => {
                // data + CRC
                file.seek(SeekFrom::Current(i64::from(length) + 4))?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut chunk = (data.len() as u32).to_be_bytes().to_vec();
        chunk.extend_from_slice(kind);
        chunk.extend_from_slice(data);
        chunk.extend_from_slice(&[0, 0, 0, 0]);
        chunk
    }

    fn png_bytes(animated: bool) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend(png_chunk(b"IHDR", &[0u8; 13]));
        if animated {
            bytes.extend(png_chunk(b"acTL", &[0, 0, 0, 2, 0, 0, 0, 0]));
        }
        bytes.extend(png_chunk(b"IDAT", &[0u8; 4]));
        bytes.extend(png_chunk(b"IEND", &[]));
        bytes
    }

    fn webp_bytes(animated: bool) -> Vec<u8> {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&30u32.to_le_bytes());
        bytes.extend_from_slice(b"WEBPVP8X");
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.push(if animated { 0x02 } else { 0x00 });
        bytes.extend_from_slice(&[0u8; 9]);
        bytes
    }

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_classify_by_extension() {
        let dir = TempDir::new().unwrap();
        let cases = [
            ("photo.jpg", MediaKind::StillImage),
            ("photo.JPEG", MediaKind::StillImage),
            ("clip.mp4", MediaKind::Video),
            ("clip.MOV", MediaKind::Video),
            ("clip.mkv", MediaKind::Video),
            ("clip.webm", MediaKind::Video),
            ("clip.avi", MediaKind::Video),
            ("clip.m4v", MediaKind::Video),
            ("loop.gif", MediaKind::AnimatedSequence(AnimatedContainer::Gif)),
        ];

        for (name, expected) in cases {
            let path = write(&dir, name, b"not really media");
            assert_eq!(classify(&path).unwrap(), expected, "{}", name);
            assert_eq!(classify(&path).unwrap(), expected, "{} (repeat)", name);
        }
    }

    #[test]
    fn test_png_and_webp_are_inspected() {
        let dir = TempDir::new().unwrap();

        let still = write(&dir, "still.png", &png_bytes(false));
        let animated = write(&dir, "anim.png", &png_bytes(true));
        assert_eq!(classify(&still).unwrap(), MediaKind::StillImage);
        assert_eq!(
            classify(&animated).unwrap(),
            MediaKind::AnimatedSequence(AnimatedContainer::Apng)
        );

        let still = write(&dir, "still.webp", &webp_bytes(false));
        let animated = write(&dir, "anim.webp", &webp_bytes(true));
        assert_eq!(classify(&still).unwrap(), MediaKind::StillImage);
        assert_eq!(
            classify(&animated).unwrap(),
            MediaKind::AnimatedSequence(AnimatedContainer::WebP)
        );
    }

    #[test]
    fn test_unknown_extension_is_sniffed() {
        let dir = TempDir::new().unwrap();

        let gif = write(&dir, "download", b"GIF89a\x01\x00\x01\x00");
        assert_eq!(
            classify(&gif).unwrap(),
            MediaKind::AnimatedSequence(AnimatedContainer::Gif)
        );

        let png = write(&dir, "image.bin", &png_bytes(false));
        assert_eq!(classify(&png).unwrap(), MediaKind::StillImage);

        let mut mp4 = vec![0, 0, 0, 0x18];
        mp4.extend_from_slice(b"ftypisom");
        mp4.extend_from_slice(&[0u8; 12]);
        let mp4 = write(&dir, "recording.dat", &mp4);
        assert_eq!(classify(&mp4).unwrap(), MediaKind::Video);
    }

    #[test]
    fn test_unsupported_and_missing_targets() {
        let dir = TempDir::new().unwrap();
        let text = write(&dir, "notes.txt", b"hello world, not media");
        assert!(matches!(classify(&text), Err(PipelineError::UnsupportedMedia { .. })));

        let missing = dir.path().join("missing.mp4");
        assert!(matches!(classify(&missing), Err(PipelineError::UnsupportedMedia { .. })));
    }
}
