//! # Frame Extraction Module
//!
//! Questo modulo scompone un target video/animato in una sequenza ordinata di
//! frame dentro il workspace, e ri-verifica l'ordinamento ogni volta che i
//! frame vengono elencati.
//!
//! ## Naming dei frame:
//! - Interi a larghezza fissa, zero-padded, a partire da 1: `000001.png`
//! - L'ordine lessicografico dei nomi coincide con l'ordine temporale
//! - Un nome fuori schema o un buco nella numerazione invalida la sequenza
//!
//! ## Esiti dell'estrazione:
//! - `Extraction::Frames`: almeno un frame, sequenza verificata
//! - `Extraction::NotFound`: zero frame (anche se ffmpeg è fallito), esito
//!   terminale ma non eccezionale
//! - `PipelineError::Extraction`: ffmpeg fallito dopo aver scritto frame
//!   parziali, tool non eseguibile, o sequenza non ordinata

use crate::cancel::CancellationToken;
use crate::config::FrameFormat;
use crate::error::{PipelineError, ToolError};
use crate::ffmpeg::{ExtractRequest, MediaTool};
use crate::pipeline::Stage;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Digits in a frame file name
pub const FRAME_NAME_WIDTH: usize = 6;

/// File name of the frame at `index` (0-based)
pub fn frame_name(index: usize, format: FrameFormat) -> String {
    format!("{:0width$}.{}", index + 1, format.extension(), width = FRAME_NAME_WIDTH)
}

/// printf-style pattern handed to ffmpeg for reading/writing the sequence
pub fn frame_pattern(dir: &Path, format: FrameFormat) -> PathBuf {
    dir.join(format!("%0{}d.{}", FRAME_NAME_WIDTH, format.extension()))
}

/// Ordered frames materialized inside a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    dir: PathBuf,
    format: FrameFormat,
    frames: Vec<PathBuf>,
}

impl FrameSequence {
    /// Lists and verifies the frames currently in `dir`
    pub fn list(dir: &Path, format: FrameFormat) -> Result<Self, PipelineError> {
        let mut frames: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(format.extension()))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();

        verify_order(&frames)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            format,
            frames,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Sorted names must be exactly `1..=N` at the fixed width
fn verify_order(frames: &[PathBuf]) -> Result<(), PipelineError> {
    for (index, frame) in frames.iter().enumerate() {
        let stem = frame
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let well_formed = stem.len() == FRAME_NAME_WIDTH && stem.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(PipelineError::Extraction(format!(
                "unexpected frame name {}",
                frame.display()
            )));
        }

        let number: usize = stem.parse().map_err(|_| {
            PipelineError::Extraction(format!("unexpected frame name {}", frame.display()))
        })?;
        if number != index + 1 {
            return Err(PipelineError::Extraction(format!(
                "frame sequence is not contiguous: expected frame {} but found {}",
                index + 1,
                frame.display()
            )));
        }
    }
    Ok(())
}

/// Result of decomposing a target
#[derive(Debug)]
pub enum Extraction {
    Frames(FrameSequence),
    NotFound { diagnostic: Option<String> },
}

/// Splits `target` into frames inside `workspace`
pub async fn extract<T: MediaTool>(
    tool: &T,
    target: &Path,
    workspace: &Workspace,
    format: FrameFormat,
    quality: u8,
    fps: Option<f64>,
    cancel: &CancellationToken,
) -> Result<Extraction, PipelineError> {
    let request = ExtractRequest {
        target,
        frames_dir: workspace.dir(),
        format,
        quality,
        fps,
    };

    let tool_result = tool.extract_frames(&request, cancel).await;
    let diagnostic = match tool_result {
        Ok(()) => None,
        Err(ToolError::Failed { stderr, .. }) => Some(stderr),
        Err(other) => return Err(PipelineError::from_tool(Stage::Extraction, other)),
    };

    let frames = FrameSequence::list(workspace.dir(), format)?;
    debug!("Extracted {} frames into {}", frames.len(), workspace.dir().display());

    match (frames.is_empty(), diagnostic) {
        (true, diagnostic) => {
            if let Some(ref message) = diagnostic {
                warn!("ffmpeg produced no frames: {}", message);
            }
            Ok(Extraction::NotFound { diagnostic })
        }
        (false, Some(message)) => Err(PipelineError::Extraction(format!(
            "ffmpeg failed after writing {} frames: {}",
            frames.len(),
            message
        ))),
        (false, None) => Ok(Extraction::Frames(frames)),
    }
}
