//! # Reassembly & Audio Restoration
//!
//! Riassembla la sequenza di frame in un video o in un'animazione e, per i
//! video, ripristina la traccia audio del target originale.
//!
//! ## Regole:
//! - Video: encode in `temp.<ext dell'output>` dentro il workspace (`temp.mp4`
//!   se l'output non ha l'estensione di un container video), verifica che
//!   l'artefatto esista, poi audio
//! - Animato: l'encode produce direttamente l'output finale (nessun audio)
//! - `skip_audio`: l'intermedio viene spostato sull'output senza modifiche
//! - Target senza traccia audio: spostato come con `skip_audio`
//! - Audio senza fps originali: tentato comunque, con un warning

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ReassemblyError};
use crate::ffmpeg::{AnimatedEncodeRequest, MediaTool, VideoEncodeRequest};
use crate::frames::FrameSequence;
use crate::media::{self, MediaKind};
use crate::pipeline::{Stage, StatusReporter};
use crate::workspace::Workspace;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const DEFAULT_VIDEO_EXTENSION: &str = "mp4";

pub struct Reassembler<'a, T: MediaTool> {
    tool: &'a T,
    config: &'a PipelineConfig,
    reporter: StatusReporter,
}

impl<'a, T: MediaTool> Reassembler<'a, T> {
    pub fn new(tool: &'a T, config: &'a PipelineConfig, reporter: StatusReporter) -> Self {
        Self {
            tool,
            config,
            reporter,
        }
    }

    /// Encodes `frames` into an artifact inside `workspace` and returns its path
    pub async fn reassemble(
        &self,
        frames: &FrameSequence,
        workspace: &Workspace,
        output: &Path,
        fps: f64,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        cancel.check(Stage::Reassembly)?;

        let intermediate = match kind {
            MediaKind::Video => {
                let extension = output
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .filter(|ext| media::is_video_extension(ext))
                    .unwrap_or(DEFAULT_VIDEO_EXTENSION);
                let intermediate = workspace.intermediate(extension);
                self.reporter
                    .status(&format!("Creating video with {} FPS...", fps));

                let request = VideoEncodeRequest {
                    frames_dir: frames.dir(),
                    format: frames.format(),
                    fps,
                    encoder: self.config.output_video_encoder,
                    quality: self.config.output_video_quality,
                    output: &intermediate,
                };
                self.tool
                    .encode_video(&request, cancel)
                    .await
                    .map_err(|e| PipelineError::from_tool(Stage::Reassembly, e))?;
                intermediate
            }
            MediaKind::AnimatedSequence(container) => {
                let intermediate = workspace.intermediate(container.extension());
                self.reporter
                    .status(&format!("Creating {} animation with {} FPS...", container.extension(), fps));

                let request = AnimatedEncodeRequest {
                    frames_dir: frames.dir(),
                    format: frames.format(),
                    fps,
                    container,
                    quality: self.config.output_video_quality,
                    output: &intermediate,
                };
                self.tool
                    .encode_animated(&request, cancel)
                    .await
                    .map_err(|e| PipelineError::from_tool(Stage::Reassembly, e))?;
                intermediate
            }
            MediaKind::StillImage => {
                return Err(ReassemblyError::Encode("still images are not reassembled".to_string()).into())
            }
        };

        if !fs::try_exists(&intermediate).await.unwrap_or(false) {
            return Err(ReassemblyError::MissingArtifact(intermediate).into());
        }
        debug!("Reassembled {} frames into {}", frames.len(), intermediate.display());
        Ok(intermediate)
    }

    /// Produces the final video at `output` from the reassembled `intermediate`
    pub async fn restore_audio(
        &self,
        target: &Path,
        intermediate: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        cancel.check(Stage::AudioRestoration)?;

        if self.config.skip_audio {
            move_file(intermediate, output).await?;
            self.reporter.status("Skipping audio...");
            return Ok(());
        }

        let has_audio = self
            .tool
            .has_audio(target, cancel)
            .await
            .map_err(|e| PipelineError::from_tool(Stage::AudioRestoration, e))?;
        if !has_audio {
            move_file(intermediate, output).await?;
            self.reporter.status("Target has no audio track, skipping audio...");
            return Ok(());
        }

        if self.config.keep_fps {
            self.reporter.status("Restoring audio...");
        } else {
            self.reporter
                .warning("Restoring audio might cause issues as fps are not kept...");
        }

        self.tool
            .mux_audio(intermediate, target, output, cancel)
            .await
            .map_err(|e| PipelineError::from_tool(Stage::AudioRestoration, e))?;

        if !fs::try_exists(output).await.unwrap_or(false) {
            return Err(ReassemblyError::AudioMux(format!(
                "no output written to {}",
                output.display()
            ))
            .into());
        }
        Ok(())
    }
}

/// Moves a file, falling back to copy + remove across filesystems
pub async fn move_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ReassemblyError::MissingArtifact(from.to_path_buf()).into())
        }
        Err(e) => {
            debug!("rename {} failed ({}), copying instead", from.display(), e);
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
            Ok(())
        }
    }
}
