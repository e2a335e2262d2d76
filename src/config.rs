//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione immutabile di una singola esecuzione.
//!
//! ## Responsabilità:
//! - Definisce la struct `PipelineConfig` con tutti i parametri del run
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Normalizza il path di output (default, directory, path esplicito)
//!
//! ## Parametri di configurazione:
//! - `source_path` / `target_path` / `output_path`: path di input e output
//! - `frame_processors`: catena ordinata di processor (default: `overlay`)
//! - `keep_fps`: mantiene il frame rate originale (default: true)
//! - `skip_audio`: non ripristina la traccia audio (default: false)
//! - `execution_providers`: keyword dei provider richiesti (default: `cpu`)
//! - `execution_threads`: budget di thread (default: suggerito dai provider)
//! - `temp_frame_format` / `temp_frame_quality`: formato frame temporanei (png, 0)
//! - `output_video_encoder` / `output_video_quality`: encoder finale (libx264, 35)
//! - `reference_face_position`, `reference_frame_number`, `similar_face_distance`,
//!   `many_faces`: valori opachi passati ai frame processor
//!
//! La configurazione viene creata una volta per invocazione e passata per
//! riferimento a ogni componente: nessun componente legge stato globale.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = PipelineConfig {
//!     source_path: "face.png".into(),
//!     target_path: "clip.mp4".into(),
//!     skip_audio: true,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Image format used for frames inside the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Png,
    Jpg,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Video encoders accepted for the reassembled output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum VideoEncoder {
    #[serde(rename = "libx264")]
    #[value(name = "libx264")]
    Libx264,
    #[serde(rename = "libx265")]
    #[value(name = "libx265")]
    Libx265,
    #[serde(rename = "libvpx-vp9")]
    #[value(name = "libvpx-vp9")]
    LibvpxVp9,
    #[serde(rename = "h264_nvenc")]
    #[value(name = "h264_nvenc")]
    H264Nvenc,
    #[serde(rename = "hevc_nvenc")]
    #[value(name = "hevc_nvenc")]
    HevcNvenc,
}

impl VideoEncoder {
    /// Name understood by ffmpeg's `-c:v`
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Libx265 => "libx265",
            Self::LibvpxVp9 => "libvpx-vp9",
            Self::H264Nvenc => "h264_nvenc",
            Self::HevcNvenc => "hevc_nvenc",
        }
    }

    /// Quality flag on the encoder's native scale
    pub fn quality_flag(&self) -> &'static str {
        match self {
            Self::Libx264 | Self::Libx265 | Self::LibvpxVp9 => "-crf",
            Self::H264Nvenc | Self::HevcNvenc => "-cq",
        }
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Immutable snapshot of a single run's parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Identity input handed to the frame processors
    pub source_path: PathBuf,
    /// Still image, video or animated image to transform
    pub target_path: PathBuf,
    /// Output file or directory (None = next to the target)
    pub output_path: Option<PathBuf>,
    /// Frame processors, applied in this order
    pub frame_processors: Vec<String>,
    /// Extract and reassemble at the target's native frame rate
    pub keep_fps: bool,
    /// Do not restore the target's audio track
    pub skip_audio: bool,
    /// Requested execution provider keywords (e.g. "cpu", "cuda")
    pub execution_providers: Vec<String>,
    /// Worker thread budget for processors (None = suggested by providers)
    pub execution_threads: Option<usize>,
    /// Image format of extracted frames
    pub temp_frame_format: FrameFormat,
    /// Quality of extracted frames (0-100, lower = better)
    pub temp_frame_quality: u8,
    /// Encoder for reassembled videos
    pub output_video_encoder: VideoEncoder,
    /// Quality of reassembled videos (0-100, lower = better)
    pub output_video_quality: u8,
    /// Face selected in the reference frame
    pub reference_face_position: usize,
    /// Frame used as reference for face selection
    pub reference_frame_number: usize,
    /// Similarity threshold for face matching
    pub similar_face_distance: f32,
    /// Process every face instead of the reference one
    pub many_faces: bool,
    /// Root directory for workspaces (None = `<target dir>/temp`)
    pub temp_root: Option<PathBuf>,
    /// ffmpeg `-loglevel`
    pub tool_log_level: String,
    /// Output status as JSON lines for programmatic use
    pub json_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            target_path: PathBuf::new(),
            output_path: None,
            frame_processors: vec!["overlay".to_string()],
            keep_fps: true,
            skip_audio: false,
            execution_providers: vec!["cpu".to_string()],
            execution_threads: None,
            temp_frame_format: FrameFormat::Png,
            temp_frame_quality: 0,
            output_video_encoder: VideoEncoder::Libx264,
            output_video_quality: 35,
            reference_face_position: 0,
            reference_frame_number: 0,
            similar_face_distance: 0.85,
            many_faces: true,
            temp_root: None,
            tool_log_level: "error".to_string(),
            json_output: false,
        }
    }
}

impl PipelineConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.target_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Target path is required"));
        }

        if self.source_path == self.target_path {
            return Err(anyhow::anyhow!("Source and target must be different files"));
        }

        if self.frame_processors.is_empty() {
            return Err(anyhow::anyhow!("At least one frame processor must be configured"));
        }

        if self.temp_frame_quality > 100 {
            return Err(anyhow::anyhow!("Temp frame quality must be between 0 and 100"));
        }

        if self.output_video_quality > 100 {
            return Err(anyhow::anyhow!("Output video quality must be between 0 and 100"));
        }

        if self.execution_threads == Some(0) {
            return Err(anyhow::anyhow!("Number of execution threads must be greater than 0"));
        }

        if !(self.similar_face_distance >= 0.0) {
            return Err(anyhow::anyhow!("Similar face distance must be a non-negative number"));
        }

        Ok(())
    }

    /// Final output location.
    ///
    /// - no output configured: `<target dir>/<target stem>-processed.<ext>`
    /// - output is an existing directory: `<dir>/<source stem>-<target stem>.<ext>`
    /// - anything else is used verbatim
    pub fn resolved_output_path(&self) -> PathBuf {
        let target_stem = stem_of(&self.target_path);
        let extension = self
            .target_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        match &self.output_path {
            None => self
                .target_path
                .with_file_name(format!("{}-processed{}", target_stem, extension)),
            Some(dir) if dir.is_dir() => dir.join(format!(
                "{}-{}{}",
                stem_of(&self.source_path),
                target_stem,
                extension
            )),
            Some(path) => path.clone(),
        }
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Default location of the optional config file
    pub fn default_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("frame-pipeline").join("config.json"))
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PipelineConfig {
        PipelineConfig {
            source_path: PathBuf::from("/in/face.png"),
            target_path: PathBuf::from("/in/clip.mp4"),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = sample();
        assert!(config.validate().is_ok());

        config.temp_frame_quality = 101;
        assert!(config.validate().is_err());

        config.temp_frame_quality = 0;
        config.output_video_quality = 200;
        assert!(config.validate().is_err());

        config.output_video_quality = 35;
        config.execution_threads = Some(0);
        assert!(config.validate().is_err());

        config.execution_threads = Some(4);
        config.frame_processors.clear();
        assert!(config.validate().is_err());

        config.frame_processors = vec!["invert".to_string()];
        config.similar_face_distance = f32::NAN;
        assert!(config.validate().is_err());

        config.similar_face_distance = 0.5;
        config.source_path = config.target_path.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert!(config.keep_fps);
        assert!(!config.skip_audio);
        assert_eq!(config.execution_providers, vec!["cpu"]);
        assert_eq!(config.temp_frame_format, FrameFormat::Png);
        assert_eq!(config.temp_frame_quality, 0);
        assert_eq!(config.output_video_encoder, VideoEncoder::Libx264);
        assert_eq!(config.output_video_quality, 35);
        assert_eq!(config.similar_face_distance, 0.85);
        assert_eq!(config.tool_log_level, "error");
    }

    #[test]
    fn test_output_path_normalization() {
        let config = sample();
        assert_eq!(config.resolved_output_path(), PathBuf::from("/in/clip-processed.mp4"));

        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_path: Some(dir.path().to_path_buf()),
            ..sample()
        };
        assert_eq!(config.resolved_output_path(), dir.path().join("face-clip.mp4"));

        let config = PipelineConfig {
            output_path: Some(PathBuf::from("/out/final.mp4")),
            ..sample()
        };
        assert_eq!(config.resolved_output_path(), PathBuf::from("/out/final.mp4"));
    }

    #[test]
    fn test_encoder_quality_flags() {
        assert_eq!(VideoEncoder::Libx264.quality_flag(), "-crf");
        assert_eq!(VideoEncoder::LibvpxVp9.quality_flag(), "-crf");
        assert_eq!(VideoEncoder::HevcNvenc.quality_flag(), "-cq");
        assert_eq!(VideoEncoder::LibvpxVp9.to_string(), "libvpx-vp9");
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = PipelineConfig {
            frame_processors: vec!["grayscale".to_string(), "invert".to_string()],
            keep_fps: false,
            skip_audio: true,
            output_video_encoder: VideoEncoder::Libx265,
            temp_frame_format: FrameFormat::Jpg,
            execution_threads: Some(8),
            ..sample()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = PipelineConfig::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.frame_processors, vec!["grayscale", "invert"]);
        assert!(!loaded_config.keep_fps);
        assert!(loaded_config.skip_audio);
        assert_eq!(loaded_config.output_video_encoder, VideoEncoder::Libx265);
        assert_eq!(loaded_config.temp_frame_format, FrameFormat::Jpg);
        assert_eq!(loaded_config.execution_threads, Some(8));
        assert_eq!(loaded_config.target_path, PathBuf::from("/in/clip.mp4"));
    }

    #[tokio::test]
    async fn test_missing_config_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_file(&temp_dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.frame_processors, vec!["overlay"]);
    }
}
