//! # FFmpeg Collaborator Module
//!
//! Questo modulo incapsula tutte le invocazioni del tool esterno di
//! encode/decode (ffmpeg + ffprobe).
//!
//! ## Responsabilità:
//! - Definisce il trait `MediaTool`, il confine verso il tool esterno
//! - Implementa `FfmpegTool` con `tokio::process::Command`
//! - Verifica presenza e versione di ffmpeg/ffprobe
//! - Rileva fps e presenza di tracce audio con ffprobe
//! - Estrae frame, riassembla video/animazioni e fa il mux dell'audio
//!
//! ## Mapping qualità:
//! - Frame temporanei: `-q:v` = quality * 31 / 100
//! - Video: `-crf`/`-cq` = (quality + 1) * 51 / 100
//! - WebP animato: `-quality` = 100 - quality
//!
//! ## Cancellazione:
//! Ogni invocazione è in `select!` con il `CancellationToken` del run: se
//! arriva un'interruzione il processo figlio viene terminato e atteso prima
//! di restituire `ToolError::Cancelled`.
//!
//! ## Esempio:
//! ```rust,ignore
//! let tool = FfmpegTool::discover("error");
//! tool.check().await?;
//! let fps = tool.detect_fps(&video_path, &cancel).await?;
//! ```

use crate::cancel::CancellationToken;
use crate::config::{FrameFormat, VideoEncoder};
use crate::error::{PreconditionError, ToolError};
use crate::frames::frame_pattern;
use crate::media::AnimatedContainer;
use crate::os_args;
use crate::tool_resolver::ToolPathResolver;
use crate::utils::display_args;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Oldest ffmpeg major version whose filters and flags are relied upon
pub const MIN_FFMPEG_MAJOR: u32 = 4;

/// Frame rate used when the container does not report one
pub const FALLBACK_FPS: f64 = 30.0;

/// Frame extraction parameters
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub target: &'a Path,
    pub frames_dir: &'a Path,
    pub format: FrameFormat,
    pub quality: u8,
    /// None = every native frame exactly once
    pub fps: Option<f64>,
}

/// Frame sequence to video parameters
#[derive(Debug, Clone)]
pub struct VideoEncodeRequest<'a> {
    pub frames_dir: &'a Path,
    pub format: FrameFormat,
    pub fps: f64,
    pub encoder: VideoEncoder,
    pub quality: u8,
    pub output: &'a Path,
}

/// Frame sequence to animated image parameters
#[derive(Debug, Clone)]
pub struct AnimatedEncodeRequest<'a> {
    pub frames_dir: &'a Path,
    pub format: FrameFormat,
    pub fps: f64,
    pub container: AnimatedContainer,
    pub quality: u8,
    pub output: &'a Path,
}

/// External media encode/decode tool
#[allow(async_fn_in_trait)]
pub trait MediaTool {
    /// Tool presence and version compatibility
    async fn check(&self) -> Result<(), PreconditionError>;

    /// Native frame rate of the first video stream
    async fn detect_fps(&self, target: &Path, cancel: &CancellationToken) -> Result<f64, ToolError>;

    /// Whether the container holds at least one audio stream
    async fn has_audio(&self, target: &Path, cancel: &CancellationToken) -> Result<bool, ToolError>;

    async fn extract_frames(
        &self,
        request: &ExtractRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError>;

    async fn encode_video(
        &self,
        request: &VideoEncodeRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError>;

    async fn encode_animated(
        &self,
        request: &AnimatedEncodeRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError>;

    /// Copy the video stream of `video` and the first audio stream of `audio_source` into `output`
    async fn mux_audio(
        &self,
        video: &Path,
        audio_source: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError>;
}

/// `MediaTool` backed by the ffmpeg/ffprobe binaries
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    log_level: String,
}

impl FfmpegTool {
    /// Locate ffmpeg and ffprobe with the default resolver
    pub fn discover(log_level: &str) -> Self {
        Self::with_resolver(&ToolPathResolver::new(), log_level)
    }

    pub fn with_resolver(resolver: &ToolPathResolver, log_level: &str) -> Self {
        Self {
            ffmpeg: resolver.resolve_tool("ffmpeg"),
            ffprobe: resolver.resolve_tool("ffprobe"),
            log_level: log_level.to_string(),
        }
    }

    fn ffmpeg(&self) -> &Path {
        self.ffmpeg.as_deref().unwrap_or_else(|| Path::new("ffmpeg"))
    }

    fn ffprobe(&self) -> &Path {
        self.ffprobe.as_deref().unwrap_or_else(|| Path::new("ffprobe"))
    }

    fn with_common_args(&self, args: Vec<OsString>) -> Vec<OsString> {
        let mut full = os_args!["-hide_banner", "-loglevel", self.log_level];
        full.extend(args);
        full
    }

    async fn run_ffmpeg(
        &self,
        args: Vec<OsString>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ToolError> {
        run_tool(self.ffmpeg(), &self.with_common_args(args), cancel).await
    }

    async fn run_ffprobe(
        &self,
        args: Vec<OsString>,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let stdout = run_tool(self.ffprobe(), &args, cancel).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

impl MediaTool for FfmpegTool {
    async fn check(&self) -> Result<(), PreconditionError> {
        for (tool, path) in [("ffmpeg", &self.ffmpeg), ("ffprobe", &self.ffprobe)] {
            if path.is_none() {
                return Err(PreconditionError::ToolMissing {
                    tool: tool.to_string(),
                    hint: ToolPathResolver::install_hint(tool),
                });
            }
        }

        let output = run_tool(self.ffmpeg(), &os_args!["-version"], &CancellationToken::new())
            .await
            .map_err(|e| PreconditionError::ToolMissing {
                tool: "ffmpeg".to_string(),
                hint: e.to_string(),
            })?;
        let banner = String::from_utf8_lossy(&output);

        match parse_ffmpeg_major(&banner) {
            Some(major) if major < MIN_FFMPEG_MAJOR => Err(PreconditionError::ToolIncompatible {
                tool: "ffmpeg".to_string(),
                found: major.to_string(),
                required: MIN_FFMPEG_MAJOR.to_string(),
            }),
            Some(major) => {
                debug!("ffmpeg major version {}", major);
                Ok(())
            }
            None => {
                warn!(
                    "Could not determine ffmpeg version from '{}', assuming a compatible build",
                    banner.lines().next().unwrap_or_default()
                );
                Ok(())
            }
        }
    }

    async fn detect_fps(&self, target: &Path, cancel: &CancellationToken) -> Result<f64, ToolError> {
        let args = os_args![
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=r_frame_rate",
            "-of", "default=noprint_wrappers=1:nokey=1",
            target,
        ];

        match self.run_ffprobe(args, cancel).await {
            Ok(rate) => Ok(parse_frame_rate(&rate).unwrap_or_else(|| {
                warn!("Unreadable frame rate '{}', falling back to {} FPS", rate, FALLBACK_FPS);
                FALLBACK_FPS
            })),
            Err(ToolError::Cancelled) => Err(ToolError::Cancelled),
            Err(e) => {
                warn!("Frame rate detection failed ({}), falling back to {} FPS", e, FALLBACK_FPS);
                Ok(FALLBACK_FPS)
            }
        }
    }

    async fn has_audio(&self, target: &Path, cancel: &CancellationToken) -> Result<bool, ToolError> {
        let args = os_args![
            "-v", "error",
            "-select_streams", "a",
            "-show_entries", "stream=index",
            "-of", "csv=p=0",
            target,
        ];
        let streams = self.run_ffprobe(args, cancel).await?;
        Ok(!streams.is_empty())
    }

    async fn extract_frames(
        &self,
        request: &ExtractRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        self.run_ffmpeg(extract_args(request), cancel).await.map(drop)
    }

    async fn encode_video(
        &self,
        request: &VideoEncodeRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        self.run_ffmpeg(video_encode_args(request), cancel).await.map(drop)
    }

    async fn encode_animated(
        &self,
        request: &AnimatedEncodeRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        self.run_ffmpeg(animated_encode_args(request), cancel).await.map(drop)
    }

    async fn mux_audio(
        &self,
        video: &Path,
        audio_source: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        let args = os_args![
            "-i", video,
            "-i", audio_source,
            "-c:v", "copy",
            "-c:a", "copy",
            "-map", "0:v:0",
            "-map", "1:a:0",
            "-y", output,
        ];
        self.run_ffmpeg(args, cancel).await.map(drop)
    }
}

/// `-q:v` for extracted frames
pub fn frame_quality(quality: u8) -> u32 {
    u32::from(quality) * 31 / 100
}

/// Encoder quality on the `-crf` / `-cq` scale
pub fn video_quality(quality: u8) -> u32 {
    (u32::from(quality) + 1) * 51 / 100
}

pub fn extract_args(request: &ExtractRequest<'_>) -> Vec<OsString> {
    let mut args = os_args![
        "-hwaccel", "auto",
        "-i", request.target,
        "-q:v", @frame_quality(request.quality),
    ];
    if request.format == FrameFormat::Png {
        args.extend(os_args!["-pix_fmt", "rgb24"]);
    }
    match request.fps {
        Some(fps) => args.extend(os_args!["-vf", format!("fps={}", fps)]),
        None => args.extend(os_args!["-vsync", "passthrough"]),
    }
    args.push(frame_pattern(request.frames_dir, request.format).into_os_string());
    args
}

pub fn video_encode_args(request: &VideoEncodeRequest<'_>) -> Vec<OsString> {
    let mut args = os_args![
        "-hwaccel", "auto",
        "-r", @request.fps,
        "-i", frame_pattern(request.frames_dir, request.format),
        "-c:v", request.encoder.ffmpeg_name(),
        request.encoder.quality_flag(), @video_quality(request.quality),
    ];
    if request.encoder == VideoEncoder::LibvpxVp9 {
        args.extend(os_args!["-b:v", "0"]);
    }
    args.extend(os_args![
        "-pix_fmt", "yuv420p",
        "-vf", "colorspace=bt709:iall=bt601-6-625:fast=1",
        "-y", request.output,
    ]);
    args
}

pub fn animated_encode_args(request: &AnimatedEncodeRequest<'_>) -> Vec<OsString> {
    let mut args = os_args![
        "-r", @request.fps,
        "-i", frame_pattern(request.frames_dir, request.format),
    ];
    match request.container {
        AnimatedContainer::Gif => args.extend(os_args![
            "-filter_complex", "[0:v] split [a][b];[a] palettegen [p];[b][p] paletteuse",
            "-loop", "0",
        ]),
        AnimatedContainer::WebP => args.extend(os_args![
            "-c:v", "libwebp",
            "-lossless", "0",
            "-quality", @(100 - u32::from(request.quality.min(100))),
            "-loop", "0",
        ]),
        AnimatedContainer::Apng => args.extend(os_args!["-plays", "0", "-f", "apng"]),
    }
    args.extend(os_args!["-y", request.output]);
    args
}

/// Parses ffprobe's `num/den` (or plain decimal) frame rate
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.lines().next()?.trim();
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Major version from the first line of `ffmpeg -version`
pub fn parse_ffmpeg_major(banner: &str) -> Option<u32> {
    let first_line = banner.lines().next()?;
    let version = first_line.split_whitespace().skip_while(|word| *word != "version").nth(1)?;
    let version = version.trim_start_matches('n');
    let digits: String = version.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !version[digits.len()..].starts_with('.') {
        return None;
    }
    digits.parse().ok()
}

/// Runs an external process to completion, or kills it on cancellation
async fn run_tool(
    program: &Path,
    args: &[OsString],
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ToolError> {
    let program_name = program.display().to_string();
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    debug!("Running: {}", display_args(&program_name, args));
    let start_time = std::time::Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program_name.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = tokio::select! {
        result = async {
            let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
            child.wait().await.map(|status| (status, out, err))
        } => Some(result),
        _ = cancel.cancelled() => None,
    };

    let Some(result) = finished else {
        warn!("Interrupt received, terminating {}", program_name);
        if let Err(e) = child.kill().await {
            warn!("Failed to terminate {}: {}", program_name, e);
        }
        return Err(ToolError::Cancelled);
    };

    let (status, stdout, stderr) = result.map_err(|source| ToolError::Spawn {
        program: program_name.clone(),
        source,
    })?;

    debug!("{} finished in {:.1}s", program_name, start_time.elapsed().as_secs_f64());

    if !status.success() {
        return Err(ToolError::Failed {
            program: program_name,
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(stdout)
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            debug!("Failed to read tool output: {}", e);
        }
    }
    buffer
}
