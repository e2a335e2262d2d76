//! Test doubles for the external collaborators: a scripted media tool with
//! per-stage fault injection and a processor that records its hook calls.

use crate::cancel::CancellationToken;
use crate::error::{PreconditionError, ToolError};
use crate::ffmpeg::{AnimatedEncodeRequest, ExtractRequest, MediaTool, VideoEncodeRequest};
use crate::frames::frame_name;
use crate::processors::{for_each_frame, FrameProcessor, ProcessorContext};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

/// Stage at which the fake tool misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeFault {
    Check,
    /// Exits non-zero without writing a frame
    ExtractNothing,
    /// Writes frames, then exits non-zero
    ExtractPartial,
    /// Writes a couple of frames, then blocks until cancelled
    ExtractHang,
    Encode,
    EncodeWithoutArtifact,
    Mux,
}

pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn calls_of(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn record(log: &CallLog, call: impl Into<String>) {
    log.lock().unwrap().push(call.into());
}

#[cfg(unix)]
fn failed_status() -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(1 << 8)
}

#[cfg(windows)]
fn failed_status() -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(1)
}

fn injected(program: &str) -> ToolError {
    ToolError::Failed {
        program: program.to_string(),
        status: failed_status(),
        stderr: "injected failure".to_string(),
    }
}

/// Scripted stand-in for ffmpeg
#[derive(Debug, Clone)]
pub(crate) struct FakeMediaTool {
    pub fault: Option<FakeFault>,
    pub frame_count: usize,
    pub fps: f64,
    pub audio: bool,
    pub log: CallLog,
    /// Frame directories seen during extraction
    pub workspaces: Arc<Mutex<Vec<PathBuf>>>,
}

impl Default for FakeMediaTool {
    fn default() -> Self {
        Self {
            fault: None,
            frame_count: 3,
            fps: 25.0,
            audio: true,
            log: CallLog::default(),
            workspaces: Arc::default(),
        }
    }
}

impl FakeMediaTool {
    pub fn failing(fault: FakeFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        calls_of(&self.log)
    }

    pub fn seen_workspaces(&self) -> Vec<PathBuf> {
        self.workspaces.lock().unwrap().clone()
    }

    fn fails_at(&self, fault: FakeFault) -> bool {
        self.fault == Some(fault)
    }

    fn write_frames(&self, request: &ExtractRequest<'_>, count: usize) {
        for index in 0..count {
            let shade = (index * 40 % 256) as u8;
            RgbImage::from_pixel(8, 6, Rgb([shade, 100, 200]))
                .save(request.frames_dir.join(frame_name(index, request.format)))
                .unwrap();
        }
    }

    fn frames_in(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| !e.file_name().to_string_lossy().starts_with("temp"))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl MediaTool for FakeMediaTool {
    async fn check(&self) -> Result<(), PreconditionError> {
        record(&self.log, "check");
        if self.fails_at(FakeFault::Check) {
            return Err(PreconditionError::ToolMissing {
                tool: "ffmpeg".to_string(),
                hint: "injected".to_string(),
            });
        }
        Ok(())
    }

    async fn detect_fps(&self, _target: &Path, _cancel: &CancellationToken) -> Result<f64, ToolError> {
        record(&self.log, "detect_fps");
        Ok(self.fps)
    }

    async fn has_audio(&self, _target: &Path, _cancel: &CancellationToken) -> Result<bool, ToolError> {
        record(&self.log, "has_audio");
        Ok(self.audio)
    }

    async fn extract_frames(
        &self,
        request: &ExtractRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        record(&self.log, format!("extract_frames:{:?}", request.fps));
        self.workspaces
            .lock()
            .unwrap()
            .push(request.frames_dir.to_path_buf());

        match self.fault {
            Some(FakeFault::ExtractNothing) => Err(injected("ffmpeg")),
            Some(FakeFault::ExtractPartial) => {
                self.write_frames(request, 2);
                Err(injected("ffmpeg"))
            }
            Some(FakeFault::ExtractHang) => {
                self.write_frames(request, 2);
                cancel.cancelled().await;
                Err(ToolError::Cancelled)
            }
            _ => {
                self.write_frames(request, self.frame_count);
                Ok(())
            }
        }
    }

    async fn encode_video(
        &self,
        request: &VideoEncodeRequest<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        record(&self.log, format!("encode_video:{}", request.fps));
        match self.fault {
            Some(FakeFault::Encode) => Err(injected("ffmpeg")),
            Some(FakeFault::EncodeWithoutArtifact) => Ok(()),
            _ => {
                let frames = Self::frames_in(request.frames_dir);
                std::fs::write(request.output, format!("video:{}", frames)).unwrap();
                Ok(())
            }
        }
    }

    async fn encode_animated(
        &self,
        request: &AnimatedEncodeRequest<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        record(&self.log, format!("encode_animated:{}", request.container.extension()));
        match self.fault {
            Some(FakeFault::Encode) => Err(injected("ffmpeg")),
            Some(FakeFault::EncodeWithoutArtifact) => Ok(()),
            _ => {
                let frames = Self::frames_in(request.frames_dir);
                std::fs::write(request.output, format!("animation:{}", frames)).unwrap();
                Ok(())
            }
        }
    }

    async fn mux_audio(
        &self,
        video: &Path,
        _audio_source: &Path,
        output: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolError> {
        record(&self.log, "mux_audio");
        if self.fails_at(FakeFault::Mux) {
            // a half-written file, as a crashing muxer would leave behind
            std::fs::write(output, b"partial").unwrap();
            return Err(injected("ffmpeg"));
        }
        let mut muxed = std::fs::read(video).unwrap();
        muxed.extend_from_slice(b"+audio");
        std::fs::write(output, muxed).unwrap();
        Ok(())
    }
}

/// Processor that records every hook call as `name:hook`
pub(crate) struct RecordingProcessor {
    name: String,
    log: CallLog,
    reject_pre_check: bool,
    reject_pre_start: bool,
    fail_process: bool,
    corrupt_output: bool,
    interrupt_with: Option<ProcessorContext>,
}

impl RecordingProcessor {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            reject_pre_check: false,
            reject_pre_start: false,
            fail_process: false,
            corrupt_output: false,
            interrupt_with: None,
        }
    }

    pub fn rejecting_pre_check(mut self) -> Self {
        self.reject_pre_check = true;
        self
    }

    pub fn rejecting_pre_start(mut self) -> Self {
        self.reject_pre_start = true;
        self
    }

    pub fn failing_process(mut self) -> Self {
        self.fail_process = true;
        self
    }

    /// Leaves an undecodable file behind on the image path
    pub fn corrupting_output(mut self) -> Self {
        self.corrupt_output = true;
        self
    }

    /// Walks frames with `context` and cancels its token on the first one,
    /// as an interrupt arriving mid-sequence would
    pub fn interrupting(mut self, context: ProcessorContext) -> Self {
        self.interrupt_with = Some(context);
        self
    }

    fn record(&self, hook: impl std::fmt::Display) {
        record(&self.log, format!("{}:{}", self.name, hook));
    }
}

impl FrameProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_check(&self) -> bool {
        self.record("pre_check");
        !self.reject_pre_check
    }

    fn pre_start(&self, _source: &Path, _target: &Path) -> bool {
        self.record("pre_start");
        !self.reject_pre_start
    }

    fn process_image(&self, _source: &Path, target: &Path, output: &Path) -> anyhow::Result<()> {
        self.record("process_image");
        if self.fail_process {
            anyhow::bail!("injected processor failure");
        }
        if self.corrupt_output {
            std::fs::write(output, b"not an image")?;
            return Ok(());
        }
        if let Ok(mut image) = image::open(target) {
            image.invert();
            image.save(output)?;
        }
        Ok(())
    }

    fn process_video(&self, _source: &Path, frames: &[PathBuf]) -> anyhow::Result<()> {
        self.record(format!("process_video:{}", frames.len()));
        if self.fail_process {
            anyhow::bail!("injected processor failure");
        }
        if let Some(context) = &self.interrupt_with {
            for_each_frame(frames, context, &self.name, |_| {
                self.record("frame");
                context.cancel.cancel();
                Ok(())
            })?;
        }
        Ok(())
    }

    fn post_process(&self) {
        self.record("post_process");
    }
}
