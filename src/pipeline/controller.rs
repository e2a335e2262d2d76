//! # Pipeline Controller
//!
//! Sequenzia gli stage in base al `MediaKind` del target e traduce ogni esito
//! in un `RunResult` terminale.
//!
//! ## Garanzie:
//! - Nessuno stage con stato (workspace, estrazione) prima di precheck e classificazione
//! - Il workspace viene distrutto su ogni percorso: successo, errore, cancellazione
//! - In caso di fallimento nessun file resta all'output configurato
//! - L'output è confermato solo dopo che il workspace è stato rimosso
//!
//! ## Esempio:
//! ```rust,ignore
//! let cancel = CancellationToken::new();
//! let pipeline = Pipeline::from_config(config, &cancel)?;
//! match pipeline.run(&cancel).await {
//!     RunResult::Succeeded { output, .. } => println!("{}", output.display()),
//!     RunResult::FramesNotFound => println!("frames not found"),
//!     RunResult::Failed(failure) => eprintln!("{}", failure),
//! }
//! ```

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ffmpeg::{FfmpegTool, MediaTool, FALLBACK_FPS};
use crate::frames::{self, Extraction, FrameSequence};
use crate::media::{self, MediaKind};
use crate::pipeline::{
    Dispatcher, PipelineState, Reassembler, RunFailure, RunResult, Stage, StatusReporter,
};
use crate::processors::{self, frame_io, ProcessorContext, ProcessorTuning, SharedProcessor};
use crate::providers::ExecutionProviders;
use crate::tool_resolver::ToolPathResolver;
use crate::workspace::{Workspace, WorkspaceManager};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::{debug, warn};

/// Frame rate of the reassembled output when the original is not kept
pub const DEFAULT_FPS: f64 = FALLBACK_FPS;

enum Outcome {
    Produced(MediaKind),
    FramesNotFound,
}

/// Orchestrates one run over a validated [`PipelineConfig`]
pub struct Pipeline<T: MediaTool> {
    config: PipelineConfig,
    tool: T,
    dispatcher: Dispatcher,
    workspaces: WorkspaceManager,
    reporter: StatusReporter,
}

impl Pipeline<FfmpegTool> {
    /// Wires ffmpeg, host provider negotiation and the configured processors.
    ///
    /// Processors watch `cancel` between frames, so it must be the token later
    /// handed to [`Pipeline::run`].
    pub fn from_config(config: PipelineConfig, cancel: &CancellationToken) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(format!("{:#}", e)))?;

        let resolver = ToolPathResolver::new();
        let tool = FfmpegTool::with_resolver(&resolver, &config.tool_log_level);
        let host = ExecutionProviders::detect(&resolver);
        let context = processor_context(&config, &host, cancel);
        let processors = processors::build(&config.frame_processors, &context)?;

        Ok(Self::new(config, tool, processors))
    }
}

impl<T: MediaTool> Pipeline<T> {
    pub fn new(config: PipelineConfig, tool: T, processors: Vec<SharedProcessor>) -> Self {
        let reporter = StatusReporter::new(config.json_output);
        Self {
            workspaces: WorkspaceManager::new(config.temp_root.clone()),
            dispatcher: Dispatcher::new(processors, reporter),
            config,
            tool,
            reporter,
        }
    }

    /// Runs every stage once; never panics on stage failure
    pub async fn run(&self, cancel: &CancellationToken) -> RunResult {
        let started = Instant::now();
        let output = self.config.resolved_output_path();
        let mut state = StateTracker::default();

        self.reporter.start(
            &self.config.source_path,
            &self.config.target_path,
            &output,
            &self.config.frame_processors,
        );

        let outcome = self.execute(&output, &mut state, cancel).await;

        match outcome {
            Ok(Outcome::Produced(kind)) => {
                state.advance(PipelineState::Succeeded);
                let message = match kind {
                    MediaKind::StillImage => "Processing to image succeed!",
                    _ => "Processing to video succeed!",
                };
                self.reporter.status(message);
                self.reporter
                    .complete(&output, kind, started.elapsed().as_secs_f64());
                RunResult::Succeeded { output, kind }
            }
            Ok(Outcome::FramesNotFound) => {
                state.advance(PipelineState::Succeeded);
                RunResult::FramesNotFound
            }
            Err(cause) => {
                state.advance(PipelineState::Failed);
                let failure = RunFailure::from(cause);
                self.reporter
                    .failure(failure.stage, &failure.cause.to_string());
                RunResult::Failed(failure)
            }
        }
    }

    async fn execute(
        &self,
        output: &Path,
        state: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let source = &self.config.source_path;
        let target = &self.config.target_path;

        cancel.check(Stage::Precheck)?;
        self.tool.check().await?;
        self.dispatcher.pre_check()?;
        state.advance(PipelineState::Prechecked);

        cancel.check(Stage::Classify)?;
        let kind = media::classify(target)?;
        debug!("Target {} classified as {}", target.display(), kind);
        state.advance(PipelineState::Classified);

        self.dispatcher.pre_start(source, target)?;

        match kind {
            MediaKind::StillImage => {
                self.process_image(output, cancel).await?;
                state.advance(PipelineState::ImageDone);
                // no workspace on this path: cleanup is a no-op
                state.advance(PipelineState::Cleaned);
                Ok(Outcome::Produced(kind))
            }
            MediaKind::Video | MediaKind::AnimatedSequence(_) => {
                self.process_sequence(kind, output, state, cancel).await
            }
        }
    }

    async fn process_image(&self, output: &Path, cancel: &CancellationToken) -> Result<(), PipelineError> {
        cancel.check(Stage::Processing)?;
        let mut guard = OutputGuard::new(output);

        guard.arm();
        // the output copy is the working file of the image path
        fs::copy(&self.config.target_path, output)
            .await
            .map_err(|source| PipelineError::Workspace {
                path: output.to_path_buf(),
                source,
            })?;
        self.dispatcher
            .process_image(&self.config.source_path, output, cancel)
            .await?;

        if let Err(e) = frame_io::dimensions(output) {
            self.reporter.status("Processing to image failed!");
            let processor = self.dispatcher.names().pop().unwrap_or_default();
            return Err(PipelineError::Processing {
                processor,
                cause: format!("Processing to image failed: {}", e),
            });
        }

        guard.commit();
        Ok(())
    }

    async fn process_sequence(
        &self,
        kind: MediaKind,
        output: &Path,
        state: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        cancel.check(Stage::Workspace)?;
        self.reporter.status("Creating temporary resources...");
        let workspace = self.workspaces.create(&self.config.target_path).await?;
        state.advance(PipelineState::WorkspaceReady);

        let mut guard = OutputGuard::new(output);
        let result = self
            .in_workspace(&workspace, kind, output, &mut guard, state, cancel)
            .await;

        self.reporter.status("Cleaning temporary resources...");
        let cleanup = self.workspaces.destroy(workspace).await;
        state.advance(PipelineState::Cleaned);

        match (result, cleanup) {
            (Ok(outcome), Ok(())) => {
                guard.commit();
                Ok(outcome)
            }
            (Ok(_), Err(cleanup_error)) => Err(cleanup_error),
            (Err(e), cleanup) => {
                if let Err(cleanup_error) = cleanup {
                    warn!("Cleanup after failure also failed: {}", cleanup_error);
                }
                Err(e)
            }
        }
    }

    async fn in_workspace(
        &self,
        workspace: &Workspace,
        kind: MediaKind,
        output: &Path,
        guard: &mut OutputGuard,
        state: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let config = &self.config;
        let target = &config.target_path;

        cancel.check(Stage::Extraction)?;
        // without keep_fps every native frame is extracted and re-timed on encode
        let (fps, extraction_fps) = if config.keep_fps {
            self.reporter.status("Detecting fps...");
            let fps = self
                .tool
                .detect_fps(target, cancel)
                .await
                .map_err(|e| PipelineError::from_tool(Stage::Extraction, e))?;
            self.reporter
                .status(&format!("Extracting frames with {} FPS...", fps));
            (fps, Some(fps))
        } else {
            self.reporter.status("Extracting frames...");
            (DEFAULT_FPS, None)
        };

        let extraction = frames::extract(
            &self.tool,
            target,
            workspace,
            config.temp_frame_format,
            config.temp_frame_quality,
            extraction_fps,
            cancel,
        )
        .await?;

        let sequence = match extraction {
            Extraction::Frames(sequence) => sequence,
            Extraction::NotFound { .. } => {
                self.reporter.frames_not_found(target);
                return Ok(Outcome::FramesNotFound);
            }
        };
        state.advance(PipelineState::Extracted);

        self.dispatcher
            .process_video(&config.source_path, &sequence, cancel)
            .await?;
        let sequence = relist(&sequence)?;
        state.advance(PipelineState::Processed);

        let reassembler = Reassembler::new(&self.tool, config, self.reporter);
        let intermediate = reassembler
            .reassemble(&sequence, workspace, output, fps, kind, cancel)
            .await?;
        state.advance(PipelineState::Reassembled);

        cancel.check(Stage::AudioRestoration)?;
        guard.arm();
        match kind {
            MediaKind::Video => {
                reassembler
                    .restore_audio(target, &intermediate, output, cancel)
                    .await?;
                state.advance(PipelineState::AudioDone);
            }
            _ => super::move_file(&intermediate, output).await?,
        }

        Ok(Outcome::Produced(kind))
    }
}

/// Processors may rewrite frames but never add or drop them
fn relist(sequence: &FrameSequence) -> Result<FrameSequence, PipelineError> {
    let listed = FrameSequence::list(sequence.dir(), sequence.format())?;
    if listed.len() != sequence.len() {
        return Err(PipelineError::Processing {
            processor: "frame sequence".to_string(),
            cause: format!(
                "expected {} frames after processing, found {}",
                sequence.len(),
                listed.len()
            ),
        });
    }
    Ok(listed)
}

/// Builds the opaque context handed to frame processors
pub fn processor_context(
    config: &PipelineConfig,
    host: &ExecutionProviders,
    cancel: &CancellationToken,
) -> ProcessorContext {
    let negotiated = host.negotiate(&config.execution_providers);
    if negotiated.is_empty() {
        warn!(
            "None of the requested execution providers {:?} is available (host offers {:?})",
            config.execution_providers,
            host.encoded()
        );
    }
    let execution_threads = config
        .execution_threads
        .unwrap_or_else(|| ExecutionProviders::new(negotiated.clone()).suggest_threads());

    ProcessorContext {
        execution_providers: negotiated,
        execution_threads,
        temp_frame_quality: config.temp_frame_quality,
        tuning: ProcessorTuning {
            reference_face_position: config.reference_face_position,
            reference_frame_number: config.reference_frame_number,
            similar_face_distance: config.similar_face_distance,
            many_faces: config.many_faces,
        },
        show_progress: !config.json_output,
        cancel: cancel.clone(),
    }
}

/// Forward-only state tracking with debug logging
#[derive(Debug)]
struct StateTracker {
    current: PipelineState,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            current: PipelineState::Init,
        }
    }
}

impl StateTracker {
    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.current, "{:?} -> {:?}", self.current, next);
        debug!("State {:?} -> {:?}", self.current, next);
        self.current = next;
    }
}

/// Removes whatever was written at the output path unless committed
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: false,
        }
    }

    /// From now on the output path belongs to this run
    fn arm(&mut self) {
        self.armed = true;
    }

    fn commit(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed incomplete output {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove incomplete output {}: {}", self.path.display(), e),
        }
    }
}
