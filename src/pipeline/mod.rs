//! # Pipeline Orchestration Module
//!
//! Questo modulo coordina gli stage della trasformazione di un target.
//!
//! ## Componenti:
//! - `controller`: sequenzia gli stage, possiede il workspace e produce il `RunResult`
//! - `dispatcher`: lifecycle dei frame processor (pre_check, pre_start, process, post_process)
//! - `reassembly`: encode video/animato e ripristino dell'audio
//! - `status`: righe di stato `[SCOPE] messaggio` (tracing + JSON opzionale)
//!
//! ## State machine:
//! ```text
//! INIT → PRECHECKED → CLASSIFIED → { IMAGE_DONE
//!                                  | WORKSPACE_READY → EXTRACTED → PROCESSED
//!                                    → REASSEMBLED → AUDIO_DONE }
//!      → CLEANED → { SUCCEEDED | FAILED }
//! ```

mod controller;
mod dispatcher;
mod reassembly;
mod status;

pub use controller::Pipeline;
pub use dispatcher::Dispatcher;
pub use reassembly::{move_file, Reassembler};
pub use status::StatusReporter;

use crate::error::PipelineError;
use crate::media::MediaKind;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Stage a run is in, and the attribution of any failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Precheck,
    Classify,
    Workspace,
    Extraction,
    Processing,
    Reassembly,
    AudioRestoration,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Precheck => "precheck",
            Stage::Classify => "classification",
            Stage::Workspace => "workspace setup",
            Stage::Extraction => "frame extraction",
            Stage::Processing => "frame processing",
            Stage::Reassembly => "reassembly",
            Stage::AudioRestoration => "audio restoration",
            Stage::Finalize => "finalization",
        };
        f.write_str(name)
    }
}

/// Controller states; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Init,
    Prechecked,
    Classified,
    ImageDone,
    WorkspaceReady,
    Extracted,
    Processed,
    Reassembled,
    AudioDone,
    Cleaned,
    Succeeded,
    Failed,
}

/// Structured failure handed back to the caller
#[derive(Debug)]
pub struct RunFailure {
    pub stage: Stage,
    pub cause: PipelineError,
}

impl RunFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, PipelineError::Cancelled { .. })
    }
}

impl From<PipelineError> for RunFailure {
    fn from(cause: PipelineError) -> Self {
        Self {
            stage: cause.stage(),
            cause,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.cause)
    }
}

/// Terminal value of a run: exactly one of output, "frames not found", failure
#[derive(Debug)]
pub enum RunResult {
    Succeeded { output: PathBuf, kind: MediaKind },
    FramesNotFound,
    Failed(RunFailure),
}

impl RunResult {
    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            RunResult::Succeeded { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RunResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
