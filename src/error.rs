//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` enum con la tassonomia completa degli stage
//! - Separa gli errori di precondizione (`PreconditionError`), di riassemblaggio
//!   (`ReassemblyError`) e di invocazione del tool esterno (`ToolError`)
//! - Integra con `thiserror` per automatic error conversion
//! - Associa ogni errore allo `Stage` in cui si è verificato
//!
//! ## Categorie di errori:
//! - `Precondition`: Ambiente o tool esterno mancante/incompatibile
//! - `UnsupportedMedia`: Il target non è classificabile
//! - `Workspace`: Impossibile creare la directory temporanea
//! - `Extraction`: ffmpeg fallito durante l'estrazione dei frame
//! - `Processing`: Un frame processor configurato è fallito
//! - `Reassembly`: Encode o mux audio falliti
//! - `Cancelled`: Interruzione ricevuta durante uno stage
//!
//! ## Esempio:
//! ```rust,ignore
//! if !tool_exists {
//!     return Err(PreconditionError::ToolMissing {
//!         tool: "ffmpeg".to_string(),
//!         hint: "sudo apt-get install ffmpeg".to_string(),
//!     }.into());
//! }
//! ```

use crate::pipeline::Stage;
use crate::processors::BUILTIN_PROCESSORS;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors raised by a pipeline run, one variant per failing stage
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Unsupported media {}: {reason}", path.display())]
    UnsupportedMedia { path: PathBuf, reason: String },

    #[error("Workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame extraction failed: {0}")]
    Extraction(String),

    #[error("Frame processor '{processor}' failed: {cause}")]
    Processing { processor: String, cause: String },

    #[error("Reassembly failed: {0}")]
    Reassembly(#[from] ReassemblyError),

    #[error("Cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stage the error is attributed to
    pub fn stage(&self) -> Stage {
        match self {
            Self::Precondition(_) | Self::Config(_) => Stage::Precheck,
            Self::UnsupportedMedia { .. } => Stage::Classify,
            Self::Workspace { .. } => Stage::Workspace,
            Self::Extraction(_) => Stage::Extraction,
            Self::Processing { .. } => Stage::Processing,
            Self::Reassembly(ReassemblyError::AudioMux(_)) => Stage::AudioRestoration,
            Self::Reassembly(_) => Stage::Reassembly,
            Self::Cancelled { stage } => *stage,
            Self::Io(_) => Stage::Finalize,
        }
    }

    /// Translate a tool failure raised while `stage` was running
    pub fn from_tool(stage: Stage, err: ToolError) -> Self {
        match err {
            ToolError::Cancelled => Self::Cancelled { stage },
            other => match stage {
                Stage::Extraction => Self::Extraction(other.to_string()),
                Stage::AudioRestoration => ReassemblyError::AudioMux(other.to_string()).into(),
                _ => ReassemblyError::Encode(other.to_string()).into(),
            },
        }
    }
}

/// Environment problems detected before any stateful work
#[derive(thiserror::Error, Debug)]
pub enum PreconditionError {
    #[error("{tool} is not installed ({hint})")]
    ToolMissing { tool: String, hint: String },

    #[error("{tool} version {found} is not supported - please upgrade to {required} or higher")]
    ToolIncompatible {
        tool: String,
        found: String,
        required: String,
    },

    #[error("Unknown frame processor: {name} (available: {})", BUILTIN_PROCESSORS.join(", "))]
    UnknownProcessor { name: String },

    #[error("Frame processor '{processor}' rejected the run in {hook}")]
    ProcessorRejected { processor: String, hook: &'static str },
}

/// Encode and audio-mux failures
#[derive(thiserror::Error, Debug)]
pub enum ReassemblyError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("expected artifact is missing: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("audio restoration failed: {0}")]
    AudioMux(String),
}

/// Outcome of a single external-tool invocation
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("interrupted")]
    Cancelled,
}
