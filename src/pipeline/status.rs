//! # Status Reporting
//!
//! Righe di stato leggibili nel formato `[SCOPE] messaggio`, emesse dal
//! controller e dal dispatcher durante il run.
//!
//! ## Responsabilità:
//! - Stato di avanzamento per scope (`FRAME_PIPELINE.CORE`, `FRAME_PIPELINE.<PROCESSOR>`)
//! - Warning non fatali (es. fps non mantenuti durante il restore audio)
//! - Messaggi di inizio, completamento e fallimento in modalità JSON
//!
//! In modalità JSON ogni riga è replicata su stdout come `JsonMessage`.

use crate::json_output::JsonMessage;
use crate::media::MediaKind;
use crate::pipeline::Stage;
use std::path::Path;
use tracing::{error, info, warn};

/// Scope used by the controller's own status lines
pub const CORE_SCOPE: &str = "FRAME_PIPELINE.CORE";

/// Human-readable `[SCOPE] message` lines, mirrored as JSON when enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusReporter {
    json: bool,
}

impl StatusReporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn status(&self, message: &str) {
        self.status_in(CORE_SCOPE, message);
    }

    pub fn status_in(&self, scope: &str, message: &str) {
        info!("[{}] {}", scope, message);
        if self.json {
            JsonMessage::Status {
                scope: scope.to_string(),
                message: message.to_string(),
            }
            .emit();
        }
    }

    pub fn warning(&self, message: &str) {
        warn!("[{}] {}", CORE_SCOPE, message);
        if self.json {
            JsonMessage::Warning {
                scope: CORE_SCOPE.to_string(),
                message: message.to_string(),
            }
            .emit();
        }
    }

    pub fn start(&self, source: &Path, target: &Path, output: &Path, processors: &[String]) {
        if self.json {
            JsonMessage::Start {
                source: source.to_path_buf(),
                target: target.to_path_buf(),
                output: output.to_path_buf(),
                frame_processors: processors.to_vec(),
            }
            .emit();
        }
    }

    pub fn frames_not_found(&self, target: &Path) {
        self.status("Frames not found...");
        if self.json {
            JsonMessage::FramesNotFound {
                target: target.to_path_buf(),
            }
            .emit();
        }
    }

    pub fn complete(&self, output: &Path, media: MediaKind, duration_seconds: f64) {
        if self.json {
            JsonMessage::Complete {
                output: output.to_path_buf(),
                media,
                duration_seconds,
            }
            .emit();
        }
    }

    pub fn failure(&self, stage: Stage, message: &str) {
        error!("[{}] {} failed: {}", CORE_SCOPE, stage, message);
        if self.json {
            JsonMessage::Error {
                stage,
                message: message.to_string(),
            }
            .emit();
        }
    }
}
