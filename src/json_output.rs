//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per i front-end che
//! guidano la pipeline come processo figlio.
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run (target, output, processor configurati)
//! - `status`: Una riga di stato per ogni transizione di stage
//! - `warning`: Condizione degradata non fatale (es. audio senza fps originali)
//! - `frames_not_found`: Nessun frame estratto, run terminato senza output
//! - `complete`: Output prodotto
//! - `error`: Fallimento strutturato con stage e causa

use crate::media::MediaKind;
use crate::pipeline::Stage;
use serde::Serialize;
use std::path::PathBuf;

/// One line of machine-readable output
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        source: PathBuf,
        target: PathBuf,
        output: PathBuf,
        frame_processors: Vec<String>,
    },

    Status {
        scope: String,
        message: String,
    },

    Warning {
        scope: String,
        message: String,
    },

    FramesNotFound {
        target: PathBuf,
    },

    Complete {
        output: PathBuf,
        media: MediaKind,
        duration_seconds: f64,
    },

    Error {
        stage: Stage,
        message: String,
    },
}

impl JsonMessage {
    /// Serialize to a single line
    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Some(json) = self.to_line() {
            println!("{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AnimatedContainer;

    #[test]
    fn test_messages_are_tagged() {
        let line = JsonMessage::Status {
            scope: "FRAME_PIPELINE.CORE".to_string(),
            message: "Extracting frames...".to_string(),
        }
        .to_line()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["scope"], "FRAME_PIPELINE.CORE");
    }

    #[test]
    fn test_error_and_complete_payloads() {
        let line = JsonMessage::Error {
            stage: Stage::Extraction,
            message: "boom".to_string(),
        }
        .to_line()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["stage"], "extraction");

        let line = JsonMessage::Complete {
            output: PathBuf::from("/out/loop.gif"),
            media: MediaKind::AnimatedSequence(AnimatedContainer::Gif),
            duration_seconds: 1.5,
        }
        .to_line()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["media"]["kind"], "animated_sequence");
        assert_eq!(value["media"]["container"], "gif");
    }
}
