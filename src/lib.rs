//! # Frame Pipeline Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri front-end
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione immutabile del run e validazione
//! - `error`: Tassonomia degli errori per stage
//! - `cancel`: Token di cancellazione strutturato
//! - `tool_resolver`: Discovery dei tool esterni (ffmpeg, ffprobe, nvidia-smi)
//! - `ffmpeg`: Confine verso il tool di encode/decode
//! - `providers`: Negoziazione degli execution provider
//! - `media`: Classificazione del target (immagine, video, animazione)
//! - `workspace`: Ciclo di vita della directory temporanea
//! - `frames`: Estrazione e verifica della sequenza di frame
//! - `processors`: Frame processor pluggabili
//! - `pipeline`: Controller, dispatcher, riassemblaggio e audio
//! - `progress` / `json_output`: Feedback per l'utente e per i front-end
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use frame_pipeline::{CancellationToken, Pipeline, PipelineConfig, RunResult};
//!
//! let cancel = CancellationToken::new();
//! let pipeline = Pipeline::from_config(config, &cancel)?;
//! let result = pipeline.run(&cancel).await;
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod frames;
pub mod json_output;
pub mod media;
pub mod pipeline;
pub mod processors;
pub mod progress;
pub mod providers;
pub mod tool_resolver;
pub mod utils;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::{cancel_on_ctrl_c, CancellationToken, INTERRUPTED_EXIT_CODE};
pub use config::{FrameFormat, PipelineConfig, VideoEncoder};
pub use error::{PipelineError, PreconditionError, ReassemblyError, ToolError};
pub use ffmpeg::{FfmpegTool, MediaTool};
pub use media::{classify, AnimatedContainer, MediaKind};
pub use pipeline::{Pipeline, RunFailure, RunResult, Stage};
pub use processors::{FrameProcessor, ProcessorContext};
pub use providers::ExecutionProviders;
