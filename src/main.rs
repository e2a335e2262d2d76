//! # Frame Pipeline - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della `PipelineConfig` (file JSON opzionale + argomenti)
//! - Collegamento di Ctrl+C al token di cancellazione e avvio della pipeline
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (`RUST_LOG`, altrimenti INFO o DEBUG con `--verbose`)
//! 3. Carica la configurazione di base e applica gli override
//! 4. Costruisce la `Pipeline` (ffmpeg, provider, processor)
//! 5. Esegue il run e traduce il `RunResult` in exit code
//!
//! ## Exit code:
//! - `0`: output prodotto
//! - `1`: run fallito
//! - `2`: nessun frame estratto dal target
//! - `130`: interrotto (un secondo Ctrl+C esce subito, senza cleanup)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! frame-pipeline -s face.png -t clip.mp4 -o out.mp4 --frame-processor invert --skip-audio
//! ```

use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use frame_pipeline::processors::BUILTIN_PROCESSORS;
use frame_pipeline::tool_resolver::ToolPathResolver;
use frame_pipeline::{
    cancel_on_ctrl_c, CancellationToken, ExecutionProviders, FrameFormat, Pipeline, PipelineConfig,
    RunResult, VideoEncoder, INTERRUPTED_EXIT_CODE,
};

#[derive(Parser)]
#[command(name = "frame-pipeline")]
#[command(about = "Transform images and videos frame by frame")]
struct Args {
    /// Source (identity) image handed to the frame processors
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Target image, video or animated image
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Output file or directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frame processors to apply, in order
    #[arg(
        long = "frame-processor",
        num_args = 1..,
        value_parser = PossibleValuesParser::new(BUILTIN_PROCESSORS.iter().copied())
    )]
    frame_processors: Vec<String>,

    /// Keep the target's original fps
    #[arg(long)]
    keep_fps: Option<bool>,

    /// Do not restore the target's audio
    #[arg(long)]
    skip_audio: bool,

    /// Execution providers to request (e.g. cpu, cuda)
    #[arg(long = "execution-provider", num_args = 1..)]
    execution_providers: Vec<String>,

    /// Worker threads for frame processing
    #[arg(long)]
    execution_threads: Option<usize>,

    /// Image format of extracted frames
    #[arg(long, value_enum)]
    temp_frame_format: Option<FrameFormat>,

    /// Quality of extracted frames (0-100, lower = better)
    #[arg(long)]
    temp_frame_quality: Option<u8>,

    /// Encoder for the output video
    #[arg(long, value_enum)]
    output_video_encoder: Option<VideoEncoder>,

    /// Quality of the output video (0-100, lower = better)
    #[arg(long)]
    output_video_quality: Option<u8>,

    /// Position of the reference face
    #[arg(long)]
    reference_face_position: Option<usize>,

    /// Number of the reference frame
    #[arg(long)]
    reference_frame_number: Option<usize>,

    /// Face similarity threshold
    #[arg(long)]
    similar_face_distance: Option<f32>,

    /// Process every face
    #[arg(long)]
    many_faces: Option<bool>,

    /// Root directory for temporary workspaces
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// JSON configuration file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store the effective configuration to this file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Output status as JSON lines for programmatic use
    #[arg(long)]
    json: bool,

    /// Print the execution providers available on this host and exit
    #[arg(long)]
    list_providers: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(source) = self.source {
            config.source_path = source;
        }
        if let Some(target) = self.target {
            config.target_path = target;
        }
        if self.output.is_some() {
            config.output_path = self.output;
        }
        if !self.frame_processors.is_empty() {
            config.frame_processors = self.frame_processors;
        }
        if let Some(keep_fps) = self.keep_fps {
            config.keep_fps = keep_fps;
        }
        config.skip_audio |= self.skip_audio;
        if !self.execution_providers.is_empty() {
            config.execution_providers = self.execution_providers;
        }
        if self.execution_threads.is_some() {
            config.execution_threads = self.execution_threads;
        }
        if let Some(format) = self.temp_frame_format {
            config.temp_frame_format = format;
        }
        if let Some(quality) = self.temp_frame_quality {
            config.temp_frame_quality = quality;
        }
        if let Some(encoder) = self.output_video_encoder {
            config.output_video_encoder = encoder;
        }
        if let Some(quality) = self.output_video_quality {
            config.output_video_quality = quality;
        }
        if let Some(position) = self.reference_face_position {
            config.reference_face_position = position;
        }
        if let Some(frame) = self.reference_frame_number {
            config.reference_frame_number = frame;
        }
        if let Some(distance) = self.similar_face_distance {
            config.similar_face_distance = distance;
        }
        if let Some(many_faces) = self.many_faces {
            config.many_faces = many_faces;
        }
        if self.temp_dir.is_some() {
            config.temp_root = self.temp_dir;
        }
        config.json_output |= self.json;
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if args.json {
        // stdout is reserved for JSON lines
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if args.list_providers {
        let providers = ExecutionProviders::detect(&ToolPathResolver::new());
        for provider in providers.encoded() {
            println!("{}", provider);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config_file = args.config.clone().or_else(PipelineConfig::default_file);
    let base = match config_file {
        Some(ref path) => {
            debug!("Loading configuration from {}", path.display());
            PipelineConfig::from_file(path).await?
        }
        None => PipelineConfig::default(),
    };

    let save_config = args.save_config.clone();
    let config = args.apply(base);

    if let Some(ref path) = save_config {
        config.save_to_file(path).await?;
        info!("Configuration saved to {}", path.display());
    }

    let cancel = CancellationToken::new();
    let pipeline = Pipeline::from_config(config, &cancel)?;

    let interrupt = cancel_on_ctrl_c(cancel.clone());
    let result = pipeline.run(&cancel).await;
    interrupt.abort();

    Ok(match result {
        RunResult::Succeeded { output, kind } => {
            info!("Created {} at {}", kind, output.display());
            ExitCode::SUCCESS
        }
        RunResult::FramesNotFound => ExitCode::from(2),
        RunResult::Failed(failure) if failure.is_cancelled() => ExitCode::from(INTERRUPTED_EXIT_CODE),
        RunResult::Failed(_) => ExitCode::FAILURE,
    })
}
