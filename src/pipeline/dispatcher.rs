//! # Frame Processing Dispatcher
//!
//! Esegue la catena di frame processor configurata, nell'ordine esatto in cui
//! è stata configurata.
//!
//! ## Responsabilità:
//! - `pre_check` e `pre_start` su tutti i processor, abort al primo rifiuto
//! - Still image: `process_image(source, output, output)` per ogni processor,
//!   così i processor si compongono modificando lo stesso file
//! - Video/animato: `process_video(source, frames)` sull'intera sequenza
//! - `post_process` dopo ogni processor
//!
//! Il lavoro di un processor è bloccante (decodifica/encode dei frame) e gira
//! su `spawn_blocking`; i processor distinti non si sovrappongono mai.
//! Un processor che si ferma per cancellazione produce `Cancelled`, non un
//! errore di processing.

use crate::cancel::CancellationToken;
use crate::error::{PipelineError, PreconditionError};
use crate::frames::FrameSequence;
use crate::pipeline::{Stage, StatusReporter};
use crate::processors::SharedProcessor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct Dispatcher {
    processors: Vec<SharedProcessor>,
    reporter: StatusReporter,
}

impl Dispatcher {
    pub fn new(processors: Vec<SharedProcessor>, reporter: StatusReporter) -> Self {
        Self {
            processors,
            reporter,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.name().to_string()).collect()
    }

    /// Environment checks of every processor
    pub fn pre_check(&self) -> Result<(), PipelineError> {
        for processor in &self.processors {
            if !processor.pre_check() {
                return Err(rejected(processor, "pre_check"));
            }
        }
        Ok(())
    }

    /// Input validation of every processor, in order
    pub fn pre_start(&self, source: &Path, target: &Path) -> Result<(), PipelineError> {
        for processor in &self.processors {
            debug!("pre_start: {}", processor.name());
            if !processor.pre_start(source, target) {
                return Err(rejected(processor, "pre_start"));
            }
        }
        Ok(())
    }

    /// Transforms the still image at `output` in place
    pub async fn process_image(
        &self,
        source: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        for processor in &self.processors {
            cancel.check(Stage::Processing)?;
            self.reporter.status_in(&scope(processor), "Progressing...");

            let (worker, source, output) = (Arc::clone(processor), source.to_path_buf(), output.to_path_buf());
            run_blocking(processor, cancel, move || {
                let result = worker.process_image(&source, &output, &output);
                worker.post_process();
                result
            })
            .await?;
        }
        Ok(())
    }

    /// Transforms every frame of `frames` with each processor in turn
    pub async fn process_video(
        &self,
        source: &Path,
        frames: &FrameSequence,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        for processor in &self.processors {
            cancel.check(Stage::Processing)?;
            self.reporter.status_in(&scope(processor), "Progressing...");

            let worker = Arc::clone(processor);
            let source = source.to_path_buf();
            let paths: Vec<PathBuf> = frames.paths().to_vec();
            run_blocking(processor, cancel, move || {
                let result = worker.process_video(&source, &paths);
                worker.post_process();
                result
            })
            .await?;
        }
        // third-party processors may ignore the token and finish the sequence
        cancel.check(Stage::Processing)
    }
}

/// Status scope of a processor, e.g. `FRAME_PIPELINE.OVERLAY`
fn scope(processor: &SharedProcessor) -> String {
    format!("FRAME_PIPELINE.{}", processor.name().to_uppercase())
}

fn rejected(processor: &SharedProcessor, hook: &'static str) -> PipelineError {
    PreconditionError::ProcessorRejected {
        processor: processor.name().to_string(),
        hook,
    }
    .into()
}

async fn run_blocking<F>(
    processor: &SharedProcessor,
    cancel: &CancellationToken,
    work: F,
) -> Result<(), PipelineError>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let processing_error = |cause: String| PipelineError::Processing {
        processor: processor.name().to_string(),
        cause,
    };

    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if cancel.is_cancelled() => {
            debug!("{} stopped: {:#}", processor.name(), e);
            Err(PipelineError::Cancelled {
                stage: Stage::Processing,
            })
        }
        Ok(Err(e)) => Err(processing_error(format!("{:#}", e))),
        Err(join_error) => Err(processing_error(format!("worker panicked: {}", join_error))),
    }
}
