//! # Frame Processors Module
//!
//! Capability polimorfica applicata a un'immagine o a un'intera sequenza di frame.
//!
//! ## Ciclo di vita di un processor:
//! 1. `pre_check`: requisiti d'ambiente (chiamato prima di qualsiasi lavoro)
//! 2. `pre_start`: validazione di source/target per questo run
//! 3. `process_image` oppure `process_video`
//! 4. `post_process`: rilascio dello stato interno (cache, modelli)
//!
//! ## Processor disponibili:
//! - `grayscale`: conversione in scala di grigi
//! - `invert`: inversione dei colori
//! - `overlay`: compone l'immagine source nell'angolo in basso a destra
//!
//! Ogni processor può parallelizzare internamente sui frame (thread pool
//! `rayon` dimensionato sul budget negoziato) e riscrive ogni frame nel suo
//! path originale, così l'ordinamento della sequenza resta valido.
//! Il token di cancellazione del run è controllato prima di ogni frame.

mod filters;
pub(crate) mod frame_io;
mod overlay;

pub use filters::{FilterKind, PixelFilter};
pub use overlay::Overlay;

use crate::cancel::CancellationToken;
use crate::error::PreconditionError;
use crate::progress::FrameProgress;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Names accepted by [`build`]
pub const BUILTIN_PROCESSORS: &[&str] = &["grayscale", "invert", "overlay"];

/// Transformation-specific values, passed through untouched
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorTuning {
    pub reference_face_position: usize,
    pub reference_frame_number: usize,
    pub similar_face_distance: f32,
    pub many_faces: bool,
}

/// Everything a processor receives from the controller
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Negotiated execution providers
    pub execution_providers: Vec<String>,
    /// Worker budget for parallel frame processing
    pub execution_threads: usize,
    /// Quality of frames written back (0-100, lower = better)
    pub temp_frame_quality: u8,
    pub tuning: ProcessorTuning,
    /// Draw progress bars
    pub show_progress: bool,
    /// Token of the run the processors belong to
    pub cancel: CancellationToken,
}

/// Returned by [`for_each_frame`] once the run has been cancelled
#[derive(Debug, thiserror::Error)]
#[error("cancelled during frame processing")]
pub struct Interrupted;

/// A pluggable transformation, one implementation per algorithm
pub trait FrameProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Environment requirements, checked before any work starts
    fn pre_check(&self) -> bool {
        true
    }

    /// Run-specific validation of the inputs
    fn pre_start(&self, source: &Path, target: &Path) -> bool {
        let _ = (source, target);
        true
    }

    /// Transform a still image; `target` and `output` may be the same file
    fn process_image(&self, source: &Path, target: &Path, output: &Path) -> Result<()>;

    /// Transform every frame of an ordered sequence in place
    fn process_video(&self, source: &Path, frames: &[PathBuf]) -> Result<()>;

    /// Release per-run state
    fn post_process(&self) {}
}

pub type SharedProcessor = Arc<dyn FrameProcessor>;

/// Instantiate the configured processors, keeping their order
pub fn build(names: &[String], context: &ProcessorContext) -> Result<Vec<SharedProcessor>, PreconditionError> {
    debug!(
        "Processor context: providers={:?} threads={} tuning={:?}",
        context.execution_providers, context.execution_threads, context.tuning
    );
    names
        .iter()
        .map(|name| -> Result<SharedProcessor, PreconditionError> {
            match name.as_str() {
                "grayscale" => Ok(Arc::new(PixelFilter::new(FilterKind::Grayscale, context.clone()))),
                "invert" => Ok(Arc::new(PixelFilter::new(FilterKind::Invert, context.clone()))),
                "overlay" => Ok(Arc::new(Overlay::new(context.clone()))),
                _ => Err(PreconditionError::UnknownProcessor { name: name.clone() }),
            }
        })
        .collect()
}

/// Applies `op` to every frame on a bounded worker pool
pub(crate) fn for_each_frame<F>(
    frames: &[PathBuf],
    context: &ProcessorContext,
    label: &str,
    op: F,
) -> Result<()>
where
    F: Fn(&Path) -> Result<()> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(context.execution_threads.max(1))
        .build()
        .context("failed to start frame worker pool")?;
    let progress = FrameProgress::new(frames.len() as u64, label, context.show_progress);

    let result = pool.install(|| {
        frames.par_iter().try_for_each(|frame| {
            if context.cancel.is_cancelled() {
                return Err(Interrupted.into());
            }
            op(frame).with_context(|| format!("frame {}", frame.display()))?;
            progress.advance();
            Ok(())
        })
    });

    if result.is_ok() {
        progress.finish(label);
    } else {
        debug!("{}: stopped after {} of {} frames", label, progress.position(), frames.len());
        progress.abandon(label);
    }
    result
}

#[cfg(test)]
pub(crate) fn test_context() -> ProcessorContext {
    ProcessorContext {
        execution_providers: vec!["CPUExecutionProvider".to_string()],
        execution_threads: 2,
        temp_frame_quality: 0,
        tuning: ProcessorTuning {
            reference_face_position: 0,
            reference_frame_number: 0,
            similar_face_distance: 0.85,
            many_faces: true,
        },
        show_progress: false,
        cancel: CancellationToken::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_build_keeps_configured_order() {
        let names = vec!["invert".to_string(), "grayscale".to_string(), "overlay".to_string()];
        let processors = build(&names, &test_context()).unwrap();
        let built: Vec<&str> = processors.iter().map(|p| p.name()).collect();
        assert_eq!(built, vec!["invert", "grayscale", "overlay"]);
    }

    #[test]
    fn test_build_rejects_unknown_names() {
        let names = vec!["invert".to_string(), "face_swapper".to_string()];
        match build(&names, &test_context()) {
            Err(PreconditionError::UnknownProcessor { name }) => assert_eq!(name, "face_swapper"),
            other => panic!("unexpected: {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_for_each_frame_visits_every_frame() {
        let frames: Vec<PathBuf> = (0..25).map(|i| PathBuf::from(format!("{:06}.png", i + 1))).collect();
        let visited = AtomicUsize::new(0);
        for_each_frame(&frames, &test_context(), "count", |_| {
            visited.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(visited.load(Ordering::SeqCst), 25);
    }

    #[test]
    fn test_for_each_frame_reports_failing_frame() {
        let frames: Vec<PathBuf> = (0..4).map(|i| PathBuf::from(format!("{:06}.png", i + 1))).collect();
        let err = for_each_frame(&frames, &test_context(), "fail", |frame| {
            if frame.ends_with("000003.png") {
                anyhow::bail!("corrupt");
            }
            Ok(())
        })
        .unwrap_err();
        assert!(format!("{:#}", err).contains("000003.png"));
    }

    #[test]
    fn test_for_each_frame_stops_once_cancelled() {
        let frames: Vec<PathBuf> = (0..50).map(|i| PathBuf::from(format!("{:06}.png", i + 1))).collect();
        let context = ProcessorContext {
            execution_threads: 1,
            ..test_context()
        };
        let visited = AtomicUsize::new(0);

        let err = for_each_frame(&frames, &context, "cancel", |_| {
            visited.fetch_add(1, Ordering::SeqCst);
            context.cancel.cancel();
            Ok(())
        })
        .unwrap_err();

        assert!(err.is::<Interrupted>());
        assert_eq!(visited.load(Ordering::SeqCst), 1);
    }
}
