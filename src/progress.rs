//! # Progress Tracking Module
//!
//! Questo modulo gestisce il feedback visuale per l'elaborazione dei frame.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif` per i frame elaborati da un processor
//! - Barra nascosta in modalità JSON (stdout riservato ai messaggi strutturati)
//! - Thread-safe: può essere incrementata dai worker del pool
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 150/240 (62%) invert
//! ```

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Per-processor frame progress
#[derive(Clone)]
pub struct FrameProgress {
    bar: ProgressBar,
}

impl FrameProgress {
    /// Create a progress bar over `total_frames`
    pub fn new(total_frames: u64, label: &str, visible: bool) -> Self {
        let bar = ProgressBar::new(total_frames);

        if visible {
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(label.to_string());

        Self { bar }
    }

    /// A frame was written back
    pub fn advance(&self) {
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Leave the bar where it is, e.g. after a failing frame
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}
