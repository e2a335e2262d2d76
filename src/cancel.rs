//! # Cancellation Module
//!
//! Token di cancellazione strutturato, condiviso tra il controller della
//! pipeline e le invocazioni dei tool esterni.
//!
//! ## Responsabilità:
//! - `CancellationToken`: flag clonabile + notifica async per i task in attesa
//! - Controllo ai confini di ogni stage (`check`)
//! - Controllo per frame dentro i processor (il token viaggia nel `ProcessorContext`)
//! - Collegamento opzionale a Ctrl+C (`cancel_on_ctrl_c`), usato solo dal binario
//!
//! La libreria non installa mai signal handler: la prima interruzione passa
//! dal token e quindi dallo stesso percorso di cleanup di un errore. Una
//! seconda interruzione termina il processo senza attendere il cleanup.

use crate::error::PipelineError;
use crate::pipeline::Stage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation shared by every stage of a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Stage-boundary check
    pub fn check(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Exit code of a process stopped by an interrupt
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Cancel `token` on the first Ctrl+C, exit the process on the second
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for interrupts: {}", e);
            return;
        }
        warn!("Interrupt received, stopping and cleaning up... (press Ctrl+C again to exit now)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt received, exiting without cleanup");
            std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
        }
    })
}
