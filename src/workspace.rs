//! # Temp Workspace Lifecycle Module
//!
//! Questo modulo crea e distrugge la directory effimera di un run.
//!
//! ## Responsabilità:
//! - Percorso deterministico derivato dal target:
//!   - default: `<dir del target>/temp/<stem del target>`
//!   - con `temp_root`: `<temp_root>/<stem>-<sha256 del path, 16 hex>`
//! - `create`: rimuove eventuali residui di un run precedente e crea la directory
//! - `destroy`: rimozione idempotente (una directory già assente non è un errore)
//! - `Workspace` è un guard: se non viene distrutto esplicitamente (panic,
//!   future droppato) la directory viene rimossa nel `Drop`
//!
//! ## Limitazione nota:
//! Due run concorrenti sullo stesso target condividono lo stesso workspace;
//! run su target diversi sono indipendenti.

use crate::error::PipelineError;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const DEFAULT_TEMP_DIR: &str = "temp";

/// Creates and destroys per-run workspaces
#[derive(Debug, Clone, Default)]
pub struct WorkspaceManager {
    temp_root: Option<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(temp_root: Option<PathBuf>) -> Self {
        Self { temp_root }
    }

    /// Deterministic workspace location for a target
    pub fn location(&self, target: &Path) -> PathBuf {
        let stem = target
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".to_string());

        match &self.temp_root {
            None => target
                .parent()
                .unwrap_or(Path::new(""))
                .join(DEFAULT_TEMP_DIR)
                .join(stem),
            Some(root) => {
                let absolute = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
                let mut hasher = Sha256::new();
                hasher.update(absolute.to_string_lossy().as_bytes());
                let hash = hex::encode(hasher.finalize())[..16].to_string();
                root.join(format!("{}-{}", stem, hash))
            }
        }
    }

    /// Create the workspace for `target`
    pub async fn create(&self, target: &Path) -> Result<Workspace, PipelineError> {
        let dir = self.location(target);
        let workspace_error = |source: io::Error| PipelineError::Workspace {
            path: dir.clone(),
            source,
        };

        if fs::try_exists(&dir).await.map_err(workspace_error)? {
            warn!("Removing stale workspace {}", dir.display());
            fs::remove_dir_all(&dir).await.map_err(workspace_error)?;
        }
        fs::create_dir_all(&dir).await.map_err(workspace_error)?;
        debug!("Created workspace {}", dir.display());

        let cleanup_parent = match self.temp_root {
            None => dir.parent().map(Path::to_path_buf),
            Some(_) => None,
        };

        Ok(Workspace {
            dir,
            cleanup_parent,
            armed: true,
        })
    }

    /// Destroy a workspace obtained from `create`
    pub async fn destroy(&self, mut workspace: Workspace) -> Result<(), PipelineError> {
        workspace.armed = false;
        remove_workspace(&workspace.dir, workspace.cleanup_parent.as_deref()).await
    }

    /// Idempotent removal of whatever workspace `target` maps to
    pub async fn destroy_for(&self, target: &Path) -> Result<(), PipelineError> {
        let dir = self.location(target);
        let parent = match self.temp_root {
            None => dir.parent().map(Path::to_path_buf),
            Some(_) => None,
        };
        remove_workspace(&dir, parent.as_deref()).await
    }
}

async fn remove_workspace(dir: &Path, cleanup_parent: Option<&Path>) -> Result<(), PipelineError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed workspace {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Workspace {} already absent", dir.display())
        }
        Err(source) => {
            return Err(PipelineError::Workspace {
                path: dir.to_path_buf(),
                source,
            })
        }
    }

    if let Some(parent) = cleanup_parent {
        // only succeeds when no other workspace lives there
        let _ = fs::remove_dir(parent).await;
    }
    Ok(())
}

/// A live workspace directory; removed on drop unless destroyed explicitly
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    cleanup_parent: Option<PathBuf>,
    armed: bool,
}

impl Workspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an intermediate artifact such as `temp.mp4`
    pub fn intermediate(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("temp.{}", extension))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Workspace {} dropped without destroy, removing", self.dir.display());
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.dir.display(), e);
            }
        }
        if let Some(ref parent) = self.cleanup_parent {
            let _ = std::fs::remove_dir(parent);
        }
    }
}
