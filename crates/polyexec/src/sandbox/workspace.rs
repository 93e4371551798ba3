//! Workspace lifecycle management
//!
//! Every execution gets a private scratch directory that is removed once the
//! request is finished.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;

const WORKSPACE_PREFIX: &str = "run-";

/// A per-request scratch directory
///
/// # Cleanup
///
/// Call [`release()`](Self::release) when the request is done. Dropping an
/// unreleased workspace still removes the directory, but logs a warning.
#[derive(Debug)]
pub struct Workspace {
    /// Backing directory, `None` once released
    dir: Option<TempDir>,

    /// Path to the workspace directory
    path: PathBuf,

    /// Concurrency permit (if a limit is configured)
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the host path to a file inside the workspace
    ///
    /// Returns an error for absolute paths or paths that leave the workspace.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        let relative = Path::new(name);
        let contained = !name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(SandboxError::InvalidPath(format!(
                "path escapes workspace: {name}"
            )));
        }
        Ok(self.path.join(relative))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), SandboxError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Remove the workspace directory and everything in it
    ///
    /// Consumes the workspace, so a directory can only be released once. The
    /// concurrency permit is returned even when removal fails.
    #[must_use = "cleanup errors should be handled"]
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn release(mut self) -> Result<(), SandboxError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(result) => result?,
            Err(join) => {
                return Err(SandboxError::Io(std::io::Error::other(join)));
            }
        }

        debug!("workspace released");
        Ok(())
    }

    fn with_permit(mut self, permit: Option<OwnedSemaphorePermit>) -> Self {
        self._permit = permit;
        self
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            warn!(
                path = %self.path.display(),
                "workspace dropped without release, removing it now"
            );
        }
    }
}

/// Creates workspaces under a scratch root, optionally bounding concurrency
#[derive(Debug)]
pub struct WorkspaceManager {
    /// Directory that holds all workspaces
    scratch_root: PathBuf,

    /// Limits how many workspaces exist at once
    limiter: Option<Arc<Semaphore>>,

    capacity: Option<usize>,
}

impl WorkspaceManager {
    /// Create a manager; `max_concurrent` of `None` means unlimited
    pub fn new(scratch_root: impl Into<PathBuf>, max_concurrent: Option<usize>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            limiter: max_concurrent.map(|count| Arc::new(Semaphore::new(count))),
            capacity: max_concurrent,
        }
    }

    /// Get the scratch root directory
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Create a fresh, empty workspace
    ///
    /// Waits for a permit first when a concurrency limit is configured.
    #[instrument(skip(self), fields(root = %self.scratch_root.display()))]
    pub async fn acquire(&self) -> Result<Workspace, SandboxError> {
        let permit = match self.limiter {
            Some(ref limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| SandboxError::LimiterClosed)?,
            ),
            None => None,
        };

        let creation_error = |source| SandboxError::WorkspaceCreation {
            root: self.scratch_root.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.scratch_root)
            .await
            .map_err(creation_error)?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.scratch_root)
            .map_err(creation_error)?;
        let path = dir.path().to_path_buf();

        debug!(?path, "workspace created");

        let workspace = Workspace {
            dir: Some(dir),
            path,
            _permit: None,
        };
        Ok(workspace.with_permit(permit))
    }

    /// Number of workspaces that can still be acquired without waiting
    ///
    /// `None` when concurrency is unlimited.
    pub fn available(&self) -> Option<usize> {
        self.limiter
            .as_ref()
            .map(|limiter| limiter.available_permits())
    }

    /// Configured concurrency limit
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
