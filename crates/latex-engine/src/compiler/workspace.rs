//! Per-request compilation workspaces
//!
//! Each request gets a freshly created, uniquely named directory. The
//! directory is removed by [`Workspace::close`] on the normal path and by
//! `Drop` when the request is cancelled or unwinds.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::errors::EngineError;
use crate::templates::RenderedSource;

/// Job name used for the source file and everything the compiler writes
pub const JOB_NAME: &str = "document";

const WORKSPACE_PREFIX: &str = "latex-";

/// An isolated directory holding one compilation attempt
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a workspace under `root` and write the rendered source into it
    pub async fn create(root: &Path, source: &RenderedSource) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(EngineError::Workspace)?;

        let parent = root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(parent)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("workspace creation task failed: {}", e)))?
        .map_err(EngineError::Workspace)?;
        let path = dir.path().to_path_buf();

        let workspace = Self {
            dir: Some(dir),
            path,
        };

        tokio::fs::write(workspace.source_path(), source.as_str())
            .await
            .map_err(EngineError::Workspace)?;

        Ok(workspace)
    }

    /// Directory of this workspace
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `document.tex`
    pub fn source_path(&self) -> PathBuf {
        self.file_with_extension("tex")
    }

    /// `document.pdf`
    pub fn artifact_path(&self) -> PathBuf {
        self.file_with_extension("pdf")
    }

    /// `document.log`
    pub fn log_path(&self) -> PathBuf {
        self.file_with_extension("log")
    }

    fn file_with_extension(&self, extension: &str) -> PathBuf {
        self.path.join(format!("{}.{}", JOB_NAME, extension))
    }

    /// Remove the workspace tree, reporting failures
    pub fn close(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}
