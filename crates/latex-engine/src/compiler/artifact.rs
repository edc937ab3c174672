//! Artifact capture and workspace teardown

use std::path::Path;

use tracing::{debug, warn};

use super::errors::{Diagnostic, DiagnosticSource, EngineError};
use super::workspace::Workspace;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// A PDF read fully into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub page_count: Option<usize>,
}

/// Whether the compiler left a regular file at `path`
pub async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Read the artifact completely. Must run before the workspace is torn down.
pub async fn capture(path: &Path) -> Result<Artifact, EngineError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        artifact_rejected(format!("compiled PDF could not be read: {}", e))
    })?;

    if bytes.is_empty() {
        return Err(artifact_rejected("compiler produced an empty PDF".to_string()));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(artifact_rejected(
            "compiler output is not a PDF document".to_string(),
        ));
    }

    let page_count = count_pages(&bytes);
    debug!(bytes = bytes.len(), ?page_count, "captured artifact");

    Ok(Artifact { bytes, page_count })
}

/// Page count via lopdf; `None` if the document does not parse
pub fn count_pages(bytes: &[u8]) -> Option<usize> {
    lopdf::Document::load_mem(bytes)
        .ok()
        .map(|doc| doc.get_pages().len())
}

/// Remove the workspace on the blocking pool. Failures are logged, never
/// returned: the result of the compilation is already decided at this point.
pub async fn teardown(workspace: Workspace) {
    let path = workspace.path().to_path_buf();
    match tokio::task::spawn_blocking(move || workspace.close()).await {
        Ok(Ok(())) => debug!(path = %path.display(), "workspace removed"),
        Ok(Err(e)) => warn!(path = %path.display(), error = %e, "failed to remove workspace"),
        Err(e) => warn!(path = %path.display(), error = %e, "workspace removal task failed"),
    }
}

fn artifact_rejected(message: String) -> EngineError {
    EngineError::CompilationFailed {
        diagnostics: vec![Diagnostic::fatal(message.clone()).from_source(DiagnosticSource::Engine)],
        message,
    }
}
