//! Error types for rendering, compilation and admission

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity of a diagnostic extracted from compiler output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Compilation aborted, no usable artifact
    Fatal,
    /// Artifact may exist but is unreliable
    Error,
    /// Artifact is valid, cosmetic issue
    Warning,
}

/// How sure the log interpreter is about a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

/// Where a diagnostic was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    Log,
    Stdout,
    Stderr,
    /// Synthesized by the engine (exit status, timeout)
    Engine,
}

/// A structured message extracted from compiler output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human-readable message
    pub message: String,
    /// Source line (1-indexed) in the rendered document, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    pub confidence: Confidence,
    pub source: DiagnosticSource,
}

impl Diagnostic {
    /// Create a high-confidence diagnostic found in the compiler log
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            severity,
            confidence: Confidence::High,
            source: DiagnosticSource::Log,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Set the source line
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Set where the diagnostic came from
    pub fn from_source(mut self, source: DiagnosticSource) -> Self {
        self.source = source;
        self
    }

    /// Mark as a best-effort extraction
    pub fn low_confidence(mut self) -> Self {
        self.confidence = Confidence::Low;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Classified failure reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    TemplateNotFound,
    InvalidBinding,
    CompilerNotFound,
    CompilationTimeout,
    CompilationFailed,
    Overloaded,
    /// Process-level resource problems (workspace creation, task panics)
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::TemplateNotFound => "TemplateNotFound",
            FailureKind::InvalidBinding => "InvalidBinding",
            FailureKind::CompilerNotFound => "CompilerNotFound",
            FailureKind::CompilationTimeout => "CompilationTimeout",
            FailureKind::CompilationFailed => "CompilationFailed",
            FailureKind::Overloaded => "Overloaded",
            FailureKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Terminal failure value of a compilation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFailure {
    #[serde(rename = "errorKind")]
    pub kind: FailureKind,
    pub message: String,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Errors raised inside the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    #[error("Invalid template '{name}': {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("LaTeX compiler not found: {0}")]
    CompilerNotFound(String),

    #[error("Compilation timeout after {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Compilation failed: {message}")]
    CompilationFailed {
        message: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Overloaded: {0}")]
    Overloaded(String),

    #[error("Failed to prepare compilation workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Failed to start compiler '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compilation task panicked: {0}")]
    TaskPanicked(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Map to the caller-facing taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::TemplateNotFound(_) => FailureKind::TemplateNotFound,
            EngineError::InvalidBinding(_) => FailureKind::InvalidBinding,
            EngineError::CompilerNotFound(_) => FailureKind::CompilerNotFound,
            EngineError::Timeout { .. } => FailureKind::CompilationTimeout,
            EngineError::CompilationFailed { .. } => FailureKind::CompilationFailed,
            EngineError::Overloaded(_) => FailureKind::Overloaded,
            EngineError::InvalidTemplate { .. }
            | EngineError::Workspace(_)
            | EngineError::Spawn { .. }
            | EngineError::TaskPanicked(_)
            | EngineError::InvalidConfig(_)
            | EngineError::Internal(_)
            | EngineError::Io(_) => FailureKind::Internal,
        }
    }

    /// Convert into the terminal failure value, keeping captured diagnostics
    pub fn into_failure(self) -> CompileFailure {
        let kind = self.kind();
        let message = self.to_string();
        let diagnostics = match self {
            EngineError::Timeout { diagnostics, .. }
            | EngineError::CompilationFailed { diagnostics, .. } => diagnostics,
            _ => vec![Diagnostic::fatal(message.clone()).from_source(DiagnosticSource::Engine)],
        };

        CompileFailure {
            kind,
            message,
            diagnostics,
        }
    }
}

impl From<EngineError> for CompileFailure {
    fn from(err: EngineError) -> Self {
        err.into_failure()
    }
}
