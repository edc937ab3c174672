//! LaTeX compilation: workspaces, compiler processes, log interpretation
//! and artifact handling

pub mod artifact;
pub mod errors;
pub mod log;
pub mod process;
pub mod sandbox;
pub mod workspace;

pub use errors::{
    CompileFailure, Confidence, Diagnostic, DiagnosticSource, EngineError, FailureKind, Severity,
};
pub use process::{LatexCompiler, PassJob, PassOutput, ProcessCompiler, Termination};
pub use workspace::Workspace;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Request to compile a template into a PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Template name (e.g. "invoice")
    pub template: String,
    /// Values for the template placeholders
    #[serde(default, alias = "bindings")]
    pub inputs: BTreeMap<String, serde_json::Value>,
}

impl CompileRequest {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            inputs: BTreeMap::new(),
        }
    }

    /// Add a plain value; it is escaped when rendered
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Add trusted LaTeX markup that is inserted verbatim
    pub fn with_raw_input(mut self, name: impl Into<String>, latex: impl Into<String>) -> Self {
        self.inputs
            .insert(name.into(), serde_json::json!({ "raw": latex.into() }));
        self
    }
}

/// A successfully compiled document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledDocument {
    /// Complete PDF bytes
    pub pdf: Vec<u8>,
    /// Page count, when the PDF could be parsed
    pub page_count: Option<usize>,
    /// Non-fatal diagnostics from the final pass
    pub warnings: Vec<Diagnostic>,
    /// Number of compiler passes that ran
    pub passes: u32,
}

/// Terminal outcome of a compilation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    Success(CompiledDocument),
    Failure(CompileFailure),
}

impl CompileResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Success(_))
    }

    /// The failure kind, if this is a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            CompileResult::Success(_) => None,
            CompileResult::Failure(failure) => Some(failure.kind),
        }
    }
}

impl From<Result<CompiledDocument, EngineError>> for CompileResult {
    fn from(result: Result<CompiledDocument, EngineError>) -> Self {
        match result {
            Ok(document) => CompileResult::Success(document),
            Err(err) => CompileResult::Failure(err.into_failure()),
        }
    }
}
