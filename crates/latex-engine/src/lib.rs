//! LaTeX document rendering engine
//!
//! This crate turns a template name plus data bindings into a PDF:
//! - Template rendering with LaTeX escaping of every user value
//! - Sandboxed, multi-pass compilation with an external TeX engine
//! - Compiler log interpretation into structured diagnostics
//! - A coordinator that bounds concurrent compilations and guarantees
//!   workspace cleanup

pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod templates;

pub use compiler::{
    CompileFailure, CompileRequest, CompileResult, CompiledDocument, Diagnostic, EngineError,
    FailureKind, LatexCompiler, ProcessCompiler, Severity,
};
pub use config::EngineConfig;
pub use coordinator::{CompilationState, Coordinator, Lifecycle, PoolStats};
pub use templates::{list_templates, TemplateInfo};
