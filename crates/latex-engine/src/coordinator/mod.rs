//! Request orchestration
//!
//! The [`Coordinator`] owns the template store, the compiler and the slot
//! pool, and drives each request through its [`Lifecycle`]. Cleanup of the
//! workspace happens in `Finalizing`, which every request reaches.

pub mod lifecycle;
pub mod pool;

pub use lifecycle::{CompilationState, Lifecycle};
pub use pool::{Admission, CompilationPool, PoolStats, SlotPermit};

use std::sync::Arc;

use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::compiler::artifact::{self, artifact_exists};
use crate::compiler::errors::{EngineError, FailureKind};
use crate::compiler::log::{self, Outcome};
use crate::compiler::process::{LatexCompiler, ProcessCompiler};
use crate::compiler::sandbox::{self, SandboxRun};
use crate::compiler::workspace::Workspace;
use crate::compiler::{CompileRequest, CompileResult, CompiledDocument};
use crate::config::EngineConfig;
use crate::templates::{render_template, Bindings, TemplateInfo, TemplateStore};

/// Turns compile requests into PDFs, bounding concurrent compiler processes
pub struct Coordinator {
    config: EngineConfig,
    compiler: Arc<dyn LatexCompiler>,
    templates: TemplateStore,
    pool: CompilationPool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("compiler", &self.compiler.name())
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl Coordinator {
    /// Coordinator around any compiler implementation
    pub fn new(config: EngineConfig, compiler: Arc<dyn LatexCompiler>) -> Result<Self, EngineError> {
        config.validate()?;

        let pool = CompilationPool::new(
            config.max_concurrent_compilations,
            config.queue_depth_limit,
            config.queue_wait_timeout(),
        );
        let templates = TemplateStore::new(config.template_dir.clone());

        Ok(Self {
            config,
            compiler,
            templates,
            pool,
        })
    }

    /// Coordinator running the configured compiler as a subprocess
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let compiler = ProcessCompiler::new(config.compiler_program.clone())
            .with_args(config.compiler_args.clone());
        Self::new(config, Arc::new(compiler))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compiler(&self) -> &dyn LatexCompiler {
        self.compiler.as_ref()
    }

    pub async fn templates(&self) -> Vec<TemplateInfo> {
        self.templates.list().await
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Compile one request to completion. Never retries.
    pub async fn compile(&self, request: CompileRequest) -> CompileResult {
        self.compile_traced(request).await.0
    }

    /// Like [`compile`](Self::compile), also returning the states visited
    pub async fn compile_traced(&self, request: CompileRequest) -> (CompileResult, Lifecycle) {
        let request_id = Uuid::new_v4();
        let span = info_span!("compile", %request_id, template = %request.template);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: CompileRequest) -> (CompileResult, Lifecycle) {
        let mut lifecycle = Lifecycle::new();
        let mut workspace: Option<Workspace> = None;

        let outcome = self.execute(&request, &mut lifecycle, &mut workspace).await;

        // Finalizing: runs for every outcome. The artifact, if any, is
        // already in memory.
        lifecycle.finalize();
        if let Some(workspace) = workspace.take() {
            artifact::teardown(workspace).await;
        }

        let result = CompileResult::from(outcome);
        let terminal = lifecycle.finish(result.is_success());

        match &result {
            CompileResult::Success(document) => info!(
                state = %terminal,
                bytes = document.pdf.len(),
                pages = ?document.page_count,
                passes = document.passes,
                warnings = document.warnings.len(),
                "compilation completed"
            ),
            CompileResult::Failure(failure) if failure.kind == FailureKind::Internal => error!(
                state = %terminal,
                error = %failure.message,
                "compilation failed with internal error"
            ),
            CompileResult::Failure(failure) => warn!(
                state = %terminal,
                kind = %failure.kind,
                diagnostics = failure.diagnostics.len(),
                "compilation failed"
            ),
        }

        (result, lifecycle)
    }

    async fn execute(
        &self,
        request: &CompileRequest,
        lifecycle: &mut Lifecycle,
        workspace: &mut Option<Workspace>,
    ) -> Result<CompiledDocument, EngineError> {
        // 1. Render first: input errors are reported even when saturated
        lifecycle.advance(CompilationState::Rendering)?;
        let template = self.templates.get(&request.template).await?;
        let bindings = Bindings::from_json(&request.inputs)?;
        let source = render_template(&template, &bindings, self.config.allow_raw_bindings)?;
        debug!(bytes = source.as_str().len(), "rendered source");

        // 2. Refuse early when the queue is full
        let admission = self.pool.admit()?;

        // 3. Compile while holding a slot
        let permit = admission.acquire().await?;
        lifecycle.advance(CompilationState::Compiling)?;
        let work = workspace.insert(Workspace::create(&self.config.workspace_root(), &source).await?);
        let run = self.run_sandbox(work).await?;
        drop(permit);

        // 4. Interpret the last pass and capture the artifact before teardown
        lifecycle.advance(CompilationState::Interpreting)?;
        let artifact_path = work.artifact_path();
        let exists = artifact_exists(&artifact_path).await;
        let interpretation = log::interpret(&run.last, exists);

        match interpretation.outcome {
            Outcome::Success => {
                let captured = artifact::capture(&artifact_path).await?;
                Ok(CompiledDocument {
                    pdf: captured.bytes,
                    page_count: captured.page_count,
                    warnings: interpretation.diagnostics,
                    passes: run.passes,
                })
            }
            Outcome::TimedOut => Err(EngineError::Timeout {
                timeout_secs: self.config.compilation_timeout_seconds,
                diagnostics: interpretation.diagnostics,
            }),
            Outcome::Failed => Err(EngineError::CompilationFailed {
                message: interpretation.summary(),
                diagnostics: interpretation.diagnostics,
            }),
        }
    }

    /// Run the passes on their own task so a panicking compiler cannot take
    /// the request down with it. Dropping this future aborts the task, which
    /// kills the compiler process.
    async fn run_sandbox(&self, workspace: &Workspace) -> Result<SandboxRun, EngineError> {
        let compiler = Arc::clone(&self.compiler);
        let source = workspace.source_path();
        let work_dir = workspace.path().to_path_buf();
        let max_passes = self.config.max_compiler_passes;
        let timeout = self.config.compilation_timeout();

        let handle = tokio::spawn(async move {
            sandbox::run_passes(compiler.as_ref(), &source, &work_dir, max_passes, timeout).await
        });
        let _abort = AbortOnDrop(handle.abort_handle());

        match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(join_failure(join_error)),
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn join_failure(join_error: JoinError) -> EngineError {
    if !join_error.is_panic() {
        return EngineError::Internal(format!("compile task cancelled: {}", join_error));
    }

    let payload = join_error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    EngineError::TaskPanicked(message)
}
