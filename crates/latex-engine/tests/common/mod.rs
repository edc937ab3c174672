//! Fake compilers and helpers shared by the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use latex_engine::compiler::{PassJob, PassOutput, Termination};
use latex_engine::{CompileRequest, EngineConfig, EngineError, LatexCompiler};
use tokio::sync::Notify;

pub const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << >> endobj\n%%EOF\n";

pub const RERUN_LOG: &str =
    "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.\n";

/// What the fake does on each pass
#[derive(Clone)]
pub enum Behavior {
    /// Write a PDF and exit 0 with this log
    Succeed { log: String },
    /// Ask for reruns this many times, then succeed
    RerunThenSucceed { reruns: usize },
    /// Exit with a non-zero status and this log, leaving no PDF
    Fail { code: i32, log: String },
    /// Exit 0 without writing anything
    NoArtifact,
    /// Exit 0 after writing a file that is not a PDF
    Garbage,
    /// Block until released or the pass timeout expires
    Block,
    /// Spawning the compiler fails
    Missing,
    /// Panic inside the compile call
    Panic,
}

/// A scriptable [`LatexCompiler`] that records what happened to it
pub struct FakeCompiler {
    behavior: Behavior,
    delay: Duration,
    release: Arc<Notify>,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeCompiler {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            release: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed { log: String::new() })
    }

    /// Hold every pass for `delay` before finishing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Let blocked passes finish
    pub fn release(&self) {
        self.release.notify_waiters();
    }

    /// Wait until `n` passes are running at once
    pub async fn wait_for_running(&self, n: usize) {
        for _ in 0..500 {
            if self.running() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} running passes, saw {}", n, self.running());
    }

    async fn pass(&self, job: &PassJob<'_>, call: usize) -> Result<PassOutput, EngineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let pdf = job.source.with_extension("pdf");
        match &self.behavior {
            Behavior::Succeed { log } => {
                tokio::fs::write(&pdf, MINIMAL_PDF).await?;
                Ok(PassOutput::new(Termination::Exited(0)).with_log(log.clone()))
            }
            Behavior::RerunThenSucceed { reruns } => {
                tokio::fs::write(&pdf, MINIMAL_PDF).await?;
                let log = if call < *reruns { RERUN_LOG } else { "" };
                Ok(PassOutput::new(Termination::Exited(0)).with_log(log))
            }
            Behavior::Fail { code, log } => {
                Ok(PassOutput::new(Termination::Exited(*code)).with_log(log.clone()))
            }
            Behavior::NoArtifact => Ok(PassOutput::new(Termination::Exited(0))),
            Behavior::Garbage => {
                tokio::fs::write(&pdf, b"this is not a pdf").await?;
                Ok(PassOutput::new(Termination::Exited(0)))
            }
            Behavior::Block => {
                let released = self.release.notified();
                match tokio::time::timeout(job.timeout, released).await {
                    Ok(()) => {
                        tokio::fs::write(&pdf, MINIMAL_PDF).await?;
                        Ok(PassOutput::new(Termination::Exited(0)))
                    }
                    Err(_) => Ok(PassOutput::new(Termination::TimedOut)
                        .with_log("! Interruption.\nl.3 \\loop\n")),
                }
            }
            Behavior::Missing => Err(EngineError::CompilerNotFound("fake-tex".to_string())),
            Behavior::Panic => panic!("fake compiler exploded"),
        }
    }
}

#[async_trait]
impl LatexCompiler for FakeCompiler {
    fn name(&self) -> &str {
        "fake-tex"
    }

    async fn compile(&self, job: &PassJob<'_>) -> Result<PassOutput, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let _running = RunningGuard(&self.running);
        self.pass(job, call).await
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Config with workspaces under `root`
pub fn config_in(root: &Path) -> EngineConfig {
    EngineConfig {
        workspace_root: Some(root.to_path_buf()),
        ..EngineConfig::default()
    }
}

pub fn invoice_request() -> CompileRequest {
    CompileRequest::new("invoice")
        .with_input("client", "A&B Co.")
        .with_input("amount", "100")
}

/// Number of entries left under a workspace root
pub fn leftover_workspaces(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

/// Skip the current test when pdflatex is not installed
#[macro_export]
macro_rules! require_pdflatex {
    () => {{
        if !latex_engine::LatexCompiler::is_available(&latex_engine::ProcessCompiler::pdflatex()) {
            eprintln!("Skipping: pdflatex not found on PATH");
            return;
        }
    }};
}
