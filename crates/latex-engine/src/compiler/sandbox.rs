//! Multi-pass compilation inside one workspace

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::errors::EngineError;
use super::log::needs_rerun;
use super::process::{LatexCompiler, PassJob, PassOutput, Termination};

/// Result of running the compiler until the document settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRun {
    /// Passes actually started
    pub passes: u32,
    /// Output of the last pass; this is what gets interpreted
    pub last: PassOutput,
}

/// Run up to `max_passes` passes sequentially.
///
/// Another pass starts only if the previous one exited cleanly and its log
/// asks for a rerun. `timeout` is one deadline shared by all passes; running
/// out of it between passes marks the run as timed out.
pub async fn run_passes(
    compiler: &dyn LatexCompiler,
    source: &Path,
    work_dir: &Path,
    max_passes: u32,
    timeout: Duration,
) -> Result<SandboxRun, EngineError> {
    let max_passes = max_passes.max(1);
    let deadline = Instant::now() + timeout;
    let mut passes = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(timed_out(passes, None));
        }

        let job = PassJob {
            source,
            work_dir,
            timeout: remaining,
        };
        let output = compiler.compile(&job).await?;
        passes += 1;

        debug!(
            compiler = compiler.name(),
            pass = passes,
            termination = ?output.termination,
            "compiler pass finished"
        );

        if !output.termination.is_success() {
            return Ok(SandboxRun {
                passes,
                last: output,
            });
        }
        if passes >= max_passes || !needs_rerun(&output.log) {
            return Ok(SandboxRun {
                passes,
                last: output,
            });
        }
        if Instant::now() >= deadline {
            return Ok(timed_out(passes, Some(output)));
        }
    }
}

fn timed_out(passes: u32, previous: Option<PassOutput>) -> SandboxRun {
    let last = match previous {
        Some(output) => PassOutput {
            termination: Termination::TimedOut,
            ..output
        },
        None => PassOutput::new(Termination::TimedOut),
    };
    SandboxRun { passes, last }
}
