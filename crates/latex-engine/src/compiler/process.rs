//! External compiler invocation
//!
//! [`LatexCompiler`] is the seam between the sandbox and the outside world:
//! one call runs one compiler pass. [`ProcessCompiler`] runs a real TeX
//! engine as a subprocess; tests substitute fakes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::errors::EngineError;

/// Default pdfLaTeX flags: never prompt, stop at the first error, no `\write18`
pub const DEFAULT_COMPILER_ARGS: &[&str] = &[
    "-interaction=nonstopmode",
    "-halt-on-error",
    "-no-shell-escape",
];

/// Upper bound on captured stdout/stderr per stream
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Grace period for output readers after the process is gone
const READER_GRACE: Duration = Duration::from_secs(2);

/// How a compiler process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum Termination {
    /// Exited on its own with this status code
    Exited(i32),
    /// Terminated by a signal it did not ask for (crash, OOM killer)
    Signaled,
    /// Killed by us after the deadline passed
    TimedOut,
}

impl Termination {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Termination::Exited(code),
            None => Termination::Signaled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

/// One compiler pass over a source file
#[derive(Debug, Clone)]
pub struct PassJob<'a> {
    /// Source file inside `work_dir`
    pub source: &'a Path,
    /// Workspace directory, used as the working directory
    pub work_dir: &'a Path,
    /// Wall-clock limit for this pass
    pub timeout: Duration,
}

/// Everything captured from one compiler pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    /// Contents of the compiler's own `.log` file (empty if none was written)
    pub log: String,
}

impl PassOutput {
    pub fn new(termination: Termination) -> Self {
        Self {
            termination,
            stdout: String::new(),
            stderr: String::new(),
            log: String::new(),
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}

/// Runs one pass of a LaTeX engine
#[async_trait]
pub trait LatexCompiler: Send + Sync {
    /// Identifies the engine (e.g. "pdflatex")
    fn name(&self) -> &str;

    /// Whether the engine can be started at all
    fn is_available(&self) -> bool {
        true
    }

    /// Run a single pass. Returns once the compiler has terminated, including
    /// when it had to be killed for exceeding `job.timeout`.
    async fn compile(&self, job: &PassJob<'_>) -> Result<PassOutput, EngineError>;
}

/// A TeX engine run as a subprocess
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: String,
    args: Vec<String>,
    search_path: Option<OsString>,
}

impl ProcessCompiler {
    /// Create a compiler for `program` with the default pdfLaTeX flags
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: DEFAULT_COMPILER_ARGS.iter().map(|a| a.to_string()).collect(),
            search_path: None,
        }
    }

    /// `pdflatex` with the default flags
    pub fn pdflatex() -> Self {
        Self::new("pdflatex")
    }

    /// Replace the arguments placed before the source file name
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Use this `PATH` for the child instead of the server's own
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Locate the compiler executable, if installed
    pub fn resolve(&self) -> Option<PathBuf> {
        resolve_program(&self.program, self.path_var().as_deref())
    }

    fn path_var(&self) -> Option<OsString> {
        self.search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
    }

    /// Minimal environment for the child; everything else is cleared
    fn environment(&self, work_dir: &Path) -> Vec<(&'static str, OsString)> {
        let mut env = vec![
            ("HOME", work_dir.as_os_str().to_owned()),
            ("TMPDIR", work_dir.as_os_str().to_owned()),
            ("TEXMFOUTPUT", work_dir.as_os_str().to_owned()),
            ("openout_any", OsString::from("p")),
        ];
        if let Some(path) = self.path_var() {
            env.push(("PATH", path));
        }
        env
    }
}

#[async_trait]
impl LatexCompiler for ProcessCompiler {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    async fn compile(&self, job: &PassJob<'_>) -> Result<PassOutput, EngineError> {
        let file_name = job.source.file_name().ok_or_else(|| {
            EngineError::Internal(format!("source path has no file name: {}", job.source.display()))
        })?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(file_name)
            .current_dir(job.work_dir)
            .env_clear()
            .envs(self.environment(job.work_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::CompilerNotFound(self.program.clone()));
            }
            Err(e) => {
                return Err(EngineError::Spawn {
                    program: self.program.clone(),
                    source: e,
                });
            }
        };

        let mut group = ProcessGroupGuard::new(child.id());
        debug!(program = %self.program, pid = ?child.id(), "compiler started");

        let stdout_task = tokio::spawn(read_capped(child.stdout.take()));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        let termination = match tokio::time::timeout(job.timeout, child.wait()).await {
            Ok(Ok(status)) => Termination::from_status(status),
            Ok(Err(e)) => return Err(EngineError::Io(e)),
            Err(_elapsed) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to reap timed out compiler");
                }
                Termination::TimedOut
            }
        };
        group.disarm();

        let stdout = join_reader(stdout_task).await;
        let stderr = join_reader(stderr_task).await;
        let log = read_log_file(&job.source.with_extension("log")).await;

        debug!(?termination, log_bytes = log.len(), "compiler finished");

        Ok(PassOutput {
            termination,
            stdout,
            stderr,
            log,
        })
    }
}

/// Search `path_var` for `program` the way a shell would
pub fn resolve_program(program: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

/// Kills the child's whole process group if the compile future is dropped
/// before the child was reaped.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn kill(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the child leads its own group
    // (process_group(0)), so pgid == pid.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn read_capped<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                // Keep draining past the cap so the child never blocks on a full pipe
                let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }

    String::from_utf8_lossy(&captured).into_owned()
}

async fn join_reader(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(READER_GRACE, task).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(error = %e, "output reader failed");
            String::new()
        }
        Err(_) => {
            warn!("output reader did not finish after the compiler exited");
            String::new()
        }
    }
}

async fn read_log_file(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}
