//! Engine configuration
//!
//! Field names accept both snake_case and the camelCase spelling used by
//! JSON clients (`maxConcurrentCompilations`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compiler::errors::EngineError;
use crate::compiler::process::DEFAULT_COMPILER_ARGS;

/// Limits and locations used by the [`Coordinator`](crate::Coordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compiler processes allowed to run at once (default: 2)
    #[serde(default = "default_max_concurrent", alias = "maxConcurrentCompilations")]
    pub max_concurrent_compilations: usize,
    /// Wall-clock limit for all passes of one request (default: 30)
    #[serde(default = "default_timeout", alias = "compilationTimeoutSeconds")]
    pub compilation_timeout_seconds: u64,
    /// Upper bound on compiler passes per request (default: 3)
    #[serde(default = "default_passes", alias = "maxCompilerPasses")]
    pub max_compiler_passes: u32,
    /// Requests allowed to wait for a slot before new ones are rejected (default: 16)
    #[serde(default = "default_queue_depth", alias = "queueDepthLimit")]
    pub queue_depth_limit: usize,
    /// How long a queued request waits for a slot (default: 30)
    #[serde(default = "default_queue_wait", alias = "queueWaitTimeoutSeconds")]
    pub queue_wait_timeout_seconds: u64,
    /// Compiler executable, looked up on `PATH` unless it contains a separator
    #[serde(default = "default_program", alias = "compilerProgram")]
    pub compiler_program: String,
    /// Arguments placed before the source file name
    #[serde(default = "default_args", alias = "compilerArgs")]
    pub compiler_args: Vec<String>,
    /// Parent directory for per-request workspaces (default: system temp dir)
    #[serde(default, alias = "workspaceRoot")]
    pub workspace_root: Option<PathBuf>,
    /// Directory of `<name>.tex` templates overlaying the built-in ones
    #[serde(default, alias = "templateDir")]
    pub template_dir: Option<PathBuf>,
    /// Accept `{"raw": ...}` bindings
    #[serde(default = "default_allow_raw", alias = "allowRawBindings")]
    pub allow_raw_bindings: bool,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_timeout() -> u64 {
    30
}

fn default_passes() -> u32 {
    3
}

fn default_queue_depth() -> usize {
    16
}

fn default_queue_wait() -> u64 {
    30
}

fn default_program() -> String {
    "pdflatex".to_string()
}

fn default_args() -> Vec<String> {
    DEFAULT_COMPILER_ARGS.iter().map(|a| a.to_string()).collect()
}

fn default_allow_raw() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_compilations: default_max_concurrent(),
            compilation_timeout_seconds: default_timeout(),
            max_compiler_passes: default_passes(),
            queue_depth_limit: default_queue_depth(),
            queue_wait_timeout_seconds: default_queue_wait(),
            compiler_program: default_program(),
            compiler_args: default_args(),
            workspace_root: None,
            template_dir: None,
            allow_raw_bindings: default_allow_raw(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrent_compilations == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrent_compilations must be at least 1".to_string(),
            ));
        }
        if self.compilation_timeout_seconds == 0 {
            return Err(EngineError::InvalidConfig(
                "compilation_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.max_compiler_passes == 0 {
            return Err(EngineError::InvalidConfig(
                "max_compiler_passes must be at least 1".to_string(),
            ));
        }
        if self.compiler_program.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "compiler_program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn compilation_timeout(&self) -> Duration {
        Duration::from_secs(self.compilation_timeout_seconds)
    }

    pub fn queue_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_wait_timeout_seconds)
    }

    /// Where workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn template_dir(&self) -> Option<&Path> {
        self.template_dir.as_deref()
    }
}
