//! End-to-end compilation with a real pdflatex
//!
//! Skipped when pdflatex is not installed.
//!
//! Run with: cargo test -p latex-engine --test pdflatex -- --nocapture

mod common;

use std::sync::Arc;

use common::{config_in, invoice_request, leftover_workspaces};
use latex_engine::compiler::artifact::count_pages;
use latex_engine::{
    CompileRequest, CompileResult, Coordinator, EngineConfig, FailureKind, ProcessCompiler,
    Severity,
};

fn pdflatex_coordinator(config: EngineConfig) -> Coordinator {
    Coordinator::new(config, Arc::new(ProcessCompiler::pdflatex())).unwrap()
}

#[tokio::test]
async fn test_invoice_compiles_to_pdf() {
    require_pdflatex!();

    let root = tempfile::tempdir().unwrap();
    let coordinator = pdflatex_coordinator(config_in(root.path()));

    let result = coordinator.compile(invoice_request()).await;

    let CompileResult::Success(document) = result else {
        panic!("invoice failed to compile");
    };
    assert!(document.pdf.starts_with(b"%PDF-"));
    assert_eq!(document.page_count, Some(1));
    assert_eq!(count_pages(&document.pdf), Some(1));
    // \pageref needs the aux file from a first pass
    assert!(document.passes >= 2, "ran {} passes", document.passes);
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_every_builtin_template_compiles() {
    require_pdflatex!();

    let root = tempfile::tempdir().unwrap();
    let coordinator = pdflatex_coordinator(config_in(root.path()));

    for info in coordinator.templates().await {
        let mut request = CompileRequest::new(info.name.clone());
        for input in info.required_inputs.iter().chain(&info.optional_inputs) {
            request = request.with_input(input.clone(), "50% off {all} items & $5_000\n\n~ #1 ^ \\");
        }

        let result = coordinator.compile(request).await;
        assert!(
            result.is_success(),
            "{} failed with hostile input: {:?}",
            info.name,
            result.failure_kind()
        );
    }
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_syntax_error_is_compilation_failed() {
    require_pdflatex!();

    let root = tempfile::tempdir().unwrap();
    let templates = tempfile::tempdir().unwrap();
    std::fs::write(
        templates.path().join("broken.tex"),
        "\\documentclass{article}\n\\begin{document}\n\\VAR{title}\n\\notacommand\n\\end{document}\n",
    )
    .unwrap();

    let config = EngineConfig {
        template_dir: Some(templates.path().to_path_buf()),
        ..config_in(root.path())
    };
    let coordinator = pdflatex_coordinator(config);

    let request = CompileRequest::new("broken").with_input("title", "Hello");
    let CompileResult::Failure(failure) = coordinator.compile(request).await else {
        panic!("broken template compiled");
    };

    assert_eq!(failure.kind, FailureKind::CompilationFailed);
    let error = failure
        .diagnostics
        .iter()
        .find(|d| matches!(d.severity, Severity::Fatal | Severity::Error))
        .expect("an error diagnostic");
    assert!(error.message.contains("Undefined control sequence"));
    assert_eq!(error.line, Some(4));
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_raw_binding_reaches_compiler() {
    require_pdflatex!();

    let root = tempfile::tempdir().unwrap();
    let coordinator = pdflatex_coordinator(config_in(root.path()));

    let request = CompileRequest::new("letter")
        .with_input("sender_name", "Ada")
        .with_input("recipient_name", "Grace")
        .with_raw_input("body", "\\begin{itemize}\\item one\\item two\\end{itemize}");

    assert!(coordinator.compile(request).await.is_success());
}

#[tokio::test]
async fn test_missing_binary_is_compiler_not_found() {
    let root = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        compiler_program: "no-such-latex-engine".to_string(),
        ..config_in(root.path())
    };
    let coordinator = Coordinator::from_config(config).unwrap();

    let result = coordinator.compile(invoice_request()).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::CompilerNotFound));
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_kills_compiler() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let pid_file = scratch.path().join("compiler.pid");

    let script = format!("echo $$ > '{}'; exec sleep 60", pid_file.display());
    let config = EngineConfig {
        compiler_program: "/bin/sh".to_string(),
        compiler_args: vec!["-c".to_string(), script, "sh".to_string()],
        compilation_timeout_seconds: 1,
        ..config_in(root.path())
    };
    let coordinator = Coordinator::from_config(config).unwrap();

    let result = coordinator.compile(invoice_request()).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::CompilationTimeout));

    let pid: libc::pid_t = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!process_alive(pid), "compiler {} survived the timeout", pid);
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[cfg(unix)]
fn process_alive(pid: libc::pid_t) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}
