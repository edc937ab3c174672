//! Compiler log interpretation
//!
//! Turns the unstructured output of a TeX engine into ordered
//! [`Diagnostic`]s and classifies a pass as success, failure or timeout.
//! Extraction is best-effort: lines that look like diagnostics but match no
//! known shape are kept as low-confidence warnings.

use lazy_static::lazy_static;
use regex::Regex;

use super::errors::{Diagnostic, DiagnosticSource, Severity};
use super::process::{PassOutput, Termination};

lazy_static! {
    /// `file.tex:12: message` (-file-line-error style)
    static ref FILE_LINE_ERROR: Regex =
        Regex::new(r"^(?:\./)?[^\s:]+\.(?:tex|sty|cls):(\d+): (.+)$").unwrap();

    /// `l.12 \foo` context line following a `!` error
    static ref ERROR_LINE_REF: Regex = Regex::new(r"^l\.(\d+)").unwrap();

    /// Messages that mean the run was aborted
    static ref FATAL_MESSAGE: Regex = Regex::new(
        r"(?i)(==> fatal error occurred|emergency stop|no output pdf file produced|job aborted)"
    )
    .unwrap();

    /// Standalone fatal markers outside `!` errors
    static ref FATAL_LINE: Regex =
        Regex::new(r"^(?:No pages of output\.|\*\*\* \(job aborted.*\))").unwrap();

    /// `LaTeX Warning:`, `Package foo Warning:`, `Class bar Warning:`, `LaTeX Font Warning:`
    static ref WARNING_START: Regex =
        Regex::new(r"^(LaTeX(?: \w+)?|Package \S+|Class \S+|pdfTeX) [Ww]arning:?\s*(.*)$").unwrap();

    /// `(hyperref)   continued text`
    static ref CONTINUATION_PREFIX: Regex = Regex::new(r"^\([\w.-]+\)\s+").unwrap();

    static ref BOX_WARNING: Regex = Regex::new(r"^(?:Overfull|Underfull) \\[hv]box").unwrap();

    static ref INPUT_LINE: Regex = Regex::new(r"on input line (\d+)").unwrap();

    static ref BOX_LINE: Regex = Regex::new(r"(?:at lines? |detected at line )(\d+)").unwrap();

    /// Anything else mentioning an error or warning
    static ref LOOSE_DIAGNOSTIC: Regex =
        Regex::new(r"(?i)\b(?:error|warning)\b[^:]{0,40}:").unwrap();

    /// Requests for another pass
    static ref RERUN_REQUEST: Regex = Regex::new(
        r"(?i)(rerun to get|label\(s\) may have changed|please rerun|rerun latex)"
    )
    .unwrap();
}

/// Lines a wrapped warning may span
const MAX_WARNING_LINES: usize = 6;

/// Lines searched after a `!` error for its `l.<n>` reference
const MAX_CONTEXT_LINES: usize = 12;

/// Classification of a compiler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    TimedOut,
}

/// Outcome plus every diagnostic found, in log order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub outcome: Outcome,
    pub diagnostics: Vec<Diagnostic>,
}

impl Interpretation {
    /// One-line description of the failure for error messages
    pub fn summary(&self) -> String {
        self.diagnostics
            .iter()
            .find(|d| matches!(d.severity, Severity::Fatal | Severity::Error))
            .map(|d| match d.line {
                Some(line) => format!("line {}: {}", line, d.message),
                None => d.message.clone(),
            })
            .unwrap_or_else(|| "compilation failed".to_string())
    }
}

/// Classify a pass. Success requires a zero exit status, an artifact on
/// disk and no fatal diagnostic.
pub fn interpret(output: &PassOutput, artifact_exists: bool) -> Interpretation {
    let mut diagnostics = if output.log.trim().is_empty() {
        parse_log(&output.stdout, DiagnosticSource::Stdout)
    } else {
        parse_log(&output.log, DiagnosticSource::Log)
    };
    diagnostics.extend(parse_stderr(&output.stderr));

    let has_fatal = diagnostics.iter().any(Diagnostic::is_fatal);
    let outcome = match output.termination {
        Termination::TimedOut => Outcome::TimedOut,
        termination if termination.is_success() && artifact_exists && !has_fatal => {
            Outcome::Success
        }
        _ => Outcome::Failed,
    };

    let has_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, Severity::Fatal | Severity::Error));
    if outcome != Outcome::Success && !has_error {
        diagnostics.push(
            Diagnostic::fatal(describe_failure(output.termination, artifact_exists))
                .from_source(DiagnosticSource::Engine),
        );
    }

    Interpretation {
        outcome,
        diagnostics,
    }
}

/// Whether the log asks for another pass (cross-references, outlines)
pub fn needs_rerun(log: &str) -> bool {
    RERUN_REQUEST.is_match(log)
}

/// Extract diagnostics from a TeX log
pub fn parse_log(log: &str, source: DiagnosticSource) -> Vec<Diagnostic> {
    let lines: Vec<&str> = log.lines().collect();
    let mut diagnostics = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_end();

        if let Some(message) = tex_error_message(line) {
            let (diagnostic, consumed) = parse_tex_error(message, &lines[i + 1..]);
            diagnostics.push(diagnostic.from_source(source));
            i += 1 + consumed;
            continue;
        }

        if let Some(caps) = FILE_LINE_ERROR.captures(line) {
            let message = caps[2].trim();
            let mut diagnostic = if FATAL_MESSAGE.is_match(message) {
                Diagnostic::fatal(message)
            } else {
                Diagnostic::error(message)
            };
            if let Ok(n) = caps[1].parse() {
                diagnostic = diagnostic.with_line(n);
            }
            diagnostics.push(diagnostic.from_source(source));
        } else if FATAL_LINE.is_match(line) {
            diagnostics.push(Diagnostic::fatal(line.trim()).from_source(source));
        } else if let Some(caps) = WARNING_START.captures(line) {
            let (message, consumed) = join_warning(caps[2].trim(), &lines[i + 1..]);
            let mut diagnostic = Diagnostic::warning(format!("{}: {}", &caps[1], message));
            if let Some(n) = capture_line(&INPUT_LINE, &message) {
                diagnostic = diagnostic.with_line(n);
            }
            diagnostics.push(diagnostic.from_source(source));
            i += 1 + consumed;
            continue;
        } else if BOX_WARNING.is_match(line) {
            let mut diagnostic = Diagnostic::warning(line.trim());
            if let Some(n) = capture_line(&BOX_LINE, line) {
                diagnostic = diagnostic.with_line(n);
            }
            diagnostics.push(diagnostic.from_source(source));
        } else if !line.starts_with('(') && LOOSE_DIAGNOSTIC.is_match(line) {
            diagnostics.push(
                Diagnostic::warning(line.trim())
                    .low_confidence()
                    .from_source(source),
            );
        }

        i += 1;
    }

    diagnostics
}

/// Every non-empty stderr line, kept as a low-confidence diagnostic
pub fn parse_stderr(stderr: &str) -> Vec<Diagnostic> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            Diagnostic::warning(line)
                .low_confidence()
                .from_source(DiagnosticSource::Stderr)
        })
        .collect()
}

fn tex_error_message(line: &str) -> Option<&str> {
    if line == "!" {
        return Some("");
    }
    line.strip_prefix("! ").map(str::trim)
}

/// Returns the diagnostic and how many following lines belong to it
fn parse_tex_error(message: &str, rest: &[&str]) -> (Diagnostic, usize) {
    let mut diagnostic = if FATAL_MESSAGE.is_match(message) {
        Diagnostic::fatal(message)
    } else {
        Diagnostic::error(message)
    };

    for (offset, line) in rest.iter().take(MAX_CONTEXT_LINES).enumerate() {
        if tex_error_message(line).is_some() {
            return (diagnostic, offset);
        }
        if let Some(caps) = ERROR_LINE_REF.captures(line) {
            if let Ok(n) = caps[1].parse() {
                diagnostic = diagnostic.with_line(n);
            }
            return (diagnostic, offset + 1);
        }
    }

    (diagnostic, 0)
}

/// Join a warning wrapped over several lines
fn join_warning(first: &str, rest: &[&str]) -> (String, usize) {
    let mut message = first.to_string();
    let mut consumed = 0;

    for line in rest.iter().take(MAX_WARNING_LINES) {
        let line = line.trim_end();
        if line.trim().is_empty()
            || tex_error_message(line).is_some()
            || WARNING_START.is_match(line)
            || BOX_WARNING.is_match(line)
        {
            break;
        }

        let continued = if let Some(m) = CONTINUATION_PREFIX.find(line) {
            &line[m.end()..]
        } else if !message.ends_with('.') {
            line
        } else {
            break;
        };

        if !message.is_empty() {
            message.push(' ');
        }
        message.push_str(continued.trim());
        consumed += 1;
    }

    (message, consumed)
}

fn capture_line(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

fn describe_failure(termination: Termination, artifact_exists: bool) -> String {
    match termination {
        Termination::TimedOut => "compiler was killed after exceeding the time limit".to_string(),
        Termination::Signaled => "compiler was terminated by a signal".to_string(),
        Termination::Exited(0) if !artifact_exists => {
            "compiler exited successfully but produced no PDF".to_string()
        }
        Termination::Exited(0) => "compiler reported a fatal error".to_string(),
        Termination::Exited(code) => format!("compiler exited with status {}", code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::errors::Confidence;
    use pretty_assertions::assert_eq;

    const UNDEFINED_CONTROL_SEQUENCE: &str = r#"This is pdfTeX, Version 3.141592653-2.6-1.40.25 (TeX Live 2023) (preloaded format=pdflatex)
 restricted \write18 enabled.
entering extended mode
(./document.tex
LaTeX2e <2022-11-01> patch level 1
(/usr/share/texlive/texmf-dist/tex/latex/base/article.cls
Document Class: article 2022/07/02 v1.4n Standard LaTeX document class
)
! Undefined control sequence.
l.5 \foo

!  ==> Fatal error occurred, no output PDF file produced!
"#;

    const CROSS_REFERENCE_PASS: &str = r#"(./document.tex
LaTeX Warning: Reference `invoice:end' on page 1 undefined on input line 12.

[1{/var/lib/texmf/fonts/map/pdftex/updmap/pdftex.map}] (./document.aux)

LaTeX Warning: There were undefined references.


LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.

 )
Output written on document.pdf (1 page, 12345 bytes).
"#;

    #[test]
    fn test_undefined_control_sequence() {
        let diagnostics = parse_log(UNDEFINED_CONTROL_SEQUENCE, DiagnosticSource::Log);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].message, "Undefined control sequence.");
        assert_eq!(diagnostics[0].line, Some(5));
        assert_eq!(diagnostics[1].severity, Severity::Fatal);
        assert!(diagnostics[1].message.contains("Fatal error occurred"));
    }

    #[test]
    fn test_warnings_with_input_lines() {
        let diagnostics = parse_log(CROSS_REFERENCE_PASS, DiagnosticSource::Log);

        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Warning));
        assert_eq!(diagnostics[0].line, Some(12));
        assert!(diagnostics[0].message.starts_with("LaTeX: Reference `invoice:end'"));
        assert!(diagnostics[2].message.contains("Label(s) may have changed"));
    }

    #[test]
    fn test_needs_rerun() {
        assert!(needs_rerun(CROSS_REFERENCE_PASS));
        assert!(!needs_rerun(UNDEFINED_CONTROL_SEQUENCE));
        assert!(needs_rerun(
            "Package rerunfilecheck Warning: File `document.out' has changed.\n(rerunfilecheck)                Rerun to get outlines right"
        ));
    }

    #[test]
    fn test_package_warning_continuation() {
        let log = "Package hyperref Warning: Token not allowed in a PDF string (Unicode):\n(hyperref)                removing `\\\\' on input line 12.\n\n";
        let diagnostics = parse_log(log, DiagnosticSource::Log);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Package hyperref: Token not allowed in a PDF string (Unicode): removing `\\\\' on input line 12."
        );
        assert_eq!(diagnostics[0].line, Some(12));
    }

    #[test]
    fn test_file_line_error_style() {
        let log = "./document.tex:7: LaTeX Error: Environment foo undefined.\n";
        let diagnostics = parse_log(log, DiagnosticSource::Log);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].line, Some(7));
        assert_eq!(diagnostics[0].message, "LaTeX Error: Environment foo undefined.");
    }

    #[test]
    fn test_box_warnings() {
        let log = "Overfull \\hbox (15.0pt too wide) in paragraph at lines 12--13\n[]\\OT1/cmr/m/n/10 A very long word\n";
        let diagnostics = parse_log(log, DiagnosticSource::Log);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].line, Some(12));
    }

    #[test]
    fn test_unrecognized_lines_kept_as_low_confidence() {
        let log = "(/usr/share/texmf/tex/latex/base/errorcheck.sty)\nmakeindex error: style file missing\nplain progress line\n";
        let diagnostics = parse_log(log, DiagnosticSource::Log);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].confidence, Confidence::Low);
        assert_eq!(diagnostics[0].message, "makeindex error: style file missing");
    }

    #[test]
    fn test_no_pages_is_fatal() {
        let diagnostics = parse_log("No pages of output.\n", DiagnosticSource::Log);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_fatal());
    }

    #[test]
    fn test_interpret_success() {
        let output = PassOutput::new(Termination::Exited(0)).with_log(CROSS_REFERENCE_PASS);
        let interpretation = interpret(&output, true);

        assert_eq!(interpretation.outcome, Outcome::Success);
        assert_eq!(interpretation.diagnostics.len(), 3);
    }

    #[test]
    fn test_interpret_requires_artifact() {
        let output = PassOutput::new(Termination::Exited(0));
        let interpretation = interpret(&output, false);

        assert_eq!(interpretation.outcome, Outcome::Failed);
        assert_eq!(interpretation.diagnostics.len(), 1);
        assert_eq!(interpretation.diagnostics[0].source, DiagnosticSource::Engine);
        assert!(interpretation.summary().contains("produced no PDF"));
    }

    #[test]
    fn test_interpret_fatal_log_with_zero_exit_fails() {
        let output = PassOutput::new(Termination::Exited(0)).with_log("No pages of output.\n");
        assert_eq!(interpret(&output, true).outcome, Outcome::Failed);
    }

    #[test]
    fn test_interpret_nonzero_exit_fails_with_log_diagnostics() {
        let output = PassOutput::new(Termination::Exited(1)).with_log(UNDEFINED_CONTROL_SEQUENCE);
        let interpretation = interpret(&output, false);

        assert_eq!(interpretation.outcome, Outcome::Failed);
        assert_eq!(interpretation.summary(), "line 5: Undefined control sequence.");
        // No synthetic diagnostic when the log already explains the failure
        assert!(interpretation
            .diagnostics
            .iter()
            .all(|d| d.source == DiagnosticSource::Log));
    }

    #[test]
    fn test_interpret_timeout() {
        let output = PassOutput::new(Termination::TimedOut).with_stderr("still typesetting");
        let interpretation = interpret(&output, false);

        assert_eq!(interpretation.outcome, Outcome::TimedOut);
        assert_eq!(interpretation.diagnostics[0].source, DiagnosticSource::Stderr);
        assert!(interpretation.diagnostics.iter().any(|d| d.is_fatal()));
    }

    #[test]
    fn test_interpret_falls_back_to_stdout() {
        let output = PassOutput::new(Termination::Exited(1))
            .with_stdout("! LaTeX Error: File `missing.sty' not found.\n");
        let interpretation = interpret(&output, false);

        assert_eq!(interpretation.diagnostics[0].source, DiagnosticSource::Stdout);
        assert_eq!(interpretation.diagnostics[0].severity, Severity::Error);
    }
}
