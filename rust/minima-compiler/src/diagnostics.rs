//! Diagnostic collection and rendering for generation-time errors.
//!
//! Static errors are gathered across the whole compile, deduplicated on
//! (severity, message, location), and always surfaced before any
//! instruction executes.

use crate::compiler::grammar::TreeError;
use crate::compiler::lower::LowerError;
use crate::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based source line, when the parser reported one.
    pub line: Option<u32>,
}

impl Diagnostic {
    fn error(message: String, line: u32) -> Self {
        Self {
            severity: Severity::Error,
            message,
            line: (line > 0).then_some(line),
        }
    }

    /// Render without colors, `error: message` or
    /// `error: message (line N)`.
    pub fn render_plain(&self) -> String {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        match self.line {
            Some(line) => format!("{}: {} (line {})", label, self.message, line),
            None => format!("{}: {}", label, self.message),
        }
    }
}

/// Flatten a compile error into its deduplicated diagnostic list.
pub fn collect(error: &CompileError) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    match error {
        CompileError::Tree(errors) => {
            for e in errors {
                diagnostics.push(Diagnostic::error(strip_location(e), tree_line(e)));
            }
        }
        CompileError::Lower(errors) => {
            for e in errors {
                diagnostics.push(Diagnostic::error(strip_location(e), lower_line(e)));
            }
        }
    }
    dedup(diagnostics)
}

// Messages embed "at line N" for Display; the structured line is carried
// separately so the renderer controls placement.
fn strip_location(err: &impl std::fmt::Display) -> String {
    let text = err.to_string();
    match text.rsplit_once(" at line ") {
        Some((message, _)) => message.to_string(),
        None => text,
    }
}

fn tree_line(err: &TreeError) -> u32 {
    match err {
        TreeError::UnknownKind { line, .. }
        | TreeError::Malformed { line, .. }
        | TreeError::BadLiteral { line, .. }
        | TreeError::IntegerOutOfRange { line, .. } => *line,
    }
}

fn lower_line(err: &LowerError) -> u32 {
    match err {
        LowerError::Redeclared { line, .. }
        | LowerError::Redefined { line, .. }
        | LowerError::NameClash { line, .. }
        | LowerError::Undefined { line, .. }
        | LowerError::FixedReassignment { line, .. }
        | LowerError::ArityMismatch { line, .. }
        | LowerError::InvalidOperands { line, .. }
        | LowerError::FunctionAsValue { line, .. }
        | LowerError::OutsideLoop { line, .. }
        | LowerError::ThrowOutsideFunction { line }
        | LowerError::DuplicateCase { line, .. }
        | LowerError::DuplicateKey { line, .. } => *line,
    }
}

/// Same kind, message, and location report once.
fn dedup(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen = Vec::new();
    for d in diagnostics {
        if !seen.contains(&d) {
            seen.push(d);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_with_line() {
        let d = Diagnostic::error("undefined identifier 'x'".into(), 4);
        assert_eq!(d.render_plain(), "error: undefined identifier 'x' (line 4)");
    }

    #[test]
    fn test_render_plain_without_line() {
        let d = Diagnostic::error("undefined identifier 'x'".into(), 0);
        assert_eq!(d.render_plain(), "error: undefined identifier 'x'");
    }

    #[test]
    fn test_identical_errors_dedup() {
        let error = CompileError::Lower(vec![
            LowerError::Undefined {
                name: "x".into(),
                line: 2,
            },
            LowerError::Undefined {
                name: "x".into(),
                line: 2,
            },
            LowerError::Undefined {
                name: "x".into(),
                line: 3,
            },
        ]);
        let diagnostics = collect(&error);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_location_stripped_from_message() {
        let error = CompileError::Lower(vec![LowerError::Undefined {
            name: "x".into(),
            line: 7,
        }]);
        let diagnostics = collect(&error);
        assert_eq!(diagnostics[0].message, "undefined identifier 'x'");
        assert_eq!(diagnostics[0].line, Some(7));
    }
}
