//! Minima compiler backend.
//!
//! Lowers a parse tree (produced by the external grammar-driven parser)
//! through a typed AST into a flat three-address-code program for the
//! Minima virtual machine.

pub mod compiler;
pub mod diagnostics;

use compiler::grammar::{self, TreeError};
use compiler::lower::{self, LowerError};
use compiler::tac::Program;
use compiler::tree::ParseNode;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse-tree errors: {0:?}")]
    Tree(Vec<TreeError>),
    #[error("lowering errors: {0:?}")]
    Lower(Vec<LowerError>),
}

impl CompileError {
    /// Deduplicated, render-ready diagnostics for this error.
    pub fn diagnostics(&self) -> Vec<diagnostics::Diagnostic> {
        diagnostics::collect(self)
    }
}

/// Compile a parse tree into a TAC program.
///
/// Both passes collect every independent problem before failing, so a
/// single compile reports all of them.
pub fn compile(root: &ParseNode) -> Result<Program, CompileError> {
    let fingerprint = fingerprint(root);
    let ast = grammar::build_program(root).map_err(CompileError::Tree)?;
    lower::lower(&ast, fingerprint).map_err(CompileError::Lower)
}

/// Stable identity of the parse-tree document a program was built from.
fn fingerprint(root: &ParseNode) -> String {
    let doc = serde_json::to_string(root).unwrap_or_default();
    format!("sha256:{:x}", Sha256::digest(doc.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_reports_fingerprint() {
        let root = ParseNode::new("program", vec![]);
        let program = compile(&root).unwrap();
        assert!(program.fingerprint.starts_with("sha256:"));
        assert!(program.instructions.is_empty());
    }

    #[test]
    fn test_fingerprint_changes_with_tree() {
        let a = fingerprint(&ParseNode::new("program", vec![]));
        let b = fingerprint(&ParseNode::new(
            "program",
            vec![ParseNode::leaf("int", "1")],
        ));
        assert_ne!(a, b);
    }
}
