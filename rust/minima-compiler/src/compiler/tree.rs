//! Parse-tree node contract handed over by the external parser.
//!
//! The backend never tokenizes or parses source text itself; it consumes a
//! tree of [`ParseNode`]s produced by the grammar-driven parser. A node
//! exposes its construct kind, an optional token value, ordered children,
//! and an optional source position. The full kind vocabulary is documented
//! on [`ParseNode`]; positional child access is confined to the
//! tree-to-AST pass in [`crate::compiler::grammar`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a node, when the parser provides one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

/// One node of the parse tree.
///
/// Statement kinds: `program`, `block`, `var_decl` (value `"var"` or
/// `"fixed"`, children are `declarator`s), `declarator` (value is the
/// name, optional child is the initializer), `assign` (value is the
/// operator `=`, `+=`, `-=`, `*=`, `/=`; first child is an `ident`,
/// `index`, or `key` target, second the right-hand side), `show`, `if`
/// (condition, `block`, zero or more `elseif`, optional `else`),
/// `elseif`, `else`, `while`, `do_while`, `for` (init statement,
/// condition, update statement, `block`), `match` (scrutinee, `case`s,
/// optional `default`), `case` (literal, `block`), `default`, `break`,
/// `continue`, `func_def` (value is the name; `params` then `block`),
/// `throw`, `expr_stmt`.
///
/// Expression kinds: `int`, `point`, `text`, `state`, `empty`, `ident`,
/// `binary` (value is the operator), `unary` (value `!` or `~`), `call`
/// (value is the callee name, children the arguments), `get` (optional
/// prompt child), `list`, `group` (children are `pair`s), `pair`,
/// `index` (value is the container name, child the list index), `key`
/// (same for group keys), `cast` (value is the target type name),
/// `post_inc` and `post_dec` (value is the variable name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseNode {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ParseNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

impl ParseNode {
    pub fn new(kind: impl Into<String>, children: Vec<ParseNode>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
            children,
            line: None,
            col: None,
        }
    }

    /// A leaf node carrying a token value.
    pub fn leaf(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: Some(value.into()),
            children: Vec::new(),
            line: None,
            col: None,
        }
    }

    /// An interior node carrying both a token value and children.
    pub fn with_value(
        kind: impl Into<String>,
        value: impl Into<String>,
        children: Vec<ParseNode>,
    ) -> Self {
        Self {
            kind: kind.into(),
            value: Some(value.into()),
            children,
            line: None,
            col: None,
        }
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.line = Some(line);
        self.col = Some(col);
        self
    }

    pub fn span(&self) -> Option<Span> {
        self.line.map(|line| Span::new(line, self.col.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_json() {
        let node = ParseNode::new(
            "program",
            vec![ParseNode::with_value(
                "binary",
                "+",
                vec![ParseNode::leaf("int", "1"), ParseNode::leaf("int", "2")],
            )
            .at(1, 5)],
        );
        let json = serde_json::to_string(&node).unwrap();
        let back: ParseNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, "program");
        assert_eq!(back.children[0].value.as_deref(), Some("+"));
        assert_eq!(back.children[0].span(), Some(Span::new(1, 5)));
    }

    #[test]
    fn test_defaults_on_sparse_json() {
        let back: ParseNode = serde_json::from_str(r#"{"kind":"empty"}"#).unwrap();
        assert!(back.children.is_empty());
        assert!(back.value.is_none());
        assert!(back.span().is_none());
    }
}
