//! Parse-tree → typed-AST lowering.
//!
//! This is the only pass that touches raw parse-tree shapes; everything
//! downstream works on [`crate::compiler::ast`] variants. Shape
//! violations are collected, never panicked on, so one pass reports
//! every independent problem.

use crate::compiler::ast::*;
use crate::compiler::tac::Constant;
use crate::compiler::tree::{ParseNode, Span};
use thiserror::Error;

/// Largest representable integer magnitude: nine digits.
pub const MAX_INT: i64 = 999_999_999;
/// Fractional digits beyond this are rounded, not rejected.
pub const MAX_FRACTION_DIGITS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("unknown node kind '{kind}' at line {line}")]
    UnknownKind { kind: String, line: u32 },
    #[error("malformed '{kind}' node: expected {expected} at line {line}")]
    Malformed {
        kind: String,
        expected: &'static str,
        line: u32,
    },
    #[error("invalid {kind} literal '{value}' at line {line}")]
    BadLiteral {
        kind: String,
        value: String,
        line: u32,
    },
    #[error("integer literal '{value}' exceeds 9 digits at line {line}")]
    IntegerOutOfRange { value: String, line: u32 },
}

/// Lower a parse tree rooted at a `program` node into a typed AST.
pub fn build_program(root: &ParseNode) -> Result<Program, Vec<TreeError>> {
    let mut builder = Builder::default();
    let body = if root.kind == "program" || root.kind == "block" {
        builder.build_stmts(&root.children)
    } else {
        builder.errors.push(TreeError::Malformed {
            kind: root.kind.clone(),
            expected: "a 'program' root",
            line: line_of(root),
        });
        Vec::new()
    };
    if builder.errors.is_empty() {
        Ok(Program { body })
    } else {
        Err(builder.errors)
    }
}

fn line_of(node: &ParseNode) -> u32 {
    node.line.unwrap_or(0)
}

fn span_of(node: &ParseNode) -> Span {
    node.span().unwrap_or_default()
}

#[derive(Default)]
struct Builder {
    errors: Vec<TreeError>,
}

impl Builder {
    fn malformed(&mut self, node: &ParseNode, expected: &'static str) {
        self.errors.push(TreeError::Malformed {
            kind: node.kind.clone(),
            expected,
            line: line_of(node),
        });
    }

    fn value_of<'a>(&mut self, node: &'a ParseNode, expected: &'static str) -> Option<&'a str> {
        match node.value.as_deref() {
            Some(v) => Some(v),
            None => {
                self.malformed(node, expected);
                None
            }
        }
    }

    fn build_stmts(&mut self, nodes: &[ParseNode]) -> Vec<Stmt> {
        nodes.iter().filter_map(|n| self.build_stmt(n)).collect()
    }

    fn build_block(&mut self, node: &ParseNode) -> Vec<Stmt> {
        if node.kind == "block" {
            self.build_stmts(&node.children)
        } else {
            self.malformed(node, "a 'block' node");
            Vec::new()
        }
    }

    fn build_stmt(&mut self, node: &ParseNode) -> Option<Stmt> {
        let span = span_of(node);
        match node.kind.as_str() {
            "var_decl" => {
                let fixed = match node.value.as_deref() {
                    Some("var") | None => false,
                    Some("fixed") => true,
                    Some(_) => {
                        self.malformed(node, "'var' or 'fixed'");
                        false
                    }
                };
                let decls: Vec<Declarator> = node
                    .children
                    .iter()
                    .filter_map(|d| self.build_declarator(d))
                    .collect();
                if decls.is_empty() {
                    self.malformed(node, "at least one declarator");
                    return None;
                }
                Some(Stmt::Declare { fixed, decls, span })
            }
            "assign" => {
                let op = match node.value.as_deref() {
                    Some("=") | None => AssignOp::Set,
                    Some("+=") => AssignOp::Add,
                    Some("-=") => AssignOp::Sub,
                    Some("*=") => AssignOp::Mul,
                    Some("/=") => AssignOp::Div,
                    Some(_) => {
                        self.malformed(node, "an assignment operator");
                        AssignOp::Set
                    }
                };
                let [target_node, value_node] = node.children.as_slice() else {
                    self.malformed(node, "a target and a value");
                    return None;
                };
                let target = self.build_target(target_node)?;
                let value = self.build_expr(value_node)?;
                Some(Stmt::Assign {
                    target,
                    op,
                    value,
                    span,
                })
            }
            "show" => {
                let Some(child) = node.children.first() else {
                    self.malformed(node, "an expression to show");
                    return None;
                };
                let value = self.build_expr(child)?;
                Some(Stmt::Show { value, span })
            }
            "if" => self.build_if(node, span),
            "while" => {
                let [cond, body] = node.children.as_slice() else {
                    self.malformed(node, "a condition and a block");
                    return None;
                };
                Some(Stmt::While {
                    condition: self.build_expr(cond)?,
                    body: self.build_block(body),
                    span,
                })
            }
            "do_while" => {
                let [body, cond] = node.children.as_slice() else {
                    self.malformed(node, "a block and a condition");
                    return None;
                };
                Some(Stmt::DoWhile {
                    body: self.build_block(body),
                    condition: self.build_expr(cond)?,
                    span,
                })
            }
            "for" => {
                let [init, cond, update, body] = node.children.as_slice() else {
                    self.malformed(node, "init, condition, update, and a block");
                    return None;
                };
                let init = self.build_optional_stmt(init);
                let condition = self.build_expr(cond)?;
                let update = self.build_optional_stmt(update);
                Some(Stmt::For {
                    init: init.map(Box::new),
                    condition,
                    update: update.map(Box::new),
                    body: self.build_block(body),
                    span,
                })
            }
            "match" => self.build_match(node, span),
            "break" => Some(Stmt::Break(span)),
            "continue" => Some(Stmt::Continue(span)),
            "func_def" => {
                let name = self.value_of(node, "a function name")?.to_string();
                let [params, body] = node.children.as_slice() else {
                    self.malformed(node, "a 'params' node and a block");
                    return None;
                };
                let params = self.build_params(params);
                Some(Stmt::FuncDef {
                    name,
                    params,
                    body: self.build_block(body),
                    span,
                })
            }
            "throw" => {
                let value = match node.children.first() {
                    Some(child) => Some(self.build_expr(child)?),
                    None => None,
                };
                Some(Stmt::Throw { value, span })
            }
            "expr_stmt" => {
                let Some(child) = node.children.first() else {
                    self.malformed(node, "an expression");
                    return None;
                };
                let value = self.build_expr(child)?;
                Some(Stmt::Expr { value, span })
            }
            _ => {
                self.errors.push(TreeError::UnknownKind {
                    kind: node.kind.clone(),
                    line: line_of(node),
                });
                None
            }
        }
    }

    /// `nop` marks an absent init/update slot in a `for` header.
    fn build_optional_stmt(&mut self, node: &ParseNode) -> Option<Stmt> {
        if node.kind == "nop" {
            None
        } else {
            self.build_stmt(node)
        }
    }

    fn build_declarator(&mut self, node: &ParseNode) -> Option<Declarator> {
        if node.kind != "declarator" {
            self.malformed(node, "a 'declarator' node");
            return None;
        }
        let name = self.value_of(node, "a variable name")?.to_string();
        let init = match node.children.first() {
            Some(child) => Some(self.build_expr(child)?),
            None => None,
        };
        Some(Declarator {
            name,
            init,
            span: span_of(node),
        })
    }

    fn build_target(&mut self, node: &ParseNode) -> Option<AssignTarget> {
        match node.kind.as_str() {
            "ident" => Some(AssignTarget::Var(
                self.value_of(node, "a variable name")?.to_string(),
            )),
            "index" | "key" => {
                let name = self.value_of(node, "a container name")?.to_string();
                let Some(index_node) = node.children.first() else {
                    self.malformed(node, "an index expression");
                    return None;
                };
                let kind = if node.kind == "index" {
                    IndexKind::List
                } else {
                    IndexKind::Group
                };
                let index = self.build_expr(index_node)?;
                Some(AssignTarget::Index(name, index, kind))
            }
            _ => {
                self.malformed(node, "an assignable target");
                None
            }
        }
    }

    fn build_params(&mut self, node: &ParseNode) -> Vec<String> {
        if node.kind != "params" {
            self.malformed(node, "a 'params' node");
            return Vec::new();
        }
        node.children
            .iter()
            .filter_map(|p| {
                if p.kind == "ident" {
                    p.value.clone()
                } else {
                    self.malformed(p, "an 'ident' parameter");
                    None
                }
            })
            .collect()
    }

    fn build_if(&mut self, node: &ParseNode, span: Span) -> Option<Stmt> {
        let mut children = node.children.iter();
        let (Some(cond), Some(body)) = (children.next(), children.next()) else {
            self.malformed(node, "a condition and a block");
            return None;
        };
        let mut arms = vec![IfArm {
            condition: self.build_expr(cond)?,
            body: self.build_block(body),
            span,
        }];
        let mut otherwise = None;
        for child in children {
            match child.kind.as_str() {
                "elseif" => {
                    let [cond, body] = child.children.as_slice() else {
                        self.malformed(child, "a condition and a block");
                        continue;
                    };
                    if let Some(condition) = self.build_expr(cond) {
                        arms.push(IfArm {
                            condition,
                            body: self.build_block(body),
                            span: span_of(child),
                        });
                    }
                }
                "else" => match child.children.as_slice() {
                    [body] => otherwise = Some(self.build_block(body)),
                    _ => self.malformed(child, "a block"),
                },
                _ => self.malformed(child, "'elseif' or 'else'"),
            }
        }
        Some(Stmt::If {
            arms,
            otherwise,
            span,
        })
    }

    fn build_match(&mut self, node: &ParseNode, span: Span) -> Option<Stmt> {
        let mut children = node.children.iter();
        let Some(scrutinee_node) = children.next() else {
            self.malformed(node, "a scrutinee expression");
            return None;
        };
        let scrutinee = self.build_expr(scrutinee_node)?;
        let mut cases = Vec::new();
        let mut default = None;
        for child in children {
            match child.kind.as_str() {
                "case" => {
                    let [lit, body] = child.children.as_slice() else {
                        self.malformed(child, "a literal and a block");
                        continue;
                    };
                    if let Some(value) = self.build_literal(lit) {
                        cases.push(MatchCase {
                            value,
                            body: self.build_block(body),
                            span: span_of(child),
                        });
                    }
                }
                "default" => match child.children.as_slice() {
                    [body] => default = Some(self.build_block(body)),
                    _ => self.malformed(child, "a block"),
                },
                _ => self.malformed(child, "'case' or 'default'"),
            }
        }
        Some(Stmt::Match {
            scrutinee,
            cases,
            default,
            span,
        })
    }

    fn build_expr(&mut self, node: &ParseNode) -> Option<Expr> {
        let span = span_of(node);
        match node.kind.as_str() {
            "int" | "point" | "text" | "state" | "empty" => {
                self.build_literal(node).map(|c| Expr::Literal(c, span))
            }
            "ident" => Some(Expr::Ident(
                self.value_of(node, "a variable name")?.to_string(),
                span,
            )),
            "binary" => {
                let op = self.binop_of(node)?;
                let [lhs, rhs] = node.children.as_slice() else {
                    self.malformed(node, "two operands");
                    return None;
                };
                let lhs = self.build_expr(lhs)?;
                let rhs = self.build_expr(rhs)?;
                Some(Expr::Binary(Box::new(lhs), op, Box::new(rhs), span))
            }
            "unary" => {
                let op = match self.value_of(node, "'!' or '~'")? {
                    "!" => UnaryOp::Not,
                    "~" => UnaryOp::Neg,
                    _ => {
                        self.malformed(node, "'!' or '~'");
                        return None;
                    }
                };
                let Some(child) = node.children.first() else {
                    self.malformed(node, "an operand");
                    return None;
                };
                let operand = self.build_expr(child)?;
                Some(Expr::Unary(op, Box::new(operand), span))
            }
            "call" => {
                let name = self.value_of(node, "a callee name")?.to_string();
                let args: Vec<Expr> = node
                    .children
                    .iter()
                    .filter_map(|a| self.build_expr(a))
                    .collect();
                if args.len() != node.children.len() {
                    return None;
                }
                Some(Expr::Call(name, args, span))
            }
            "get" => {
                let prompt = match node.children.first() {
                    Some(child) => Some(Box::new(self.build_expr(child)?)),
                    None => None,
                };
                Some(Expr::Get(prompt, span))
            }
            "list" => {
                let items: Vec<Expr> = node
                    .children
                    .iter()
                    .filter_map(|e| self.build_expr(e))
                    .collect();
                if items.len() != node.children.len() {
                    return None;
                }
                Some(Expr::ListLit(items, span))
            }
            "group" => {
                let mut pairs = Vec::new();
                for pair in &node.children {
                    if pair.kind != "pair" {
                        self.malformed(pair, "a 'pair' node");
                        continue;
                    }
                    let [k, v] = pair.children.as_slice() else {
                        self.malformed(pair, "a key and a value");
                        continue;
                    };
                    if let (Some(k), Some(v)) = (self.build_expr(k), self.build_expr(v)) {
                        pairs.push((k, v));
                    }
                }
                Some(Expr::GroupLit(pairs, span))
            }
            "index" | "key" => {
                let name = self.value_of(node, "a container name")?.to_string();
                let Some(index_node) = node.children.first() else {
                    self.malformed(node, "an index expression");
                    return None;
                };
                let kind = if node.kind == "index" {
                    IndexKind::List
                } else {
                    IndexKind::Group
                };
                let index = self.build_expr(index_node)?;
                Some(Expr::Index(name, Box::new(index), kind, span))
            }
            "cast" => {
                let kind = match self.value_of(node, "a type name")? {
                    "integer" => CastKind::Integer,
                    "point" => CastKind::Point,
                    "text" => CastKind::Text,
                    "state" => CastKind::State,
                    _ => {
                        self.malformed(node, "'integer', 'point', 'text', or 'state'");
                        return None;
                    }
                };
                let Some(child) = node.children.first() else {
                    self.malformed(node, "an operand");
                    return None;
                };
                let operand = self.build_expr(child)?;
                Some(Expr::Cast(kind, Box::new(operand), span))
            }
            "post_inc" => Some(Expr::PostInc(
                self.value_of(node, "a variable name")?.to_string(),
                span,
            )),
            "post_dec" => Some(Expr::PostDec(
                self.value_of(node, "a variable name")?.to_string(),
                span,
            )),
            _ => {
                self.errors.push(TreeError::UnknownKind {
                    kind: node.kind.clone(),
                    line: line_of(node),
                });
                None
            }
        }
    }

    fn binop_of(&mut self, node: &ParseNode) -> Option<BinOp> {
        let op = match self.value_of(node, "a binary operator")? {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            "==" => BinOp::Eq,
            "!=" => BinOp::Neq,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            _ => {
                self.malformed(node, "a binary operator");
                return None;
            }
        };
        Some(op)
    }

    fn build_literal(&mut self, node: &ParseNode) -> Option<Constant> {
        let line = line_of(node);
        match node.kind.as_str() {
            "empty" => Some(Constant::Empty),
            "state" => match node.value.as_deref() {
                Some("YES") => Some(Constant::State(true)),
                Some("NO") => Some(Constant::State(false)),
                other => {
                    self.errors.push(TreeError::BadLiteral {
                        kind: "state".into(),
                        value: other.unwrap_or("").into(),
                        line,
                    });
                    None
                }
            },
            "text" => Some(Constant::Text(
                self.value_of(node, "a text value")?.to_string(),
            )),
            "int" => {
                let raw = self.value_of(node, "an integer value")?;
                self.parse_int(raw, line)
            }
            "point" => {
                let raw = self.value_of(node, "a point value")?;
                self.parse_point(raw, line)
            }
            _ => {
                self.malformed(node, "a literal");
                None
            }
        }
    }

    fn parse_int(&mut self, raw: &str, line: u32) -> Option<Constant> {
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            self.errors.push(TreeError::BadLiteral {
                kind: "integer".into(),
                value: raw.into(),
                line,
            });
            return None;
        }
        // A ten-digit magnitude is rejected at construction.
        if digits.trim_start_matches('0').len() > 9 {
            self.errors.push(TreeError::IntegerOutOfRange {
                value: raw.into(),
                line,
            });
            return None;
        }
        let n: i64 = raw.parse().ok()?;
        debug_assert!(n.abs() <= MAX_INT);
        Some(Constant::Int(n))
    }

    fn parse_point(&mut self, raw: &str, line: u32) -> Option<Constant> {
        let unsigned = raw.strip_prefix('-').unwrap_or(raw);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        let digits_ok = !int_part.is_empty()
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.bytes().all(|b| b.is_ascii_digit());
        if !digits_ok {
            self.errors.push(TreeError::BadLiteral {
                kind: "point".into(),
                value: raw.into(),
                line,
            });
            return None;
        }
        if int_part.trim_start_matches('0').len() > 9 {
            self.errors.push(TreeError::IntegerOutOfRange {
                value: raw.into(),
                line,
            });
            return None;
        }
        let mut x: f64 = raw.parse().ok()?;
        // Fractional digits past the ninth are rounded, not rejected.
        if frac_part.len() > MAX_FRACTION_DIGITS {
            x = (x * 1e9).round() / 1e9;
        }
        Some(Constant::Point(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(kind: &str, children: Vec<ParseNode>) -> ParseNode {
        ParseNode::new(kind, children)
    }

    fn v(kind: &str, value: &str) -> ParseNode {
        ParseNode::leaf(kind, value)
    }

    #[test]
    fn test_builds_declaration_with_binary_init() {
        let tree = n(
            "program",
            vec![n(
                "var_decl",
                vec![ParseNode {
                    kind: "declarator".into(),
                    value: Some("a".into()),
                    children: vec![ParseNode::with_value(
                        "binary",
                        "+",
                        vec![v("int", "1"), v("int", "2")],
                    )],
                    line: Some(1),
                    col: Some(1),
                }],
            )],
        );
        let program = build_program(&tree).unwrap();
        assert_eq!(program.body.len(), 1);
        match &program.body[0] {
            Stmt::Declare { fixed, decls, .. } => {
                assert!(!fixed);
                assert_eq!(decls[0].name, "a");
                assert!(matches!(decls[0].init, Some(Expr::Binary(..))));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_ten_digit_integer_rejected() {
        let tree = n(
            "program",
            vec![n(
                "expr_stmt",
                vec![v("int", "1000000000")],
            )],
        );
        let errors = build_program(&tree).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, TreeError::IntegerOutOfRange { .. })));
    }

    #[test]
    fn test_nine_digit_integer_accepted() {
        let tree = n("program", vec![n("expr_stmt", vec![v("int", "999999999")])]);
        assert!(build_program(&tree).is_ok());
    }

    #[test]
    fn test_long_fraction_rounds_to_nine_digits() {
        let tree = n(
            "program",
            vec![n("expr_stmt", vec![v("point", "1.1234567891")])],
        );
        let program = build_program(&tree).unwrap();
        match &program.body[0] {
            Stmt::Expr {
                value: Expr::Literal(Constant::Point(x), _),
                ..
            } => assert_eq!(*x, 1.123456789),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_collected() {
        let tree = n("program", vec![n("mystery", vec![])]);
        let errors = build_program(&tree).unwrap_err();
        assert_eq!(
            errors,
            vec![TreeError::UnknownKind {
                kind: "mystery".into(),
                line: 0
            }]
        );
    }

    #[test]
    fn test_multiple_errors_collected_in_one_pass() {
        let tree = n(
            "program",
            vec![
                n("mystery", vec![]),
                n("expr_stmt", vec![v("int", "9999999999")]),
            ],
        );
        let errors = build_program(&tree).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
