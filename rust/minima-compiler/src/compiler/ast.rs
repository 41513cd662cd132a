//! Typed AST for Minima, one variant per construct.
//!
//! Produced from the raw parse tree by [`crate::compiler::grammar`] and
//! consumed by the TAC generator. Every node carries the span the parser
//! reported for it (defaulted when the parser had none).

use crate::compiler::tac::Constant;
use crate::compiler::tree::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type classification used by the generator to pick opcode
/// families. The IR itself carries no types; the VM re-validates at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Integer,
    Point,
    Text,
    State,
    List,
    Group,
    Empty,
    Unknown,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Point)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Integer => "integer",
            Type::Point => "point",
            Type::Text => "text",
            Type::State => "state",
            Type::List => "list",
            Type::Group => "group",
            Type::Empty => "empty",
            Type::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Target type of a typecast expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    Integer,
    Point,
    Text,
    State,
}

impl CastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CastKind::Integer => "integer",
            CastKind::Point => "point",
            CastKind::Text => "text",
            CastKind::State => "state",
        }
    }

    pub fn result_type(self) -> Type {
        match self {
            CastKind::Integer => Type::Integer,
            CastKind::Point => Type::Point,
            CastKind::Text => Type::Text,
            CastKind::State => Type::State,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        };
        write!(f, "{}", sym)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical not, `!`.
    Not,
    /// Arithmetic negation, `~`.
    Neg,
}

/// Whether an indexed access uses list (`[...]`) or group (`{...}`)
/// syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    List,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Constant, Span),
    Ident(String, Span),
    Unary(UnaryOp, Box<Expr>, Span),
    Binary(Box<Expr>, BinOp, Box<Expr>, Span),
    /// Function or builtin call by name.
    Call(String, Vec<Expr>, Span),
    /// The `get(prompt)` input builtin.
    Get(Option<Box<Expr>>, Span),
    ListLit(Vec<Expr>, Span),
    GroupLit(Vec<(Expr, Expr)>, Span),
    Index(String, Box<Expr>, IndexKind, Span),
    Cast(CastKind, Box<Expr>, Span),
    PostInc(String, Span),
    PostDec(String, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, s)
            | Expr::Ident(_, s)
            | Expr::Unary(_, _, s)
            | Expr::Binary(_, _, _, s)
            | Expr::Call(_, _, s)
            | Expr::Get(_, s)
            | Expr::ListLit(_, s)
            | Expr::GroupLit(_, s)
            | Expr::Index(_, _, _, s)
            | Expr::Cast(_, _, s)
            | Expr::PostInc(_, s)
            | Expr::PostDec(_, s) => *s,
        }
    }
}

/// One `name = init` entry of a declaration statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// Assignment target: a bare variable or an indexed container slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    Var(String),
    Index(String, Expr, IndexKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfArm {
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub value: Constant,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Declare {
        fixed: bool,
        decls: Vec<Declarator>,
        span: Span,
    },
    Assign {
        target: AssignTarget,
        op: AssignOp,
        value: Expr,
        span: Span,
    },
    Show {
        value: Expr,
        span: Span,
    },
    If {
        /// The `checkif` arm followed by every `recheck` arm.
        arms: Vec<IfArm>,
        otherwise: Option<Vec<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Vec<Stmt>,
        condition: Expr,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Expr,
        update: Option<Box<Stmt>>,
        body: Vec<Stmt>,
        span: Span,
    },
    Match {
        scrutinee: Expr,
        cases: Vec<MatchCase>,
        default: Option<Vec<Stmt>>,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
        span: Span,
    },
    /// Minima's function-return statement.
    Throw {
        value: Option<Expr>,
        span: Span,
    },
    Expr {
        value: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Declare { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Show { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::FuncDef { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Expr { span, .. } => *span,
            Stmt::Break(span) | Stmt::Continue(span) => *span,
        }
    }
}

/// A whole Minima program: the ordered top-level statement list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}
