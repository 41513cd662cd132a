//! TAC (three-address code) data types — the contract shared by the
//! generator and the virtual machine.
//!
//! An instruction is a 4-field tuple `(opcode, a, b, dest)` with unused
//! fields carrying `None`. Labels resolve by exact match against a
//! `Label` instruction's destination; the VM compiles the label map once
//! before execution begins.

use crate::compiler::ast::Type;
use crate::compiler::tree::Span;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Assign,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    // Logic — note there are no AND/OR opcodes: logical operators lower
    // to short-circuit branch sequences.
    Not,
    // Text and list joining
    Concat,
    ListConcat,
    // Comparison
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    // Control flow
    Label,
    Goto,
    IfTrue,
    IfFalse,
    // Functions
    Function,
    EndFunction,
    Param,
    Call,
    Return,
    // I/O
    Input,
    Print,
    TypeCast,
    // Containers
    ListCreate,
    ListAppend,
    ListAccess,
    ListSet,
    GroupCreate,
    GroupAccess,
    GroupSet,
    /// Pseudo-instruction planted by the generator for operand-type
    /// errors, so the VM fails gracefully instead of the generator
    /// crashing.
    Error,
}

/// An immediate value embedded in the instruction stream. Container
/// literals are never constants; they are built by instruction
/// sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Empty,
    Int(i64),
    Point(f64),
    Text(String),
    State(bool),
}

impl Constant {
    pub fn static_type(&self) -> Type {
        match self {
            Constant::Empty => Type::Empty,
            Constant::Int(_) => Type::Integer,
            Constant::Point(_) => Type::Point,
            Constant::Text(_) => Type::Text,
            Constant::State(_) => Type::State,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Empty => write!(f, "empty"),
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Point(x) => write!(f, "{}", x),
            Constant::Text(s) => write!(f, "\"{}\"", s),
            Constant::State(true) => write!(f, "YES"),
            Constant::State(false) => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(Constant),
    Var(String),
    Temp(u32),
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(c) => write!(f, "{}", c),
            Operand::Var(name) => write!(f, "{}", name),
            Operand::Temp(id) => write!(f, "t{}", id),
            Operand::Label(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub a: Option<Operand>,
    pub b: Option<Operand>,
    pub dest: Option<Operand>,
}

impl Instruction {
    pub fn new(
        op: Opcode,
        a: Option<Operand>,
        b: Option<Operand>,
        dest: Option<Operand>,
    ) -> Self {
        Self { op, a, b, dest }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        let fields: Vec<String> = [&self.a, &self.b, &self.dest]
            .into_iter()
            .flatten()
            .map(|o| o.to_string())
            .collect();
        if !fields.is_empty() {
            write!(f, " {}", fields.join(", "))?;
        }
        Ok(())
    }
}

/// Function metadata handed from the generator to the VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Entry label of the function body.
    pub entry: String,
    /// Ordered parameter names, bound positionally at CALL.
    pub params: Vec<String>,
}

/// A compiled Minima program: the flat instruction list, a parallel
/// source-position map, the function table, and a fingerprint of the
/// parse-tree document it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub spans: Vec<Option<Span>>,
    pub functions: BTreeMap<String, FunctionInfo>,
    pub fingerprint: String,
}

impl Program {
    /// Build the label → instruction-index map by scanning `Label`
    /// destinations. The generator guarantees unique labels.
    pub fn label_index(&self) -> HashMap<String, usize> {
        let mut labels = HashMap::new();
        for (i, instr) in self.instructions.iter().enumerate() {
            if instr.op == Opcode::Label {
                if let Some(Operand::Label(name)) = &instr.dest {
                    labels.insert(name.clone(), i);
                }
            }
        }
        labels
    }

    /// Render the numbered instruction listing.
    pub fn listing(&self) -> String {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, instr)| format!("{}: {}", i, instr))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Builtin-function call contract ──────────────────────────────────

/// Arity of a builtin function. The generator validates call shape
/// against this; the VM's registry performs the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Accepts one or two arguments.
    Variadic,
}

impl Arity {
    pub fn accepts(self, argc: usize) -> bool {
        match self {
            Arity::Fixed(n) => argc == n,
            Arity::Variadic => (1..=2).contains(&argc),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Variadic => write!(f, "1 or 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinSig {
    pub name: &'static str,
    pub arity: Arity,
    pub returns: Type,
}

const BUILTIN_SIGS: &[BuiltinSig] = &[
    BuiltinSig { name: "length", arity: Arity::Fixed(1), returns: Type::Integer },
    BuiltinSig { name: "uppercase", arity: Arity::Fixed(1), returns: Type::Text },
    BuiltinSig { name: "lowercase", arity: Arity::Fixed(1), returns: Type::Text },
    BuiltinSig { name: "reverse", arity: Arity::Fixed(1), returns: Type::Unknown },
    BuiltinSig { name: "abs", arity: Arity::Fixed(1), returns: Type::Unknown },
    BuiltinSig { name: "sum", arity: Arity::Fixed(1), returns: Type::Unknown },
    BuiltinSig { name: "contains", arity: Arity::Fixed(2), returns: Type::State },
    BuiltinSig { name: "join", arity: Arity::Fixed(2), returns: Type::Text },
    BuiltinSig { name: "slice", arity: Arity::Fixed(3), returns: Type::Unknown },
    BuiltinSig { name: "unique", arity: Arity::Fixed(1), returns: Type::List },
    BuiltinSig { name: "sorted", arity: Arity::Variadic, returns: Type::List },
    BuiltinSig { name: "type", arity: Arity::Fixed(1), returns: Type::Text },
    BuiltinSig { name: "max", arity: Arity::Variadic, returns: Type::Unknown },
    BuiltinSig { name: "min", arity: Arity::Variadic, returns: Type::Unknown },
    BuiltinSig { name: "pow", arity: Arity::Fixed(2), returns: Type::Unknown },
    BuiltinSig { name: "isqrt", arity: Arity::Fixed(1), returns: Type::Integer },
    BuiltinSig { name: "factorial", arity: Arity::Fixed(1), returns: Type::Integer },
    BuiltinSig { name: "ceil", arity: Arity::Fixed(1), returns: Type::Integer },
    BuiltinSig { name: "floor", arity: Arity::Fixed(1), returns: Type::Integer },
    BuiltinSig { name: "round", arity: Arity::Variadic, returns: Type::Unknown },
];

/// Look up a builtin's call signature by name.
pub fn builtin_signature(name: &str) -> Option<&'static BuiltinSig> {
    BUILTIN_SIGS.iter().find(|sig| sig.name == name)
}

/// Names of every builtin, for registry cross-checks.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_SIGS.iter().map(|sig| sig.name)
}
