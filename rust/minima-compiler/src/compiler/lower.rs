//! AST → TAC lowering. The single canonical generator pass.
//!
//! Resolves names through the scope chain, classifies static types to
//! pick opcode families (CONCAT vs ADD vs LIST_CONCAT), and linearizes
//! control flow into labels and jumps. Logical operators lower to
//! short-circuit branch sequences; the right operand never executes when
//! the left decides the result. All generation-time errors are collected
//! so one pass reports every independent problem.

use crate::compiler::ast::{self, AssignOp, AssignTarget, BinOp, CastKind, Expr, IndexKind, Stmt, Type, UnaryOp};
use crate::compiler::scope::{ScopeError, SymbolTable};
use crate::compiler::tac::{
    builtin_signature, Constant, FunctionInfo, Instruction, Opcode, Operand, Program,
};
use crate::compiler::tree::Span;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerError {
    #[error("redeclaration of '{name}' at line {line}")]
    Redeclared { name: String, line: u32 },
    #[error("function '{name}' is already defined at line {line}")]
    Redefined { name: String, line: u32 },
    #[error("'{name}' cannot name both a variable and a function at line {line}")]
    NameClash { name: String, line: u32 },
    #[error("undefined identifier '{name}' at line {line}")]
    Undefined { name: String, line: u32 },
    #[error("cannot reassign fixed variable '{name}' at line {line}")]
    FixedReassignment { name: String, line: u32 },
    #[error("'{name}' expects {expected} argument(s), got {got} at line {line}")]
    ArityMismatch {
        name: String,
        expected: String,
        got: usize,
        line: u32,
    },
    #[error("invalid operands for '{op}': {lhs} and {rhs} at line {line}")]
    InvalidOperands {
        op: String,
        lhs: Type,
        rhs: Type,
        line: u32,
    },
    #[error("function '{name}' used as a value at line {line}")]
    FunctionAsValue { name: String, line: u32 },
    #[error("'{keyword}' outside of a loop at line {line}")]
    OutsideLoop { keyword: &'static str, line: u32 },
    #[error("'throw' outside of a function at line {line}")]
    ThrowOutsideFunction { line: u32 },
    #[error("duplicate case value {value} at line {line}")]
    DuplicateCase { value: String, line: u32 },
    #[error("duplicate group key {value} at line {line}")]
    DuplicateKey { value: String, line: u32 },
}

/// Lower a typed AST into a TAC program. The fingerprint identifies the
/// parse-tree document the program was built from.
pub fn lower(
    program: &ast::Program,
    fingerprint: impl Into<String>,
) -> Result<Program, Vec<LowerError>> {
    let mut lowerer = Lowerer::new();
    for stmt in &program.body {
        lowerer.lower_stmt(stmt);
    }
    if lowerer.errors.is_empty() {
        Ok(Program {
            instructions: lowerer.instructions,
            spans: lowerer.spans,
            functions: lowerer.functions,
            fingerprint: fingerprint.into(),
        })
    } else {
        Err(lowerer.errors)
    }
}

/// (continue-target, break-target) pair consumed by break/continue.
struct LoopContext {
    continue_label: String,
    break_label: String,
}

struct Lowerer {
    instructions: Vec<Instruction>,
    spans: Vec<Option<Span>>,
    functions: BTreeMap<String, FunctionInfo>,
    symbols: SymbolTable,
    temp_counter: u32,
    label_counter: u32,
    loop_stack: Vec<LoopContext>,
    function_depth: usize,
    errors: Vec<LowerError>,
}

impl Lowerer {
    fn new() -> Self {
        Self {
            instructions: Vec::new(),
            spans: Vec::new(),
            functions: BTreeMap::new(),
            symbols: SymbolTable::new(),
            temp_counter: 0,
            label_counter: 0,
            loop_stack: Vec::new(),
            function_depth: 0,
            errors: Vec::new(),
        }
    }

    fn emit(
        &mut self,
        op: Opcode,
        a: Option<Operand>,
        b: Option<Operand>,
        dest: Option<Operand>,
        span: Span,
    ) {
        self.instructions.push(Instruction::new(op, a, b, dest));
        self.spans.push((span.line > 0).then_some(span));
    }

    fn new_temp(&mut self) -> u32 {
        self.temp_counter += 1;
        self.temp_counter
    }

    fn new_label(&mut self) -> String {
        self.label_counter += 1;
        format!("L{}", self.label_counter)
    }

    fn error(&mut self, err: LowerError) {
        self.errors.push(err);
    }

    /// Lower a statement list inside a fresh child scope.
    fn lower_block(&mut self, body: &[Stmt]) {
        self.symbols.push_scope();
        for stmt in body {
            self.lower_stmt(stmt);
        }
        self.symbols.pop_scope();
    }

    // ── Statements ──────────────────────────────────────────────────

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Declare { fixed, decls, span } => {
                for decl in decls {
                    self.lower_declarator(*fixed, decl, *span);
                }
            }
            Stmt::Assign {
                target,
                op,
                value,
                span,
            } => self.lower_assign(target, *op, value, *span),
            Stmt::Show { value, span } => {
                let (_, operand) = self.lower_expr(value);
                self.emit(Opcode::Print, Some(operand), None, None, *span);
            }
            Stmt::If {
                arms,
                otherwise,
                span,
            } => {
                let end = self.new_label();
                for arm in arms {
                    let next = self.new_label();
                    let (_, cond) = self.lower_expr(&arm.condition);
                    self.emit(
                        Opcode::IfFalse,
                        Some(cond),
                        None,
                        Some(Operand::Label(next.clone())),
                        arm.span,
                    );
                    self.lower_block(&arm.body);
                    self.emit(
                        Opcode::Goto,
                        None,
                        None,
                        Some(Operand::Label(end.clone())),
                        arm.span,
                    );
                    self.emit(Opcode::Label, None, None, Some(Operand::Label(next)), arm.span);
                }
                if let Some(body) = otherwise {
                    self.lower_block(body);
                }
                self.emit(Opcode::Label, None, None, Some(Operand::Label(end)), *span);
            }
            Stmt::While {
                condition,
                body,
                span,
            } => {
                let start = self.new_label();
                let end = self.new_label();
                self.loop_stack.push(LoopContext {
                    continue_label: start.clone(),
                    break_label: end.clone(),
                });
                self.emit(
                    Opcode::Label,
                    None,
                    None,
                    Some(Operand::Label(start.clone())),
                    *span,
                );
                let (_, cond) = self.lower_expr(condition);
                self.emit(
                    Opcode::IfFalse,
                    Some(cond),
                    None,
                    Some(Operand::Label(end.clone())),
                    *span,
                );
                self.lower_block(body);
                self.emit(Opcode::Goto, None, None, Some(Operand::Label(start)), *span);
                self.emit(Opcode::Label, None, None, Some(Operand::Label(end)), *span);
                self.loop_stack.pop();
            }
            Stmt::DoWhile {
                body,
                condition,
                span,
            } => {
                let start = self.new_label();
                let check = self.new_label();
                let end = self.new_label();
                self.loop_stack.push(LoopContext {
                    continue_label: check.clone(),
                    break_label: end.clone(),
                });
                self.emit(
                    Opcode::Label,
                    None,
                    None,
                    Some(Operand::Label(start.clone())),
                    *span,
                );
                self.lower_block(body);
                self.emit(Opcode::Label, None, None, Some(Operand::Label(check)), *span);
                let (_, cond) = self.lower_expr(condition);
                self.emit(
                    Opcode::IfTrue,
                    Some(cond),
                    None,
                    Some(Operand::Label(start)),
                    *span,
                );
                self.emit(Opcode::Label, None, None, Some(Operand::Label(end)), *span);
                self.loop_stack.pop();
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                span,
            } => {
                // The header gets its own scope so the loop variable dies
                // with the loop.
                self.symbols.push_scope();
                if let Some(init) = init {
                    self.lower_stmt(init);
                }
                let check = self.new_label();
                let body_label = self.new_label();
                let update_label = self.new_label();
                let end = self.new_label();
                self.loop_stack.push(LoopContext {
                    continue_label: update_label.clone(),
                    break_label: end.clone(),
                });
                self.emit(
                    Opcode::Goto,
                    None,
                    None,
                    Some(Operand::Label(check.clone())),
                    *span,
                );
                self.emit(
                    Opcode::Label,
                    None,
                    None,
                    Some(Operand::Label(body_label.clone())),
                    *span,
                );
                self.lower_block(body);
                self.emit(
                    Opcode::Label,
                    None,
                    None,
                    Some(Operand::Label(update_label)),
                    *span,
                );
                if let Some(update) = update {
                    self.lower_stmt(update);
                }
                // The condition check sits after the body: the update
                // runs, then the re-check, and a true condition jumps
                // back to the body.
                self.emit(Opcode::Label, None, None, Some(Operand::Label(check)), *span);
                let (_, cond) = self.lower_expr(condition);
                self.emit(
                    Opcode::IfTrue,
                    Some(cond),
                    None,
                    Some(Operand::Label(body_label)),
                    *span,
                );
                self.emit(Opcode::Label, None, None, Some(Operand::Label(end)), *span);
                self.loop_stack.pop();
                self.symbols.pop_scope();
            }
            Stmt::Match {
                scrutinee,
                cases,
                default,
                span,
            } => {
                let (_, scrut) = self.lower_expr(scrutinee);
                let end = self.new_label();
                let mut seen: Vec<&Constant> = Vec::new();
                for case in cases {
                    if seen.contains(&&case.value) {
                        self.error(LowerError::DuplicateCase {
                            value: case.value.to_string(),
                            line: case.span.line,
                        });
                        continue;
                    }
                    seen.push(&case.value);
                    let next = self.new_label();
                    let t = self.new_temp();
                    self.emit(
                        Opcode::Eq,
                        Some(scrut.clone()),
                        Some(Operand::Literal(case.value.clone())),
                        Some(Operand::Temp(t)),
                        case.span,
                    );
                    self.emit(
                        Opcode::IfFalse,
                        Some(Operand::Temp(t)),
                        None,
                        Some(Operand::Label(next.clone())),
                        case.span,
                    );
                    self.lower_block(&case.body);
                    self.emit(
                        Opcode::Goto,
                        None,
                        None,
                        Some(Operand::Label(end.clone())),
                        case.span,
                    );
                    self.emit(Opcode::Label, None, None, Some(Operand::Label(next)), case.span);
                }
                if let Some(body) = default {
                    self.lower_block(body);
                }
                self.emit(Opcode::Label, None, None, Some(Operand::Label(end)), *span);
            }
            Stmt::Break(span) => match self.loop_stack.last() {
                Some(ctx) => {
                    let label = ctx.break_label.clone();
                    self.emit(Opcode::Goto, None, None, Some(Operand::Label(label)), *span);
                }
                None => self.error(LowerError::OutsideLoop {
                    keyword: "exit",
                    line: span.line,
                }),
            },
            Stmt::Continue(span) => match self.loop_stack.last() {
                Some(ctx) => {
                    let label = ctx.continue_label.clone();
                    self.emit(Opcode::Goto, None, None, Some(Operand::Label(label)), *span);
                }
                None => self.error(LowerError::OutsideLoop {
                    keyword: "next",
                    line: span.line,
                }),
            },
            Stmt::FuncDef {
                name,
                params,
                body,
                span,
            } => self.lower_func_def(name, params, body, *span),
            Stmt::Throw { value, span } => {
                if self.function_depth == 0 {
                    self.error(LowerError::ThrowOutsideFunction { line: span.line });
                }
                let operand = match value {
                    Some(expr) => self.lower_expr(expr).1,
                    None => Operand::Literal(Constant::Empty),
                };
                self.emit(Opcode::Return, Some(operand), None, None, *span);
            }
            Stmt::Expr { value, span: _ } => {
                self.lower_expr(value);
            }
        }
    }

    fn lower_declarator(&mut self, fixed: bool, decl: &ast::Declarator, span: Span) {
        let (ty, operand) = match &decl.init {
            // A `get(prompt)` initializer becomes INPUT into a temp,
            // then ASSIGN into the variable; input is always text.
            Some(Expr::Get(prompt, get_span)) => {
                let t = self.lower_get(prompt.as_deref(), *get_span);
                (Type::Text, Operand::Temp(t))
            }
            Some(expr) => self.lower_expr(expr),
            None => (Type::Empty, Operand::Literal(Constant::Empty)),
        };
        match self.symbols.define_variable(&decl.name, fixed, Some(ty)).err() {
            None => {
                self.emit(
                    Opcode::Assign,
                    Some(operand),
                    None,
                    Some(Operand::Var(decl.name.clone())),
                    span,
                );
            }
            Some(ScopeError::ShadowsFunction(name)) => self.error(LowerError::NameClash {
                name,
                line: decl.span.line,
            }),
            Some(_) => self.error(LowerError::Redeclared {
                name: decl.name.clone(),
                line: decl.span.line,
            }),
        }
    }

    fn lower_assign(&mut self, target: &AssignTarget, op: AssignOp, value: &Expr, span: Span) {
        match target {
            AssignTarget::Var(name) => {
                if self.symbols.lookup_function(name).is_some() {
                    self.error(LowerError::FunctionAsValue {
                        name: name.clone(),
                        line: span.line,
                    });
                    return;
                }
                let Some(symbol) = self.symbols.lookup_variable(name) else {
                    self.error(LowerError::Undefined {
                        name: name.clone(),
                        line: span.line,
                    });
                    return;
                };
                let (fixed, symbol_ty) = (symbol.fixed, symbol.ty);
                if fixed {
                    self.error(LowerError::FixedReassignment {
                        name: name.clone(),
                        line: span.line,
                    });
                    return;
                }
                let var_ty = symbol_ty.unwrap_or(Type::Unknown);
                let (value_ty, operand) = self.lower_expr(value);
                let result_ty = match op {
                    AssignOp::Set => {
                        self.emit(
                            Opcode::Assign,
                            Some(operand),
                            None,
                            Some(Operand::Var(name.clone())),
                            span,
                        );
                        value_ty
                    }
                    _ => {
                        // Read-modify-write through temps.
                        let snapshot = self.new_temp();
                        self.emit(
                            Opcode::Assign,
                            Some(Operand::Var(name.clone())),
                            None,
                            Some(Operand::Temp(snapshot)),
                            span,
                        );
                        let (ty, result) = self.emit_arith(
                            compound_binop(op),
                            var_ty,
                            value_ty,
                            Operand::Temp(snapshot),
                            operand,
                            span,
                        );
                        self.emit(
                            Opcode::Assign,
                            Some(result),
                            None,
                            Some(Operand::Var(name.clone())),
                            span,
                        );
                        ty
                    }
                };
                // Refine the inferred type on assignment.
                if let Some(symbol) = self.symbols.lookup_variable_mut(name) {
                    symbol.ty = Some(result_ty);
                }
            }
            AssignTarget::Index(name, index, kind) => {
                if self.symbols.lookup_variable(name).is_none() {
                    self.error(LowerError::Undefined {
                        name: name.clone(),
                        line: span.line,
                    });
                    return;
                }
                let (_, index_op) = self.lower_expr(index);
                let (value_ty, value_op) = self.lower_expr(value);
                let (access, set) = match kind {
                    IndexKind::List => (Opcode::ListAccess, Opcode::ListSet),
                    IndexKind::Group => (Opcode::GroupAccess, Opcode::GroupSet),
                };
                let final_value = match op {
                    AssignOp::Set => value_op,
                    _ => {
                        let current = self.new_temp();
                        self.emit(
                            access,
                            Some(Operand::Var(name.clone())),
                            Some(index_op.clone()),
                            Some(Operand::Temp(current)),
                            span,
                        );
                        let (_, result) = self.emit_arith(
                            compound_binop(op),
                            Type::Unknown,
                            value_ty,
                            Operand::Temp(current),
                            value_op,
                            span,
                        );
                        result
                    }
                };
                self.emit(
                    set,
                    Some(Operand::Var(name.clone())),
                    Some(index_op),
                    Some(final_value),
                    span,
                );
            }
        }
    }

    fn lower_func_def(&mut self, name: &str, params: &[String], body: &[Stmt], span: Span) {
        match self.symbols.define_function(name, params.to_vec()).err() {
            None => {}
            Some(ScopeError::Redefined(name)) => {
                self.error(LowerError::Redefined {
                    name,
                    line: span.line,
                });
                return;
            }
            Some(_) => {
                self.error(LowerError::NameClash {
                    name: name.to_string(),
                    line: span.line,
                });
                return;
            }
        }
        let entry = self.new_label();
        let skip = self.new_label();
        self.functions.insert(
            name.to_string(),
            FunctionInfo {
                entry: entry.clone(),
                params: params.to_vec(),
            },
        );
        // Jump over the body so definitions are not executed in line.
        self.emit(
            Opcode::Goto,
            None,
            None,
            Some(Operand::Label(skip.clone())),
            span,
        );
        self.emit(
            Opcode::Function,
            Some(Operand::Literal(Constant::Text(name.to_string()))),
            None,
            Some(Operand::Label(entry.clone())),
            span,
        );
        self.emit(Opcode::Label, None, None, Some(Operand::Label(entry)), span);
        self.symbols.push_scope();
        self.function_depth += 1;
        for param in params {
            // Parameters are pre-bound by name at CALL time.
            if self.symbols.define_variable(param, false, None).is_err() {
                self.error(LowerError::Redeclared {
                    name: param.clone(),
                    line: span.line,
                });
            }
        }
        for stmt in body {
            self.lower_stmt(stmt);
        }
        // Implicit return for bodies that fall off the end.
        self.emit(
            Opcode::Return,
            Some(Operand::Literal(Constant::Empty)),
            None,
            None,
            span,
        );
        self.emit(
            Opcode::EndFunction,
            Some(Operand::Literal(Constant::Text(name.to_string()))),
            None,
            None,
            span,
        );
        self.function_depth -= 1;
        self.symbols.pop_scope();
        self.emit(Opcode::Label, None, None, Some(Operand::Label(skip)), span);
    }

    // ── Expressions ─────────────────────────────────────────────────

    /// Lower an expression, returning its static type and the operand
    /// holding its value. Literals return immediates and emit nothing.
    fn lower_expr(&mut self, expr: &Expr) -> (Type, Operand) {
        match expr {
            Expr::Literal(c, _) => (c.static_type(), Operand::Literal(c.clone())),
            Expr::Ident(name, span) => {
                if let Some(symbol) = self.symbols.lookup_variable(name) {
                    (symbol.ty.unwrap_or(Type::Unknown), Operand::Var(name.clone()))
                } else if self.symbols.lookup_function(name).is_some() {
                    self.error(LowerError::FunctionAsValue {
                        name: name.clone(),
                        line: span.line,
                    });
                    (Type::Unknown, Operand::Literal(Constant::Empty))
                } else {
                    self.error(LowerError::Undefined {
                        name: name.clone(),
                        line: span.line,
                    });
                    (Type::Unknown, Operand::Literal(Constant::Empty))
                }
            }
            Expr::Unary(UnaryOp::Not, operand, span) => {
                let (_, op) = self.lower_expr(operand);
                let t = self.new_temp();
                self.emit(Opcode::Not, Some(op), None, Some(Operand::Temp(t)), *span);
                (Type::State, Operand::Temp(t))
            }
            Expr::Unary(UnaryOp::Neg, operand, span) => {
                let (ty, op) = self.lower_expr(operand);
                if matches!(ty, Type::Text | Type::List | Type::Group) {
                    self.error(LowerError::InvalidOperands {
                        op: "~".into(),
                        lhs: ty,
                        rhs: Type::Empty,
                        line: span.line,
                    });
                    return self.emit_error_value("cannot negate non-numeric value", *span);
                }
                let result_ty = if ty == Type::Point { Type::Point } else { Type::Integer };
                let t = self.new_temp();
                self.emit(Opcode::Neg, Some(op), None, Some(Operand::Temp(t)), *span);
                (result_ty, Operand::Temp(t))
            }
            Expr::Binary(lhs, op, rhs, span) => self.lower_binary(lhs, *op, rhs, *span),
            Expr::Call(name, args, span) => self.lower_call(name, args, *span),
            Expr::Get(prompt, span) => {
                let t = self.lower_get(prompt.as_deref(), *span);
                (Type::Text, Operand::Temp(t))
            }
            Expr::ListLit(items, span) => {
                let t = self.new_temp();
                // An empty literal still yields an empty list, never a
                // missing one.
                self.emit(Opcode::ListCreate, None, None, Some(Operand::Temp(t)), *span);
                for item in items {
                    let (_, op) = self.lower_expr(item);
                    self.emit(
                        Opcode::ListAppend,
                        Some(Operand::Temp(t)),
                        Some(op),
                        None,
                        *span,
                    );
                }
                (Type::List, Operand::Temp(t))
            }
            Expr::GroupLit(pairs, span) => {
                let t = self.new_temp();
                self.emit(Opcode::GroupCreate, None, None, Some(Operand::Temp(t)), *span);
                let mut seen: Vec<&Constant> = Vec::new();
                for (key, value) in pairs {
                    if let Expr::Literal(c, key_span) = key {
                        if seen.contains(&c) {
                            self.error(LowerError::DuplicateKey {
                                value: c.to_string(),
                                line: key_span.line,
                            });
                            continue;
                        }
                        seen.push(c);
                    }
                    let (_, key_op) = self.lower_expr(key);
                    let (_, value_op) = self.lower_expr(value);
                    self.emit(
                        Opcode::GroupSet,
                        Some(Operand::Temp(t)),
                        Some(key_op),
                        Some(value_op),
                        *span,
                    );
                }
                (Type::Group, Operand::Temp(t))
            }
            Expr::Index(name, index, kind, span) => {
                if self.symbols.lookup_variable(name).is_none() {
                    self.error(LowerError::Undefined {
                        name: name.clone(),
                        line: span.line,
                    });
                }
                let (_, index_op) = self.lower_expr(index);
                let opcode = match kind {
                    IndexKind::List => Opcode::ListAccess,
                    IndexKind::Group => Opcode::GroupAccess,
                };
                let t = self.new_temp();
                self.emit(
                    opcode,
                    Some(Operand::Var(name.clone())),
                    Some(index_op),
                    Some(Operand::Temp(t)),
                    *span,
                );
                (Type::Unknown, Operand::Temp(t))
            }
            Expr::Cast(kind, operand, span) => {
                let (_, op) = self.lower_expr(operand);
                let result_ty = kind.result_type();
                let t = self.new_temp();
                self.emit(
                    Opcode::TypeCast,
                    Some(op),
                    Some(Operand::Literal(Constant::Text(kind.as_str().to_string()))),
                    Some(Operand::Temp(t)),
                    *span,
                );
                (result_ty, Operand::Temp(t))
            }
            Expr::PostInc(name, span) => self.lower_step_expr(name, Opcode::Add, *span),
            Expr::PostDec(name, span) => self.lower_step_expr(name, Opcode::Sub, *span),
        }
    }

    /// Post-increment/decrement: snapshot the old value, step the
    /// variable in place, yield the snapshot.
    fn lower_step_expr(&mut self, name: &str, op: Opcode, span: Span) -> (Type, Operand) {
        let Some(symbol) = self.symbols.lookup_variable(name) else {
            self.error(LowerError::Undefined {
                name: name.to_string(),
                line: span.line,
            });
            return (Type::Unknown, Operand::Literal(Constant::Empty));
        };
        let (fixed, symbol_ty) = (symbol.fixed, symbol.ty);
        if fixed {
            self.error(LowerError::FixedReassignment {
                name: name.to_string(),
                line: span.line,
            });
            return (Type::Unknown, Operand::Literal(Constant::Empty));
        }
        let ty = symbol_ty.unwrap_or(Type::Unknown);
        let t = self.new_temp();
        self.emit(
            Opcode::Assign,
            Some(Operand::Var(name.to_string())),
            None,
            Some(Operand::Temp(t)),
            span,
        );
        self.emit(
            op,
            Some(Operand::Var(name.to_string())),
            Some(Operand::Literal(Constant::Int(1))),
            Some(Operand::Var(name.to_string())),
            span,
        );
        (ty, Operand::Temp(t))
    }

    fn lower_get(&mut self, prompt: Option<&Expr>, span: Span) -> u32 {
        let prompt_op = match prompt {
            Some(expr) => self.lower_expr(expr).1,
            None => Operand::Literal(Constant::Text(String::new())),
        };
        let t = self.new_temp();
        self.emit(
            Opcode::Input,
            Some(prompt_op),
            None,
            Some(Operand::Temp(t)),
            span,
        );
        t
    }

    fn lower_binary(&mut self, lhs: &Expr, op: BinOp, rhs: &Expr, span: Span) -> (Type, Operand) {
        match op {
            // Short-circuit: the right operand, and any of its side
            // effects, must not execute when the left decides.
            BinOp::And | BinOp::Or => {
                let (_, left) = self.lower_expr(lhs);
                let result = self.new_temp();
                self.emit(
                    Opcode::Assign,
                    Some(left),
                    None,
                    Some(Operand::Temp(result)),
                    span,
                );
                let end = self.new_label();
                let branch = if op == BinOp::Or {
                    Opcode::IfTrue
                } else {
                    Opcode::IfFalse
                };
                self.emit(
                    branch,
                    Some(Operand::Temp(result)),
                    None,
                    Some(Operand::Label(end.clone())),
                    span,
                );
                let (_, right) = self.lower_expr(rhs);
                self.emit(
                    Opcode::Assign,
                    Some(right),
                    None,
                    Some(Operand::Temp(result)),
                    span,
                );
                self.emit(Opcode::Label, None, None, Some(Operand::Label(end)), span);
                (Type::State, Operand::Temp(result))
            }
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let (_, left) = self.lower_expr(lhs);
                let (_, right) = self.lower_expr(rhs);
                let opcode = match op {
                    BinOp::Eq => Opcode::Eq,
                    BinOp::Neq => Opcode::Neq,
                    BinOp::Lt => Opcode::Lt,
                    BinOp::Le => Opcode::Le,
                    BinOp::Gt => Opcode::Gt,
                    _ => Opcode::Ge,
                };
                let t = self.new_temp();
                self.emit(opcode, Some(left), Some(right), Some(Operand::Temp(t)), span);
                (Type::State, Operand::Temp(t))
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let (lt, left) = self.lower_expr(lhs);
                let (rt, right) = self.lower_expr(rhs);
                self.emit_arith(op, lt, rt, left, right, span)
            }
        }
    }

    /// Classify operand types, pick the opcode family, and emit one
    /// arithmetic instruction into a fresh temp.
    fn emit_arith(
        &mut self,
        op: BinOp,
        lt: Type,
        rt: Type,
        left: Operand,
        right: Operand,
        span: Span,
    ) -> (Type, Operand) {
        let has = |ty: Type| lt == ty || rt == ty;
        let numeric_result = || {
            if has(Type::Point) {
                Type::Point
            } else if lt == Type::Unknown || rt == Type::Unknown {
                Type::Unknown
            } else {
                Type::Integer
            }
        };
        let (opcode, result_ty) = match op {
            BinOp::Add => {
                if has(Type::List) {
                    if lt == Type::List && rt == Type::List
                        || lt == Type::Unknown
                        || rt == Type::Unknown
                    {
                        (Opcode::ListConcat, Type::List)
                    } else {
                        return self.arith_type_error(op, lt, rt, span);
                    }
                } else if has(Type::Text) {
                    if lt == Type::Text && rt == Type::Text
                        || lt == Type::Unknown
                        || rt == Type::Unknown
                    {
                        (Opcode::Concat, Type::Text)
                    } else {
                        return self.arith_type_error(op, lt, rt, span);
                    }
                } else {
                    (Opcode::Add, numeric_result())
                }
            }
            BinOp::Sub | BinOp::Mul | BinOp::Mod => {
                if has(Type::Text) || has(Type::List) || has(Type::Group) {
                    return self.arith_type_error(op, lt, rt, span);
                }
                let opcode = match op {
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    _ => Opcode::Mod,
                };
                (opcode, numeric_result())
            }
            BinOp::Div => {
                if has(Type::Text) || has(Type::List) || has(Type::Group) {
                    return self.arith_type_error(op, lt, rt, span);
                }
                // Division always yields a point.
                (Opcode::Div, Type::Point)
            }
            _ => unreachable!("logical and comparison ops are lowered elsewhere"),
        };
        let t = self.new_temp();
        self.emit(opcode, Some(left), Some(right), Some(Operand::Temp(t)), span);
        (result_ty, Operand::Temp(t))
    }

    fn arith_type_error(&mut self, op: BinOp, lt: Type, rt: Type, span: Span) -> (Type, Operand) {
        self.error(LowerError::InvalidOperands {
            op: op.to_string(),
            lhs: lt,
            rhs: rt,
            line: span.line,
        });
        self.emit_error_value(&format!("cannot use {} with {} and {}", op, lt, rt), span)
    }

    /// Plant an ERROR pseudo-instruction so the stream stays well-formed
    /// and the VM fails gracefully if it is ever reached.
    fn emit_error_value(&mut self, message: &str, span: Span) -> (Type, Operand) {
        let t = self.new_temp();
        self.emit(
            Opcode::Error,
            Some(Operand::Literal(Constant::Text(message.to_string()))),
            None,
            Some(Operand::Temp(t)),
            span,
        );
        (Type::Unknown, Operand::Temp(t))
    }

    fn lower_call(&mut self, name: &str, args: &[Expr], span: Span) -> (Type, Operand) {
        // `get` reaches here when the parser emits it as an ordinary
        // call node.
        if name == "get" {
            let t = self.lower_get(args.first(), span);
            return (Type::Text, Operand::Temp(t));
        }
        if let Some(sig) = builtin_signature(name) {
            if !sig.arity.accepts(args.len()) {
                self.error(LowerError::ArityMismatch {
                    name: name.to_string(),
                    expected: sig.arity.to_string(),
                    got: args.len(),
                    line: span.line,
                });
                return (sig.returns, Operand::Literal(Constant::Empty));
            }
            let result = self.emit_call(name, args, span);
            return (sig.returns, result);
        }
        let Some(symbol) = self.symbols.lookup_function(name) else {
            self.error(LowerError::Undefined {
                name: name.to_string(),
                line: span.line,
            });
            return (Type::Unknown, Operand::Literal(Constant::Empty));
        };
        let expected = symbol.params.len();
        if args.len() != expected {
            self.error(LowerError::ArityMismatch {
                name: name.to_string(),
                expected: expected.to_string(),
                got: args.len(),
                line: span.line,
            });
            return (Type::Unknown, Operand::Literal(Constant::Empty));
        }
        (Type::Unknown, self.emit_call(name, args, span))
    }

    /// Arguments are emitted as PARAM(value, index) left-to-right,
    /// immediately before the CALL.
    fn emit_call(&mut self, name: &str, args: &[Expr], span: Span) -> Operand {
        let operands: Vec<Operand> = args.iter().map(|a| self.lower_expr(a).1).collect();
        let argc = operands.len();
        for (i, operand) in operands.into_iter().enumerate() {
            self.emit(
                Opcode::Param,
                Some(operand),
                None,
                Some(Operand::Literal(Constant::Int(i as i64))),
                span,
            );
        }
        let t = self.new_temp();
        self.emit(
            Opcode::Call,
            Some(Operand::Literal(Constant::Text(name.to_string()))),
            Some(Operand::Literal(Constant::Int(argc as i64))),
            Some(Operand::Temp(t)),
            span,
        );
        Operand::Temp(t)
    }
}

fn compound_binop(op: AssignOp) -> BinOp {
    match op {
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Set => unreachable!("plain assignment is not a compound op"),
    }
}
