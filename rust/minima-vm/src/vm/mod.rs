//! TAC dispatch loop: a flat-array state machine with call frames,
//! suspendable input, and dynamic re-validation of runtime types.
//!
//! `ip` is the only continuation needed between steps beyond the call
//! stack and the suspension record. Opcodes that set `ip` themselves
//! (GOTO, IF_TRUE, IF_FALSE, CALL, RETURN) advance it; everything else
//! falls through to `ip += 1`. The loop terminates when `ip` leaves the
//! instruction range, when the step counter reaches the configured
//! limit (a policy signal, not an error), or when an INPUT instruction
//! suspends the run.
//!
//! The whole mutable state is serializable, so a suspended VM can be
//! parked in external storage and restored later; between a suspend and
//! its matching resume exactly one owner may hold the captured state.

pub mod builtins;
mod ops;

use crate::values::{unescape, validate_int, validate_point, Value};
use minima_compiler::compiler::tac::{
    Constant, Instruction, Opcode, Operand, Program,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Default step budget for a run; `None` disables the limit.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000;

pub type DebugCallback = Option<Box<dyn FnMut(&DebugEvent)>>;

/// Events emitted during execution for step-through debugging.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    Step { ip: usize, opcode: String },
    CallEnter { name: String },
    CallExit { name: String },
    Suspend { prompt: String },
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("{0}")]
    Range(String),
    #[error("unresolved label '{0}'")]
    UnresolvedLabel(String),
    #[error("undefined function '{0}'")]
    UndefinedFunction(String),
    #[error("cannot index into a value of type {0}")]
    NotAContainer(&'static str),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("no pending input to resume")]
    NotSuspended,
    #[error("stale resume token {0:?}")]
    StaleToken(ResumeToken),
    #[error("invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },
}

/// Opaque handle pairing a `resume` call with its pending suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken(u64);

/// How a run (or resumed segment) ended, short of a runtime error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Complete {
        output: String,
    },
    Suspended {
        prompt: String,
        token: ResumeToken,
    },
    /// The step budget ran out. The host decides whether this counts as
    /// success, partial success, or failure.
    LimitReached {
        output: String,
        steps: u64,
    },
}

/// Per-frame variable and temporary storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    vars: HashMap<String, Value>,
    temps: HashMap<u32, Value>,
}

/// Call-stack record: where to return, the caller's memory, and the
/// operand receiving the return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Frame {
    return_ip: usize,
    saved: Memory,
    target: Option<Operand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Suspension {
    prompt: String,
    dest: Operand,
    /// Type tag from a TYPECAST immediately following the INPUT, used
    /// to parse the resumed text.
    expected: Option<String>,
    token: ResumeToken,
}

/// The Minima virtual machine. One instance per run; instances share
/// nothing.
#[derive(Serialize, Deserialize)]
pub struct Vm {
    program: Program,
    labels: HashMap<String, usize>,
    ip: usize,
    memory: Memory,
    frames: Vec<Frame>,
    /// (index, value) pairs buffered by PARAM for the next CALL.
    params: Vec<(usize, Value)>,
    /// Accumulated PRINT output; preserved across suspensions and kept
    /// readable after a runtime error.
    pub output: String,
    steps: u64,
    step_limit: Option<u64>,
    suspension: Option<Suspension>,
    next_token: u64,
    #[serde(skip)]
    debug: DebugCallback,
}

impl Vm {
    /// Load a program: the label map is compiled once, before execution
    /// begins.
    pub fn new(program: Program) -> Self {
        let labels = program.label_index();
        Self {
            program,
            labels,
            ip: 0,
            memory: Memory::default(),
            frames: Vec::new(),
            params: Vec::new(),
            output: String::new(),
            steps: 0,
            step_limit: Some(DEFAULT_STEP_LIMIT),
            suspension: None,
            next_token: 0,
            debug: None,
        }
    }

    pub fn set_step_limit(&mut self, limit: Option<u64>) {
        self.step_limit = limit;
    }

    pub fn set_debug_callback(&mut self, callback: Box<dyn FnMut(&DebugEvent)>) {
        self.debug = Some(callback);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    /// Execute from the top. Static state from any previous run is
    /// discarded; the output accumulator starts empty.
    pub fn run(&mut self) -> Result<Outcome, VmError> {
        self.ip = 0;
        self.steps = 0;
        self.output.clear();
        self.memory = Memory::default();
        self.frames.clear();
        self.params.clear();
        self.suspension = None;
        self.execute_loop()
    }

    /// Resume a suspended run with the raw input text. Requires a prior
    /// pending INPUT; the token must match the pending suspension.
    pub fn resume(&mut self, token: ResumeToken, input: &str) -> Result<Outcome, VmError> {
        let suspension = self.suspension.take().ok_or(VmError::NotSuspended)?;
        if suspension.token != token {
            self.suspension = Some(suspension);
            return Err(VmError::StaleToken(token));
        }
        match parse_input(input, suspension.expected.as_deref()) {
            Ok(value) => {
                self.write(&suspension.dest, value);
                // INPUT does not self-advance; the resumed run continues
                // at the following instruction.
                self.ip += 1;
                self.execute_loop()
            }
            Err(err) => {
                // The suspension stays pending so the host can retry.
                self.suspension = Some(suspension);
                Err(err)
            }
        }
    }

    fn execute_loop(&mut self) -> Result<Outcome, VmError> {
        while self.ip < self.program.instructions.len() {
            if let Some(limit) = self.step_limit {
                if self.steps >= limit {
                    return Ok(Outcome::LimitReached {
                        output: self.output.clone(),
                        steps: self.steps,
                    });
                }
            }
            let instruction = self.program.instructions[self.ip].clone();
            self.debug_event(|ip| DebugEvent::Step {
                ip,
                opcode: instruction.op.to_string(),
            });
            let prev_ip = self.ip;
            self.execute(&instruction)?;
            self.steps += 1;
            if self.suspension.is_some() {
                let (prompt, token) = {
                    let s = self.suspension.as_ref().expect("suspension checked above");
                    (s.prompt.clone(), s.token)
                };
                self.debug_event(|_| DebugEvent::Suspend {
                    prompt: prompt.clone(),
                });
                return Ok(Outcome::Suspended { prompt, token });
            }
            if self.ip == prev_ip {
                self.ip += 1;
            }
        }
        Ok(Outcome::Complete {
            output: self.output.clone(),
        })
    }

    fn debug_event(&mut self, make: impl Fn(usize) -> DebugEvent) {
        if let Some(callback) = &mut self.debug {
            let event = make(self.ip);
            callback(&event);
        }
    }

    // ── Operand resolution ──────────────────────────────────────────

    fn resolve(&self, operand: &Operand) -> Result<Value, VmError> {
        match operand {
            Operand::Literal(c) => Ok(Value::from(c)),
            Operand::Temp(id) => Ok(self.memory.temps.get(id).cloned().unwrap_or(Value::Empty)),
            Operand::Var(name) => Ok(self.lookup_var(name).cloned().unwrap_or(Value::Empty)),
            Operand::Label(name) => Err(VmError::Runtime(format!(
                "label '{}' used as a value",
                name
            ))),
        }
    }

    /// Reads see the active frame first, then enclosing frames down to
    /// the globals; scalar writes always land in the active frame.
    fn lookup_var(&self, name: &str) -> Option<&Value> {
        self.memory.vars.get(name).or_else(|| {
            self.frames
                .iter()
                .rev()
                .find_map(|frame| frame.saved.vars.get(name))
        })
    }

    fn write(&mut self, dest: &Operand, value: Value) {
        match dest {
            Operand::Var(name) => {
                self.memory.vars.insert(name.clone(), value);
            }
            Operand::Temp(id) => {
                self.memory.temps.insert(*id, value);
            }
            _ => {}
        }
    }

    fn has_slot(&self, operand: &Operand) -> bool {
        match operand {
            Operand::Temp(id) => self.memory.temps.contains_key(id),
            Operand::Var(name) => self.lookup_var(name).is_some(),
            _ => false,
        }
    }

    /// In-place access for container mutation; walks the frame chain
    /// the same way reads do.
    fn slot_mut(&mut self, operand: &Operand) -> Option<&mut Value> {
        match operand {
            Operand::Temp(id) => self.memory.temps.get_mut(id),
            Operand::Var(name) => {
                if self.memory.vars.contains_key(name) {
                    self.memory.vars.get_mut(name)
                } else {
                    self.frames
                        .iter_mut()
                        .rev()
                        .find_map(|frame| frame.saved.vars.get_mut(name))
                }
            }
            _ => None,
        }
    }

    fn jump(&mut self, dest: &Option<Operand>) -> Result<(), VmError> {
        let Some(Operand::Label(name)) = dest else {
            return Err(VmError::Runtime("jump without a label".to_string()));
        };
        match self.labels.get(name) {
            Some(index) => {
                self.ip = *index;
                Ok(())
            }
            None => Err(VmError::UnresolvedLabel(name.clone())),
        }
    }

    fn operand_a<'i>(&self, instr: &'i Instruction) -> Result<&'i Operand, VmError> {
        instr
            .a
            .as_ref()
            .ok_or_else(|| VmError::Runtime(format!("{} missing operand", instr.op)))
    }

    fn operand_b<'i>(&self, instr: &'i Instruction) -> Result<&'i Operand, VmError> {
        instr
            .b
            .as_ref()
            .ok_or_else(|| VmError::Runtime(format!("{} missing operand", instr.op)))
    }

    fn operand_dest<'i>(&self, instr: &'i Instruction) -> Result<&'i Operand, VmError> {
        instr
            .dest
            .as_ref()
            .ok_or_else(|| VmError::Runtime(format!("{} missing destination", instr.op)))
    }

    // ── Dispatch ────────────────────────────────────────────────────

    fn execute(&mut self, instr: &Instruction) -> Result<(), VmError> {
        match instr.op {
            Opcode::Assign => {
                let value = self.resolve(self.operand_a(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, value);
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                let lhs = self.resolve(self.operand_a(instr)?)?;
                let rhs = self.resolve(self.operand_b(instr)?)?;
                let result = ops::arith(instr.op, &lhs, &rhs)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, result);
            }
            Opcode::Neg => {
                let value = self.resolve(self.operand_a(instr)?)?;
                let result = ops::negate(&value)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, result);
            }
            Opcode::Not => {
                let value = self.resolve(self.operand_a(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, Value::State(!value.is_truthy()));
            }
            Opcode::Concat => {
                let lhs = self.resolve(self.operand_a(instr)?)?;
                let rhs = self.resolve(self.operand_b(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(
                    &dest,
                    Value::Text(format!("{}{}", lhs.concat_text(), rhs.concat_text())),
                );
            }
            Opcode::ListConcat => {
                let lhs = self.resolve(self.operand_a(instr)?)?;
                let rhs = self.resolve(self.operand_b(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, ops::list_concat(lhs, rhs));
            }
            Opcode::Eq => {
                let lhs = self.resolve(self.operand_a(instr)?)?;
                let rhs = self.resolve(self.operand_b(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, Value::State(lhs == rhs));
            }
            Opcode::Neq => {
                let lhs = self.resolve(self.operand_a(instr)?)?;
                let rhs = self.resolve(self.operand_b(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, Value::State(lhs != rhs));
            }
            Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let lhs = self.resolve(self.operand_a(instr)?)?;
                let rhs = self.resolve(self.operand_b(instr)?)?;
                let result = ops::compare(instr.op, &lhs, &rhs)?;
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, result);
            }
            // Markers carry no runtime action.
            Opcode::Label | Opcode::Function | Opcode::EndFunction => {}
            Opcode::Goto => self.jump(&instr.dest)?,
            Opcode::IfTrue => {
                let cond = self.resolve(self.operand_a(instr)?)?;
                if cond.is_truthy() {
                    self.jump(&instr.dest)?;
                }
            }
            Opcode::IfFalse => {
                let cond = self.resolve(self.operand_a(instr)?)?;
                if !cond.is_truthy() {
                    self.jump(&instr.dest)?;
                }
            }
            Opcode::Param => {
                let value = self.resolve(self.operand_a(instr)?)?;
                let index = match self.operand_dest(instr)? {
                    Operand::Literal(Constant::Int(i)) => *i as usize,
                    _ => self.params.len(),
                };
                self.params.push((index, value));
            }
            Opcode::Call => self.call(instr)?,
            Opcode::Return => self.ret(instr)?,
            Opcode::Input => {
                let prompt = self.resolve(self.operand_a(instr)?)?.concat_text();
                let dest = self.operand_dest(instr)?.clone();
                let expected = self.input_type_hint(&dest);
                let token = ResumeToken(self.next_token);
                self.next_token += 1;
                self.suspension = Some(Suspension {
                    prompt,
                    dest,
                    expected,
                    token,
                });
            }
            Opcode::Print => {
                let value = self.resolve(self.operand_a(instr)?)?;
                self.output.push_str(&value.render());
            }
            Opcode::TypeCast => {
                let value = self.resolve(self.operand_a(instr)?)?;
                let tag = match self.operand_b(instr)? {
                    Operand::Literal(Constant::Text(tag)) => tag.clone(),
                    other => {
                        return Err(VmError::Runtime(format!(
                            "invalid typecast target {}",
                            other
                        )))
                    }
                };
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, cast(value, &tag));
            }
            Opcode::ListCreate => {
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, Value::List(Vec::new()));
            }
            Opcode::ListAppend => {
                let item = self.resolve(self.operand_b(instr)?)?;
                let target = self.operand_a(instr)?.clone();
                // A missing or non-list target becomes a fresh list.
                if !self.has_slot(&target) {
                    self.write(&target, Value::List(Vec::new()));
                }
                match self.slot_mut(&target) {
                    Some(Value::List(items)) => items.push(item),
                    Some(other) => *other = Value::List(vec![item]),
                    None => {}
                }
            }
            Opcode::ListAccess => {
                let container = self.resolve(self.operand_a(instr)?)?;
                let index = self.resolve(self.operand_b(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                let result = ops::list_access(&container, &index)?;
                self.write(&dest, result);
            }
            Opcode::ListSet => self.list_set(instr)?,
            Opcode::GroupCreate => {
                let dest = self.operand_dest(instr)?.clone();
                self.write(&dest, Value::Group(Vec::new()));
            }
            Opcode::GroupAccess => {
                let container = self.resolve(self.operand_a(instr)?)?;
                let key = self.resolve(self.operand_b(instr)?)?;
                let dest = self.operand_dest(instr)?.clone();
                let result = match &container {
                    Value::Group(pairs) => pairs
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.clone())
                        // A missing key reads as Empty, like an
                        // out-of-range list read.
                        .unwrap_or(Value::Empty),
                    other => return Err(VmError::NotAContainer(other.type_name())),
                };
                self.write(&dest, result);
            }
            Opcode::GroupSet => self.group_set(instr)?,
            Opcode::Error => {
                let message = self.resolve(self.operand_a(instr)?)?.concat_text();
                return Err(VmError::Runtime(message));
            }
        }
        Ok(())
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn call(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let name = match self.operand_a(instr)? {
            Operand::Literal(Constant::Text(name)) => name.clone(),
            other => return Err(VmError::Runtime(format!("invalid call target {}", other))),
        };
        let argc = match self.operand_b(instr)? {
            Operand::Literal(Constant::Int(n)) => *n as usize,
            _ => 0,
        };
        // Positional arguments from the PARAM buffer; the buffer is
        // consumed by the call.
        let take = argc.min(self.params.len());
        let mut args = vec![Value::Empty; take];
        for (index, value) in self.params.drain(..take) {
            if index < args.len() {
                args[index] = value;
            }
        }
        if let Some(builtin) = builtins::lookup(&name) {
            let result = builtin(&args)?;
            let dest = self.operand_dest(instr)?.clone();
            self.write(&dest, result);
            return Ok(());
        }
        let Some(info) = self.program.functions.get(&name) else {
            return Err(VmError::UndefinedFunction(name));
        };
        let entry = info.entry.clone();
        let param_names = info.params.clone();
        let Some(&entry_ip) = self.labels.get(&entry) else {
            return Err(VmError::UnresolvedLabel(entry));
        };
        let mut callee = Memory::default();
        for (i, param) in param_names.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Empty);
            callee.vars.insert(param.clone(), value);
        }
        self.frames.push(Frame {
            return_ip: self.ip + 1,
            saved: std::mem::replace(&mut self.memory, callee),
            target: instr.dest.clone(),
        });
        self.ip = entry_ip;
        self.debug_event(|_| DebugEvent::CallEnter { name: name.clone() });
        Ok(())
    }

    fn ret(&mut self, instr: &Instruction) -> Result<(), VmError> {
        // The return value resolves in the callee's memory, before the
        // caller's is restored.
        let value = match &instr.a {
            Some(operand) => self.resolve(operand)?,
            None => Value::Empty,
        };
        match self.frames.pop() {
            Some(frame) => {
                self.memory = frame.saved;
                if let Some(target) = &frame.target {
                    self.write(target, value);
                }
                self.ip = frame.return_ip;
                self.debug_event(|_| DebugEvent::CallExit {
                    name: String::new(),
                });
            }
            // RETURN with an empty call stack terminates the program.
            None => self.ip = self.program.instructions.len(),
        }
        Ok(())
    }

    // ── Container writes ────────────────────────────────────────────

    fn list_set(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let index = ops::to_index(&self.resolve(self.operand_b(instr)?)?)?;
        let value = self.resolve(self.operand_dest(instr)?)?;
        let target = self.operand_a(instr)?.clone();
        match self.slot_mut(&target) {
            Some(Value::List(items)) => {
                let len = items.len() as i64;
                let actual = if index < 0 { len + index } else { index };
                if actual < 0 {
                    return Err(VmError::Runtime(format!(
                        "list index {} out of range for length {}",
                        index, len
                    )));
                }
                let actual = actual as usize;
                // Writes past the end pad with Empty up to the index.
                if actual >= items.len() {
                    items.resize(actual + 1, Value::Empty);
                }
                items[actual] = value;
                Ok(())
            }
            Some(other) => Err(VmError::NotAContainer(other.type_name())),
            None => Err(VmError::NotAContainer("empty")),
        }
    }

    fn group_set(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let key = self.resolve(self.operand_b(instr)?)?;
        let value = self.resolve(self.operand_dest(instr)?)?;
        let target = self.operand_a(instr)?.clone();
        // A missing or non-group target becomes a fresh group.
        if !self.has_slot(&target) {
            self.write(&target, Value::Group(Vec::new()));
        }
        match self.slot_mut(&target) {
            Some(Value::Group(pairs)) => {
                match pairs.iter_mut().find(|(k, _)| *k == key) {
                    Some(pair) => pair.1 = value,
                    None => pairs.push((key, value)),
                }
            }
            Some(other) => *other = Value::Group(vec![(key, value)]),
            None => {}
        }
        Ok(())
    }

    /// Peek at the instruction after an INPUT: a TYPECAST of the same
    /// destination announces the expected input type.
    fn input_type_hint(&self, dest: &Operand) -> Option<String> {
        let next = self.program.instructions.get(self.ip + 1)?;
        if next.op != Opcode::TypeCast || next.a.as_ref() != Some(dest) {
            return None;
        }
        match &next.b {
            Some(Operand::Literal(Constant::Text(tag))) => Some(tag.clone()),
            _ => None,
        }
    }
}

// ── Input parsing ───────────────────────────────────────────────────

/// Parse raw input text per the language's literal conventions: a
/// leading sign marker, integer vs. decimal by presence of a decimal
/// point, the nine-digit ceiling, and YES/NO states.
fn parse_input(input: &str, expected: Option<&str>) -> Result<Value, VmError> {
    let invalid = |reason: &str| VmError::InvalidInput {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let digits = input.strip_prefix('-').unwrap_or(input);
    let numeric_kind = classify_numeric(digits);
    match expected {
        Some("integer") => match numeric_kind {
            NumericKind::Int => parse_bounded_int(input).map_err(|e| invalid(&e)),
            _ => Err(invalid("expected an integer")),
        },
        Some("point") => match numeric_kind {
            NumericKind::Int | NumericKind::Point => {
                parse_bounded_point(input).map_err(|e| invalid(&e))
            }
            NumericKind::NotNumeric => Err(invalid("expected a point")),
        },
        Some("state") => match input.to_uppercase().as_str() {
            "YES" | "TRUE" | "1" => Ok(Value::State(true)),
            "NO" | "FALSE" | "0" => Ok(Value::State(false)),
            _ => Err(invalid("expected YES, NO, TRUE, FALSE, 1, or 0")),
        },
        Some(_) => Ok(Value::Text(input.to_string())),
        None => match numeric_kind {
            NumericKind::Int => parse_bounded_int(input).map_err(|e| invalid(&e)),
            NumericKind::Point => parse_bounded_point(input).map_err(|e| invalid(&e)),
            NumericKind::NotNumeric => match input.to_uppercase().as_str() {
                "YES" => Ok(Value::State(true)),
                "NO" => Ok(Value::State(false)),
                _ => Ok(Value::Text(input.to_string())),
            },
        },
    }
}

enum NumericKind {
    Int,
    Point,
    NotNumeric,
}

fn classify_numeric(digits: &str) -> NumericKind {
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return NumericKind::Int;
    }
    match digits.split_once('.') {
        Some((whole, frac))
            if !whole.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit()) =>
        {
            NumericKind::Point
        }
        _ => NumericKind::NotNumeric,
    }
}

fn parse_bounded_int(text: &str) -> Result<Value, String> {
    let n: i64 = text
        .parse()
        .map_err(|_| "not a representable integer".to_string())?;
    validate_int(n).map(Value::Int)
}

fn parse_bounded_point(text: &str) -> Result<Value, String> {
    let x: f64 = text
        .parse()
        .map_err(|_| "not a representable point".to_string())?;
    validate_point(x).map(Value::Point)
}

// ── Typecasts ───────────────────────────────────────────────────────

/// TYPECAST semantics: forgiving conversions with typed fallbacks, so a
/// cast never faults the run.
fn cast(value: Value, tag: &str) -> Value {
    match tag {
        "integer" => {
            let n = match &value {
                Value::Int(n) => Some(*n),
                Value::Point(x) => Some(*x as i64),
                Value::State(b) => Some(*b as i64),
                Value::Text(s) => s.trim().parse::<f64>().ok().map(|x| x as i64),
                _ => None,
            };
            match n.and_then(|n| validate_int(n).ok()) {
                Some(n) => Value::Int(n),
                None => Value::Int(0),
            }
        }
        "point" => {
            let x = match &value {
                Value::Int(n) => Some(*n as f64),
                Value::Point(x) => Some(*x),
                Value::State(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::Text(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match x.and_then(|x| validate_point(x).ok()) {
                Some(x) => Value::Point(x),
                None => Value::Point(0.0),
            }
        }
        "text" => Value::Text(match &value {
            Value::Text(s) => unescape(s),
            other => other.render(),
        }),
        "state" => Value::State(match &value {
            Value::Text(s) => {
                !matches!(s.to_uppercase().as_str(), "" | "0" | "NO" | "FALSE" | "EMPTY")
            }
            other => other.is_truthy(),
        }),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_literal_conventions() {
        assert_eq!(parse_input("7", None).unwrap(), Value::Int(7));
        assert_eq!(parse_input("-3", None).unwrap(), Value::Int(-3));
        assert_eq!(parse_input("2.5", None).unwrap(), Value::Point(2.5));
        assert_eq!(parse_input("YES", None).unwrap(), Value::State(true));
        assert_eq!(
            parse_input("hello", None).unwrap(),
            Value::Text("hello".into())
        );
    }

    #[test]
    fn test_parse_input_digit_ceiling() {
        assert!(parse_input("1000000000", None).is_err());
        assert_eq!(
            parse_input("999999999", None).unwrap(),
            Value::Int(999_999_999)
        );
    }

    #[test]
    fn test_parse_input_expected_type() {
        assert!(parse_input("2.5", Some("integer")).is_err());
        assert_eq!(
            parse_input("2.5", Some("point")).unwrap(),
            Value::Point(2.5)
        );
        assert_eq!(
            parse_input("7", Some("point")).unwrap(),
            Value::Point(7.0)
        );
        assert_eq!(
            parse_input("0", Some("state")).unwrap(),
            Value::State(false)
        );
        assert_eq!(
            parse_input("7", Some("text")).unwrap(),
            Value::Text("7".into())
        );
    }

    #[test]
    fn test_cast_fallbacks() {
        assert_eq!(cast(Value::Text("abc".into()), "integer"), Value::Int(0));
        assert_eq!(cast(Value::Text("41.9".into()), "integer"), Value::Int(41));
        assert_eq!(cast(Value::State(true), "integer"), Value::Int(1));
        assert_eq!(cast(Value::Empty, "text"), Value::Text("empty".into()));
        assert_eq!(cast(Value::Text("NO".into()), "state"), Value::State(false));
        assert_eq!(cast(Value::Int(2), "state"), Value::State(true));
    }
}
