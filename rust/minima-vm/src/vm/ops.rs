//! Arithmetic, comparison, and container access helpers with dynamic
//! re-validation of operand kinds.
//!
//! The generator already classified static types to pick opcodes; these
//! helpers re-check at runtime since the IR carries no types, and every
//! numeric result is validated against the nine-digit domain.

use super::VmError;
use crate::values::{validate_int, validate_point, Value};
use minima_compiler::compiler::tac::Opcode;
use std::cmp::Ordering;

/// Numeric view of a value: states coerce to 0/1 and Empty to 0, the
/// way the language treats them in arithmetic.
enum Num {
    Int(i64),
    Point(f64),
}

fn to_number(value: &Value, context: &str) -> Result<Num, VmError> {
    match value {
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Point(x) => Ok(Num::Point(*x)),
        Value::State(b) => Ok(Num::Int(*b as i64)),
        Value::Empty => Ok(Num::Int(0)),
        other => Err(VmError::Runtime(format!(
            "cannot use a {} in {}",
            other.type_name(),
            context
        ))),
    }
}

fn int_result(n: i64) -> Result<Value, VmError> {
    validate_int(n).map(Value::Int).map_err(VmError::Range)
}

fn point_result(x: f64) -> Result<Value, VmError> {
    validate_point(x).map(Value::Point).map_err(VmError::Range)
}

/// ADD/SUB/MUL/DIV/MOD dispatch. ADD falls back to concatenation when
/// either operand is a list or text, mirroring the generator's static
/// choice; DIV always produces a point.
pub(super) fn arith(op: Opcode, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
    if op == Opcode::Add {
        if matches!(lhs, Value::List(_)) || matches!(rhs, Value::List(_)) {
            return Ok(list_concat(lhs.clone(), rhs.clone()));
        }
        if matches!(lhs, Value::Text(_)) || matches!(rhs, Value::Text(_)) {
            return Ok(Value::Text(format!(
                "{}{}",
                lhs.concat_text(),
                rhs.concat_text()
            )));
        }
    }
    let context = match op {
        Opcode::Add => "addition",
        Opcode::Sub => "subtraction",
        Opcode::Mul => "multiplication",
        Opcode::Div => "division",
        _ => "modulo",
    };
    let l = to_number(lhs, context)?;
    let r = to_number(rhs, context)?;
    match op {
        Opcode::Div => {
            let (x, y) = (as_point(&l), as_point(&r));
            if y == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            point_result(x / y)
        }
        Opcode::Mod => match (l, r) {
            (_, Num::Int(0)) => Err(VmError::ModuloByZero),
            (Num::Int(a), Num::Int(b)) => int_result(a.rem_euclid(b)),
            (a, b) => {
                let y = as_point(&b);
                if y == 0.0 {
                    return Err(VmError::ModuloByZero);
                }
                point_result(as_point(&a).rem_euclid(y))
            }
        },
        _ => match (l, r) {
            (Num::Int(a), Num::Int(b)) => {
                let n = match op {
                    Opcode::Add => a + b,
                    Opcode::Sub => a - b,
                    _ => match a.checked_mul(b) {
                        Some(n) => n,
                        None => {
                            return Err(VmError::Range(format!(
                                "integer out of range: {} * {}",
                                a, b
                            )))
                        }
                    },
                };
                int_result(n)
            }
            (a, b) => {
                let (x, y) = (as_point(&a), as_point(&b));
                let result = match op {
                    Opcode::Add => x + y,
                    Opcode::Sub => x - y,
                    _ => x * y,
                };
                point_result(result)
            }
        },
    }
}

fn as_point(n: &Num) -> f64 {
    match n {
        Num::Int(n) => *n as f64,
        Num::Point(x) => *x,
    }
}

pub(super) fn negate(value: &Value) -> Result<Value, VmError> {
    match value {
        Value::Int(n) => int_result(-n),
        Value::Point(x) => point_result(-x),
        other => Err(VmError::Runtime(format!(
            "cannot negate a {}",
            other.type_name()
        ))),
    }
}

/// List concatenation; a non-list side joins as a single element.
pub(super) fn list_concat(lhs: Value, rhs: Value) -> Value {
    let mut items = match lhs {
        Value::List(items) => items,
        other => vec![other],
    };
    match rhs {
        Value::List(mut rest) => items.append(&mut rest),
        other => items.push(other),
    }
    Value::List(items)
}

/// LT/LE/GT/GE. Any comparison against Empty is false; only Empty ==
/// Empty holds, and equality is handled elsewhere.
pub(super) fn compare(op: Opcode, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
    let Some(ordering) = order(lhs, rhs)? else {
        return Ok(Value::State(false));
    };
    let result = match op {
        Opcode::Lt => ordering == Ordering::Less,
        Opcode::Le => ordering != Ordering::Greater,
        Opcode::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::State(result))
}

fn order(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, VmError> {
    if matches!(lhs, Value::Empty) || matches!(rhs, Value::Empty) {
        return Ok(None);
    }
    // Digit-only text coerces to a number when ordered against one.
    let numeric = |v: &Value| -> Option<f64> {
        match v {
            Value::Int(n) => Some(*n as f64),
            Value::Point(x) => Some(*x),
            Value::State(b) => Some(*b as i64 as f64),
            Value::Text(s) => {
                let digits = s.strip_prefix('-').unwrap_or(s);
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    s.parse().ok()
                } else {
                    None
                }
            }
            _ => None,
        }
    };
    if let (Value::Text(a), Value::Text(b)) = (lhs, rhs) {
        return Ok(Some(a.cmp(b)));
    }
    match (numeric(lhs), numeric(rhs)) {
        (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
        _ => Err(VmError::Runtime(format!(
            "cannot compare a {} with a {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

/// LIST_ACCESS: negative indices wrap from the end, out-of-range reads
/// yield Empty. Text is indexable character-wise.
pub(super) fn list_access(container: &Value, index: &Value) -> Result<Value, VmError> {
    let index = to_index(index)?;
    match container {
        Value::List(items) => {
            let actual = wrap_index(index, items.len());
            Ok(actual
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Empty))
        }
        Value::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            let actual = wrap_index(index, chars.len());
            Ok(actual
                .and_then(|i| chars.get(i))
                .map(|c| Value::Text(c.to_string()))
                .unwrap_or(Value::Empty))
        }
        other => Err(VmError::NotAContainer(other.type_name())),
    }
}

fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let actual = if index < 0 { len + index } else { index };
    (0..len).contains(&actual).then_some(actual as usize)
}

/// Coerce an index operand to an integer; whole points are accepted.
pub(super) fn to_index(value: &Value) -> Result<i64, VmError> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Point(x) if x.fract() == 0.0 => Ok(*x as i64),
        Value::Text(s) => s.parse().map_err(|_| {
            VmError::Runtime(format!("invalid index '{}'", s))
        }),
        other => Err(VmError::Runtime(format!(
            "invalid index of type {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_re_validates_dynamically() {
        // Static classification said ADD, but text still concatenates.
        let result = arith(
            Opcode::Add,
            &Value::Text("a".into()),
            &Value::Int(1),
        )
        .unwrap();
        assert_eq!(result, Value::Text("a1".into()));
    }

    #[test]
    fn test_div_always_point() {
        let result = arith(Opcode::Div, &Value::Int(10), &Value::Int(2)).unwrap();
        assert_eq!(result, Value::Point(5.0));
        assert!(matches!(result, Value::Point(_)));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            arith(Opcode::Div, &Value::Int(1), &Value::Int(0)),
            Err(VmError::DivisionByZero)
        ));
        assert!(matches!(
            arith(Opcode::Mod, &Value::Int(1), &Value::Int(0)),
            Err(VmError::ModuloByZero)
        ));
    }

    #[test]
    fn test_overflow_is_range_error() {
        assert!(matches!(
            arith(
                Opcode::Add,
                &Value::Int(999_999_999),
                &Value::Int(1)
            ),
            Err(VmError::Range(_))
        ));
        assert!(matches!(
            arith(
                Opcode::Mul,
                &Value::Int(100_000),
                &Value::Int(100_000)
            ),
            Err(VmError::Range(_))
        ));
    }

    #[test]
    fn test_empty_comparisons_are_false() {
        for op in [Opcode::Lt, Opcode::Le, Opcode::Gt, Opcode::Ge] {
            assert_eq!(
                compare(op, &Value::Empty, &Value::Int(1)).unwrap(),
                Value::State(false)
            );
            assert_eq!(
                compare(op, &Value::Empty, &Value::Empty).unwrap(),
                Value::State(false)
            );
        }
    }

    #[test]
    fn test_negative_index_wraps() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            list_access(&list, &Value::Int(-1)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(list_access(&list, &Value::Int(3)).unwrap(), Value::Empty);
    }

    #[test]
    fn test_indexing_non_container_fails() {
        assert!(matches!(
            list_access(&Value::Int(5), &Value::Int(0)),
            Err(VmError::NotAContainer("integer"))
        ));
    }

    #[test]
    fn test_state_coerces_in_arithmetic() {
        let result = arith(Opcode::Add, &Value::State(true), &Value::Int(2)).unwrap();
        assert_eq!(result, Value::Int(3));
    }
}
