//! Builtin-function registry.
//!
//! The generator validates call arity against the signature table in the
//! compiler crate; this registry holds the callables, invoked by CALL
//! over already-evaluated positional arguments. Numeric results are
//! re-validated against the nine-digit domain.

use super::VmError;
use crate::values::{validate_int, validate_point, Value};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub type BuiltinFn = fn(&[Value]) -> Result<Value, VmError>;

static REGISTRY: Lazy<HashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, BuiltinFn> = HashMap::new();
    map.insert("length", length);
    map.insert("uppercase", uppercase);
    map.insert("lowercase", lowercase);
    map.insert("reverse", reverse);
    map.insert("abs", abs);
    map.insert("sum", sum);
    map.insert("contains", contains);
    map.insert("join", join);
    map.insert("slice", slice);
    map.insert("unique", unique);
    map.insert("sorted", sorted);
    map.insert("type", type_of);
    map.insert("max", max);
    map.insert("min", min);
    map.insert("pow", pow);
    map.insert("isqrt", isqrt);
    map.insert("factorial", factorial);
    map.insert("ceil", ceil);
    map.insert("floor", floor);
    map.insert("round", round);
    map
});

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    REGISTRY.get(name).copied()
}

fn bad_arg(name: &str, detail: &str) -> VmError {
    VmError::Runtime(format!("{}: {}", name, detail))
}

fn arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a Value, VmError> {
    args.get(index)
        .ok_or_else(|| bad_arg(name, "missing argument"))
}

fn number(name: &str, value: &Value) -> Result<f64, VmError> {
    value
        .as_number()
        .ok_or_else(|| bad_arg(name, &format!("expected a number, got {}", value.type_name())))
}

fn int_result(n: i64) -> Result<Value, VmError> {
    validate_int(n).map(Value::Int).map_err(VmError::Range)
}

fn point_result(x: f64) -> Result<Value, VmError> {
    validate_point(x).map(Value::Point).map_err(VmError::Range)
}

// ── Sequence builtins ───────────────────────────────────────────────

fn length(args: &[Value]) -> Result<Value, VmError> {
    match arg("length", args, 0)? {
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Text(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(bad_arg(
            "length",
            &format!("cannot get length of a {}", other.type_name()),
        )),
    }
}

fn uppercase(args: &[Value]) -> Result<Value, VmError> {
    match arg("uppercase", args, 0)? {
        Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
        other => Err(bad_arg("uppercase", &format!("expected text, got {}", other.type_name()))),
    }
}

fn lowercase(args: &[Value]) -> Result<Value, VmError> {
    match arg("lowercase", args, 0)? {
        Value::Text(s) => Ok(Value::Text(s.to_lowercase())),
        other => Err(bad_arg("lowercase", &format!("expected text, got {}", other.type_name()))),
    }
}

fn reverse(args: &[Value]) -> Result<Value, VmError> {
    match arg("reverse", args, 0)? {
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        Value::Text(s) => Ok(Value::Text(s.chars().rev().collect())),
        other => Err(bad_arg("reverse", &format!("cannot reverse a {}", other.type_name()))),
    }
}

fn contains(args: &[Value]) -> Result<Value, VmError> {
    let needle = arg("contains", args, 1)?;
    match arg("contains", args, 0)? {
        Value::List(items) => Ok(Value::State(items.contains(needle))),
        Value::Text(s) => match needle {
            Value::Text(sub) => Ok(Value::State(s.contains(sub.as_str()))),
            other => Err(bad_arg(
                "contains",
                &format!("cannot search text for a {}", other.type_name()),
            )),
        },
        other => Err(bad_arg("contains", &format!("cannot search a {}", other.type_name()))),
    }
}

fn join(args: &[Value]) -> Result<Value, VmError> {
    let separator = match arg("join", args, 1)? {
        Value::Text(s) => s.clone(),
        other => {
            return Err(bad_arg(
                "join",
                &format!("separator must be text, got {}", other.type_name()),
            ))
        }
    };
    match arg("join", args, 0)? {
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(|v| v.concat_text()).collect();
            Ok(Value::Text(parts.join(&separator)))
        }
        other => Err(bad_arg("join", &format!("cannot join a {}", other.type_name()))),
    }
}

fn slice(args: &[Value]) -> Result<Value, VmError> {
    let start = number("slice", arg("slice", args, 1)?)? as i64;
    let end = number("slice", arg("slice", args, 2)?)? as i64;
    let bounds = |len: usize| -> (usize, usize) {
        let clamp = |i: i64| -> usize {
            let len = len as i64;
            let i = if i < 0 { len + i } else { i };
            i.clamp(0, len) as usize
        };
        let (s, e) = (clamp(start), clamp(end));
        (s, e.max(s))
    };
    match arg("slice", args, 0)? {
        Value::List(items) => {
            let (s, e) = bounds(items.len());
            Ok(Value::List(items[s..e].to_vec()))
        }
        Value::Text(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (s, e) = bounds(chars.len());
            Ok(Value::Text(chars[s..e].iter().collect()))
        }
        other => Err(bad_arg("slice", &format!("cannot slice a {}", other.type_name()))),
    }
}

fn unique(args: &[Value]) -> Result<Value, VmError> {
    match arg("unique", args, 0)? {
        Value::List(items) => {
            let mut seen: Vec<Value> = Vec::new();
            for item in items {
                if !seen.contains(item) {
                    seen.push(item.clone());
                }
            }
            Ok(Value::List(seen))
        }
        other => Err(bad_arg("unique", &format!("expected a list, got {}", other.type_name()))),
    }
}

fn sorted(args: &[Value]) -> Result<Value, VmError> {
    let descending = match args.get(1) {
        Some(flag) => flag.is_truthy(),
        None => false,
    };
    let items = match arg("sorted", args, 0)? {
        Value::List(items) => items.clone(),
        other => {
            return Err(bad_arg(
                "sorted",
                &format!("expected a list, got {}", other.type_name()),
            ))
        }
    };
    let mut result = items;
    if result.iter().all(|v| v.as_number().is_some()) {
        result.sort_by(|a, b| {
            let (a, b) = (a.as_number().unwrap_or(0.0), b.as_number().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else if result.iter().all(|v| matches!(v, Value::Text(_))) {
        result.sort_by(|a, b| a.concat_text().cmp(&b.concat_text()));
    } else {
        return Err(bad_arg("sorted", "cannot sort a mixed list"));
    }
    if descending {
        result.reverse();
    }
    Ok(Value::List(result))
}

fn type_of(args: &[Value]) -> Result<Value, VmError> {
    Ok(Value::Text(arg("type", args, 0)?.type_name().to_string()))
}

// ── Numeric builtins ────────────────────────────────────────────────

fn abs(args: &[Value]) -> Result<Value, VmError> {
    match arg("abs", args, 0)? {
        Value::Int(n) => int_result(n.abs()),
        Value::Point(x) => point_result(x.abs()),
        other => Err(bad_arg("abs", &format!("expected a number, got {}", other.type_name()))),
    }
}

fn sum(args: &[Value]) -> Result<Value, VmError> {
    let items = match arg("sum", args, 0)? {
        Value::List(items) => items,
        other => {
            return Err(bad_arg(
                "sum",
                &format!("expected a list, got {}", other.type_name()),
            ))
        }
    };
    let mut total_int: i64 = 0;
    let mut total_point: f64 = 0.0;
    let mut any_point = false;
    for item in items {
        match item {
            Value::Int(n) => {
                total_int += n;
                total_point += *n as f64;
            }
            Value::Point(x) => {
                any_point = true;
                total_point += x;
            }
            other => {
                return Err(bad_arg(
                    "sum",
                    &format!("cannot sum a {}", other.type_name()),
                ))
            }
        }
    }
    if any_point {
        point_result(total_point)
    } else {
        int_result(total_int)
    }
}

/// One list argument or two scalars.
fn extremum(name: &str, args: &[Value], want_max: bool) -> Result<Value, VmError> {
    let candidates: Vec<Value> = match args {
        [Value::List(items)] => items.clone(),
        [a, b] => vec![a.clone(), b.clone()],
        [other] => {
            return Err(bad_arg(
                name,
                &format!("expected a list or two values, got {}", other.type_name()),
            ))
        }
        _ => return Err(bad_arg(name, "missing argument")),
    };
    if candidates.is_empty() {
        return Err(bad_arg(name, "empty list"));
    }
    let mut best = candidates[0].clone();
    for candidate in &candidates[1..] {
        let ordering = match (best.as_number(), candidate.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (&best, candidate) {
                (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
                _ => None,
            },
        };
        let Some(ordering) = ordering else {
            return Err(bad_arg(name, "values are not comparable"));
        };
        let replace = if want_max {
            ordering == std::cmp::Ordering::Less
        } else {
            ordering == std::cmp::Ordering::Greater
        };
        if replace {
            best = candidate.clone();
        }
    }
    Ok(best)
}

fn max(args: &[Value]) -> Result<Value, VmError> {
    extremum("max", args, true)
}

fn min(args: &[Value]) -> Result<Value, VmError> {
    extremum("min", args, false)
}

fn pow(args: &[Value]) -> Result<Value, VmError> {
    let base = arg("pow", args, 0)?.clone();
    let exponent = arg("pow", args, 1)?.clone();
    match (&base, &exponent) {
        (Value::Int(b), Value::Int(e)) if *e >= 0 => {
            let mut result: i64 = 1;
            for _ in 0..*e {
                result = match result.checked_mul(*b) {
                    Some(n) => n,
                    None => return Err(VmError::Range(format!("integer out of range: pow({}, {})", b, e))),
                };
                validate_int(result).map_err(VmError::Range)?;
            }
            Ok(Value::Int(result))
        }
        _ => {
            let b = number("pow", &base)?;
            let e = number("pow", &exponent)?;
            point_result(b.powf(e))
        }
    }
}

fn isqrt(args: &[Value]) -> Result<Value, VmError> {
    match arg("isqrt", args, 0)? {
        Value::Int(n) if *n >= 0 => Ok(Value::Int((*n as f64).sqrt().floor() as i64)),
        Value::Int(_) => Err(bad_arg("isqrt", "argument must be non-negative")),
        other => Err(bad_arg("isqrt", &format!("expected an integer, got {}", other.type_name()))),
    }
}

fn factorial(args: &[Value]) -> Result<Value, VmError> {
    match arg("factorial", args, 0)? {
        Value::Int(n) if *n >= 0 => {
            let mut result: i64 = 1;
            for i in 2..=*n {
                result *= i;
                // 13! already exceeds the nine-digit domain.
                validate_int(result).map_err(VmError::Range)?;
            }
            Ok(Value::Int(result))
        }
        Value::Int(_) => Err(bad_arg("factorial", "argument must be non-negative")),
        other => Err(bad_arg("factorial", &format!("expected an integer, got {}", other.type_name()))),
    }
}

fn ceil(args: &[Value]) -> Result<Value, VmError> {
    match arg("ceil", args, 0)? {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Point(x) => int_result(x.ceil() as i64),
        other => Err(bad_arg("ceil", &format!("expected a number, got {}", other.type_name()))),
    }
}

fn floor(args: &[Value]) -> Result<Value, VmError> {
    match arg("floor", args, 0)? {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Point(x) => int_result(x.floor() as i64),
        other => Err(bad_arg("floor", &format!("expected a number, got {}", other.type_name()))),
    }
}

/// `round(x)` yields an integer; `round(x, digits)` keeps a point.
fn round(args: &[Value]) -> Result<Value, VmError> {
    let x = number("round", arg("round", args, 0)?)?;
    match args.get(1) {
        None => int_result(x.round() as i64),
        Some(digits) => {
            let digits = number("round", digits)?.clamp(0.0, 9.0) as u32;
            let scale = 10f64.powi(digits as i32);
            point_result((x * scale).round() / scale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_compiler_signatures() {
        for name in minima_compiler::compiler::tac::builtin_names() {
            assert!(lookup(name).is_some(), "missing builtin '{}'", name);
        }
    }

    #[test]
    fn test_length() {
        assert_eq!(
            length(&[Value::List(vec![Value::Int(1), Value::Int(2)])]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(length(&[Value::Text("abc".into())]).unwrap(), Value::Int(3));
        assert!(length(&[Value::Int(3)]).is_err());
    }

    #[test]
    fn test_sorted_variants() {
        let list = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(
            sorted(&[list.clone()]).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            sorted(&[list, Value::State(true)]).unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
    }

    #[test]
    fn test_extrema() {
        assert_eq!(
            max(&[Value::Int(2), Value::Int(5)]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            min(&[Value::List(vec![Value::Int(4), Value::Int(1)])]).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_factorial_domain() {
        assert_eq!(factorial(&[Value::Int(5)]).unwrap(), Value::Int(120));
        assert_eq!(factorial(&[Value::Int(12)]).unwrap(), Value::Int(479_001_600));
        assert!(matches!(
            factorial(&[Value::Int(13)]),
            Err(VmError::Range(_))
        ));
    }

    #[test]
    fn test_round_variants() {
        assert_eq!(round(&[Value::Point(2.5)]).unwrap(), Value::Int(3));
        assert_eq!(
            round(&[Value::Point(2.546), Value::Int(2)]).unwrap(),
            Value::Point(2.55)
        );
    }

    #[test]
    fn test_slice_clamps() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            slice(&[list.clone(), Value::Int(1), Value::Int(5)]).unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            slice(&[Value::Text("hello".into()), Value::Int(0), Value::Int(2)]).unwrap(),
            Value::Text("he".into())
        );
    }
}
