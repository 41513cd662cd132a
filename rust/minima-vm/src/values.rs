//! Tagged runtime values for the Minima VM.
//!
//! Numeric domain invariant: integer magnitude is capped at nine digits
//! (999,999,999); fractional parts beyond nine digits are rounded, never
//! rejected. Every arithmetic result is re-validated against this
//! domain.

use minima_compiler::compiler::tac::Constant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest representable integer magnitude.
pub const MAX_MAGNITUDE: i64 = 999_999_999;
/// Digits kept in the fractional part of a point.
pub const MAX_FRACTION_DIGITS: u32 = 9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Point(f64),
    Text(String),
    State(bool),
    List(Vec<Value>),
    /// Ordered mapping; insertion order is preserved and keys may be any
    /// value, so this is a pair list rather than a hash map.
    Group(Vec<(Value, Value)>),
    Empty,
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Empty => Value::Empty,
            Constant::Int(n) => Value::Int(*n),
            Constant::Point(x) => Value::Point(*x),
            Constant::Text(s) => Value::Text(s.clone()),
            Constant::State(b) => Value::State(*b),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Point(_) => "point",
            Value::Text(_) => "text",
            Value::State(_) => "state",
            Value::List(_) => "list",
            Value::Group(_) => "group",
            Value::Empty => "empty",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::State(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Point(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Group(pairs) => !pairs.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Point(x) => Some(*x),
            _ => None,
        }
    }

    /// Render for PRINT: sign-prefixed negatives, trailing-zero-trimmed
    /// points, YES/NO states, `empty`, element-wise lists and groups,
    /// text with escape sequences processed.
    pub fn render(&self) -> String {
        match self {
            Value::Empty => "empty".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Point(x) => format_point(*x),
            Value::State(true) => "YES".to_string(),
            Value::State(false) => "NO".to_string(),
            Value::Text(s) => unescape(s),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Group(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.render(), v.render()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }

    /// Stringify for CONCAT: identical to [`Value::render`] except that
    /// Empty contributes nothing.
    pub fn concat_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            other => other.render(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Equality follows the language rules: integers and points compare
/// numerically across kinds, and Empty equals only Empty.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Point(a), Value::Point(b)) => a == b,
            (Value::Int(a), Value::Point(b)) | (Value::Point(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::State(a), Value::State(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Group(a), Value::Group(b)) => a == b,
            _ => false,
        }
    }
}

/// Validate an integer against the nine-digit domain.
pub fn validate_int(n: i64) -> Result<i64, String> {
    if n.abs() > MAX_MAGNITUDE {
        Err(format!(
            "integer out of range: {} (valid range is -{} to {})",
            n, MAX_MAGNITUDE, MAX_MAGNITUDE
        ))
    } else {
        Ok(n)
    }
}

/// Validate a point: the integer part is capped at nine digits, the
/// fractional part is rounded to nine digits.
pub fn validate_point(x: f64) -> Result<f64, String> {
    if !x.is_finite() || x.abs() >= 1e9 {
        return Err(format!("point out of range: {}", x));
    }
    Ok((x * 1e9).round() / 1e9)
}

/// Format a point the way Minima prints numbers: up to nine fractional
/// digits, trailing zeros trimmed, whole values without a decimal point.
pub fn format_point(x: f64) -> String {
    let formatted = format!("{:.9}", x.abs());
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    let body = if trimmed.is_empty() { "0" } else { trimmed };
    if x < 0.0 && body != "0" {
        format!("-{}", body)
    } else {
        body.to_string()
    }
}

/// Process the escape sequences `\\`, `\"`, `\n`, and `\t`; unrecognized
/// escapes stay literal.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_numbers() {
        assert_eq!(Value::Int(-3).render(), "-3");
        assert_eq!(Value::Point(5.0).render(), "5");
        assert_eq!(Value::Point(2.5).render(), "2.5");
        assert_eq!(Value::Point(-0.25).render(), "-0.25");
    }

    #[test]
    fn test_render_states_and_empty() {
        assert_eq!(Value::State(true).render(), "YES");
        assert_eq!(Value::State(false).render(), "NO");
        assert_eq!(Value::Empty.render(), "empty");
        assert_eq!(Value::Empty.concat_text(), "");
    }

    #[test]
    fn test_render_list_elementwise() {
        let v = Value::List(vec![Value::Int(1), Value::State(false), Value::Empty]);
        assert_eq!(v.render(), "[1, NO, empty]");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb\t\\\q"), "a\nb\t\\\\q");
        assert_eq!(unescape(r#"say \"hi\""#), "say \"hi\"");
    }

    #[test]
    fn test_numeric_cross_equality() {
        assert_eq!(Value::Int(5), Value::Point(5.0));
        assert_ne!(Value::Int(5), Value::Text("5".into()));
        assert_eq!(Value::Empty, Value::Empty);
        assert_ne!(Value::Empty, Value::Int(0));
    }

    #[test]
    fn test_validate_int_bounds() {
        assert_eq!(validate_int(999_999_999), Ok(999_999_999));
        assert!(validate_int(1_000_000_000).is_err());
        assert!(validate_int(-1_000_000_000).is_err());
    }

    #[test]
    fn test_validate_point_rounds_fraction() {
        assert_eq!(validate_point(1.123_456_789_4).unwrap(), 1.123_456_789);
        assert!(validate_point(1e9).is_err());
        assert!(validate_point(f64::INFINITY).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Empty.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(Value::State(true).is_truthy());
        assert!(!Value::State(false).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }
}
