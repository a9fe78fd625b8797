//! Tagged values stored in cycle matrices and the experiment state

use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete value: what ends up in the experiment state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A value as written in a loop definition
///
/// Expressions are kept as source text and evaluated each time their cycle
/// is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(Literal),
    Expression(String),
}

impl Literal {
    /// Coerce raw definition text into an int, a float or a string
    ///
    /// Text is an int only when it parses as an integer and as a float to the
    /// same number, so `"3"` is `Int(3)` and `"3.5"` is `Float(3.5)`.
    /// Non-finite spellings (`nan`, `inf`) stay strings.
    pub fn coerce(raw: &str) -> Self {
        let float = raw.parse::<f64>().ok().filter(|f| f.is_finite());
        if let Ok(int) = raw.parse::<i64>()
            && float == Some(int as f64)
        {
            return Literal::Int(int);
        }
        match float {
            Some(f) => Literal::Float(f),
            None => Literal::Str(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a token of the expression language
    ///
    /// Strings become double-quoted literals, everything else renders as its
    /// display form.
    pub fn to_source(&self) -> String {
        match self {
            Literal::Str(s) => quote(s),
            other => other.to_string(),
        }
    }
}

impl Value {
    /// Coerce raw definition text, recognizing `=` expressions
    pub fn coerce(raw: &str) -> Self {
        match Literal::coerce(raw) {
            Literal::Str(s) if s.chars().count() > 2 && s.starts_with('=') => Value::Expression(s[1..].to_string()),
            literal => Value::Literal(literal),
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Value::Literal(literal)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Str(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Str(v)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", format_float(*v)),
            Literal::Str(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(literal) => literal.fmt(f),
            Value::Expression(code) => write!(f, "={}", code),
        }
    }
}

/// Format a float so that it never reads back as an int
///
/// Whole numbers keep a decimal point (`3.0`); from 1e16 on they switch to
/// exponent notation (`1e16`).
pub(crate) fn format_float(v: f64) -> String {
    if !v.is_finite() || v.fract() != 0.0 {
        format!("{}", v)
    } else if v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{:e}", v)
    }
}

/// Double-quote a string, escaping backslashes and quotes
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
