//! Tree-walking evaluator

use std::cmp::Ordering;

use rand::Rng;

use super::ExprError;
use super::library;
use super::parser::{BinOp, CmpOp, Expr, UnaryOp};
use crate::value::{Literal, format_float, quote};

/// Largest string (in bytes) or list (in nested elements) an expression
/// may build
pub const MAX_SEQUENCE_SIZE: usize = 1 << 20;

/// Runtime value inside the evaluator
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Object>),
}

/// Number view used by arithmetic; bools act as ints
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Str(_) => "str",
            Object::List(_) => "list",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Object::Bool(b) => *b,
            Object::Int(i) => *i != 0,
            Object::Float(f) => *f != 0.0,
            Object::Str(s) => !s.is_empty(),
            Object::List(items) => !items.is_empty(),
        }
    }

    /// Bytes of a string, or elements of a list counted through nested lists
    pub fn size(&self) -> usize {
        match self {
            Object::Str(s) => s.len(),
            Object::List(items) => list_size(items),
            _ => 1,
        }
    }

    pub(crate) fn as_num(&self) -> Option<Num> {
        match self {
            Object::Bool(b) => Some(Num::Int(*b as i64)),
            Object::Int(i) => Some(Num::Int(*i)),
            Object::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Python-style `str()` rendering
    pub fn display(&self) -> String {
        match self {
            Object::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// Python-style `repr()` rendering
    pub fn repr(&self) -> String {
        match self {
            Object::Bool(true) => "True".to_string(),
            Object::Bool(false) => "False".to_string(),
            Object::Int(i) => i.to_string(),
            Object::Float(f) => format_float(*f),
            Object::Str(s) => quote(s),
            Object::List(items) => {
                let inner: Vec<String> = items.iter().map(Object::repr).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    pub fn into_literal(self) -> Result<Literal, ExprError> {
        match self {
            Object::Bool(b) => Ok(Literal::Bool(b)),
            Object::Int(i) => Ok(Literal::Int(i)),
            Object::Float(f) => Ok(Literal::Float(f)),
            Object::Str(s) => Ok(Literal::Str(s)),
            Object::List(_) => Err(ExprError::NonScalarResult("list")),
        }
    }
}

pub struct Evaluator<'r, R: Rng + ?Sized> {
    rng: &'r mut R,
}

impl<'r, R: Rng + ?Sized> Evaluator<'r, R> {
    pub fn new(rng: &'r mut R) -> Self {
        Self { rng }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Object, ExprError> {
        match expr {
            Expr::Int(i) => Ok(Object::Int(*i)),
            Expr::Float(f) => Ok(Object::Float(*f)),
            Expr::Str(s) => Ok(Object::Str(s.clone())),
            Expr::Bool(b) => Ok(Object::Bool(*b)),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Object::List),
            Expr::Name(name) => library::constant(name),
            Expr::Call { func, args } => {
                let args = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>, _>>()?;
                library::call(func, args, &mut *self.rng)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                subscript(target, &index)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::Compare { first, rest } => {
                let mut lhs = self.eval(first)?;
                for (op, rhs) in rest {
                    let rhs = self.eval(rhs)?;
                    if !compare(*op, &lhs, &rhs)? {
                        return Ok(Object::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Object::Bool(true))
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() { self.eval(rhs) } else { Ok(lhs) }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() { Ok(lhs) } else { self.eval(rhs) }
            }
        }
    }
}

fn type_error(op: &str, lhs: &Object, rhs: &Object) -> ExprError {
    ExprError::Type(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn unary(op: UnaryOp, value: Object) -> Result<Object, ExprError> {
    match (op, value.as_num()) {
        (UnaryOp::Not, _) => Ok(Object::Bool(!value.truthy())),
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Object::Int).ok_or(ExprError::Overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Object::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Object::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Object::Float(f)),
        (_, None) => Err(ExprError::Type(format!(
            "bad operand type for unary operator: '{}'",
            value.type_name()
        ))),
    }
}

fn binary(op: BinOp, lhs: Object, rhs: Object) -> Result<Object, ExprError> {
    if let (Some(a), Some(b)) = (lhs.as_num(), rhs.as_num()) {
        return arithmetic(op, a, b);
    }
    match (op, lhs, rhs) {
        (BinOp::Add, Object::Str(a), Object::Str(b)) => {
            sized(a.len().checked_add(b.len()))?;
            Ok(Object::Str(a + &b))
        }
        (BinOp::Add, Object::List(mut a), Object::List(b)) => {
            sized(list_size(&a).checked_add(list_size(&b)))?;
            a.extend(b);
            Ok(Object::List(a))
        }
        (BinOp::Mul, Object::Str(s), n) | (BinOp::Mul, n, Object::Str(s)) if n.as_num().is_some() => {
            let count = repeat_count(&n)?;
            sized(s.len().checked_mul(count))?;
            Ok(Object::Str(s.repeat(count)))
        }
        (BinOp::Mul, Object::List(items), n) | (BinOp::Mul, n, Object::List(items)) if n.as_num().is_some() => {
            let count = repeat_count(&n)?;
            sized(list_size(&items).checked_mul(count))?;
            Ok(Object::List(
                std::iter::repeat_n(items, count).flatten().collect(),
            ))
        }
        (op, lhs, rhs) => Err(type_error(op_symbol(op), &lhs, &rhs)),
    }
}

fn list_size(items: &[Object]) -> usize {
    items.iter().map(|item| item.size().max(1)).sum()
}

// Reject sequences over MAX_SEQUENCE_SIZE before they are built
fn sized(size: Option<usize>) -> Result<(), ExprError> {
    match size {
        Some(size) if size <= MAX_SEQUENCE_SIZE => Ok(()),
        _ => Err(ExprError::Overflow),
    }
}

fn repeat_count(n: &Object) -> Result<usize, ExprError> {
    match n.as_num() {
        Some(Num::Int(i)) => Ok(i.max(0) as usize),
        _ => Err(ExprError::Type(format!(
            "can't multiply sequence by non-int of type '{}'",
            n.type_name()
        ))),
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn arithmetic(op: BinOp, a: Num, b: Num) -> Result<Object, ExprError> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return int_arithmetic(op, x, y);
    }
    let (x, y) = (a.to_f64(), b.to_f64());
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        BinOp::Pow => float_pow(x, y)?,
    };
    Ok(Object::Float(result))
}

fn int_arithmetic(op: BinOp, x: i64, y: i64) -> Result<Object, ExprError> {
    let checked = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            return Ok(Object::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            x.checked_div(y)
                .map(|q| if x % y != 0 && (x < 0) != (y < 0) { q - 1 } else { q })
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            x.checked_rem(y)
                .map(|r| if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
        }
        BinOp::Pow => {
            if y < 0 {
                return float_pow(x as f64, y as f64).map(Object::Float);
            }
            u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
        }
    };
    checked.map(Object::Int).ok_or(ExprError::Overflow)
}

fn float_pow(x: f64, y: f64) -> Result<f64, ExprError> {
    if x == 0.0 && y < 0.0 {
        return Err(ExprError::DivisionByZero);
    }
    if x < 0.0 && y.fract() != 0.0 {
        return Err(ExprError::Domain("**".to_string()));
    }
    let result = x.powf(y);
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(ExprError::Overflow);
    }
    Ok(result)
}

/// Order two objects the way Python would, if they are comparable
pub(crate) fn ordering(lhs: &Object, rhs: &Object) -> Option<Ordering> {
    match (lhs, rhs) {
        (Object::Str(a), Object::Str(b)) => Some(a.cmp(b)),
        (Object::List(a), Object::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                match ordering(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (lhs.as_num()?, rhs.as_num()?) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        },
    }
}

fn compare(op: CmpOp, lhs: &Object, rhs: &Object) -> Result<bool, ExprError> {
    let ord = ordering(lhs, rhs);
    match op {
        CmpOp::Eq => Ok(ord == Some(Ordering::Equal)),
        CmpOp::Ne => Ok(ord != Some(Ordering::Equal)),
        _ => {
            let Some(ord) = ord else {
                return Err(ExprError::Type(format!(
                    "'{}' and '{}' cannot be ordered",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            };
            Ok(match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
    }
}

fn subscript(target: Object, index: &Object) -> Result<Object, ExprError> {
    let Some(Num::Int(i)) = index.as_num() else {
        return Err(ExprError::Type(format!(
            "indices must be integers, not '{}'",
            index.type_name()
        )));
    };
    let resolve = |len: usize| -> Result<usize, ExprError> {
        let idx = if i < 0 { i + len as i64 } else { i };
        if idx < 0 || idx >= len as i64 {
            Err(ExprError::IndexOutOfRange)
        } else {
            Ok(idx as usize)
        }
    };
    match target {
        Object::List(mut items) => {
            let idx = resolve(items.len())?;
            Ok(items.swap_remove(idx))
        }
        Object::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = resolve(chars.len())?;
            Ok(Object::Str(chars[idx].to_string()))
        }
        other => Err(ExprError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}
