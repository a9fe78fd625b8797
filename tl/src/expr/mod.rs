//! Sandboxed expression language for `=` cycle values
//!
//! Expressions are parsed into a tree and evaluated against a fixed table
//! of random, math and conversion functions. There is no path from an
//! expression to arbitrary code, the filesystem or the environment.
//!
//! ```ignore
//! let mut rng = StdRng::seed_from_u64(1);
//! let value = trialloop::expr::evaluate("random.randint(1, 6) * 100", &mut rng)?;
//! ```

mod eval;
mod lexer;
mod library;
mod parser;

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::value::Literal;

pub use eval::Object;
pub use parser::{BinOp, CmpOp, Expr, UnaryOp, parse};

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("function '{0}' is not available")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s) ({got} given)")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error: {0}")]
    Domain(String),

    #[error("numeric overflow")]
    Overflow,

    #[error("index out of range")]
    IndexOutOfRange,

    #[error("variable '{0}' does not exist")]
    UnresolvedVariable(String),

    #[error("expression must produce a number, string or bool, not a {0}")]
    NonScalarResult(&'static str),
}

/// Parse and evaluate an expression to a storable value
pub fn evaluate<R: Rng + ?Sized>(source: &str, rng: &mut R) -> Result<Literal, ExprError> {
    debug!(%source, "evaluate: called");
    let tree = parse(source)?;
    eval::Evaluator::new(rng).eval(&tree)?.into_literal()
}
