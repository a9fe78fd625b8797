//! Allow-listed functions and constants available to expressions
//!
//! Names may be used bare (`randint(1, 6)`) or with their module prefix
//! (`random.randint(1, 6)`, `math.pi`). Nothing outside these tables is
//! reachable from an expression.

use std::cmp::Ordering;
use std::f64::consts;

use rand::Rng;
use rand::seq::IndexedRandom;

use super::ExprError;
use super::eval::{Num, Object, ordering};

const RANDOM_FUNCTIONS: &[&str] = &[
    "random",
    "randint",
    "randrange",
    "uniform",
    "choice",
    "sample",
    "gauss",
    "normalvariate",
];

const MATH_FUNCTIONS: &[&str] = &[
    "sqrt", "exp", "log", "log10", "log2", "pow", "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "hypot",
    "floor", "ceil", "trunc", "fabs", "degrees", "radians",
];

const BUILTINS: &[&str] = &[
    "abs", "round", "min", "max", "int", "float", "str", "len", "sum",
];

/// Strip an optional module prefix, rejecting names from other modules
fn unqualify<'a>(name: &'a str, table: &[&str], module: &str) -> Option<&'a str> {
    match name.split_once('.') {
        Some((prefix, rest)) if prefix == module && table.contains(&rest) => Some(rest),
        Some(_) => None,
        None if table.contains(&name) => Some(name),
        None => None,
    }
}

fn resolve_function(name: &str) -> Option<&str> {
    unqualify(name, RANDOM_FUNCTIONS, "random")
        .or_else(|| unqualify(name, MATH_FUNCTIONS, "math"))
        .or_else(|| unqualify(name, BUILTINS, "builtins"))
}

/// Look up a named constant
pub fn constant(name: &str) -> Result<Object, ExprError> {
    let bare = match name.split_once('.') {
        Some(("math", rest)) => rest,
        Some(_) => return Err(ExprError::UnknownName(name.to_string())),
        None => name,
    };
    match bare {
        "pi" => Ok(Object::Float(consts::PI)),
        "e" => Ok(Object::Float(consts::E)),
        "tau" => Ok(Object::Float(consts::TAU)),
        "inf" => Ok(Object::Float(f64::INFINITY)),
        _ if resolve_function(name).is_some() => Err(ExprError::Type(format!(
            "function '{}' must be called",
            name
        ))),
        _ => Err(ExprError::UnknownName(name.to_string())),
    }
}

fn arity(function: &str, expected: &'static str, args: &[Object], ok: bool) -> Result<(), ExprError> {
    if ok {
        Ok(())
    } else {
        Err(ExprError::Arity {
            function: function.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn number(function: &str, arg: &Object) -> Result<Num, ExprError> {
    arg.as_num().ok_or_else(|| {
        ExprError::Type(format!(
            "{}() expects a number, not '{}'",
            function,
            arg.type_name()
        ))
    })
}

fn float(function: &str, arg: &Object) -> Result<f64, ExprError> {
    number(function, arg).map(Num::to_f64)
}

fn integer(function: &str, arg: &Object) -> Result<i64, ExprError> {
    match number(function, arg)? {
        Num::Int(i) => Ok(i),
        Num::Float(_) => Err(ExprError::Type(format!(
            "{}() expects an integer, not 'float'",
            function
        ))),
    }
}

fn float_to_int(function: &str, f: f64) -> Result<Object, ExprError> {
    if !f.is_finite() {
        return Err(ExprError::Domain(function.to_string()));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(ExprError::Overflow);
    }
    Ok(Object::Int(f as i64))
}

fn items(function: &str, arg: &Object) -> Result<Vec<Object>, ExprError> {
    match arg {
        Object::List(items) => Ok(items.clone()),
        Object::Str(s) => Ok(s.chars().map(|c| Object::Str(c.to_string())).collect()),
        other => Err(ExprError::Type(format!(
            "{}() expects a sequence, not '{}'",
            function,
            other.type_name()
        ))),
    }
}

/// Call an allow-listed function
pub fn call<R: Rng + ?Sized>(name: &str, args: Vec<Object>, rng: &mut R) -> Result<Object, ExprError> {
    let Some(func) = resolve_function(name) else {
        return Err(ExprError::UnknownFunction(name.to_string()));
    };
    let n = args.len();

    match func {
        // random
        "random" => {
            arity(func, "0", &args, n == 0)?;
            Ok(Object::Float(rng.random::<f64>()))
        }
        "randint" => {
            arity(func, "2", &args, n == 2)?;
            let (a, b) = (integer(func, &args[0])?, integer(func, &args[1])?);
            if a > b {
                return Err(ExprError::Domain(format!("randint({}, {}): empty range", a, b)));
            }
            Ok(Object::Int(rng.random_range(a..=b)))
        }
        "randrange" => {
            arity(func, "1 to 3", &args, (1..=3).contains(&n))?;
            let (start, stop) = if n == 1 {
                (0, integer(func, &args[0])?)
            } else {
                (integer(func, &args[0])?, integer(func, &args[1])?)
            };
            let step = if n == 3 { integer(func, &args[2])? } else { 1 };
            if step == 0 {
                return Err(ExprError::Domain("randrange(): step must not be zero".to_string()));
            }
            let span = stop as i128 - start as i128;
            let count = (span + step as i128 - step.signum() as i128) / step as i128;
            if count <= 0 {
                return Err(ExprError::Domain(format!("randrange({}, {}): empty range", start, stop)));
            }
            let k = rng.random_range(0..count);
            Ok(Object::Int((start as i128 + step as i128 * k) as i64))
        }
        "uniform" => {
            arity(func, "2", &args, n == 2)?;
            let (a, b) = (float(func, &args[0])?, float(func, &args[1])?);
            Ok(Object::Float(a + (b - a) * rng.random::<f64>()))
        }
        "choice" => {
            arity(func, "1", &args, n == 1)?;
            let pool = items(func, &args[0])?;
            pool.choose(rng)
                .cloned()
                .ok_or_else(|| ExprError::Domain("choice(): empty sequence".to_string()))
        }
        "sample" => {
            arity(func, "2", &args, n == 2)?;
            let pool = items(func, &args[0])?;
            let k = integer(func, &args[1])?;
            if k < 0 || k as usize > pool.len() {
                return Err(ExprError::Domain("sample(): sample larger than population or negative".to_string()));
            }
            let picked = rand::seq::index::sample(rng, pool.len(), k as usize);
            Ok(Object::List(picked.iter().map(|i| pool[i].clone()).collect()))
        }
        "gauss" | "normalvariate" => {
            arity(func, "2", &args, n == 2)?;
            let (mu, sigma) = (float(func, &args[0])?, float(func, &args[1])?);
            // Box-Muller; u1 is in (0, 1] so ln(u1) is finite
            let u1 = 1.0 - rng.random::<f64>();
            let u2 = rng.random::<f64>();
            let z = (-2.0 * u1.ln()).sqrt() * (consts::TAU * u2).cos();
            Ok(Object::Float(mu + sigma * z))
        }

        // math
        "sqrt" | "exp" | "log10" | "log2" | "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "fabs"
        | "degrees" | "radians" => {
            arity(func, "1", &args, n == 1)?;
            let x = float(func, &args[0])?;
            let domain_ok = match func {
                "sqrt" => x >= 0.0,
                "log10" | "log2" => x > 0.0,
                "asin" | "acos" => (-1.0..=1.0).contains(&x),
                _ => true,
            };
            if !domain_ok {
                return Err(ExprError::Domain(func.to_string()));
            }
            let y = match func {
                "sqrt" => x.sqrt(),
                "exp" => x.exp(),
                "log10" => x.log10(),
                "log2" => x.log2(),
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "asin" => x.asin(),
                "acos" => x.acos(),
                "atan" => x.atan(),
                "fabs" => x.abs(),
                "degrees" => x.to_degrees(),
                _ => x.to_radians(),
            };
            if y.is_infinite() && x.is_finite() {
                return Err(ExprError::Overflow);
            }
            Ok(Object::Float(y))
        }
        "log" => {
            arity(func, "1 or 2", &args, n == 1 || n == 2)?;
            let x = float(func, &args[0])?;
            if x <= 0.0 {
                return Err(ExprError::Domain(func.to_string()));
            }
            if n == 1 {
                return Ok(Object::Float(x.ln()));
            }
            let base = float(func, &args[1])?;
            if base <= 0.0 || base == 1.0 {
                return Err(ExprError::Domain(func.to_string()));
            }
            Ok(Object::Float(x.ln() / base.ln()))
        }
        "pow" | "atan2" | "hypot" => {
            arity(func, "2", &args, n == 2)?;
            let (x, y) = (float(func, &args[0])?, float(func, &args[1])?);
            let result = match func {
                "pow" => {
                    if (x == 0.0 && y < 0.0) || (x < 0.0 && y.fract() != 0.0) {
                        return Err(ExprError::Domain(func.to_string()));
                    }
                    x.powf(y)
                }
                "atan2" => x.atan2(y),
                _ => x.hypot(y),
            };
            Ok(Object::Float(result))
        }
        "floor" | "ceil" | "trunc" => {
            arity(func, "1", &args, n == 1)?;
            match number(func, &args[0])? {
                Num::Int(i) => Ok(Object::Int(i)),
                Num::Float(f) => {
                    let r = match func {
                        "floor" => f.floor(),
                        "ceil" => f.ceil(),
                        _ => f.trunc(),
                    };
                    float_to_int(func, r)
                }
            }
        }

        // builtins
        "abs" => {
            arity(func, "1", &args, n == 1)?;
            match number(func, &args[0])? {
                Num::Int(i) => i.checked_abs().map(Object::Int).ok_or(ExprError::Overflow),
                Num::Float(f) => Ok(Object::Float(f.abs())),
            }
        }
        "round" => {
            arity(func, "1 or 2", &args, n == 1 || n == 2)?;
            let x = number(func, &args[0])?;
            if n == 1 {
                return match x {
                    Num::Int(i) => Ok(Object::Int(i)),
                    Num::Float(f) => float_to_int(func, f.round_ties_even()),
                };
            }
            let digits = integer(func, &args[1])?;
            match x {
                Num::Int(i) if digits >= 0 => Ok(Object::Int(i)),
                x => {
                    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
                    Ok(Object::Float((x.to_f64() * scale).round_ties_even() / scale))
                }
            }
        }
        "min" | "max" => {
            let pool = match args.as_slice() {
                [single] => items(func, single)?,
                _ => args.clone(),
            };
            let want = if func == "min" { Ordering::Less } else { Ordering::Greater };
            let mut best: Option<Object> = None;
            for item in pool {
                best = match best {
                    None => Some(item),
                    Some(current) => {
                        let ord = ordering(&item, &current).ok_or_else(|| {
                            ExprError::Type(format!(
                                "'{}' and '{}' cannot be compared",
                                item.type_name(),
                                current.type_name()
                            ))
                        })?;
                        Some(if ord == want { item } else { current })
                    }
                };
            }
            best.ok_or_else(|| ExprError::Domain(format!("{}(): empty sequence", func)))
        }
        "int" => {
            arity(func, "1", &args, n == 1)?;
            match &args[0] {
                Object::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Object::Int)
                    .map_err(|_| ExprError::Type(format!("invalid literal for int(): '{}'", s))),
                other => match number(func, other)? {
                    Num::Int(i) => Ok(Object::Int(i)),
                    Num::Float(f) => float_to_int(func, f.trunc()),
                },
            }
        }
        "float" => {
            arity(func, "1", &args, n == 1)?;
            match &args[0] {
                Object::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Object::Float)
                    .map_err(|_| ExprError::Type(format!("could not convert string to float: '{}'", s))),
                other => float(func, other).map(Object::Float),
            }
        }
        "str" => {
            arity(func, "1", &args, n == 1)?;
            Ok(Object::Str(args[0].display()))
        }
        "len" => {
            arity(func, "1", &args, n == 1)?;
            let len = items(func, &args[0])?.len();
            Ok(Object::Int(len as i64))
        }
        "sum" => {
            arity(func, "1", &args, n == 1)?;
            let mut total = Num::Int(0);
            for item in items(func, &args[0])? {
                total = match (total, number(func, &item)?) {
                    (Num::Int(a), Num::Int(b)) => Num::Int(a.checked_add(b).ok_or(ExprError::Overflow)?),
                    (a, b) => Num::Float(a.to_f64() + b.to_f64()),
                };
            }
            Ok(match total {
                Num::Int(i) => Object::Int(i),
                Num::Float(f) => Object::Float(f),
            })
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}
