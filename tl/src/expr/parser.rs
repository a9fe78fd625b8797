//! Recursive-descent parser producing an expression tree

use super::ExprError;
use super::lexer::{Spanned, Tok, lex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    /// A possibly dotted name such as `pi` or `math.pi`
    Name(String),
    Call {
        func: String,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Chained comparison: `a < b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Deepest tree the parser builds
///
/// Bounds the recursion of both parsing and evaluation. Every bracket,
/// unary operator, subscript and chained binary operator counts one level.
pub const MAX_DEPTH: usize = 100;

/// Parse a complete expression
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let toks = lex(src)?;
    let mut p = Parser {
        toks,
        i: 0,
        len: src.len(),
        depth: 0,
    };
    let expr = p.parse_or()?;
    match p.peek() {
        None => Ok(expr),
        Some(_) => Err(p.error("unexpected trailing input")),
    }
}

struct Parser {
    toks: Vec<Spanned>,
    i: usize,
    len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.i).map(|s| &s.tok)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.i).map(|s| s.tok.clone());
        if tok.is_some() {
            self.i += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(id)) if id == kw) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ExprError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn error(&self, message: &str) -> ExprError {
        let offset = self.toks.get(self.i).map(|s| s.offset).unwrap_or(self.len);
        ExprError::Syntax {
            offset,
            message: message.to_string(),
        }
    }

    // One level deeper; callers restore `self.depth` when they return
    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression is nested too deeply"));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            self.descend()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            self.descend()?;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let depth = self.depth;
            self.descend()?;
            let operand = self.parse_not()?;
            self.depth = depth;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let first = self.parse_sum()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => CmpOp::Eq,
                Some(Tok::Ne) => CmpOp::Ne,
                Some(Tok::Lt) => CmpOp::Lt,
                Some(Tok::Le) => CmpOp::Le,
                Some(Tok::Gt) => CmpOp::Gt,
                Some(Tok::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.i += 1;
            rest.push((op, self.parse_sum()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.i += 1;
            self.descend()?;
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::SlashSlash) => BinOp::FloorDiv,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.i += 1;
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    // Every operand passes through here, so this is where bracket nesting
    // and `**` chains are counted
    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        self.descend()?;
        let op = match self.peek() {
            Some(Tok::Minus) => UnaryOp::Neg,
            Some(Tok::Plus) => UnaryOp::Pos,
            _ => {
                let expr = self.parse_power()?;
                self.depth = depth;
                return Ok(expr);
            }
        };
        self.i += 1;
        let operand = self.parse_unary()?;
        self.depth = depth;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // `**` binds tighter than a unary minus on its left and is right
    // associative: -2 ** 2 == -4, 2 ** -1 == 0.5
    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_postfix()?;
        if self.eat(&Tok::StarStar) {
            let exponent = self.parse_unary()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    let Expr::Name(func) = expr else {
                        return Err(self.error("only named functions can be called"));
                    };
                    self.i += 1;
                    self.descend()?;
                    let args = self.parse_items(Tok::RParen, "')'")?;
                    expr = Expr::Call { func, args };
                }
                Some(Tok::LBracket) => {
                    self.i += 1;
                    self.descend()?;
                    let index = self.parse_or()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Tok::Dot) => {
                    let Expr::Name(prefix) = expr else {
                        return Err(self.error("attribute access is not supported"));
                    };
                    self.i += 1;
                    match self.bump() {
                        Some(Tok::Ident(attr)) => expr = Expr::Name(format!("{}.{}", prefix, attr)),
                        _ => return Err(self.error("expected a name after '.'")),
                    }
                }
                _ => {
                    self.depth = depth;
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        let err = self.error("expected a value");
        match self.bump() {
            Some(Tok::Int(v)) => Ok(Expr::Int(v)),
            Some(Tok::Float(v)) => Ok(Expr::Float(v)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Ident(id)) => match id.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "and" | "or" | "not" => Err(err),
                _ => Ok(Expr::Name(id)),
            },
            Some(Tok::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::LBracket) => Ok(Expr::List(self.parse_items(Tok::RBracket, "']'")?)),
            _ => Err(err),
        }
    }

    // Comma separated expressions up to `close`, trailing comma allowed
    fn parse_items(&mut self, close: Tok, what: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.parse_or()?);
            if !self.eat(&Tok::Comma) {
                self.expect(close, what)?;
                return Ok(items);
            }
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
