//! Tokenizer for the expression language

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A token and the byte offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub tok: Tok,
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut out = Vec::new();
    let mut it = src.char_indices().peekable();

    while let Some(&(offset, c)) = it.peek() {
        let simple = match c {
            ' ' | '\t' | '\n' | '\r' => {
                it.next();
                continue;
            }
            '+' => Some(Tok::Plus),
            '-' => Some(Tok::Minus),
            '%' => Some(Tok::Percent),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            ',' => Some(Tok::Comma),
            _ => None,
        };
        if let Some(tok) = simple {
            it.next();
            out.push(Spanned { tok, offset });
            continue;
        }

        let tok = match c {
            '*' => {
                it.next();
                if it.next_if(|&(_, d)| d == '*').is_some() {
                    Tok::StarStar
                } else {
                    Tok::Star
                }
            }
            '/' => {
                it.next();
                if it.next_if(|&(_, d)| d == '/').is_some() {
                    Tok::SlashSlash
                } else {
                    Tok::Slash
                }
            }
            '<' | '>' | '=' | '!' => {
                it.next();
                let eq = it.next_if(|&(_, d)| d == '=').is_some();
                match (c, eq) {
                    ('<', false) => Tok::Lt,
                    ('<', true) => Tok::Le,
                    ('>', false) => Tok::Gt,
                    ('>', true) => Tok::Ge,
                    ('=', true) => Tok::Eq,
                    ('!', true) => Tok::Ne,
                    _ => {
                        return Err(ExprError::Syntax {
                            offset,
                            message: format!("unexpected '{}'", c),
                        });
                    }
                }
            }
            '"' | '\'' => lex_string(&mut it, offset, c)?,
            '.' => {
                it.next();
                match it.peek() {
                    Some(&(_, d)) if d.is_ascii_digit() => lex_number(&mut it, src, offset)?,
                    _ => Tok::Dot,
                }
            }
            c if c.is_ascii_digit() => lex_number(&mut it, src, offset)?,
            c if is_ident_start(c) => {
                let mut id = String::new();
                while let Some((_, d)) = it.next_if(|&(_, d)| is_ident(d)) {
                    id.push(d);
                }
                Tok::Ident(id)
            }
            other => {
                return Err(ExprError::Syntax {
                    offset,
                    message: format!("unexpected '{}'", other),
                });
            }
        };
        out.push(Spanned { tok, offset });
    }

    Ok(out)
}

type CharIter<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

// Consumes the rest of a number whose first char is at `start`. A leading
// '.' has already been consumed by the caller.
fn lex_number(it: &mut CharIter<'_>, src: &str, start: usize) -> Result<Tok, ExprError> {
    let mut end = start + 1;
    let mut is_float = src[start..].starts_with('.');
    let mut seen_exp = false;

    while let Some(&(i, d)) = it.peek() {
        let accept = match d {
            '0'..='9' => true,
            '.' if !is_float && !seen_exp => {
                is_float = true;
                true
            }
            'e' | 'E' if !seen_exp => {
                seen_exp = true;
                is_float = true;
                true
            }
            '+' | '-' if seen_exp && matches!(src[..i].chars().last(), Some('e' | 'E')) => true,
            _ => false,
        };
        if !accept {
            break;
        }
        it.next();
        end = i + d.len_utf8();
    }

    let text = &src[start..end];
    if is_float {
        text.parse::<f64>().map(Tok::Float).map_err(|_| ExprError::Syntax {
            offset: start,
            message: format!("invalid number '{}'", text),
        })
    } else {
        text.parse::<i64>().map(Tok::Int).map_err(|_| ExprError::Overflow)
    }
}

fn lex_string(it: &mut CharIter<'_>, offset: usize, quote: char) -> Result<Tok, ExprError> {
    it.next();
    let mut s = String::new();
    loop {
        match it.next() {
            Some((_, c)) if c == quote => return Ok(Tok::Str(s)),
            Some((_, '\\')) => match it.next() {
                Some((_, 'n')) => s.push('\n'),
                Some((_, 't')) => s.push('\t'),
                Some((_, c)) => s.push(c),
                None => break,
            },
            Some((_, c)) => s.push(c),
            None => break,
        }
    }
    Err(ExprError::Syntax {
        offset,
        message: "unterminated string".to_string(),
    })
}
