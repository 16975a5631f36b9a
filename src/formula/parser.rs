//! Tokenizer and recursive-descent parser for rule formulas.
//!
//! Grammar (whitespace is insignificant):
//!
//! ```text
//! expr   := and ( '|' and )*
//! and    := unary ( '&' unary )*
//! unary  := '!' unary | atom
//! atom   := INDEX | '(' expr ')'
//! ```
//!
//! `!` binds tighter than `&`, which binds tighter than `|`. Chains of `&`
//! and `|` parse into flat n-ary nodes, so only `!` and `(` add depth, and
//! that depth is capped at [`MAX_DEPTH`].

use std::collections::BTreeSet;

use crate::error::FormulaError;

use super::FormulaResult;

/// Parsed boolean formula over attribute indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Var(u32),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// Deepest nesting of `!` and `(` the parser accepts.
pub const MAX_DEPTH: usize = 256;

impl Expr {
    /// Distinct attribute indices referenced anywhere in the expression.
    pub fn attributes(&self) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes(&self, out: &mut BTreeSet<u32>) {
        match self {
            Expr::Var(v) => {
                out.insert(*v);
            }
            Expr::Not(inner) => inner.collect_attributes(out),
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_attributes(out);
                }
            }
        }
    }

    /// Evaluate under an assignment given as a predicate on attribute indices.
    pub fn eval<F>(&self, value: &F) -> bool
    where
        F: Fn(u32) -> bool,
    {
        match self {
            Expr::Var(v) => value(*v),
            Expr::Not(inner) => !inner.eval(value),
            Expr::And(terms) => terms.iter().all(|t| t.eval(value)),
            Expr::Or(terms) => terms.iter().any(|t| t.eval(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Index(u32),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    offset: usize,
    len: usize,
}

impl Token {
    fn text(&self, input: &str) -> String {
        input[self.offset..self.offset + self.len].to_string()
    }
}

fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let kind = match ch {
            c if c.is_whitespace() => continue,
            '!' => TokenKind::Not,
            '&' => TokenKind::And,
            '|' => TokenKind::Or,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            c if c.is_ascii_digit() => {
                let mut end = offset + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                let text = &input[offset..end];
                let index = text.parse::<u32>().map_err(|_| FormulaError::IndexOverflow {
                    token: text.to_string(),
                    offset,
                    input: input.to_string(),
                    span: (offset, end - offset).into(),
                })?;
                tokens.push(Token {
                    kind: TokenKind::Index(index),
                    offset,
                    len: end - offset,
                });
                continue;
            }
            other => {
                return Err(FormulaError::UnexpectedChar {
                    found: other,
                    offset,
                    input: input.to_string(),
                    span: (offset, other.len_utf8()).into(),
                });
            }
        };
        tokens.push(Token { kind, offset, len: 1 });
    }

    Ok(tokens)
}

/// Parse a formula string into an [`Expr`].
pub fn parse(input: &str) -> FormulaResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.unexpected("'&', '|' or end of formula")),
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn unexpected(&self, expected: &'static str) -> FormulaError {
        match self.peek() {
            Some(tok) => FormulaError::UnexpectedToken {
                expected,
                found: tok.text(self.input),
                offset: tok.offset,
                input: self.input.to_string(),
                span: (tok.offset, tok.len).into(),
            },
            None => FormulaError::UnexpectedEnd {
                expected,
                input: self.input.to_string(),
                span: (self.input.len(), 0).into(),
            },
        }
    }

    /// Enter one nesting level at the current token.
    fn descend(&mut self) -> FormulaResult<()> {
        if self.depth == MAX_DEPTH {
            let (offset, len) = self.peek().map_or((self.input.len(), 0), |t| (t.offset, t.len));
            return Err(FormulaError::TooDeep {
                max: MAX_DEPTH,
                offset,
                input: self.input.to_string(),
                span: (offset, len).into(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> FormulaResult<Expr> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(TokenKind::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> FormulaResult<Expr> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat(TokenKind::And) {
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        if self.peek().map(|t| t.kind) == Some(TokenKind::Not) {
            self.descend()?;
            self.pos += 1;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> FormulaResult<Expr> {
        const OPERAND: &str = "an attribute index, '!' or '('";
        let Some(tok) = self.peek() else {
            return Err(self.unexpected(OPERAND));
        };
        match tok.kind {
            TokenKind::Index(v) => {
                self.pos += 1;
                Ok(Expr::Var(v))
            }
            TokenKind::LParen => {
                self.descend()?;
                self.pos += 1;
                let inner = self.parse_or()?;
                if !self.eat(TokenKind::RParen) {
                    return Err(self.unexpected("')'"));
                }
                self.depth -= 1;
                Ok(inner)
            }
            _ => Err(self.unexpected(OPERAND)),
        }
    }
}
