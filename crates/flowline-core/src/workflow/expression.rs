//! Boolean expression evaluator for condition steps.
//!
//! Conditions are parsed by a small recursive-descent parser and evaluated
//! directly against the execution context. Nothing in an expression can
//! execute code; the grammar only covers literals, context paths,
//! comparisons and boolean connectives:
//!
//! ```text
//! expr    := or
//! or      := and (("||" | "or") and)*
//! and     := not (("&&" | "and") not)*
//! not     := ("!" | "not") not | cmp
//! cmp     := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//! primary := number | string | "true" | "false" | "null" | path | "(" expr ")"
//! path    := ["$"] ident ("." ident)*
//! ```
//!
//! Paths may start with `context.`, which refers to the whole context.
//! Nesting through `!`, parentheses and chained connectives is capped at
//! [`MAX_DEPTH`].

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use flowline_types::context::{ContextValue, ExecutionContext};

use super::resolver::lookup_path;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown path '{0}'")]
    UnknownPath(String),

    #[error("cannot compare {left} with {right} using '{op}'")]
    TypeMismatch {
        op: CompareOp,
        left: &'static str,
        right: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Dollar,
    Dot,
    Minus,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Compare(CompareOp),
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let syntax = |offset: usize, message: &str| ExpressionError::Syntax {
        offset,
        message: message.to_string(),
    };

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let after = chars.get(i + 2).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (c, next) {
            ('=', Some('=')) if after == Some('=') => (Token::Compare(CompareOp::Eq), 3),
            ('!', Some('=')) if after == Some('=') => (Token::Compare(CompareOp::Ne), 3),
            ('=', Some('=')) => (Token::Compare(CompareOp::Eq), 2),
            ('!', Some('=')) => (Token::Compare(CompareOp::Ne), 2),
            ('<', Some('=')) => (Token::Compare(CompareOp::Le), 2),
            ('>', Some('=')) => (Token::Compare(CompareOp::Ge), 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('<', _) => (Token::Compare(CompareOp::Lt), 1),
            ('>', _) => (Token::Compare(CompareOp::Gt), 1),
            ('!', _) => (Token::Not, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('$', _) => (Token::Dollar, 1),
            ('.', _) => (Token::Dot, 1),
            ('-', _) => (Token::Minus, 1),
            ('"' | '\'', _) => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    let (_, ch) = chars[j];
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    if ch == '\\' {
                        j += 1;
                        let (_, escaped) = *chars
                            .get(j)
                            .ok_or_else(|| syntax(offset, "unterminated string"))?;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    } else {
                        value.push(ch);
                    }
                    j += 1;
                }
                if !closed {
                    return Err(syntax(offset, "unterminated string"));
                }
                (Token::Str(value), j + 1 - i)
            }
            (c, _) if c.is_ascii_digit() => {
                let mut j = i;
                let mut seen_dot = false;
                while j < chars.len() {
                    let ch = chars[j].1;
                    if ch.is_ascii_digit() {
                        j += 1;
                    } else if ch == '.'
                        && !seen_dot
                        && chars.get(j + 1).is_some_and(|(_, d)| d.is_ascii_digit())
                    {
                        seen_dot = true;
                        j += 1;
                    } else {
                        break;
                    }
                }
                let end = chars.get(j).map_or(input.len(), |(o, _)| *o);
                let number = input[offset..end]
                    .parse::<f64>()
                    .map_err(|_| syntax(offset, "invalid number"))?;
                (Token::Number(number), j - i)
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len() && (chars[j].1.is_alphanumeric() || chars[j].1 == '_') {
                    j += 1;
                }
                let end = chars.get(j).map_or(input.len(), |(o, _)| *o);
                let word = &input[offset..end];
                let token = match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word.to_string()),
                };
                (token, j - i)
            }
            _ => return Err(syntax(offset, &format!("unexpected character '{c}'"))),
        };

        tokens.push((offset, token));
        i += width;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// AST and parser
// ---------------------------------------------------------------------------

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ContextValue),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Deepest nesting the parser accepts before reporting a syntax error.
pub const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    // Each chained connective deepens the left-leaning tree by one level.
    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            self.enter()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            self.enter()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(ContextValue::Number(n))),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Number(n)) => Ok(Expr::Literal(ContextValue::Number(-n))),
                _ => {
                    self.pos -= 1;
                    Err(self.error("expected number after '-'"))
                }
            },
            Some(Token::Str(s)) => Ok(Expr::Literal(ContextValue::String(s))),
            Some(Token::True) => Ok(Expr::Literal(ContextValue::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(ContextValue::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(ContextValue::Null)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => {
                        self.pos -= 1;
                        Err(self.error("expected ')'"))
                    }
                }
            }
            Some(Token::Dollar) => match self.advance() {
                Some(Token::Ident(first)) => self.parse_path(first),
                _ => {
                    self.pos -= 1;
                    Err(self.error("expected identifier after '$'"))
                }
            },
            Some(Token::Ident(first)) => self.parse_path(first),
            Some(_) => {
                self.pos -= 1;
                Err(self.error("unexpected token"))
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_path(&mut self, first: String) -> Result<Expr, ExpressionError> {
        let mut segments = vec![first];
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            match self.advance() {
                Some(Token::Ident(segment)) => segments.push(segment),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected identifier after '.'"));
                }
            }
        }
        Ok(Expr::Path(segments))
    }
}

/// Parse an expression without evaluating it.
pub fn parse(expression: &str) -> Result<Expr, ExpressionError> {
    if expression.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: expression.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// WorkflowEvaluator
// ---------------------------------------------------------------------------

/// Evaluates condition expressions against an execution context.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowEvaluator;

impl WorkflowEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an expression and coerce the result to a boolean using
    /// JavaScript-like truthiness.
    pub fn evaluate_bool(
        &self,
        expression: &str,
        context: &ExecutionContext,
    ) -> Result<bool, ExpressionError> {
        Ok(self.evaluate_value(expression, context)?.is_truthy())
    }

    /// Evaluate an expression and return the raw value.
    pub fn evaluate_value(
        &self,
        expression: &str,
        context: &ExecutionContext,
    ) -> Result<ContextValue, ExpressionError> {
        let expr = parse(expression)?;
        eval(&expr, context)
    }
}

fn eval(expr: &Expr, context: &ExecutionContext) -> Result<ContextValue, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => lookup(segments, context),
        Expr::Not(inner) => Ok(ContextValue::Bool(!eval(inner, context)?.is_truthy())),
        Expr::And(left, right) => {
            let l = eval(left, context)?.is_truthy();
            Ok(ContextValue::Bool(l && eval(right, context)?.is_truthy()))
        }
        Expr::Or(left, right) => {
            let l = eval(left, context)?.is_truthy();
            Ok(ContextValue::Bool(l || eval(right, context)?.is_truthy()))
        }
        Expr::Compare(op, left, right) => {
            let l = eval(left, context)?;
            let r = eval(right, context)?;
            compare(*op, &l, &r).map(ContextValue::Bool)
        }
    }
}

fn lookup(segments: &[String], context: &ExecutionContext) -> Result<ContextValue, ExpressionError> {
    let mut path = segments.join(".");
    if segments.len() > 1 && segments[0] == "context" && !context.contains_key("context") {
        path = segments[1..].join(".");
    } else if segments.len() == 1 && segments[0] == "context" && !context.contains_key("context") {
        return Ok(context.to_value());
    }
    lookup_path(context.as_map(), &path)
        .cloned()
        .ok_or_else(|| ExpressionError::UnknownPath(segments.join(".")))
}

/// Parse the string side of a timestamp/string comparison.
fn string_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn compare(op: CompareOp, left: &ContextValue, right: &ContextValue) -> Result<bool, ExpressionError> {
    // A timestamp meets a string through the string's RFC 3339 instant.
    let instants = match (left, right) {
        (ContextValue::Timestamp(a), ContextValue::String(b)) => Some((Some(*a), string_instant(b))),
        (ContextValue::String(a), ContextValue::Timestamp(b)) => Some((string_instant(a), Some(*b))),
        _ => None,
    };

    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match instants {
                Some((Some(a), Some(b))) => a == b,
                Some(_) => false,
                None => left == right,
            };
            return Ok(equal == (op == CompareOp::Eq));
        }
        _ => {}
    }

    let ordering = match (left, right, instants) {
        (_, _, Some((Some(a), Some(b)))) => Some(a.cmp(&b)),
        (ContextValue::Number(a), ContextValue::Number(b), _) => a.partial_cmp(b),
        (ContextValue::String(a), ContextValue::String(b), _) => Some(a.cmp(b)),
        (ContextValue::Timestamp(a), ContextValue::Timestamp(b), _) => Some(a.cmp(b)),
        _ => {
            return Err(ExpressionError::TypeMismatch {
                op,
                left: left.type_name(),
                right: right.type_name(),
            });
        }
    };

    // NaN compares false on every ordering operator.
    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
