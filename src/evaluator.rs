//! Expression evaluation for `Script` lines and `Custom` conditions.
//!
//! The scheduler only depends on the [`Evaluator`] trait. [`ScriptEngine`] is
//! the built-in implementation: a small expression language tokenized by the
//! script [`Lexer`], evaluated directly while parsing.
//!
//! ```text
//! statement := $name = expr | expr
//! expr      := sum (('==' | '!=') sum)*
//! sum       := product (('+' | '-') product)*
//! product   := unary (('*' | '/') unary)*
//! unary     := '-' unary | primary
//! primary   := number | `text` | $name | true | false | nil
//!            | name '(' [expr (',' expr)*] ')' | '(' expr ')'
//! ```

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::code::KeyCode;
use crate::keys;
use crate::lexer::{Lexer, Operator, Token, TokenKind};
use crate::simulator::{Simulator, SimulatorError};

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Boolean coercion used by conditions.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },
    #[error("undefined variable '${0}'")]
    UndefinedVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{name}() expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error(transparent)]
    Output(#[from] SimulatorError),
}

/// Text accessor exposed to scripts as `clipboard()` and `set_clipboard()`.
pub trait Clipboard {
    fn get_text(&self) -> String;
    fn set_text(&mut self, text: String);
}

/// Process-local clipboard.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard(String);

impl Clipboard for MemoryClipboard {
    fn get_text(&self) -> String {
        self.0.clone()
    }

    fn set_text(&mut self, text: String) {
        self.0 = text;
    }
}

/// Host objects reachable from script text.
pub struct Bindings<'a> {
    pub simulator: &'a mut dyn Simulator,
    pub clipboard: &'a mut dyn Clipboard,
}

pub trait Evaluator {
    /// Evaluate one line of script text.
    fn evaluate(&mut self, expr: &str, bindings: &mut Bindings<'_>) -> Result<Value, EvalError>;
}

/// Built-in evaluator. Variables live as long as the engine.
#[derive(Debug, Default)]
pub struct ScriptEngine {
    variables: HashMap<String, Value>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

impl Evaluator for ScriptEngine {
    fn evaluate(&mut self, expr: &str, bindings: &mut Bindings<'_>) -> Result<Value, EvalError> {
        let tokens = Lexer::new(expr)
            .filter(|tok| {
                !matches!(
                    tok,
                    Ok(Token {
                        kind: TokenKind::Whitespace | TokenKind::Comment,
                        ..
                    })
                )
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| EvalError::Syntax {
                column: 1,
                message: err.message,
            })?;
        let end_column = expr.chars().count() + 1;
        let mut cur = Cursor {
            tokens,
            pos: 0,
            end_column,
        };

        let value = match (cur.peek_kind(0), cur.peek_kind(1)) {
            (Some(TokenKind::Variable), Some(TokenKind::Operator(Operator::Assign))) => {
                let name = cur.bump().map(|t| t.text).unwrap_or_default();
                cur.bump();
                let value = self.expr(&mut cur, bindings)?;
                self.variables.insert(name, value.clone());
                value
            }
            (None, _) => return Err(cur.error("empty expression")),
            _ => self.expr(&mut cur, bindings)?,
        };

        if let Some(tok) = cur.peek() {
            return Err(cur.error(format!("unexpected '{}'", tok.text)));
        }
        Ok(value)
    }
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
    end_column: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self, ahead: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind(0) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            column: self.peek().map_or(self.end_column, |t| t.column),
            message: message.into(),
        }
    }
}

impl ScriptEngine {
    fn expr(&mut self, cur: &mut Cursor, b: &mut Bindings<'_>) -> Result<Value, EvalError> {
        let mut lhs = self.sum(cur, b)?;
        loop {
            let negate = match cur.peek_kind(0) {
                Some(TokenKind::Operator(Operator::Eq)) => false,
                Some(TokenKind::Operator(Operator::Ne)) => true,
                _ => return Ok(lhs),
            };
            cur.bump();
            let rhs = self.sum(cur, b)?;
            lhs = Value::Bool((lhs == rhs) != negate);
        }
    }

    fn sum(&mut self, cur: &mut Cursor, b: &mut Bindings<'_>) -> Result<Value, EvalError> {
        let mut lhs = self.product(cur, b)?;
        loop {
            let op = match cur.peek_kind(0) {
                Some(TokenKind::Operator(op @ (Operator::Plus | Operator::Minus))) => op,
                _ => return Ok(lhs),
            };
            cur.bump();
            let rhs = self.product(cur, b)?;
            lhs = match (op, lhs, rhs) {
                (Operator::Plus, Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                (Operator::Plus, l @ Value::Text(_), r)
                | (Operator::Plus, l, r @ Value::Text(_)) => {
                    Value::Text(format!("{}{}", l, r))
                }
                (Operator::Minus, Value::Number(x), Value::Number(y)) => Value::Number(x - y),
                (op, l, r) => return Err(binary_type_error(op, &l, &r)),
            };
        }
    }

    fn product(&mut self, cur: &mut Cursor, b: &mut Bindings<'_>) -> Result<Value, EvalError> {
        let mut lhs = self.unary(cur, b)?;
        loop {
            let op = match cur.peek_kind(0) {
                Some(TokenKind::Operator(op @ (Operator::Star | Operator::Slash))) => op,
                _ => return Ok(lhs),
            };
            cur.bump();
            let rhs = self.unary(cur, b)?;
            lhs = match (op, lhs, rhs) {
                (Operator::Star, Value::Number(x), Value::Number(y)) => Value::Number(x * y),
                (Operator::Slash, Value::Number(_), Value::Number(y)) if y == 0.0 => {
                    return Err(EvalError::DivisionByZero);
                }
                (Operator::Slash, Value::Number(x), Value::Number(y)) => Value::Number(x / y),
                (op, l, r) => return Err(binary_type_error(op, &l, &r)),
            };
        }
    }

    fn unary(&mut self, cur: &mut Cursor, b: &mut Bindings<'_>) -> Result<Value, EvalError> {
        if cur.eat(TokenKind::Operator(Operator::Minus)) {
            return match self.unary(cur, b)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(EvalError::Type(format!(
                    "cannot negate a {}",
                    other.type_name()
                ))),
            };
        }
        self.primary(cur, b)
    }

    fn primary(&mut self, cur: &mut Cursor, b: &mut Bindings<'_>) -> Result<Value, EvalError> {
        let Some(tok) = cur.bump() else {
            return Err(cur.error("expected a value"));
        };
        match tok.kind {
            TokenKind::Number => tok
                .text
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| EvalError::Syntax {
                    column: tok.column,
                    message: format!("invalid number '{}'", tok.text),
                }),
            TokenKind::Str => Ok(Value::Text(tok.text)),
            TokenKind::Variable => self
                .variables
                .get(&tok.text)
                .cloned()
                .ok_or(EvalError::UndefinedVariable(tok.text)),
            TokenKind::LParen => {
                let value = self.expr(cur, b)?;
                if !cur.eat(TokenKind::RParen) {
                    return Err(cur.error("expected ')'"));
                }
                Ok(value)
            }
            TokenKind::Ident | TokenKind::Keyword(_)
                if cur.peek_kind(0) == Some(TokenKind::LParen) =>
            {
                cur.bump();
                let mut args = Vec::new();
                if !cur.eat(TokenKind::RParen) {
                    loop {
                        args.push(self.expr(cur, b)?);
                        if cur.eat(TokenKind::Comma) {
                            continue;
                        }
                        if cur.eat(TokenKind::RParen) {
                            break;
                        }
                        return Err(cur.error("expected ',' or ')' in argument list"));
                    }
                }
                call(&tok.text.to_ascii_lowercase(), args, b)
            }
            TokenKind::Ident => match tok.text.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "nil" => Ok(Value::Nil),
                _ => Err(EvalError::Syntax {
                    column: tok.column,
                    message: format!("unexpected word '{}'", tok.text),
                }),
            },
            _ => Err(EvalError::Syntax {
                column: tok.column,
                message: format!("unexpected '{}'", tok.text),
            }),
        }
    }
}

fn binary_type_error(op: Operator, lhs: &Value, rhs: &Value) -> EvalError {
    let symbol = match op {
        Operator::Plus => "+",
        Operator::Minus => "-",
        Operator::Star => "*",
        Operator::Slash => "/",
        Operator::Assign => "=",
        Operator::Eq => "==",
        Operator::Ne => "!=",
    };
    EvalError::Type(format!(
        "cannot apply '{}' to {} and {}",
        symbol,
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Dispatch a built-in function.
fn call(name: &str, args: Vec<Value>, b: &mut Bindings<'_>) -> Result<Value, EvalError> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::Arity {
                name: name.to_string(),
                expected,
                found: args.len(),
            })
        }
    };

    match name {
        "clipboard" => {
            arity(0)?;
            Ok(Value::Text(b.clipboard.get_text()))
        }
        "set_clipboard" => {
            arity(1)?;
            b.clipboard.set_text(args[0].to_string());
            Ok(Value::Nil)
        }
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::Text(s) => Ok(Value::Number(s.chars().count() as f64)),
                other => Err(EvalError::Type(format!(
                    "len() expects text, got {}",
                    other.type_name()
                ))),
            }
        }
        "key_down" | "key_up" => {
            arity(1)?;
            let key = key_arg(&args[0])?;
            if name == "key_down" {
                b.simulator.key_down(key)?;
            } else {
                b.simulator.key_up(key)?;
            }
            Ok(Value::Nil)
        }
        "mouse_move" | "mouse_move_to" => {
            arity(2)?;
            let x = int_arg(&args[0], name)?;
            let y = int_arg(&args[1], name)?;
            if name == "mouse_move" {
                b.simulator.mouse_move(x, y)?;
            } else {
                b.simulator.mouse_move_to(x, y)?;
            }
            Ok(Value::Nil)
        }
        "mouse_down" | "mouse_up" => {
            arity(1)?;
            let button = match &args[0] {
                Value::Text(s) => keys::mouse_button(s)
                    .ok_or_else(|| EvalError::Type(format!("unknown mouse button '{}'", s)))?,
                other => {
                    return Err(EvalError::Type(format!(
                        "{}() expects a button name, got {}",
                        name,
                        other.type_name()
                    )));
                }
            };
            if name == "mouse_down" {
                b.simulator.mouse_down(button)?;
            } else {
                b.simulator.mouse_up(button)?;
            }
            Ok(Value::Nil)
        }
        "mouse_wheel" => {
            arity(1)?;
            b.simulator.mouse_wheel(int_arg(&args[0], name)?)?;
            Ok(Value::Nil)
        }
        "release_all" => {
            arity(0)?;
            b.simulator.release_all_keys()?;
            b.simulator.release_all_mouse()?;
            Ok(Value::Nil)
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn int_arg(value: &Value, func: &str) -> Result<i32, EvalError> {
    match value {
        Value::Number(n) if n.is_finite() => Ok(n.round() as i32),
        other => Err(EvalError::Type(format!(
            "{}() expects numbers, got {}",
            func,
            other.type_name()
        ))),
    }
}

fn key_arg(value: &Value) -> Result<KeyCode, EvalError> {
    match value {
        Value::Text(name) => {
            keys::key_code(name).ok_or_else(|| EvalError::Type(format!("unknown key '{}'", name)))
        }
        Value::Number(n) if n.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(n) => {
            Ok(KeyCode(*n as u16))
        }
        other => Err(EvalError::Type(format!(
            "expected a key name or code, got {}",
            other.type_name()
        ))),
    }
}
