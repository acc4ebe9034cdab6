//! Recursive descent compiler for macro scripts.
//!
//! Transforms script text into a flat [`Sequence`]. Structured control flow
//! (`if`/`else`/`endif`, `while`/`endwhile`/`break`) is lowered onto hidden
//! labels named `__dsl_<purpose>_<n>`, and every jump is recorded as a fixup
//! that is resolved once the whole input has been read, so `goto` may refer
//! to labels defined later in the file.

use std::collections::HashMap;
use std::iter::Peekable;

use itertools::Itertools;

use crate::code::*;
use crate::error::CompileError;
use crate::keys;
use crate::lexer::{Keyword, Lexer, Operator, Token, TokenKind};

/// Prefix reserved for compiler-generated labels.
pub const HIDDEN_LABEL_PREFIX: &str = "__dsl_";

/// Compile a script into an instruction [`Sequence`].
///
/// Fails on the first problem found; there is no partial output.
pub fn compile(input: &str) -> Result<Sequence, CompileError> {
    let tokens = Lexer::new(input)
        .filter(|tok| {
            !matches!(
                tok,
                Ok(Token {
                    kind: TokenKind::Whitespace | TokenKind::Comment,
                    ..
                })
            )
        })
        .dedup_by(|a, b| is_eol(a) && is_eol(b));

    Compiler {
        tokens: tokens.peekable(),
        line: 1,
        output: Vec::new(),
        labels: HashMap::new(),
        fixups: Vec::new(),
        blocks: Vec::new(),
        next_id: 0,
    }
    .compile_program()
}

fn is_eol(tok: &Result<Token, CompileError>) -> bool {
    matches!(tok, Ok(Token { kind: TokenKind::Eol, .. }))
}

/// A jump whose target index is filled in after parsing.
struct Fixup {
    instruction: usize,
    target: String,
    line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Else,
    While,
}

impl BlockKind {
    fn keyword(self) -> &'static str {
        match self {
            BlockKind::If | BlockKind::Else => "if",
            BlockKind::While => "while",
        }
    }
}

/// An open structured block.
struct Block {
    kind: BlockKind,
    start_label: Option<String>,
    else_label: Option<String>,
    end_label: String,
    line: usize,
}

/// A parsed parameter inside `(...)`.
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Number(f64),
    Str(String),
    Word(String),
}

struct Compiler<I: Iterator<Item = Result<Token, CompileError>>> {
    tokens: Peekable<I>,
    /// Line of the most recently consumed token.
    line: usize,
    output: Vec<Instruction>,
    /// Lowercased label name to instruction index.
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    blocks: Vec<Block>,
    next_id: usize,
}

impl<I: Iterator<Item = Result<Token, CompileError>>> Compiler<I> {
    fn compile_program(mut self) -> Result<Sequence, CompileError> {
        while let Some(tok) = self.next_token()? {
            if tok.kind == TokenKind::Eol {
                continue;
            }
            self.compile_statement(tok)?;
            self.expect_end_of_statement()?;
        }

        if let Some(block) = self.blocks.last() {
            return Err(CompileError::new(
                format!(
                    "unterminated '{}' block opened at line {}",
                    block.kind.keyword(),
                    block.line
                ),
                block.line,
            ));
        }

        for fixup in &self.fixups {
            let Some(&index) = self.labels.get(&fixup.target.to_lowercase()) else {
                return Err(CompileError::new(
                    format!(
                        "undefined label '{}' referenced at line {}",
                        fixup.target, fixup.line
                    ),
                    fixup.line,
                ));
            };
            if let InstructionKind::Jump { target_index, .. } =
                &mut self.output[fixup.instruction].kind
            {
                *target_index = Some(index);
            }
        }

        Ok(Sequence::new(self.output))
    }

    /// Compile one statement, dispatching on its leading keyword.
    fn compile_statement(&mut self, tok: Token) -> Result<(), CompileError> {
        let kw = match tok.kind {
            TokenKind::Keyword(kw) => kw,
            TokenKind::Unknown => {
                return Err(self.error(format!("unexpected character '{}'", tok.text)));
            }
            _ => return Err(self.error(format!("unknown command '{}'", tok.text))),
        };

        match kw {
            Keyword::Delay => self.compile_delay(),
            Keyword::Mouse => self.compile_mouse(),
            Keyword::Key => self.compile_key(),
            Keyword::Script => self.compile_script(),
            Keyword::Exit => {
                self.emit(InstructionKind::Break);
                Ok(())
            }
            Keyword::If => self.compile_if(tok.line),
            Keyword::Else => self.compile_else(),
            Keyword::EndIf => self.compile_endif(),
            Keyword::While => self.compile_while(tok.line),
            Keyword::EndWhile => self.compile_endwhile(),
            Keyword::Break => self.compile_break(),
            Keyword::Label => self.compile_label(),
            Keyword::Goto => self.compile_goto(),
            Keyword::PixelColor | Keyword::Rgb | Keyword::Argb | Keyword::Custom => Err(self
                .error(format!(
                    "'{}' is only valid inside an if/while condition",
                    tok.text
                ))),
        }
    }

    // ---------------------------------------------------------------------
    // Atomic statements
    // ---------------------------------------------------------------------

    /// `Delay(ms)`
    fn compile_delay(&mut self) -> Result<(), CompileError> {
        let args = self.parse_args("Delay")?;
        let [Arg::Number(ms)] = args.as_slice() else {
            return Err(self.error("Delay expects one duration in milliseconds"));
        };
        if *ms < 0.0 {
            return Err(self.error("Delay duration must not be negative"));
        }
        if *ms > MAX_DELAY_MS {
            return Err(self.error(format!(
                "Delay duration must not exceed {} ms",
                MAX_DELAY_MS
            )));
        }
        self.emit(InstructionKind::Delay { duration_ms: *ms });
        Ok(())
    }

    /// `Mouse(action, x, y)` or `Mouse(Wheel, x, y, delta)`
    fn compile_mouse(&mut self) -> Result<(), CompileError> {
        let args = self.parse_args("Mouse")?;
        if args.len() != 3 && args.len() != 4 {
            return Err(self.error("Mouse expects (action, x, y) or (Wheel, x, y, delta)"));
        }
        let action = match &args[0] {
            Arg::Word(name) => keys::mouse_action(name)
                .ok_or_else(|| self.error(format!("unknown mouse action '{}'", name)))?,
            _ => return Err(self.error("Mouse expects an action name first")),
        };
        let x = self.int_arg(&args[1], "Mouse x")?;
        let y = self.int_arg(&args[2], "Mouse y")?;
        let wheel_delta = match args.get(3) {
            Some(arg) if action == MouseAction::Wheel => self.int_arg(arg, "Mouse wheel delta")?,
            Some(_) => {
                return Err(self.error("only Mouse(Wheel, ...) takes a fourth parameter"));
            }
            None => 0,
        };
        self.emit(InstructionKind::Mouse {
            action,
            x,
            y,
            wheel_delta,
        });
        Ok(())
    }

    /// `Key(Down|Up, key)` where key is a name or a numeric code.
    fn compile_key(&mut self) -> Result<(), CompileError> {
        let args = self.parse_args("Key")?;
        let [action, key] = args.as_slice() else {
            return Err(self.error("Key expects (action, key)"));
        };
        let action = match action {
            Arg::Word(name) => keys::key_action(name)
                .ok_or_else(|| self.error(format!("unknown key action '{}'", name)))?,
            _ => return Err(self.error("Key expects Down or Up first")),
        };
        let key = match key {
            Arg::Word(name) => {
                keys::key_code(name).ok_or_else(|| self.error(format!("unknown key '{}'", name)))?
            }
            Arg::Number(n) if n.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(n) => {
                KeyCode(*n as u16)
            }
            _ => return Err(self.error("Key expects a key name or code")),
        };
        self.emit(InstructionKind::Key { action, key });
        Ok(())
    }

    /// ``Script(`line`, `line`, ...)``
    fn compile_script(&mut self) -> Result<(), CompileError> {
        let args = self.parse_args("Script")?;
        if args.is_empty() {
            return Err(self.error("Script expects at least one line"));
        }
        let lines = args
            .into_iter()
            .map(|arg| match arg {
                Arg::Str(s) => Ok(s),
                _ => Err(self.error("Script lines must be backtick strings")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.emit(InstructionKind::Script { lines });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Structured control flow
    // ---------------------------------------------------------------------

    fn compile_if(&mut self, line: usize) -> Result<(), CompileError> {
        let (condition, negated) = self.parse_condition()?;
        let id = self.next_block_id();
        let then_label = hidden_label("then", id);
        let else_label = hidden_label("else", id);
        let end_label = hidden_label("endif", id);

        self.emit_branch(condition, &then_label, &else_label, negated);
        self.emit_label(then_label)?;
        self.blocks.push(Block {
            kind: BlockKind::If,
            start_label: None,
            else_label: Some(else_label),
            end_label,
            line,
        });
        Ok(())
    }

    fn compile_else(&mut self) -> Result<(), CompileError> {
        let block = match self.blocks.pop() {
            Some(block) if block.kind == BlockKind::If => block,
            _ => return Err(self.error("'else' without matching 'if'")),
        };
        self.emit_jump(block.end_label.clone());
        if let Some(else_label) = block.else_label {
            self.emit_label(else_label)?;
        }
        self.blocks.push(Block {
            kind: BlockKind::Else,
            start_label: None,
            else_label: None,
            end_label: block.end_label,
            line: block.line,
        });
        Ok(())
    }

    fn compile_endif(&mut self) -> Result<(), CompileError> {
        let block = match self.blocks.pop() {
            Some(block) if matches!(block.kind, BlockKind::If | BlockKind::Else) => block,
            _ => return Err(self.error("'endif' without matching 'if'")),
        };
        // A bare `if` still needs a landing point for its false branch.
        if let Some(else_label) = block.else_label {
            self.emit_label(else_label)?;
        }
        self.emit_label(block.end_label)
    }

    fn compile_while(&mut self, line: usize) -> Result<(), CompileError> {
        let (condition, negated) = self.parse_condition()?;
        let id = self.next_block_id();
        let start_label = hidden_label("while", id);
        let body_label = hidden_label("do", id);
        let end_label = hidden_label("endwhile", id);

        self.emit_label(start_label.clone())?;
        self.emit_branch(condition, &body_label, &end_label, negated);
        self.emit_label(body_label)?;
        self.blocks.push(Block {
            kind: BlockKind::While,
            start_label: Some(start_label),
            else_label: None,
            end_label,
            line,
        });
        Ok(())
    }

    fn compile_endwhile(&mut self) -> Result<(), CompileError> {
        let block = match self.blocks.pop() {
            Some(block) if block.kind == BlockKind::While => block,
            _ => return Err(self.error("'endwhile' without matching 'while'")),
        };
        if let Some(start_label) = block.start_label {
            self.emit_jump(start_label);
        }
        self.emit_label(block.end_label)
    }

    /// `break` leaves the nearest enclosing loop, however many `if` blocks
    /// sit between it and the loop.
    fn compile_break(&mut self) -> Result<(), CompileError> {
        let end_label = self
            .blocks
            .iter()
            .rev()
            .find(|block| block.kind == BlockKind::While)
            .map(|block| block.end_label.clone())
            .ok_or_else(|| self.error("'break' outside of a while loop"))?;
        self.emit_jump(end_label);
        Ok(())
    }

    fn compile_label(&mut self) -> Result<(), CompileError> {
        let name = self.user_label_name("label")?;
        self.emit_label(name)
    }

    fn compile_goto(&mut self) -> Result<(), CompileError> {
        let name = self.user_label_name("goto")?;
        self.emit_jump(name);
        Ok(())
    }

    /// Label name written by the user; the hidden prefix is reserved.
    fn user_label_name(&mut self, keyword: &str) -> Result<String, CompileError> {
        let name = self.expect_label_name(keyword)?;
        if name.to_lowercase().starts_with(HIDDEN_LABEL_PREFIX) {
            return Err(self.error(format!(
                "label names may not start with '{}'",
                HIDDEN_LABEL_PREFIX
            )));
        }
        Ok(name)
    }

    // ---------------------------------------------------------------------
    // Conditions
    // ---------------------------------------------------------------------

    /// Parse `(PixelColor(x, y) ==|!= RGB(...)|ARGB(...))` or ``(Custom(`expr`))``.
    ///
    /// Returns the condition and whether the comparison was `!=`.
    fn parse_condition(&mut self) -> Result<(Condition, bool), CompileError> {
        self.expect(TokenKind::LParen, "'(' before the condition")?;
        let tok = self.expect_any("a condition")?;
        let parsed = match tok.kind {
            TokenKind::Keyword(Keyword::PixelColor) => self.parse_pixel_condition()?,
            TokenKind::Keyword(Keyword::Custom) => {
                let args = self.parse_args("Custom")?;
                let [Arg::Str(source)] = args.as_slice() else {
                    return Err(self.error("Custom expects one backtick expression"));
                };
                (
                    Condition::Expression {
                        source: source.clone(),
                    },
                    false,
                )
            }
            _ => {
                return Err(self.error(format!(
                    "expected PixelColor(...) or Custom(...) condition, found '{}'",
                    tok.text
                )));
            }
        };
        self.expect(TokenKind::RParen, "')' after the condition")?;
        Ok(parsed)
    }

    fn parse_pixel_condition(&mut self) -> Result<(Condition, bool), CompileError> {
        let args = self.parse_args("PixelColor")?;
        let [x, y] = args.as_slice() else {
            return Err(self.error("PixelColor expects (x, y)"));
        };
        let x = self.int_arg(x, "PixelColor x")?;
        let y = self.int_arg(y, "PixelColor y")?;

        let op = self.expect_any("'==' or '!='")?;
        let negated = match op.kind {
            TokenKind::Operator(Operator::Eq) => false,
            TokenKind::Operator(Operator::Ne) => true,
            _ => return Err(self.error("expected '==' or '!=' after PixelColor(...)")),
        };

        let color_tok = self.expect_any("RGB(...) or ARGB(...)")?;
        let (channels, name) = match color_tok.kind {
            TokenKind::Keyword(Keyword::Rgb) => (3, "RGB"),
            TokenKind::Keyword(Keyword::Argb) => (4, "ARGB"),
            _ => return Err(self.error("expected RGB(...) or ARGB(...)")),
        };
        let args = self.parse_args(name)?;
        if args.len() != channels && args.len() != channels + 1 {
            return Err(self.error(format!(
                "{} expects {} components and an optional tolerance",
                name, channels
            )));
        }
        let values = args
            .iter()
            .map(|arg| self.byte_arg(arg, name))
            .collect::<Result<Vec<_>, _>>()?;
        let (color, tolerance) = if channels == 3 {
            (
                Color::rgb(values[0], values[1], values[2]),
                values.get(3).copied(),
            )
        } else {
            (
                Color::argb(values[0], values[1], values[2], values[3]),
                values.get(4).copied(),
            )
        };
        Ok((
            Condition::Pixel {
                x,
                y,
                color,
                tolerance: tolerance.unwrap_or(0),
            },
            negated,
        ))
    }

    // ---------------------------------------------------------------------
    // Emission
    // ---------------------------------------------------------------------

    fn emit(&mut self, kind: InstructionKind) -> usize {
        self.output.push(Instruction::new(kind));
        self.output.len() - 1
    }

    /// Emit a label marker and register it.
    fn emit_label(&mut self, name: String) -> Result<(), CompileError> {
        let key = name.to_lowercase();
        if self.labels.contains_key(&key) {
            return Err(self.error(format!("duplicate label '{}'", name)));
        }
        let index = self.emit(InstructionKind::Label { name });
        self.labels.insert(key, index);
        Ok(())
    }

    /// Emit an unconditional jump and queue its fixup.
    fn emit_jump(&mut self, target: String) {
        let instruction = self.emit(InstructionKind::Jump {
            target_name: Some(target.clone()),
            target_index: None,
        });
        self.fixups.push(Fixup {
            instruction,
            target,
            line: self.line,
        });
    }

    /// `!=` is lowered by swapping which label is the true target.
    fn emit_branch(&mut self, condition: Condition, on_true: &str, on_false: &str, negated: bool) {
        let (on_true, on_false) = if negated {
            (on_false, on_true)
        } else {
            (on_true, on_false)
        };
        self.emit(InstructionKind::Branch {
            condition,
            true_target: BranchTarget::label(on_true),
            false_target: BranchTarget::label(on_false),
        });
    }

    fn next_block_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---------------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------------

    fn next_token(&mut self) -> Result<Option<Token>, CompileError> {
        let tok = self.tokens.next().transpose()?;
        if let Some(tok) = &tok {
            self.line = tok.line;
        }
        Ok(tok)
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>, CompileError> {
        match self.tokens.peek() {
            None => Ok(None),
            Some(Ok(tok)) => Ok(Some(tok.kind)),
            Some(Err(err)) => Err(err.clone()),
        }
    }

    fn expect_any(&mut self, what: &str) -> Result<Token, CompileError> {
        match self.next_token()? {
            Some(tok) if tok.kind != TokenKind::Eol => Ok(tok),
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CompileError> {
        let tok = self.expect_any(what)?;
        if tok.kind != kind {
            return Err(self.error(format!("expected {}, found '{}'", what, tok.text)));
        }
        Ok(tok)
    }

    fn expect_label_name(&mut self, cmd: &str) -> Result<String, CompileError> {
        let tok = self.expect_any("a label name")?;
        match tok.kind {
            TokenKind::Ident => Ok(tok.text),
            _ => Err(self.error(format!("'{}' expects a label name, found '{}'", cmd, tok.text))),
        }
    }

    fn expect_end_of_statement(&mut self) -> Result<(), CompileError> {
        match self.next_token()? {
            None => Ok(()),
            Some(tok) if tok.kind == TokenKind::Eol => Ok(()),
            Some(tok) => Err(self.error(format!("unexpected '{}' after statement", tok.text))),
        }
    }

    /// Parse a parenthesized, comma-separated parameter list.
    fn parse_args(&mut self, cmd: &str) -> Result<Vec<Arg>, CompileError> {
        self.expect(TokenKind::LParen, &format!("'(' after {}", cmd))?;
        let mut args = Vec::new();
        if self.peek_kind()? == Some(TokenKind::RParen) {
            self.next_token()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_arg(cmd)?);
            let tok = self.expect_any(&format!("',' or ')' in {} parameters", cmd))?;
            match tok.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => {
                    return Err(self.error(format!(
                        "malformed parameter list for {}: unexpected '{}'",
                        cmd, tok.text
                    )));
                }
            }
        }
    }

    fn parse_arg(&mut self, cmd: &str) -> Result<Arg, CompileError> {
        let tok = self.expect_any(&format!("a parameter for {}", cmd))?;
        match tok.kind {
            TokenKind::Operator(Operator::Minus) => {
                let num = self.expect(TokenKind::Number, "a number after '-'")?;
                Ok(Arg::Number(-self.number(&num)?))
            }
            TokenKind::Number => Ok(Arg::Number(self.number(&tok)?)),
            TokenKind::Str => Ok(Arg::Str(tok.text)),
            TokenKind::Ident | TokenKind::Keyword(_) => Ok(Arg::Word(tok.text)),
            _ => Err(self.error(format!(
                "malformed parameter list for {}: unexpected '{}'",
                cmd, tok.text
            ))),
        }
    }

    fn number(&self, tok: &Token) -> Result<f64, CompileError> {
        tok.text
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number '{}'", tok.text)))
    }

    fn int_arg(&self, arg: &Arg, what: &str) -> Result<i32, CompileError> {
        match arg {
            Arg::Number(n)
                if n.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(n) =>
            {
                Ok(*n as i32)
            }
            _ => Err(self.error(format!("{} must be an integer", what))),
        }
    }

    fn byte_arg(&self, arg: &Arg, what: &str) -> Result<u8, CompileError> {
        match arg {
            Arg::Number(n) if n.fract() == 0.0 && (0.0..=255.0).contains(n) => Ok(*n as u8),
            _ => Err(self.error(format!("{} components must be integers 0..=255", what))),
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.line)
    }
}

fn hidden_label(purpose: &str, id: usize) -> String {
    format!("{}{}_{}", HIDDEN_LABEL_PREFIX, purpose, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to compile and return the instructions vec
    fn compile_ok(input: &str) -> Vec<Instruction> {
        compile(input).unwrap().instructions().to_vec()
    }

    fn compile_err(input: &str) -> CompileError {
        compile(input).unwrap_err()
    }

    fn kinds(input: &str) -> Vec<InstructionKind> {
        compile_ok(input).into_iter().map(|i| i.kind).collect()
    }

    fn label_index(instrs: &[Instruction], name: &str) -> usize {
        instrs
            .iter()
            .position(|i| i.target_name() == Some(name))
            .unwrap_or_else(|| panic!("no label {}", name))
    }

    fn jump_index(instr: &Instruction) -> usize {
        match &instr.kind {
            InstructionKind::Jump {
                target_index: Some(index),
                ..
            } => *index,
            other => panic!("expected resolved Jump, got {:?}", other),
        }
    }

    // --- Atomic statements ---

    #[test]
    fn test_delay() {
        assert_eq!(
            kinds("Delay(250)"),
            vec![InstructionKind::Delay { duration_ms: 250.0 }]
        );
    }

    #[test]
    fn test_delay_too_long() {
        let err = compile_err("Delay(1)
Delay(10000000000000000000000)");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("must not exceed"), "got: {}", err);
        assert_eq!(
            kinds("Delay(86400000)"),
            vec![InstructionKind::Delay { duration_ms: MAX_DELAY_MS }]
        );
    }

    #[test]
    fn test_mouse_move_negative() {
        assert_eq!(
            kinds("Mouse(Move, -10, 5)"),
            vec![InstructionKind::Mouse {
                action: MouseAction::Move,
                x: -10,
                y: 5,
                wheel_delta: 0,
            }]
        );
    }

    #[test]
    fn test_mouse_wheel_delta() {
        match &kinds("mouse(wheel, 0, 0, -120)")[0] {
            InstructionKind::Mouse {
                action,
                wheel_delta,
                ..
            } => {
                assert_eq!(*action, MouseAction::Wheel);
                assert_eq!(*wheel_delta, -120);
            }
            other => panic!("expected Mouse, got {:?}", other),
        }
    }

    #[test]
    fn test_mouse_fourth_param_only_for_wheel() {
        let err = compile_err("Mouse(LeftDown, 1, 2, 3)");
        assert!(err.message.contains("fourth parameter"), "got: {}", err);
    }

    #[test]
    fn test_key_by_name_and_code() {
        assert_eq!(
            kinds("Key(Down, Return)\nKey(Up, 65)"),
            vec![
                InstructionKind::Key {
                    action: KeyAction::Down,
                    key: KeyCode(0x0D),
                },
                InstructionKind::Key {
                    action: KeyAction::Up,
                    key: KeyCode(65),
                },
            ]
        );
    }

    #[test]
    fn test_script_lines() {
        assert_eq!(
            kinds("Script(`$a = 1`, `$b = $a + 1`)"),
            vec![InstructionKind::Script {
                lines: vec!["$a = 1".to_string(), "$b = $a + 1".to_string()],
            }]
        );
    }

    #[test]
    fn test_exit_is_break() {
        assert_eq!(kinds("Exit"), vec![InstructionKind::Break]);
    }

    #[test]
    fn test_compiled_gaps_are_zero() {
        for instr in compile_ok("Delay(5)\nKey(Down, A)") {
            assert_eq!(instr.time_since_previous_ms, 0.0);
        }
    }

    // --- Comments and whitespace ---

    #[test]
    fn test_comments_and_blank_lines() {
        let instrs = compile_ok("// header\n\n\nDelay(1)   // trailing\n\r\n\nDelay(2)\n");
        assert_eq!(instrs.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(compile_ok("").is_empty());
        assert!(compile_ok("  \n\n").is_empty());
    }

    // --- Labels and goto ---

    #[test]
    fn test_forward_goto() {
        let instrs = compile_ok("goto Ahead\nDelay(1)\nlabel Ahead");
        assert_eq!(instrs.len(), 3);
        assert_eq!(jump_index(&instrs[0]), 2);
        assert_eq!(instrs[2].target_name(), Some("Ahead"));
    }

    #[test]
    fn test_backward_goto_case_insensitive() {
        let instrs = compile_ok("label Top\nDelay(1)\ngoto TOP");
        assert_eq!(jump_index(&instrs[2]), 0);
    }

    #[test]
    fn test_duplicate_label_cites_second_line() {
        let err = compile_err("label X\nDelay(1)\n\nlabel x");
        assert_eq!(err.line, 4);
        assert!(err.message.contains("duplicate label"), "got: {}", err);
    }

    #[test]
    fn test_undefined_label() {
        let err = compile_err("Delay(1)\ngoto Nowhere");
        assert_eq!(err.line, 2);
        assert_eq!(
            err.message,
            "undefined label 'Nowhere' referenced at line 2"
        );
    }

    #[test]
    fn test_hidden_prefix_rejected() {
        let err = compile_err("label __DSL_then_0");
        assert!(err.message.contains("may not start with"), "got: {}", err);
    }

    #[test]
    fn test_goto_hidden_label_rejected() {
        let err = compile_err("while (Custom(`true`))
goto __dsl_endwhile_0
endwhile");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("may not start with"), "got: {}", err);
    }

    // --- if / else ---

    #[test]
    fn test_unclosed_if_cites_if_line() {
        let err = compile_err("Delay(1)\nif (Custom(`true`))\nDelay(2)");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unterminated"), "got: {}", err);
    }

    #[test]
    fn test_if_else_lowering() {
        let instrs = compile_ok(
            "if (Custom(`true`))\n  Delay(1)\nelse\n  Delay(2)\nendif",
        );
        let InstructionKind::Branch {
            condition,
            true_target,
            false_target,
        } = &instrs[0].kind
        else {
            panic!("expected Branch, got {:?}", instrs[0].kind);
        };
        assert_eq!(
            *condition,
            Condition::Expression {
                source: "true".to_string()
            }
        );
        let then_at = label_index(&instrs, true_target.name.as_deref().unwrap());
        let else_at = label_index(&instrs, false_target.name.as_deref().unwrap());
        let delay1 = instrs
            .iter()
            .position(|i| i.kind == InstructionKind::Delay { duration_ms: 1.0 })
            .unwrap();
        let delay2 = instrs
            .iter()
            .position(|i| i.kind == InstructionKind::Delay { duration_ms: 2.0 })
            .unwrap();
        assert!(then_at < delay1 && delay1 < else_at);
        assert!(else_at < delay2);

        // The first block ends with a jump to the shared end label.
        let end_at = jump_index(&instrs[delay1 + 1]);
        assert!(end_at > delay2);
        assert!(matches!(instrs[end_at].kind, InstructionKind::Label { .. }));
        assert_eq!(end_at, instrs.len() - 1);
    }

    #[test]
    fn test_bare_if_emits_else_landing() {
        let instrs = compile_ok("if (Custom(`x`))\nDelay(1)\nendif");
        let InstructionKind::Branch { false_target, .. } = &instrs[0].kind else {
            panic!("expected Branch");
        };
        let else_at = label_index(&instrs, false_target.name.as_deref().unwrap());
        assert!(else_at > 2);
        assert_eq!(instrs.len(), 5);
    }

    #[test]
    fn test_pixel_not_equal_swaps_targets() {
        let eq = compile_ok("if (PixelColor(1, 2) == RGB(255, 0, 0))\nendif");
        let ne = compile_ok("if (PixelColor(1, 2) != RGB(255, 0, 0, 10))\nendif");
        let (
            InstructionKind::Branch {
                true_target: eq_true,
                false_target: eq_false,
                ..
            },
            InstructionKind::Branch {
                condition,
                true_target: ne_true,
                false_target: ne_false,
            },
        ) = (&eq[0].kind, &ne[0].kind)
        else {
            panic!("expected branches");
        };
        assert_eq!(eq_true, ne_false);
        assert_eq!(eq_false, ne_true);
        assert_eq!(
            *condition,
            Condition::Pixel {
                x: 1,
                y: 2,
                color: Color::rgb(255, 0, 0),
                tolerance: 10,
            }
        );
    }

    #[test]
    fn test_argb_condition() {
        let instrs = compile_ok("while (PixelColor(0, 0) == ARGB(128, 1, 2, 3))\nendwhile");
        match &instrs[1].kind {
            InstructionKind::Branch {
                condition: Condition::Pixel { color, tolerance, .. },
                ..
            } => {
                assert_eq!(*color, Color::argb(128, 1, 2, 3));
                assert_eq!(*tolerance, 0);
            }
            other => panic!("expected pixel Branch, got {:?}", other),
        }
    }

    #[test]
    fn test_color_component_out_of_range() {
        let err = compile_err("if (PixelColor(0, 0) == RGB(256, 0, 0))\nendif");
        assert!(err.message.contains("0..=255"), "got: {}", err);
    }

    #[test]
    fn test_else_without_if() {
        let err = compile_err("Delay(1)\nelse");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("'else' without matching 'if'"));
    }

    #[test]
    fn test_endif_closing_while() {
        let err = compile_err("while (Custom(`1`))\nendif");
        assert!(err.message.contains("'endif' without matching 'if'"));
    }

    // --- while / break ---

    #[test]
    fn test_while_lowering() {
        let instrs = compile_ok("while (Custom(`go`))\nDelay(1)\nendwhile");
        // start label, branch, body label, delay, jump back, end label
        assert_eq!(instrs.len(), 6);
        assert!(matches!(instrs[0].kind, InstructionKind::Label { .. }));
        assert_eq!(jump_index(&instrs[4]), 0);
        let InstructionKind::Branch {
            true_target,
            false_target,
            ..
        } = &instrs[1].kind
        else {
            panic!("expected Branch");
        };
        assert_eq!(label_index(&instrs, true_target.name.as_deref().unwrap()), 2);
        assert_eq!(label_index(&instrs, false_target.name.as_deref().unwrap()), 5);
    }

    #[test]
    fn test_break_outside_while() {
        let err = compile_err("if (Custom(`1`))\nbreak\nendif");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("outside of a while loop"));
    }

    #[test]
    fn test_break_skips_nested_if_blocks() {
        let instrs = compile_ok(
            "while (Custom(`1`))\n\
             if (Custom(`2`))\n\
             if (Custom(`3`))\n\
             break\n\
             endif\n\
             endif\n\
             endwhile\n\
             Delay(9)",
        );
        let break_jump = instrs
            .iter()
            .find(|i| {
                matches!(&i.kind, InstructionKind::Jump { target_name: Some(n), .. }
                    if n.starts_with("__dsl_endwhile"))
            })
            .unwrap();
        let target = jump_index(break_jump);
        assert_eq!(instrs[target].target_name(), Some("__dsl_endwhile_0"));
        assert_eq!(
            instrs[target + 1].kind,
            InstructionKind::Delay { duration_ms: 9.0 }
        );
    }

    #[test]
    fn test_break_targets_innermost_loop() {
        let instrs = compile_ok(
            "while (Custom(`a`))\nwhile (Custom(`b`))\nbreak\nendwhile\nendwhile",
        );
        let break_jump = instrs
            .iter()
            .find(|i| {
                matches!(&i.kind, InstructionKind::Jump { target_name: Some(n), .. }
                    if n == "__dsl_endwhile_1")
            })
            .unwrap();
        assert_eq!(
            instrs[jump_index(break_jump)].target_name(),
            Some("__dsl_endwhile_1")
        );
    }

    #[test]
    fn test_unterminated_while() {
        let err = compile_err("\n\nwhile (Custom(`1`))\nDelay(1)");
        assert_eq!(err.line, 3);
        assert!(err.message.contains("'while'"), "got: {}", err);
    }

    // --- Error cases ---

    #[test]
    fn test_unknown_command() {
        let err = compile_err("Click(1)");
        assert!(err.message.contains("unknown command 'Click'"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = compile_err("Delay(1)\n#");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unexpected character"));
    }

    #[test]
    fn test_malformed_parameter_list() {
        let err = compile_err("Delay(1 2)");
        assert!(err.message.contains("malformed parameter list"), "got: {}", err);
        let err = compile_err("Mouse(Move, 1)");
        assert!(err.message.contains("Mouse expects"), "got: {}", err);
    }

    #[test]
    fn test_unknown_key_name() {
        let err = compile_err("Key(Down, Hyper)");
        assert!(err.message.contains("unknown key 'Hyper'"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = compile_err("Delay(1) Delay(2)");
        assert!(err.message.contains("after statement"), "got: {}", err);
    }

    #[test]
    fn test_lexical_error_surfaces() {
        let err = compile_err("Delay(1)\nScript(`oops\n`)");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn test_condition_keyword_as_statement() {
        let err = compile_err("RGB(1, 2, 3)");
        assert!(err.message.contains("only valid inside"));
    }
}
