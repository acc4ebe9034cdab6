//! Lazy tokenizer for macro scripts.
//!
//! Produces every token, including whitespace, end-of-line and comments; the
//! compiler decides what to drop. Positions are 1-based and columns count
//! characters, not bytes.

use std::iter::Peekable;
use std::str::Chars;

use itertools::Itertools;
use phf::{Map, phf_map};

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token. String literals hold their raw content
    /// without backticks and variables their name without `$`.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Eol,
    Comment,
    Operator(Operator),
    LParen,
    RParen,
    Comma,
    Str,
    Variable,
    Number,
    Keyword(Keyword),
    Ident,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Assign,
    Eq,
    Ne,
    Plus,
    Minus,
    Star,
    Slash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Delay,
    Mouse,
    Key,
    Script,
    Exit,
    If,
    Else,
    EndIf,
    While,
    EndWhile,
    Break,
    Label,
    Goto,
    PixelColor,
    Rgb,
    Argb,
    Custom,
}

const KEYWORDS: Map<&'static str, Keyword> = phf_map! {
    "argb" => Keyword::Argb,
    "break" => Keyword::Break,
    "custom" => Keyword::Custom,
    "delay" => Keyword::Delay,
    "else" => Keyword::Else,
    "endif" => Keyword::EndIf,
    "endwhile" => Keyword::EndWhile,
    "exit" => Keyword::Exit,
    "goto" => Keyword::Goto,
    "if" => Keyword::If,
    "key" => Keyword::Key,
    "label" => Keyword::Label,
    "mouse" => Keyword::Mouse,
    "pixelcolor" => Keyword::PixelColor,
    "rgb" => Keyword::Rgb,
    "script" => Keyword::Script,
    "while" => Keyword::While,
};

/// Case-insensitive keyword lookup.
pub fn keyword(word: &str) -> Option<Keyword> {
    KEYWORDS.get(word.to_ascii_lowercase().as_str()).copied()
}

/// Single-pass tokenizer over script text.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.column += 1;
        Some(ch)
    }

    fn next_token(&mut self) -> Result<Option<Token>, CompileError> {
        let (line, column) = (self.line, self.column);
        let Some(ch) = self.bump() else {
            return Ok(None);
        };
        let token = |kind, text: String| Token {
            kind,
            text,
            line,
            column,
        };

        let tok = match ch {
            ' ' | '\t' => {
                let mut text = ch.to_string();
                while let Some(&c) = self.chars.peek() {
                    if c != ' ' && c != '\t' {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                token(TokenKind::Whitespace, text)
            }
            '\n' | '\r' => {
                if ch == '\r' && self.chars.peek() == Some(&'\n') {
                    self.chars.next();
                }
                self.line += 1;
                self.column = 1;
                token(TokenKind::Eol, "\n".to_string())
            }
            '/' if self.chars.peek() == Some(&'/') => {
                let text: String = self
                    .chars
                    .peeking_take_while(|&c| c != '\n' && c != '\r')
                    .collect();
                self.column += text.chars().count();
                token(TokenKind::Comment, format!("/{}", text))
            }
            '=' | '!' if self.chars.peek() == Some(&'=') => {
                self.bump();
                let op = if ch == '=' { Operator::Eq } else { Operator::Ne };
                token(TokenKind::Operator(op), format!("{}=", ch))
            }
            '=' => token(TokenKind::Operator(Operator::Assign), "=".to_string()),
            '+' => token(TokenKind::Operator(Operator::Plus), "+".to_string()),
            '-' => token(TokenKind::Operator(Operator::Minus), "-".to_string()),
            '*' => token(TokenKind::Operator(Operator::Star), "*".to_string()),
            '/' => token(TokenKind::Operator(Operator::Slash), "/".to_string()),
            '(' => token(TokenKind::LParen, "(".to_string()),
            ')' => token(TokenKind::RParen, ")".to_string()),
            ',' => token(TokenKind::Comma, ",".to_string()),
            '`' => {
                let mut content = String::new();
                loop {
                    match self.chars.peek() {
                        Some('`') => {
                            self.bump();
                            break;
                        }
                        Some('\n') | Some('\r') | None => {
                            return Err(CompileError::new("unterminated string literal", line));
                        }
                        Some(&c) => {
                            content.push(c);
                            self.bump();
                        }
                    }
                }
                token(TokenKind::Str, content)
            }
            '$' => {
                let name = self.take_word();
                if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                    token(TokenKind::Unknown, format!("${}", name))
                } else {
                    token(TokenKind::Variable, name)
                }
            }
            c if c.is_ascii_digit() => {
                let mut text = c.to_string();
                let mut seen_point = false;
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                    } else if c == '.' && !seen_point {
                        seen_point = true;
                        text.push(c);
                    } else {
                        break;
                    }
                    self.bump();
                }
                token(TokenKind::Number, text)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = format!("{}{}", c, self.take_word());
                match keyword(&word) {
                    Some(kw) => token(TokenKind::Keyword(kw), word),
                    None => token(TokenKind::Ident, word),
                }
            }
            c => token(TokenKind::Unknown, c.to_string()),
        };
        Ok(Some(tok))
    }

    fn take_word(&mut self) -> String {
        let word: String = self
            .chars
            .peeking_take_while(|&c| c.is_ascii_alphanumeric() || c == '_')
            .collect();
        self.column += word.chars().count();
        word
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}
