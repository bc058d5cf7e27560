//! Tokenizer for the expression grammar.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::datetime::parse_datetime;
use tabula_core::{Error, Result};

/// Token kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    Str(String),
    Date(i64),
    /// Identifier. `quoted` is set for `[bracketed]` names, which are never
    /// treated as keywords.
    Ident { name: String, quoted: bool },
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    In,
    Like,
    Is,
    Null,
    True,
    False,
    Eof,
}

/// A token and the character offset it starts at.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Splits expression text into tokens, terminated by [`TokenKind::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    Lexer::new(text).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while self.peek().map_or(false, char::is_whitespace) {
                self.pos += 1;
            }
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    position: start,
                });
                return Ok(tokens);
            };
            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ',' => self.single(TokenKind::Comma),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                '=' => {
                    // "==" is accepted as equality
                    self.pos += if self.peek_at(1) == Some('=') { 2 } else { 1 };
                    TokenKind::Eq
                }
                '!' if self.peek_at(1) == Some('=') => {
                    self.pos += 2;
                    TokenKind::NotEq
                }
                '<' => match self.peek_at(1) {
                    Some('>') => self.double(TokenKind::NotEq),
                    Some('=') => self.double(TokenKind::LtEq),
                    _ => self.single(TokenKind::Lt),
                },
                '>' => match self.peek_at(1) {
                    Some('=') => self.double(TokenKind::GtEq),
                    _ => self.single(TokenKind::Gt),
                },
                '\'' => self.string(start)?,
                '#' => self.date(start)?,
                '[' => self.bracketed(start)?,
                '.' if !self.peek_at(1).map_or(false, |d| d.is_ascii_digit()) => {
                    self.single(TokenKind::Dot)
                }
                c if c.is_ascii_digit() || c == '.' => self.number(start)?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                other => {
                    return Err(Error::syntax(start, format!("Unexpected character '{}'", other)));
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 2;
        kind
    }

    fn string(&mut self, start: usize) -> Result<TokenKind> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(Error::syntax(start, "Unterminated string literal")),
                Some('\'') if self.peek_at(1) == Some('\'') => {
                    out.push('\'');
                    self.pos += 2;
                }
                Some('\'') => {
                    self.pos += 1;
                    return Ok(TokenKind::Str(out));
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn date(&mut self, start: usize) -> Result<TokenKind> {
        self.pos += 1;
        let body_start = self.pos;
        while self.peek().map_or(false, |c| c != '#') {
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(Error::syntax(start, "Unterminated date literal"));
        }
        let body: String = self.chars[body_start..self.pos].iter().collect();
        self.pos += 1;
        parse_datetime(body.trim())
            .map(TokenKind::Date)
            .ok_or_else(|| Error::syntax(start, format!("Invalid date literal '#{}#'", body)))
    }

    fn bracketed(&mut self, start: usize) -> Result<TokenKind> {
        self.pos += 1;
        let mut name = String::new();
        loop {
            match self.peek() {
                None => return Err(Error::syntax(start, "Missing closing bracket")),
                Some('\\') if matches!(self.peek_at(1), Some(']') | Some('\\')) => {
                    if let Some(c) = self.peek_at(1) {
                        name.push(c);
                    }
                    self.pos += 2;
                }
                Some(']') => {
                    self.pos += 1;
                    return Ok(TokenKind::Ident { name, quoted: true });
                }
                Some(c) => {
                    name.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<TokenKind> {
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).map_or(false, |d| d.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+') | Some('-'))
                        && self.peek_at(2).map_or(false, |d| d.is_ascii_digit())))
            {
                is_float = true;
                self.pos += 2;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| Error::syntax(start, format!("Invalid number '{}'", text)))
        } else {
            match text.parse::<i64>() {
                Ok(i) => Ok(TokenKind::Integer(i)),
                Err(_) => text
                    .parse::<f64>()
                    .map(TokenKind::Float)
                    .map_err(|_| Error::syntax(start, format!("Invalid number '{}'", text))),
            }
        }
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        match name.to_ascii_lowercase().as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "like" => TokenKind::Like,
            "is" => TokenKind::Is,
            "null" => TokenKind::Null,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident {
                name,
                quoted: false,
            },
        }
    }
}
