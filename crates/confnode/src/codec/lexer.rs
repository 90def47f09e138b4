use std::iter::Peekable;
use std::str::Chars;

use super::ParseError;
use crate::key_path::{is_name_char, is_name_start};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    /// Identifier-like word. Keywords (`true`, `nan`, ...) are decided by the
    /// parser, so settings may still be named `true`.
    Word(String),
    Int { value: i64, hex: bool },
    Float(f64),
    Str(String),
    Assign,
    Semicolon,
    Comma,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eof,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Word(w) => format!("`{w}`"),
            TokenKind::Int { .. } => "integer".into(),
            TokenKind::Float(_) => "float".into(),
            TokenKind::Str(_) => "string".into(),
            TokenKind::Assign => "`=`".into(),
            TokenKind::Semicolon => "`;`".into(),
            TokenKind::Comma => "`,`".into(),
            TokenKind::LBrace => "`{`".into(),
            TokenKind::RBrace => "`}`".into(),
            TokenKind::LBracket => "`[`".into(),
            TokenKind::RBracket => "`]`".into(),
            TokenKind::LParen => "`(`".into(),
            TokenKind::RParen => "`)`".into(),
            TokenKind::Eof => "end of input".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub(crate) struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => self.skip_line(),
                Some('/') if self.peek_second() == Some('/') => self.skip_line(),
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.line;
                    self.bump();
                    self.bump();
                    let mut prev = '\0';
                    loop {
                        match self.bump() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => {
                                return Err(ParseError::new(start, "unterminated block comment"))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
            });
        };

        let kind = match c {
            '=' | ':' => self.punct(TokenKind::Assign),
            ';' => self.punct(TokenKind::Semicolon),
            ',' => self.punct(TokenKind::Comma),
            '{' => self.punct(TokenKind::LBrace),
            '}' => self.punct(TokenKind::RBrace),
            '[' => self.punct(TokenKind::LBracket),
            ']' => self.punct(TokenKind::RBracket),
            '(' => self.punct(TokenKind::LParen),
            ')' => self.punct(TokenKind::RParen),
            '"' => self.string()?,
            c if is_name_start(c) => TokenKind::Word(self.word()),
            c if c.is_ascii_digit() || c == '.' || c == '+' || c == '-' => self.number()?,
            other => return Err(self.error(format!("unexpected character {other:?}"))),
        };
        Ok(Token { kind, line })
    }

    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if !is_name_char(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn string(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.line;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(TokenKind::Str(out)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('f') => '\u{c}',
                        Some('x') => self.hex_escape()?,
                        Some(other) => {
                            return Err(self.error(format!("unknown escape sequence `\\{other}`")))
                        }
                        None => return Err(ParseError::new(start, "unterminated string")),
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
                None => return Err(ParseError::new(start, "unterminated string")),
            }
        }
    }

    fn hex_escape(&mut self) -> Result<char, ParseError> {
        let mut code = 0u32;
        for _ in 0..2 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("`\\x` must be followed by two hex digits"))?;
            code = code * 16 + digit;
        }
        if code > 0x7f {
            return Err(self.error(format!("`\\x{code:02x}` is not an ASCII character")));
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid escape"))
    }

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        let mut negative = false;
        if let Some(sign @ ('+' | '-')) = self.peek() {
            self.bump();
            negative = sign == '-';
            if self.peek().is_some_and(is_name_start) {
                let word = self.word();
                return match word.to_ascii_lowercase().as_str() {
                    "inf" => Ok(TokenKind::Float(if negative {
                        f64::NEG_INFINITY
                    } else {
                        f64::INFINITY
                    })),
                    "nan" => Ok(TokenKind::Float(f64::NAN)),
                    _ => Err(self.error(format!("expected a number after `{sign}`"))),
                };
            }
        }

        if self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(self.error("hex literal needs at least one digit"));
            }
            let raw = u64::from_str_radix(&digits, 16)
                .map_err(|_| self.error(format!("hex literal 0x{digits} is too large")))?;
            self.int_suffix();
            self.expect_number_end()?;
            // Hex literals denote a 64-bit pattern.
            let value = raw as i64;
            return Ok(TokenKind::Int {
                value: if negative { value.wrapping_neg() } else { value },
                hex: true,
            });
        }

        let mut text = String::from(if negative { "-" } else { "" });
        let int_part = self.take_while(|c| c.is_ascii_digit());
        text.push_str(&int_part);
        let mut is_float = false;
        let mut digits = int_part.len();

        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            let frac = self.take_while(|c| c.is_ascii_digit());
            digits += frac.len();
            text.push('.');
            text.push_str(&frac);
        }
        if digits == 0 {
            return Err(self.error("malformed number"));
        }
        if let Some(e @ ('e' | 'E')) = self.peek() {
            is_float = true;
            self.bump();
            text.push(e);
            if let Some(sign @ ('+' | '-')) = self.peek() {
                self.bump();
                text.push(sign);
            }
            let exp = self.take_while(|c| c.is_ascii_digit());
            if exp.is_empty() {
                return Err(self.error("exponent needs at least one digit"));
            }
            text.push_str(&exp);
        }

        if is_float {
            self.expect_number_end()?;
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("malformed float `{text}`")))?;
            return Ok(TokenKind::Float(value));
        }

        self.int_suffix();
        self.expect_number_end()?;
        let value = text
            .parse::<i64>()
            .map_err(|_| self.error(format!("integer {text} is out of range")))?;
        Ok(TokenKind::Int { value, hex: false })
    }

    /// Accept and ignore `L` / `LL` (64-bit markers in the classic syntax).
    fn int_suffix(&mut self) {
        for _ in 0..2 {
            if self.peek() == Some('L') {
                self.bump();
            }
        }
    }

    fn expect_number_end(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if is_name_char(c) || c == '.' => {
                Err(self.error(format!("unexpected {c:?} in number")))
            }
            _ => Ok(()),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}
