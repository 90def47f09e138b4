use super::lexer::{Lexer, Token, TokenKind};
use super::ParseError;
use crate::errors::Error;
use crate::key_path::is_valid_name;
use crate::options::Options;
use crate::setting::SettingMut;
use crate::tree::Tree;
use crate::value::{SettingFormat, SettingType, Value};

/// Parse a whole document into a new tree. Nothing is shared with any
/// existing tree, so a failure leaves the caller's state as it was.
pub(crate) fn parse(text: &str, options: &Options) -> Result<Tree, ParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut tree = Tree::with_options(options.clone());
    let mut parser = Parser { tokens, pos: 0 };
    parser.settings(&mut tree.root_mut(), &TokenKind::Eof)?;
    Ok(tree)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Where a parsed value goes: a named Group member or the next element of an
/// Array/List.
#[derive(Clone, Copy)]
enum Slot<'n> {
    Member(&'n str),
    Element,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof, and Eof is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(
            token.line,
            format!("syntax error: expected {expected}, found {}", token.kind.describe()),
        )
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// `setting*` up to (not including) `end`.
    fn settings(&mut self, group: &mut SettingMut<'_>, end: &TokenKind) -> Result<(), ParseError> {
        while &self.peek().kind != end {
            let name = match &self.peek().kind {
                TokenKind::Word(name) if is_valid_name(name) => name.clone(),
                _ => return Err(self.unexpected("a setting name")),
            };
            self.advance();
            self.expect(TokenKind::Assign, "`=` or `:`")?;
            self.value(group, Slot::Member(&name))?;

            if matches!(self.peek().kind, TokenKind::Semicolon | TokenKind::Comma) {
                self.advance();
            }
        }
        Ok(())
    }

    fn value(&mut self, parent: &mut SettingMut<'_>, slot: Slot<'_>) -> Result<(), ParseError> {
        let line = self.peek().line;
        match self.peek().kind {
            TokenKind::LBrace => {
                self.advance();
                let mut group = create(parent, slot, SettingType::Group, line)?;
                self.settings(&mut group, &TokenKind::RBrace)?;
                self.expect(TokenKind::RBrace, "`}`")?;
            }
            TokenKind::LBracket => {
                self.advance();
                let mut array = create(parent, slot, SettingType::Array, line)?;
                self.array_elements(&mut array)?;
            }
            TokenKind::LParen => {
                self.advance();
                let mut list = create(parent, slot, SettingType::List, line)?;
                self.list_elements(&mut list)?;
            }
            _ => {
                let (value, format) = self.scalar()?;
                let mut setting = match slot {
                    Slot::Member(name) => parent.add_value(name, value),
                    Slot::Element => parent.append_value(value),
                }
                .map_err(|err| tree_error(err, line))?;
                if format == SettingFormat::Hex {
                    setting
                        .set_format(format)
                        .map_err(|err| tree_error(err, line))?;
                }
            }
        }
        Ok(())
    }

    fn array_elements(&mut self, array: &mut SettingMut<'_>) -> Result<(), ParseError> {
        if self.peek().kind == TokenKind::RBracket {
            self.advance();
            return Ok(());
        }
        loop {
            let line = self.peek().line;
            if matches!(
                self.peek().kind,
                TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen
            ) {
                return Err(ParseError::new(
                    line,
                    "arrays may only contain scalar values",
                ));
            }
            let (value, format) = self.scalar()?;
            let mut element = array.append_value(value).map_err(|err| match err {
                Error::TypeMismatch { .. } => {
                    ParseError::new(line, "array elements must all have the same type")
                }
                other => tree_error(other, line),
            })?;
            if format == SettingFormat::Hex {
                element
                    .set_format(format)
                    .map_err(|err| tree_error(err, line))?;
            }

            match self.peek().kind {
                TokenKind::Comma => self.advance(),
                TokenKind::RBracket => {
                    self.advance();
                    return Ok(());
                }
                _ => return Err(self.unexpected("`,` or `]`")),
            };
        }
    }

    fn list_elements(&mut self, list: &mut SettingMut<'_>) -> Result<(), ParseError> {
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(());
        }
        loop {
            self.value(list, Slot::Element)?;
            match self.peek().kind {
                TokenKind::Comma => self.advance(),
                TokenKind::RParen => {
                    self.advance();
                    return Ok(());
                }
                _ => return Err(self.unexpected("`,` or `)`")),
            };
        }
    }

    fn scalar(&mut self) -> Result<(Value, SettingFormat), ParseError> {
        let token = self.advance();
        let value = match token.kind {
            TokenKind::Int { value, hex } => {
                let format = if hex {
                    SettingFormat::Hex
                } else {
                    SettingFormat::Default
                };
                return Ok((Value::Int(value), format));
            }
            TokenKind::Float(f) => Value::Float(f),
            TokenKind::Str(mut s) => {
                // Adjacent string literals are concatenated.
                while let TokenKind::Str(next) = &self.peek().kind {
                    s.push_str(next);
                    self.advance();
                }
                Value::String(s)
            }
            TokenKind::Word(word) => match word.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "inf" => Value::Float(f64::INFINITY),
                "nan" => Value::Float(f64::NAN),
                _ => {
                    return Err(ParseError::new(
                        token.line,
                        format!("syntax error: `{word}` is not a value"),
                    ))
                }
            },
            _ => {
                if token.kind != TokenKind::Eof {
                    self.pos -= 1;
                }
                return Err(self.unexpected("a value"));
            }
        };
        Ok((value, SettingFormat::Default))
    }
}

fn create<'p>(
    parent: &'p mut SettingMut<'_>,
    slot: Slot<'_>,
    kind: SettingType,
    line: usize,
) -> Result<SettingMut<'p>, ParseError> {
    match slot {
        Slot::Member(name) => parent.add(name, kind),
        Slot::Element => parent.append(kind),
    }
    .map_err(|err| tree_error(err, line))
}

fn tree_error(err: Error, line: usize) -> ParseError {
    match err {
        Error::AlreadyExists { path } => {
            ParseError::new(line, format!("duplicate setting `{path}`"))
        }
        Error::TypeMismatch { reason, .. } => ParseError::new(line, reason),
        other => ParseError::new(line, other.to_string()),
    }
}
