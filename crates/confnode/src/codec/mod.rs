//! Text serialization contract and the bundled libconfig-style codec.
//!
//! The tree itself does not know about any syntax. A [`TextCodec`] turns text
//! into a fresh [`Tree`] (or a line-numbered [`ParseError`]) and writes a tree
//! back out. Whatever a codec writes must parse back into a structurally equal
//! tree.

mod lexer;
mod parser;
mod writer;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::options::Options;
use crate::tree::Tree;

/// Failure to derive a tree from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}line {line}: {message}", location(.file.as_deref()))]
pub struct ParseError {
    /// 1-based line of the offending token.
    pub line: usize,
    pub message: String,
    /// Source file, when the text came from [`Config::read_file`](crate::Config::read_file).
    pub file: Option<PathBuf>,
}

fn location(file: Option<&Path>) -> String {
    match file {
        Some(path) => format!("{}: ", path.display()),
        None => String::new(),
    }
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            file: None,
        }
    }

    pub(crate) fn in_file(mut self, path: &Path) -> Self {
        self.file = Some(path.to_path_buf());
        self
    }
}

pub trait TextCodec: Send + Sync {
    /// Build a complete tree from `text`. The returned tree should carry
    /// `options`, so typed access on it behaves as configured.
    fn parse(&self, text: &str, options: &Options) -> Result<Tree, ParseError>;

    fn serialize(&self, tree: &Tree, options: &Options, out: &mut dyn io::Write) -> io::Result<()>;
}

/// The `name = value;` format with `{}` groups, `[]` arrays and `()` lists.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibconfigCodec;

impl TextCodec for LibconfigCodec {
    fn parse(&self, text: &str, options: &Options) -> Result<Tree, ParseError> {
        parser::parse(text, options)
    }

    fn serialize(&self, tree: &Tree, options: &Options, out: &mut dyn io::Write) -> io::Result<()> {
        writer::write(tree, options, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_file_when_known() {
        let err = ParseError::new(3, "unexpected `}`");
        assert_eq!(err.to_string(), "line 3: unexpected `}`");
        let err = err.in_file(Path::new("app.cfg"));
        assert_eq!(err.to_string(), "app.cfg: line 3: unexpected `}`");
    }
}
