use std::fmt;

use thiserror::Error;

/// One step of a [`KeyPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Group member by name.
    Name(String),
    /// Child of a Group, Array or List by position.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid path {path:?}: {reason}")]
pub struct InvalidPath {
    pub path: String,
    pub reason: &'static str,
}

/// Parsed setting path such as `server.routes[1].prefix` or `list.[0]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyPath(pub Vec<Segment>);

impl KeyPath {
    pub fn new(segments: impl Into<Vec<Segment>>) -> Self {
        KeyPath(segments.into())
    }

    /// Parse the dotted/bracketed path syntax. The empty string is the empty
    /// path, which designates the node the lookup starts from.
    pub fn parse(path: &str) -> Result<Self, InvalidPath> {
        let fail = |reason| InvalidPath {
            path: path.to_owned(),
            reason,
        };

        let mut segments = Vec::new();
        if path.is_empty() {
            return Ok(KeyPath(segments));
        }

        for part in path.split('.') {
            if part.is_empty() {
                return Err(fail("empty segment"));
            }

            let (name, mut rest) = match part.find('[') {
                Some(at) => part.split_at(at),
                None => (part, ""),
            };
            if !name.is_empty() {
                if !is_valid_name(name) {
                    return Err(fail("invalid setting name"));
                }
                segments.push(Segment::Name(name.to_owned()));
            }

            while !rest.is_empty() {
                let inner = rest.strip_prefix('[').ok_or_else(|| fail("expected `[`"))?;
                let close = inner.find(']').ok_or_else(|| fail("unclosed `[`"))?;
                let digits = &inner[..close];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(fail("index must be a non-negative integer"));
                }
                let index = digits.parse().map_err(|_| fail("index too large"))?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Ok(KeyPath(segments))
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 && matches!(segment, Segment::Name(_)) {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

pub(crate) fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '*'
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '*')
}

/// Setting names: `[A-Za-z*][-A-Za-z0-9_*]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start(first) => chars.all(is_name_char),
        _ => false,
    }
}
