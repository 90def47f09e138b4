use std::path::PathBuf;

use thiserror::Error;

use crate::codec::ParseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("type mismatch at `{path}`: {reason}")]
    TypeMismatch { path: String, reason: String },

    #[error("setting not found: `{path}`")]
    NotFound { path: String },

    #[error("setting already exists: `{path}`")]
    AlreadyExists { path: String },

    #[error("value of `{path}` does not fit in {target}")]
    OutOfRange { path: String, target: &'static str },

    #[error("invalid setting name: {0:?}")]
    InvalidName(String),

    #[error("setting handle is no longer valid")]
    StaleHandle,

    #[error("cannot open {path:?}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid options: {0}")]
    Options(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn mismatch(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::TypeMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    /// True for the two resolution failures a strict lookup can report.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::TypeMismatch { .. })
    }
}
