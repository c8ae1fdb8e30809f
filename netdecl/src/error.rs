//! Engine diagnostics.
//!
//! Every stage returns the first problem it finds as a single [`Error`]
//! carrying a message and, when the offending value came from a document,
//! the document path and 1-based position.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use netdecl_doc::{KeyfileError, Mark, ParseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Where a value was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: Option<&Path>, mark: Mark) -> Self {
        Self {
            file: file.map(Path::to_path_buf),
            line: mark.line,
            column: mark.column,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file.display(), self.line, self.column),
            None => write!(f, "<input>:{}:{}", self.line, self.column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Syntax,
    Schema,
    Semantic,
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax",
            Self::Schema => "schema",
            Self::Semantic => "semantic",
            Self::Io => "io",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed markup or a disallowed construct.
    #[error("{location}: {message}")]
    Syntax { message: String, location: Location },
    /// Unknown key or wrong value kind.
    #[error("{location}: {message}")]
    Schema { message: String, location: Location },
    /// Invariant, reference, range or backend-capability violation.
    #[error("{}{message}", prefix(.location))]
    Semantic {
        message: String,
        location: Option<Location>,
    },
    /// Missing input, unwritable output, permission denial.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn prefix(location: &Option<Location>) -> String {
    location
        .as_ref()
        .map(|loc| format!("{loc}: "))
        .unwrap_or_default()
}

impl Error {
    pub fn schema(message: impl Into<String>, location: Location) -> Self {
        Self::Schema {
            message: message.into(),
            location,
        }
    }

    pub fn semantic(message: impl Into<String>, location: Option<Location>) -> Self {
        Self::Semantic {
            message: message.into(),
            location,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Convert a document parse failure, attributing it to `file`.
    pub fn from_parse(err: ParseError, file: Option<&Path>) -> Self {
        match err {
            ParseError::Syntax { mark, message } => Self::Syntax {
                message,
                location: Location::new(file, mark),
            },
            ParseError::Io(source) => Self::io(file.unwrap_or(Path::new("<input>")), source),
        }
    }

    /// Convert a keyfile parse failure, attributing it to `file`.
    pub fn from_keyfile(err: KeyfileError, file: Option<&Path>) -> Self {
        match err {
            KeyfileError::Syntax { line, message } => Self::Syntax {
                message,
                location: Location::new(file, Mark::new(line, 1)),
            },
            KeyfileError::Io(source) => Self::io(file.unwrap_or(Path::new("<input>")), source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Semantic { .. } => ErrorKind::Semantic,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// The bare message without position.
    pub fn message(&self) -> String {
        match self {
            Self::Syntax { message, .. }
            | Self::Schema { message, .. }
            | Self::Semantic { message, .. } => message.clone(),
            Self::Io { source, .. } => source.to_string(),
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Syntax { location, .. } | Self::Schema { location, .. } => Some(location),
            Self::Semantic { location, .. } => location.as_ref(),
            Self::Io { .. } => None,
        }
    }
}

/// Serializable form of an error, for machine-readable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let location = err.location();
        let file = match err {
            Error::Io { path, .. } => Some(path.clone()),
            _ => location.and_then(|loc| loc.file.clone()),
        };
        Self {
            kind: err.kind(),
            message: err.message(),
            file,
            line: location.map(|loc| loc.line),
            column: location.map(|loc| loc.column),
        }
    }
}
