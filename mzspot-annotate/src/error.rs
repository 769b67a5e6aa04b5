use std::io;

use thiserror::Error;

/// An error that might occur while loading a library or configuring a search
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Invalid search configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Malformed library entry at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("An IO error occurred: {0}")]
    Io(#[from] io::Error),
}

impl From<csv::Error> for AnnotationError {
    fn from(value: csv::Error) -> Self {
        let line = value.position().map(|p| p.line() as usize).unwrap_or_default();
        let message = value.to_string();
        match value.into_kind() {
            csv::ErrorKind::Io(e) => Self::Io(e),
            _ => Self::parse(line, message),
        }
    }
}

impl AnnotationError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
