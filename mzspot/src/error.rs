use std::io;

use thiserror::Error;

/// An error that might occur while building or running an alignment
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("Invalid alignment configuration: {0}")]
    InvalidConfiguration(String),
    #[error("File {file_id} ({file_name}) has no retention index calibration, but retention index alignment was requested")]
    MissingCalibration { file_id: usize, file_name: String },
    #[error("Invalid retention index calibration: {0}")]
    InvalidCalibration(String),
    #[error("Alignment invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Failed to read data for file {file_id} ({file_name}): {source}")]
    DataSource {
        file_id: usize,
        file_name: String,
        #[source]
        source: io::Error,
    },
}

impl AlignmentError {
    pub(crate) fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}
