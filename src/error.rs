//! Error types shared by the whole crate.
//!
//! Two families of failure exist: precondition violations inside the
//! samplers (degenerate selection weights and the like) and validation
//! errors on external input. Both are fatal for a run. A rejected proposal is
//! never an error; it is a plain `bool` in the samplers.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhaseError {
    /// I/O errors (missing files, unwritable log or output files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A sampler invariant did not hold (e.g. a non-positive selection total)
    #[error("Precondition violated: {message}")]
    Precondition { message: String },

    /// Malformed input data, reported with the offending file and line
    #[error("Invalid data in {} at line {line}: {message}", file.display())]
    InvalidData {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// Inconsistent or out-of-range settings
    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, PhaseError>;

impl PhaseError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn invalid_data(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidData {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
