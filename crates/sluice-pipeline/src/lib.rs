#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

//! # sluice-pipeline
//!
//! Runs compiled mappings over streams of messages.
//!
//! A pipeline reads messages from an input, applies its processors to each
//! message concurrently (bounded by `max_in_flight`), and writes the results
//! to an output in input order. Messages whose processing fails are handled
//! by the configured [`ErrorPolicy`].

pub mod config;
pub mod io;
pub mod pipeline;
pub mod policies;

pub use config::{
    InputConfig, MappingSource, OutputConfig, PipelineConfig, ProcessingConfig, ProcessorConfig,
};
pub use io::{MessageWriter, Record};
pub use pipeline::{Pipeline, PipelineStats, RunReport};
pub use policies::ErrorPolicy;

use thiserror::Error;

/// Errors that can occur in the pipeline
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Configuration error in '{path}': {message}")]
    Config { path: String, message: String },

    #[error("IO error during {operation} for '{path}': {message}")]
    Io {
        operation: String,
        path: String,
        message: String,
    },

    #[error("Processing failed for message {index}: {message}")]
    Processing { index: usize, message: String },

    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    /// Create a configuration error for the document at `path`.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a structured I/O error with operation/path context.
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a processing failure for the message at `index`.
    pub fn processing(index: usize, message: impl Into<String>) -> Self {
        Self::Processing {
            index,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("io", "<unknown>", e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_preserves_path_context() {
        let error = Error::config("/tmp/pipeline.yaml", "max_in_flight must be at least 1");
        assert_eq!(
            error.to_string(),
            "Configuration error in '/tmp/pipeline.yaml': max_in_flight must be at least 1"
        );
    }

    #[test]
    fn io_error_from_std_error_has_fallback_context() {
        let io_error = std::fs::File::open("/path/that/does/not/exist")
            .map_err(Error::from)
            .expect_err("open should fail");

        match io_error {
            Error::Io {
                operation,
                path,
                message,
            } => {
                assert_eq!(operation, "io");
                assert_eq!(path, "<unknown>");
                assert!(!message.is_empty());
            }
            _ => panic!("expected io variant"),
        }
    }
}
