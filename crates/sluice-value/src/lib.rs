#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

//! # sluice-value
//!
//! Runtime value domain and message representation for the sluice
//! stream-processing engine.
//!
//! Every stage of a pipeline (inputs, mappings, outputs) exchanges data as
//! [`Message`]s whose payload is a dynamically typed [`Value`]. The value
//! domain includes a distinguished [`Value::Nothing`] member meaning "no
//! result", which mappings use to skip an assignment or filter a message.

/// Messages flowing between pipeline stages.
pub mod message;
/// Dotted key-path parsing and formatting.
pub mod path;
/// Dynamically typed runtime values.
pub mod value;

/// Message with payload and metadata.
pub use message::Message;
/// Key-path helpers.
pub use path::{format_path, parse_path};
/// Runtime value type.
pub use value::Value;

use thiserror::Error;

/// Errors that can occur when working with values and messages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Conversion error in {context}: {message}")]
    Conversion { context: String, message: String },
}

impl Error {
    /// Build an invalid-path error with input path and parsing reason.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a type-mismatch error for a value found at `path`.
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Build a conversion error with conversion context.
    pub fn conversion(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Crate-local result type for value operations.
pub type Result<T> = std::result::Result<T, Error>;
