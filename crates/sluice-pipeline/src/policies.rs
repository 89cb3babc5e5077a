//! Error policies

use serde::{Deserialize, Serialize};

/// What happens to a message whose processing fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the failure and discard the message
    #[default]
    Drop,

    /// Abort the run with the first failure, in input order
    Fail,

    /// Keep failed messages, annotated with the error, for the error output
    Route,
}

/// Metadata key carrying the failure text on routed messages
pub const ERROR_METADATA_KEY: &str = "error";
