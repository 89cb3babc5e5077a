//! # sluice-query
//!
//! Expression engine for the sluice mapping language.
//!
//! Expressions are trees of [`Function`] nodes. Every node can be executed
//! against a [`FunctionContext`] to produce a [`Value`], and analysed against a
//! [`TargetsContext`] to discover which input fields it reads without running
//! it. Nodes are immutable once built and are shared across threads, so a
//! compiled [`Mapping`] can be applied to many messages concurrently.

pub mod context;
pub mod dsl;
pub mod expression;
pub mod function;
pub mod functions;
pub mod mapping;
pub mod targets;

pub use context::FunctionContext;
pub use dsl::{Expr, MappingDsl};
pub use expression::{
    DISCARD_ALIAS, MatchCase, new_if_function, new_match_function, new_named_context_function,
};
pub use function::{Function, FunctionRef, TargetsResult, aggregate_target_paths, closure_function};
pub use mapping::{Assignment, AssignmentTarget, Mapping, MappingMode, StatementTargets};
pub use targets::{TargetPath, TargetType, TargetsContext};

pub use sluice_value::{Message, Value};

use thiserror::Error;

/// Errors that can occur while compiling or evaluating expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("failed to check match case {index}: {source}")]
    MatchCase { index: usize, source: Box<Error> },

    #[error("failed to check if condition: {0}")]
    Condition(#[source] Box<Error>),

    #[error("failed to map element {key}: {source}")]
    Element { key: String, source: Box<Error> },

    #[error("failed to assign statement {index} ({target}): {source}")]
    Assignment {
        index: usize,
        target: String,
        source: Box<Error>,
    },

    #[error("failed to capture context {name}: no context to capture")]
    NoContext { name: String },

    #[error("context alias '{name}' is not bound")]
    UnknownAlias { name: String },

    #[error("expected {expected} value, got {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("DSL parse error: {0}")]
    Parse(String),

    #[error("expression nesting exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error(transparent)]
    Value(#[from] sluice_value::Error),
}

impl Error {
    /// Wrap an error raised while checking the case at `index`.
    pub fn match_case(index: usize, source: Error) -> Self {
        Self::MatchCase {
            index,
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while checking an if condition.
    pub fn condition(source: Error) -> Self {
        Self::Condition(Box::new(source))
    }

    /// Wrap an error raised while mapping the element under `key`.
    pub fn element(key: impl Into<String>, source: Error) -> Self {
        Self::Element {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an error raised by the statement at `index`.
    pub fn assignment(index: usize, target: impl Into<String>, source: Error) -> Self {
        Self::Assignment {
            index,
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Build a capture failure for an empty pending stack.
    pub fn no_context(name: impl Into<String>) -> Self {
        Self::NoContext { name: name.into() }
    }

    /// Build a type mismatch between the expected kind and a found value.
    pub fn type_mismatch(expected: impl Into<String>, found: &Value) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.type_name().to_string(),
        }
    }

    /// Whether this error (or the error it wraps) comes from a malformed
    /// function tree rather than from the data being evaluated.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::NoContext { .. } | Self::DepthExceeded { .. } => true,
            Self::MatchCase { source, .. }
            | Self::Condition(source)
            | Self::Element { source, .. }
            | Self::Assignment { source, .. } => source.is_structural(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
