//! Mapping runtime
//!
//! A [`Mapping`] is an ordered list of assignments. Every assignment query
//! reads from the input message and writes into the output message.

use serde::{Deserialize, Serialize};
use sluice_value::{format_path, parse_path};
use std::collections::BTreeMap;
use std::fmt;

use crate::context::FunctionContext;
use crate::function::{Function, FunctionRef};
use crate::targets::{TargetPath, TargetsContext};
use crate::{Error, Message, Result, Value};

/// Where the output of a mapping starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Start from a copy of the input message
    #[default]
    Mutate,
    /// Start from an empty payload, keeping input metadata
    Replace,
}

/// Where an assignment writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentTarget {
    /// A path in the output payload (empty for the whole payload)
    Root(Vec<String>),
    /// A metadata key, or all metadata at once
    Metadata(Option<String>),
}

impl AssignmentTarget {
    /// Parse `root`, `root.a.b`, `meta` or `meta.key`
    pub fn parse(target: &str) -> Result<Self> {
        let (head, rest) = match target.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (target, None),
        };
        match (head, rest) {
            ("root", None) => Ok(Self::Root(Vec::new())),
            ("root", Some(rest)) => Ok(Self::Root(parse_path(rest)?)),
            ("meta", None) => Ok(Self::Metadata(None)),
            ("meta", Some(key)) if !key.is_empty() => Ok(Self::Metadata(Some(key.to_string()))),
            _ => Err(Error::Parse(format!(
                "invalid assignment target '{target}': expected root[.path] or meta[.key]"
            ))),
        }
    }
}

impl fmt::Display for AssignmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(path) if path.is_empty() => f.write_str("root"),
            Self::Root(path) => write!(f, "root.{}", format_path(path)),
            Self::Metadata(None) => f.write_str("meta"),
            Self::Metadata(Some(key)) => write!(f, "meta.{key}"),
        }
    }
}

/// A compiled assignment
#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: AssignmentTarget,
    pub query: FunctionRef,
}

/// Input fields read by one statement
#[derive(Debug, Clone, PartialEq)]
pub struct StatementTargets {
    pub target: AssignmentTarget,
    pub reads: Vec<TargetPath>,
}

/// A compiled mapping
#[derive(Debug, Clone)]
pub struct Mapping {
    pub name: String,
    pub mode: MappingMode,
    pub statements: Vec<Assignment>,
}

impl Mapping {
    /// Create an empty mapping in mutate mode
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MappingMode::default(),
            statements: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MappingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append an assignment
    #[must_use]
    pub fn assign(mut self, target: AssignmentTarget, query: FunctionRef) -> Self {
        self.statements.push(Assignment { target, query });
        self
    }

    /// Apply the mapping to a message.
    ///
    /// Returns `Ok(None)` when the output payload is left as nothing, which
    /// filters the message out.
    pub fn apply(&self, input: &Message) -> Result<Option<Message>> {
        let ctx = FunctionContext::with_message(input);
        let mut output = match self.mode {
            MappingMode::Mutate => input.clone(),
            MappingMode::Replace => Message {
                payload: Value::Nothing,
                metadata: input.metadata.clone(),
            },
        };

        for (index, statement) in self.statements.iter().enumerate() {
            let wrap = |e| Error::assignment(index, statement.target.to_string(), e);
            let value = statement.query.exec(&ctx).map_err(wrap)?;
            if value.is_nothing() {
                tracing::trace!(mapping = %self.name, index, target = %statement.target, "Statement produced nothing");
                continue;
            }
            write_target(&mut output, &statement.target, value).map_err(wrap)?;
        }

        if output.payload.is_nothing() {
            tracing::debug!(mapping = %self.name, "Mapping filtered message");
            return Ok(None);
        }
        Ok(Some(output))
    }

    /// Report the input fields each statement reads, without evaluating
    pub fn query_targets(&self) -> Result<Vec<StatementTargets>> {
        self.statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                let (_, reads) = statement
                    .query
                    .query_targets(TargetsContext::new())
                    .map_err(|e| Error::assignment(index, statement.target.to_string(), e))?;
                Ok(StatementTargets {
                    target: statement.target.clone(),
                    reads,
                })
            })
            .collect()
    }

    /// Every input field the mapping reads, deduplicated, in first-seen order
    pub fn input_targets(&self) -> Result<Vec<TargetPath>> {
        let mut seen = Vec::new();
        for statement in self.query_targets()? {
            for path in statement.reads {
                if !seen.contains(&path) {
                    seen.push(path);
                }
            }
        }
        Ok(seen)
    }
}

fn write_target(output: &mut Message, target: &AssignmentTarget, value: Value) -> Result<()> {
    match target {
        AssignmentTarget::Root(path) => output.payload.set_path(path, value)?,
        AssignmentTarget::Metadata(Some(key)) => {
            output.metadata.insert(key.clone(), value);
        }
        AssignmentTarget::Metadata(None) => match value {
            Value::Object(map) => output.metadata = map,
            Value::Null => output.metadata = BTreeMap::new(),
            other => return Err(Error::type_mismatch("object", &other)),
        },
    }
    Ok(())
}
