//! Static target analysis
//!
//! [`TargetsContext`] mirrors the scoping rules of
//! [`FunctionContext`](crate::FunctionContext) without carrying any real
//! values. Walking a function tree with it reports the [`TargetPath`]s the
//! tree may read.

use im::{HashMap, Vector};
use sluice_value::format_path;
use std::fmt;

use crate::{Error, Result};

/// What a target path is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// The message payload
    Value,
    /// The message metadata
    Metadata,
}

/// A field read discovered by static analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPath {
    pub target_type: TargetType,
    pub path: Vec<String>,
}

impl TargetPath {
    pub fn new(target_type: TargetType, path: Vec<String>) -> Self {
        Self { target_type, path }
    }

    /// A path into the message payload
    pub fn value(path: Vec<String>) -> Self {
        Self::new(TargetType::Value, path)
    }

    /// A path into the message metadata
    pub fn metadata(path: Vec<String>) -> Self {
        Self::new(TargetType::Metadata, path)
    }

    /// This path with `segments` appended
    #[must_use]
    pub fn extended(&self, segments: &[String]) -> Self {
        let mut path = self.path.clone();
        path.extend_from_slice(segments);
        Self::new(self.target_type, path)
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.target_type {
            TargetType::Value => "this",
            TargetType::Metadata => "meta",
        };
        if self.path.is_empty() {
            f.write_str(prefix)
        } else {
            write!(f, "{prefix}.{}", format_path(&self.path))
        }
    }
}

#[derive(Debug, Clone)]
struct Scope {
    paths: Vec<TargetPath>,
    previous: Vec<TargetPath>,
}

/// Scoping state for target analysis
#[derive(Debug, Clone)]
pub struct TargetsContext {
    current: Vec<TargetPath>,
    values: Vec<TargetPath>,
    pending: Vector<Scope>,
    named: HashMap<String, Vec<TargetPath>>,
}

impl TargetsContext {
    /// Start analysis at the root of the message payload
    pub fn new() -> Self {
        Self {
            current: vec![TargetPath::value(Vec::new())],
            values: Vec::new(),
            pending: Vector::new(),
            named: HashMap::new(),
        }
    }

    /// Paths that unqualified reads resolve against
    pub fn current(&self) -> &[TargetPath] {
        &self.current
    }

    /// Paths the most recently analysed function's result originates from
    pub fn values(&self) -> &[TargetPath] {
        &self.values
    }

    /// Record the paths a result originates from
    #[must_use]
    pub fn with_values(&self, paths: Vec<TargetPath>) -> Self {
        let mut next = self.clone();
        next.values = paths;
        next
    }

    /// Enter a nested scope made of the recorded values, pushing it as
    /// pending. Parallels [`FunctionContext::with_value`](crate::FunctionContext::with_value).
    #[must_use]
    pub fn with_values_as_context(&self) -> Self {
        let mut next = self.clone();
        let paths = std::mem::take(&mut next.values);
        next.pending.push_back(Scope {
            paths: paths.clone(),
            previous: std::mem::replace(&mut next.current, paths),
        });
        next
    }

    /// Pop the most recent pending scope, restoring the scope in force before
    /// it was pushed. Returns `None` when nothing is pending.
    pub fn pop_context(&self) -> Option<(Vec<TargetPath>, Self)> {
        let mut next = self.clone();
        let scope = next.pending.pop_back()?;
        next.current = scope.previous;
        Some((scope.paths, next))
    }

    /// Pop the most recent pending scope and register it under `name`.
    pub fn with_context_as_named(&self, name: &str) -> Result<Self> {
        let (paths, mut next) = self.pop_context().ok_or_else(|| Error::no_context(name))?;
        next.named.insert(name.to_string(), paths);
        Ok(next)
    }

    /// Paths registered under an alias
    pub fn named_context(&self, name: &str) -> Option<&[TargetPath]> {
        self.named.get(name).map(Vec::as_slice)
    }
}

impl Default for TargetsContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_new_context_targets_root() {
        let ctx = TargetsContext::new();
        assert_eq!(ctx.current(), &[TargetPath::value(Vec::new())]);
        assert!(ctx.values().is_empty());
        assert!(ctx.pop_context().is_none());
    }

    #[test]
    fn test_values_as_context_round_trip() {
        let items = TargetPath::value(path(&["items"]));
        let ctx = TargetsContext::new()
            .with_values(vec![items.clone()])
            .with_values_as_context();

        assert_eq!(ctx.current(), &[items.clone()]);
        assert!(ctx.values().is_empty());

        let (popped, restored) = ctx.pop_context().unwrap();
        assert_eq!(popped, vec![items]);
        assert_eq!(restored.current(), &[TargetPath::value(Vec::new())]);
    }

    #[test]
    fn test_named_context_registration() {
        let doc = TargetPath::value(path(&["doc"]));
        let ctx = TargetsContext::new()
            .with_values(vec![doc.clone()])
            .with_values_as_context()
            .with_context_as_named("outer")
            .unwrap();

        assert_eq!(ctx.named_context("outer"), Some(&[doc][..]));
        assert_eq!(ctx.current(), &[TargetPath::value(Vec::new())]);
        assert_eq!(ctx.named_context("inner"), None);
    }

    #[test]
    fn test_named_context_without_pending_fails() {
        let err = TargetsContext::new().with_context_as_named("x").unwrap_err();
        assert_eq!(err, Error::no_context("x"));
    }

    #[test]
    fn test_target_path_display() {
        assert_eq!(TargetPath::value(Vec::new()).to_string(), "this");
        assert_eq!(TargetPath::value(path(&["a", "b"])).to_string(), "this.a.b");
        assert_eq!(TargetPath::metadata(path(&["topic"])).to_string(), "meta.topic");
        assert_eq!(
            TargetPath::value(path(&["a"])).extended(&path(&["b", "c"])),
            TargetPath::value(path(&["a", "b", "c"]))
        );
    }
}
