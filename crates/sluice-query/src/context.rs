//! Execution context for function trees
//!
//! A [`FunctionContext`] is a persistent value: every method that "changes"
//! it returns a new context and leaves the receiver untouched, so one
//! context can be handed to many sibling evaluations without copying.

use im::{HashMap, Vector};
use sluice_value::{Message, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A value pushed by an enclosing expression and not yet captured.
#[derive(Debug, Clone)]
struct Pending {
    value: Arc<Value>,
    /// The value that was in scope before the push, restored on pop.
    previous: Option<Arc<Value>>,
}

/// Per-evaluation state threaded through a function tree
#[derive(Debug, Clone, Default)]
pub struct FunctionContext {
    value: Option<Arc<Value>>,
    pending: Vector<Pending>,
    named: HashMap<String, Arc<Value>>,
    metadata: Arc<BTreeMap<String, Value>>,
}

impl FunctionContext {
    /// Create a context with no value in scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with `value` in scope
    pub fn from_value(value: Value) -> Self {
        Self {
            value: Some(Arc::new(value)),
            ..Self::default()
        }
    }

    /// Create a context for evaluating against a message
    pub fn with_message(message: &Message) -> Self {
        Self {
            value: Some(Arc::new(message.payload.clone())),
            metadata: Arc::new(message.metadata.clone()),
            ..Self::default()
        }
    }

    /// The value currently in scope
    pub fn value(&self) -> Option<&Value> {
        self.value.as_deref()
    }

    /// Read a metadata entry of the message under evaluation
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// All metadata of the message under evaluation
    pub fn all_metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Enter a nested scope: `value` becomes the value in scope and is pushed
    /// as pending so that a capture can bind it to a name.
    #[must_use]
    pub fn with_value(&self, value: Value) -> Self {
        let value = Arc::new(value);
        let mut next = self.clone();
        next.pending.push_back(Pending {
            value: Arc::clone(&value),
            previous: self.value.clone(),
        });
        next.value = Some(value);
        next
    }

    /// Pop the most recently pushed pending value.
    ///
    /// The returned context has the value that was in scope before the
    /// matching push restored. Returns `None` for the value when nothing is
    /// pending.
    pub fn pop_value(&self) -> (Option<Arc<Value>>, Self) {
        let mut next = self.clone();
        match next.pending.pop_back() {
            Some(pending) => {
                next.value = pending.previous;
                (Some(pending.value), next)
            }
            None => (None, next),
        }
    }

    /// Bind a value to an alias, visible to every descendant evaluation
    #[must_use]
    pub fn with_named_value(&self, name: impl Into<String>, value: impl Into<Arc<Value>>) -> Self {
        let mut next = self.clone();
        next.named.insert(name.into(), value.into());
        next
    }

    /// Look up a value bound to an alias
    pub fn named_value(&self, name: &str) -> Option<&Value> {
        self.named.get(name).map(|value| &**value)
    }

    /// Number of values pushed and not yet popped
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
