//! The function contract and the closure combinator

use std::fmt;
use std::sync::Arc;

use crate::context::FunctionContext;
use crate::targets::{TargetPath, TargetsContext};
use crate::{Result, Value};

/// Output of target analysis: the context after the function (with its
/// result's origin paths recorded as values) and the paths it reads.
pub type TargetsResult = Result<(TargetsContext, Vec<TargetPath>)>;

/// A node of an expression tree.
///
/// Implementations must not keep per-call state: the same node is executed
/// concurrently for many messages.
pub trait Function: Send + Sync {
    /// Evaluate against a context
    fn exec(&self, ctx: &FunctionContext) -> Result<Value>;

    /// Report which fields evaluation may read, without evaluating
    fn query_targets(&self, ctx: TargetsContext) -> TargetsResult;

    /// The alias a capture node binds, if this is one
    fn alias(&self) -> Option<&str> {
        None
    }
}

impl fmt::Debug for dyn Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// Shared handle to a function node
pub type FunctionRef = Arc<dyn Function>;

struct ClosureFunction<E, A> {
    exec: E,
    analyze: A,
}

impl<E, A> Function for ClosureFunction<E, A>
where
    E: Fn(&FunctionContext) -> Result<Value> + Send + Sync,
    A: Fn(TargetsContext) -> TargetsResult + Send + Sync,
{
    fn exec(&self, ctx: &FunctionContext) -> Result<Value> {
        (self.exec)(ctx)
    }

    fn query_targets(&self, ctx: TargetsContext) -> TargetsResult {
        (self.analyze)(ctx)
    }
}

/// Build a function from an executor and a target analyzer.
///
/// Every expression form in this crate is assembled through this
/// constructor.
pub fn closure_function<E, A>(exec: E, analyze: A) -> FunctionRef
where
    E: Fn(&FunctionContext) -> Result<Value> + Send + Sync + 'static,
    A: Fn(TargetsContext) -> TargetsResult + Send + Sync + 'static,
{
    Arc::new(ClosureFunction { exec, analyze })
}

/// Build an analyzer reporting the targets of every present function, in
/// order, each analysed against the same input context.
pub fn aggregate_target_paths(
    fns: Vec<Option<FunctionRef>>,
) -> impl Fn(TargetsContext) -> TargetsResult + Send + Sync + 'static {
    move |ctx| {
        let mut targets = Vec::new();
        for function in fns.iter().flatten() {
            let (_, fn_targets) = function.query_targets(ctx.clone())?;
            targets.extend(fn_targets);
        }
        Ok((ctx.with_values(targets.clone()), targets))
    }
}
