//! Composite expression forms: match, if/else and named context capture

use std::sync::Arc;

use crate::context::FunctionContext;
use crate::function::{
    Function, FunctionRef, TargetsResult, aggregate_target_paths, closure_function,
};
use crate::targets::TargetsContext;
use crate::{Error, Result, Value};

/// Alias that consumes a pending value without binding it
pub const DISCARD_ALIAS: &str = "_";

/// A single case of a match expression: when `case_fn` yields `true`,
/// `query_fn` is executed and its result returned.
#[derive(Debug, Clone)]
pub struct MatchCase {
    case_fn: FunctionRef,
    query_fn: FunctionRef,
}

impl MatchCase {
    pub fn new(case_fn: FunctionRef, query_fn: FunctionRef) -> Self {
        Self { case_fn, query_fn }
    }
}

/// Create a match expression.
///
/// The context function (the value in scope when `None`) is evaluated once
/// and becomes the value in scope for every case. Cases are checked in
/// order; the first whose check yields boolean `true` wins. Non-boolean
/// results count as `false`. Without a winning case the result is
/// [`Value::Nothing`].
pub fn new_match_function(context_fn: Option<FunctionRef>, cases: Vec<MatchCase>) -> FunctionRef {
    let cases: Arc<[MatchCase]> = cases.into();

    let exec_context = context_fn.clone();
    let exec_cases = Arc::clone(&cases);

    closure_function(
        move |ctx: &FunctionContext| {
            let subject = match &exec_context {
                Some(context_fn) => context_fn.exec(ctx)?,
                None => ctx.value().cloned().unwrap_or(Value::Null),
            };
            for (index, case) in exec_cases.iter().enumerate() {
                let case_ctx = ctx.with_value(subject.clone());
                let matched = case
                    .case_fn
                    .exec(&case_ctx)
                    .map_err(|e| Error::match_case(index, e))?;
                if let Value::Bool(true) = matched {
                    return case.query_fn.exec(&case_ctx);
                }
            }
            Ok(Value::Nothing)
        },
        move |ctx: TargetsContext| {
            // Cases see the paths the context reads as their scope. Without a
            // context function they stay in the enclosing scope.
            let (context_ctx, context_targets, scope) = match &context_fn {
                Some(context_fn) => {
                    let (context_ctx, context_targets) = context_fn.query_targets(ctx.clone())?;
                    let scope = context_targets.clone();
                    (context_ctx, context_targets, scope)
                }
                None => (ctx.clone(), Vec::new(), ctx.current().to_vec()),
            };
            let context_ctx = context_ctx.with_values(scope).with_values_as_context();

            // Any case may be the one that matches, so all of them count.
            let mut targets = Vec::new();
            for case in cases.iter() {
                let (_, case_targets) = case.case_fn.query_targets(context_ctx.clone())?;
                targets.extend(case_targets);

                let (_, query_targets) = case.query_fn.query_targets(context_ctx.clone())?;
                targets.extend(query_targets);
            }

            targets.extend(context_targets);
            Ok((ctx.with_values(targets.clone()), targets))
        },
    )
}

/// Create an if expression. When `query_fn` yields boolean `true` the result
/// of `if_fn` is returned, otherwise that of `else_fn`, or
/// [`Value::Nothing`] when there is no else branch.
pub fn new_if_function(
    query_fn: FunctionRef,
    if_fn: FunctionRef,
    else_fn: Option<FunctionRef>,
) -> FunctionRef {
    let analyze = aggregate_target_paths(vec![
        Some(Arc::clone(&query_fn)),
        Some(Arc::clone(&if_fn)),
        else_fn.clone(),
    ]);

    closure_function(
        move |ctx: &FunctionContext| {
            let query_val = query_fn.exec(ctx).map_err(Error::condition)?;
            if let Value::Bool(true) = query_val {
                return if_fn.exec(ctx);
            }
            match &else_fn {
                Some(else_fn) => else_fn.exec(ctx),
                None => Ok(Value::Nothing),
            }
        },
        analyze,
    )
}

/// A capture node. Execution and analysis are closure-built; the alias stays
/// inspectable through [`Function::alias`].
struct NamedContextFunction {
    name: Arc<str>,
    inner: FunctionRef,
}

impl Function for NamedContextFunction {
    fn exec(&self, ctx: &FunctionContext) -> Result<Value> {
        self.inner.exec(ctx)
    }

    fn query_targets(&self, ctx: TargetsContext) -> TargetsResult {
        self.inner.query_targets(ctx)
    }

    fn alias(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Wrap a function so that the most recently pushed value is captured under
/// `name` before the function runs.
///
/// The value in scope is restored to what it was before the push, so the
/// wrapped function sees the outer value as `this` and the captured one by
/// name. Capturing as [`DISCARD_ALIAS`] drops the value.
pub fn new_named_context_function(name: impl Into<String>, function: FunctionRef) -> FunctionRef {
    let name: Arc<str> = name.into().into();
    let exec_name = Arc::clone(&name);
    let analyze_name = Arc::clone(&name);
    let exec_fn = Arc::clone(&function);

    let inner = closure_function(
        move |ctx: &FunctionContext| {
            let (value, next) = ctx.pop_value();
            let value = value.ok_or_else(|| Error::no_context(&*exec_name))?;
            let next = if &*exec_name == DISCARD_ALIAS {
                next
            } else {
                next.with_named_value(&*exec_name, value)
            };
            exec_fn.exec(&next)
        },
        move |ctx: TargetsContext| {
            let next = if &*analyze_name == DISCARD_ALIAS {
                ctx.pop_context()
                    .map(|(_, next)| next)
                    .ok_or_else(|| Error::no_context(&*analyze_name))?
            } else {
                ctx.with_context_as_named(&analyze_name)?
            };
            function.query_targets(next)
        },
    );
    Arc::new(NamedContextFunction { name, inner })
}
