//! Leaf functions: literals, field reads and operators
//!
//! This is a deliberately small catalog. It covers what mappings need to
//! address input data and combine it; richer string and collection methods
//! plug in the same way, through [`closure_function`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::FunctionContext;
use crate::function::{Function, FunctionRef, aggregate_target_paths, closure_function};
use crate::targets::{TargetPath, TargetsContext};
use crate::{Error, Result, Value};

/// A constant value
pub fn literal(value: Value) -> FunctionRef {
    closure_function(
        move |_: &FunctionContext| Ok(value.clone()),
        |ctx: TargetsContext| Ok((ctx.with_values(Vec::new()), Vec::new())),
    )
}

/// Read `path` from the value in scope. Missing fields read as null.
///
/// With no known scope the read is reported against the payload root.
pub fn field(path: Vec<String>) -> FunctionRef {
    let exec_path = path.clone();
    closure_function(
        move |ctx: &FunctionContext| {
            Ok(ctx
                .value()
                .and_then(|value| value.get_path(&exec_path))
                .cloned()
                .unwrap_or(Value::Null))
        },
        move |ctx: TargetsContext| {
            let targets: Vec<TargetPath> = if ctx.current().is_empty() {
                vec![TargetPath::value(path.clone())]
            } else {
                ctx.current()
                    .iter()
                    .map(|scope| scope.extended(&path))
                    .collect()
            };
            Ok((ctx.with_values(targets.clone()), targets))
        },
    )
}

/// Read `path` from the value captured under `alias`
pub fn alias_field(alias: impl Into<String>, path: Vec<String>) -> FunctionRef {
    let alias: Arc<str> = alias.into().into();
    let exec_alias = Arc::clone(&alias);
    let exec_path = path.clone();
    closure_function(
        move |ctx: &FunctionContext| {
            let value = ctx.named_value(&exec_alias).ok_or_else(|| Error::UnknownAlias {
                name: exec_alias.to_string(),
            })?;
            Ok(value.get_path(&exec_path).cloned().unwrap_or(Value::Null))
        },
        move |ctx: TargetsContext| {
            let scope = ctx.named_context(&alias).ok_or_else(|| Error::UnknownAlias {
                name: alias.to_string(),
            })?;
            let targets: Vec<TargetPath> = scope.iter().map(|p| p.extended(&path)).collect();
            Ok((ctx.with_values(targets.clone()), targets))
        },
    )
}

/// Read a metadata entry, or all metadata as an object when `key` is `None`.
/// Missing entries read as null.
pub fn metadata(key: Option<String>) -> FunctionRef {
    let exec_key = key.clone();
    closure_function(
        move |ctx: &FunctionContext| {
            Ok(match &exec_key {
                Some(key) => ctx.metadata(key).cloned().unwrap_or(Value::Null),
                None => Value::Object(ctx.all_metadata().clone()),
            })
        },
        move |ctx: TargetsContext| {
            let targets = vec![TargetPath::metadata(key.iter().cloned().collect())];
            Ok((ctx.with_values(targets.clone()), targets))
        },
    )
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Apply `op` to the results of `lhs` and `rhs`.
///
/// `&&` and `||` short-circuit and only accept booleans.
pub fn binary(op: BinaryOp, lhs: FunctionRef, rhs: FunctionRef) -> FunctionRef {
    let analyze = aggregate_target_paths(vec![Some(Arc::clone(&lhs)), Some(Arc::clone(&rhs))]);
    closure_function(
        move |ctx: &FunctionContext| {
            let left = lhs.exec(ctx)?;
            match op {
                BinaryOp::And | BinaryOp::Or => {
                    let left = expect_bool(op, &left)?;
                    if (op == BinaryOp::And && !left) || (op == BinaryOp::Or && left) {
                        return Ok(Value::Bool(left));
                    }
                    let right = rhs.exec(ctx)?;
                    Ok(Value::Bool(expect_bool(op, &right)?))
                }
                _ => {
                    let right = rhs.exec(ctx)?;
                    apply(op, &left, &right)
                }
            }
        },
        analyze,
    )
}

/// Boolean negation
pub fn not(function: FunctionRef) -> FunctionRef {
    let exec_fn = Arc::clone(&function);
    closure_function(
        move |ctx: &FunctionContext| match exec_fn.exec(ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(Error::type_mismatch("bool", &other)),
        },
        move |ctx: TargetsContext| function.query_targets(ctx),
    )
}

/// Evaluate `function` once per element of the array (or object) produced by
/// `target`, with the element in scope and pending for capture. Elements
/// mapped to [`Value::Nothing`] are dropped.
pub fn map_each(target: FunctionRef, function: FunctionRef) -> FunctionRef {
    let exec_target = Arc::clone(&target);
    let exec_fn = Arc::clone(&function);
    closure_function(
        move |ctx: &FunctionContext| match exec_target.exec(ctx)? {
            Value::Array(items) => {
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let value = exec_fn
                        .exec(&ctx.with_value(item))
                        .map_err(|e| Error::element(index.to_string(), e))?;
                    if !value.is_nothing() {
                        mapped.push(value);
                    }
                }
                Ok(Value::Array(mapped))
            }
            Value::Object(entries) => {
                let mut mapped = BTreeMap::new();
                for (key, item) in entries {
                    let value = exec_fn
                        .exec(&ctx.with_value(item))
                        .map_err(|e| Error::element(key.clone(), e))?;
                    if !value.is_nothing() {
                        mapped.insert(key, value);
                    }
                }
                Ok(Value::Object(mapped))
            }
            other => Err(Error::type_mismatch("array or object", &other)),
        },
        move |ctx: TargetsContext| {
            let (target_ctx, mut targets) = target.query_targets(ctx.clone())?;
            let element_ctx = target_ctx.with_values(targets.clone()).with_values_as_context();
            let (_, element_targets) = function.query_targets(element_ctx)?;
            targets.extend(element_targets);
            Ok((ctx.with_values(targets.clone()), targets))
        },
    )
}

fn expect_bool(op: BinaryOp, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| Error::TypeMismatch {
        expected: format!("bool operand for '{}'", op.symbol()),
        found: value.type_name().to_string(),
    })
}

fn operand_mismatch(op: BinaryOp, left: &Value, right: &Value) -> Error {
    Error::Evaluation(format!(
        "cannot apply '{}' to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
            left.as_f64() == right.as_f64()
        }
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering> {
    let ordering = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => return Err(operand_mismatch(op, left, right)),
        },
    };
    ordering.ok_or_else(|| operand_mismatch(op, left, right))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    if let (Value::Integer(l), Value::Integer(r)) = (left, right) {
        let result = match op {
            BinaryOp::Add => l.checked_add(*r),
            BinaryOp::Sub => l.checked_sub(*r),
            BinaryOp::Mul => l.checked_mul(*r),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(Value::Integer(result));
        }
        if op != BinaryOp::Div {
            return Err(Error::Evaluation(format!(
                "integer overflow in {l} {} {r}",
                op.symbol()
            )));
        }
    }

    let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
        return Err(operand_mismatch(op, left, right));
    };
    match op {
        BinaryOp::Add => Ok(Value::Float(l + r)),
        BinaryOp::Sub => Ok(Value::Float(l - r)),
        BinaryOp::Mul => Ok(Value::Float(l * r)),
        BinaryOp::Div if r == 0.0 => Err(Error::Evaluation(
            "attempted to divide by zero".to_string(),
        )),
        _ => Ok(Value::Float(l / r)),
    }
}

fn apply(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Gt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(op, left, right)? != Ordering::Less)),
        BinaryOp::Lt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(op, left, right)? != Ordering::Greater)),
        BinaryOp::Add => match (left, right) {
            (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
            _ => arithmetic(op, left, right),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, left, right),
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(
            expect_bool(op, left)? && expect_bool(op, right)?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::new_named_context_function;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(ToString::to_string).collect()
    }

    fn eval(function: &FunctionRef, input: serde_json::Value) -> Result<Value> {
        function.exec(&FunctionContext::from_value(Value::from(input)))
    }

    fn lit(value: impl Into<Value>) -> FunctionRef {
        literal(value.into())
    }

    #[test]
    fn test_field_reads_and_defaults_to_null() {
        let input = json!({"a": {"b": [10, 20]}});
        assert_eq!(eval(&field(path(&["a", "b", "1"])), input.clone()).unwrap(), Value::Integer(20));
        assert_eq!(eval(&field(path(&["a", "missing"])), input).unwrap(), Value::Null);
        assert_eq!(field(path(&["a"])).exec(&FunctionContext::new()).unwrap(), Value::Null);
    }

    #[test]
    fn test_metadata_reads() {
        let message = sluice_value::Message::new(Value::Null).with_metadata("topic", "orders");
        let ctx = FunctionContext::with_message(&message);

        assert_eq!(metadata(Some("topic".into())).exec(&ctx).unwrap(), Value::from("orders"));
        assert_eq!(metadata(Some("key".into())).exec(&ctx).unwrap(), Value::Null);
        let all = metadata(None).exec(&ctx).unwrap();
        assert_eq!(all.as_object().unwrap().len(), 1);

        let (_, targets) = metadata(Some("topic".into()))
            .query_targets(TargetsContext::new())
            .unwrap();
        assert_eq!(targets, vec![TargetPath::metadata(path(&["topic"]))]);
    }

    #[test]
    fn test_comparisons() {
        let cases = [
            (BinaryOp::Eq, lit(1i64), lit(1.0), true),
            (BinaryOp::Ne, lit("a"), lit("b"), true),
            (BinaryOp::Gt, lit(3i64), lit(2.5), true),
            (BinaryOp::Ge, lit("b"), lit("b"), true),
            (BinaryOp::Lt, lit(-3i64), lit(0i64), true),
            (BinaryOp::Le, lit(4i64), lit(3i64), false),
            (BinaryOp::Eq, lit(Value::Null), lit(Value::Null), true),
            (BinaryOp::Eq, lit("1"), lit(1i64), false),
        ];
        for (op, lhs, rhs, expected) in cases {
            let result = binary(op, lhs, rhs).exec(&FunctionContext::new()).unwrap();
            assert_eq!(result, Value::Bool(expected), "operator {op:?}");
        }
    }

    #[test]
    fn test_comparison_type_mismatch() {
        let err = binary(BinaryOp::Gt, lit("a"), lit(1i64))
            .exec(&FunctionContext::new())
            .unwrap_err();
        assert_eq!(
            err,
            Error::Evaluation("cannot apply '>' to string and integer".to_string())
        );
    }

    #[test]
    fn test_arithmetic() {
        let ctx = FunctionContext::new();
        assert_eq!(
            binary(BinaryOp::Add, lit(2i64), lit(3i64)).exec(&ctx).unwrap(),
            Value::Integer(5)
        );
        assert_eq!(
            binary(BinaryOp::Mul, lit(2i64), lit(1.5)).exec(&ctx).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            binary(BinaryOp::Div, lit(7i64), lit(2i64)).exec(&ctx).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            binary(BinaryOp::Add, lit("ab"), lit("cd")).exec(&ctx).unwrap(),
            Value::from("abcd")
        );
        assert!(matches!(
            binary(BinaryOp::Div, lit(1i64), lit(0i64)).exec(&ctx),
            Err(Error::Evaluation(message)) if message == "attempted to divide by zero"
        ));
        assert!(matches!(
            binary(BinaryOp::Add, lit(i64::MAX), lit(1i64)).exec(&ctx),
            Err(Error::Evaluation(message)) if message.starts_with("integer overflow")
        ));
    }

    #[test]
    fn test_boolean_operators_short_circuit() {
        let ctx = FunctionContext::new();
        let unbound = alias_field("nope", Vec::new());

        assert_eq!(
            binary(BinaryOp::And, lit(false), Arc::clone(&unbound)).exec(&ctx).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            binary(BinaryOp::Or, lit(true), Arc::clone(&unbound)).exec(&ctx).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            binary(BinaryOp::And, lit(true), lit("x")).exec(&ctx),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(not(lit(false)).exec(&ctx).unwrap(), Value::Bool(true));
        assert_eq!(
            not(lit(1i64)).exec(&ctx).unwrap_err(),
            Error::type_mismatch("bool", &Value::Integer(1))
        );
    }

    #[test]
    fn test_map_each_array_with_capture() {
        let function = map_each(
            field(path(&["items"])),
            new_named_context_function(
                "item",
                binary(
                    BinaryOp::Add,
                    alias_field("item", path(&["sku"])),
                    field(path(&["suffix"])),
                ),
            ),
        );
        let input = json!({
            "suffix": "-X",
            "items": [{"sku": "A"}, {"sku": "B"}]
        });
        assert_eq!(
            eval(&function, input).unwrap(),
            Value::from(json!(["A-X", "B-X"]))
        );

        let (_, targets) = function.query_targets(TargetsContext::new()).unwrap();
        assert_eq!(
            targets,
            vec![
                TargetPath::value(path(&["items"])),
                TargetPath::value(path(&["items", "sku"])),
                TargetPath::value(path(&["suffix"])),
            ]
        );
    }

    #[test]
    fn test_map_each_drops_nothing_and_maps_objects() {
        let keep_big = crate::expression::new_if_function(
            binary(BinaryOp::Gt, field(Vec::new()), lit(1i64)),
            field(Vec::new()),
            None,
        );
        let function = map_each(field(path(&["n"])), keep_big);

        assert_eq!(
            eval(&function, json!({"n": [1, 2, 3]})).unwrap(),
            Value::from(json!([2, 3]))
        );
        assert_eq!(
            eval(&function, json!({"n": {"a": 1, "b": 5}})).unwrap(),
            Value::from(json!({"b": 5}))
        );
        assert_eq!(
            eval(&function, json!({"n": "text"})).unwrap_err(),
            Error::type_mismatch("array or object", &Value::from("text"))
        );
    }

    #[test]
    fn test_map_each_element_errors_carry_key() {
        let function = map_each(field(path(&["n"])), not(field(Vec::new())));
        let err = eval(&function, json!({"n": [true, 3]})).unwrap_err();
        assert_eq!(
            err,
            Error::element("1", Error::type_mismatch("bool", &Value::Integer(3)))
        );
    }

    #[test]
    fn test_field_without_scope_targets_root() {
        let ctx = TargetsContext::new()
            .with_values(Vec::new())
            .with_values_as_context();
        let (_, targets) = field(path(&["a", "b"])).query_targets(ctx).unwrap();
        assert_eq!(targets, vec![TargetPath::value(path(&["a", "b"]))]);
    }

    #[test]
    fn test_map_each_scope_follows_target_reads() {
        // The target analyzer reports `items` but records no values.
        let items = closure_function(
            |ctx: &FunctionContext| {
                Ok(ctx
                    .value()
                    .and_then(|value| value.get_path(&path(&["items"])))
                    .cloned()
                    .unwrap_or(Value::Null))
            },
            |ctx: TargetsContext| Ok((ctx, vec![TargetPath::value(path(&["items"]))])),
        );
        let function = map_each(items, field(path(&["qty"])));

        let (_, targets) = function.query_targets(TargetsContext::new()).unwrap();
        assert_eq!(
            targets,
            vec![
                TargetPath::value(path(&["items"])),
                TargetPath::value(path(&["items", "qty"])),
            ]
        );
        assert_eq!(
            eval(&function, json!({"items": [{"qty": 1}, {"qty": 2}]})).unwrap(),
            Value::from(json!([1, 2]))
        );
    }

    #[test]
    fn test_unknown_alias_in_analysis() {
        let err = alias_field("ghost", Vec::new())
            .query_targets(TargetsContext::new())
            .unwrap_err();
        assert_eq!(err, Error::UnknownAlias { name: "ghost".into() });
    }
}
