//! Mapping DSL
//!
//! Mappings are written as YAML documents. Each statement names an
//! assignment target and an expression tree, spelled out node by node:
//!
//! ```yaml
//! name: classify
//! statements:
//!   - target: root.kind
//!     expr:
//!       op: match
//!       cases:
//!         - when: { op: eq, lhs: { op: this, path: a }, rhs: { op: lit, value: 1 } }
//!           then: { op: lit, value: first }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::expression::{
    MatchCase, new_if_function, new_match_function, new_named_context_function,
};
use crate::function::FunctionRef;
use crate::functions::{self, BinaryOp};
use crate::mapping::{AssignmentTarget, Mapping, MappingMode};
use crate::{Error, Result, Value};

/// Deepest expression nesting accepted by the compiler.
///
/// Kept below the YAML parser's own nesting limit (128 levels) so documents
/// that nest too deeply fail with [`Error::DepthExceeded`] rather than a
/// parse error. Every expression level takes at least one YAML level.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// A complete mapping definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingDefinition {
    /// Mapping name
    pub name: String,

    /// Whether output starts from the input message or from nothing
    #[serde(default)]
    pub mode: MappingMode,

    /// Assignments, applied in order
    #[serde(default)]
    pub statements: Vec<StatementDefinition>,
}

/// A single assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementDefinition {
    /// Target path (`root`, `root.a.b`, `meta` or `meta.key`)
    pub target: String,

    /// Expression producing the assigned value
    pub expr: Expr,
}

/// Operands of a binary operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operands {
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

/// A match case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseExpr {
    pub when: Expr,
    pub then: Expr,
}

/// An expression tree node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    /// Constant value
    Lit { value: Value },

    /// Field of the value in scope (empty path for the value itself)
    This {
        #[serde(default)]
        path: String,
    },

    /// Field of a captured value
    Var {
        name: String,
        #[serde(default)]
        path: String,
    },

    /// Metadata entry, or all metadata without a key
    Meta {
        #[serde(default)]
        key: Option<String>,
    },

    Eq(Operands),
    Ne(Operands),
    Gt(Operands),
    Ge(Operands),
    Lt(Operands),
    Le(Operands),
    Add(Operands),
    Sub(Operands),
    Mul(Operands),
    Div(Operands),
    And(Operands),
    Or(Operands),

    /// Boolean negation
    Not { expr: Box<Expr> },

    /// Conditional
    If {
        check: Box<Expr>,
        then: Box<Expr>,
        #[serde(default, rename = "else")]
        otherwise: Option<Box<Expr>>,
    },

    /// First-match-wins case analysis
    Match {
        #[serde(default)]
        context: Option<Box<Expr>>,
        #[serde(default)]
        cases: Vec<CaseExpr>,
    },

    /// Capture the pending value under an alias
    Capture { alias: String, expr: Box<Expr> },

    /// Map every element of an array or object
    MapEach { over: Box<Expr>, expr: Box<Expr> },
}

impl Expr {
    /// Compile into a function tree
    pub fn compile(&self) -> Result<FunctionRef> {
        self.compile_at(1)
    }

    fn compile_at(&self, depth: usize) -> Result<FunctionRef> {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(Error::DepthExceeded {
                max: MAX_EXPRESSION_DEPTH,
            });
        }
        let next = depth + 1;

        let function = match self {
            Expr::Lit { value } => functions::literal(value.clone()),
            Expr::This { path } => functions::field(parse_path(path)?),
            Expr::Var { name, path } => functions::alias_field(name.as_str(), parse_path(path)?),
            Expr::Meta { key } => functions::metadata(key.clone()),
            Expr::Eq(operands) => operands.compile(BinaryOp::Eq, next)?,
            Expr::Ne(operands) => operands.compile(BinaryOp::Ne, next)?,
            Expr::Gt(operands) => operands.compile(BinaryOp::Gt, next)?,
            Expr::Ge(operands) => operands.compile(BinaryOp::Ge, next)?,
            Expr::Lt(operands) => operands.compile(BinaryOp::Lt, next)?,
            Expr::Le(operands) => operands.compile(BinaryOp::Le, next)?,
            Expr::Add(operands) => operands.compile(BinaryOp::Add, next)?,
            Expr::Sub(operands) => operands.compile(BinaryOp::Sub, next)?,
            Expr::Mul(operands) => operands.compile(BinaryOp::Mul, next)?,
            Expr::Div(operands) => operands.compile(BinaryOp::Div, next)?,
            Expr::And(operands) => operands.compile(BinaryOp::And, next)?,
            Expr::Or(operands) => operands.compile(BinaryOp::Or, next)?,
            Expr::Not { expr } => functions::not(expr.compile_at(next)?),
            Expr::If {
                check,
                then,
                otherwise,
            } => new_if_function(
                check.compile_at(next)?,
                then.compile_at(next)?,
                otherwise
                    .as_ref()
                    .map(|expr| expr.compile_at(next))
                    .transpose()?,
            ),
            Expr::Match { context, cases } => {
                let context = context
                    .as_ref()
                    .map(|expr| expr.compile_at(next))
                    .transpose()?;
                let cases = cases
                    .iter()
                    .map(|case| {
                        Ok(MatchCase::new(
                            case.when.compile_at(next)?,
                            case.then.compile_at(next)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                new_match_function(context, cases)
            }
            Expr::Capture { alias, expr } => {
                if alias.is_empty() {
                    return Err(Error::Parse("capture alias must not be empty".to_string()));
                }
                new_named_context_function(alias.as_str(), expr.compile_at(next)?)
            }
            Expr::MapEach { over, expr } => {
                functions::map_each(over.compile_at(next)?, expr.compile_at(next)?)
            }
        };
        Ok(function)
    }
}

impl Operands {
    fn compile(&self, op: BinaryOp, depth: usize) -> Result<FunctionRef> {
        Ok(functions::binary(
            op,
            self.lhs.compile_at(depth)?,
            self.rhs.compile_at(depth)?,
        ))
    }
}

fn parse_path(path: &str) -> Result<Vec<String>> {
    sluice_value::parse_path(path).map_err(Error::from)
}

impl MappingDefinition {
    /// Compile every statement into an executable mapping
    pub fn compile(&self) -> Result<Mapping> {
        let mut mapping = Mapping::new(self.name.clone()).with_mode(self.mode);
        for (index, statement) in self.statements.iter().enumerate() {
            let target = AssignmentTarget::parse(&statement.target)?;
            let query = statement
                .expr
                .compile()
                .map_err(|e| Error::assignment(index, statement.target.clone(), e))?;
            mapping = mapping.assign(target, query);
        }
        Ok(mapping)
    }
}

/// DSL Parser
pub struct MappingDsl;

impl MappingDsl {
    /// Parse and compile a mapping from YAML
    pub fn parse(yaml: &str) -> Result<Mapping> {
        Self::parse_definition(yaml)?.compile()
    }

    /// Parse a mapping definition from YAML without compiling it
    pub fn parse_definition(yaml: &str) -> Result<MappingDefinition> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Parse(format!("Failed to parse DSL: {e}")))
    }

    /// Parse and compile a mapping from a file
    pub fn parse_file(path: &Path) -> Result<Mapping> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Parse(format!("Failed to read file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse and compile a single expression from YAML
    pub fn parse_expr(yaml: &str) -> Result<FunctionRef> {
        let expr: Expr = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Parse(format!("Failed to parse expression: {e}")))?;
        expr.compile()
    }

    /// Serialize a mapping definition to YAML
    pub fn to_yaml(definition: &MappingDefinition) -> Result<String> {
        serde_yaml::to_string(definition)
            .map_err(|e| Error::Parse(format!("Failed to serialize: {e}")))
    }
}
