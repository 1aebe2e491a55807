//! Compiled label predicate.
//!
//! A missing label compares like an empty value would in a negative test:
//! `key != v`, `key !~ re` and `key NOT IN (...)` match series without the
//! label, every positive comparison does not.

use super::ast::{FilterExpr, LogicalOp, Operator, Value};
use super::parser::parse_filter;
use crate::core::{LabelSet, Result, StrataError};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone)]
enum Predicate {
    All,
    Equals { key: String, value: Value, negated: bool },
    Numeric { key: String, op: Operator, value: f64 },
    Regex { key: String, regex: Regex, negated: bool },
    Contains { key: String, needle: String },
    In { key: String, values: Vec<Value>, negated: bool },
    Exists { key: String, negated: bool },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

/// Label predicate ready to be evaluated against many series.
#[derive(Debug, Clone)]
pub struct LabelFilter {
    predicate: Predicate,
    source: String,
}

impl LabelFilter {
    /// Filter matching every label set.
    pub fn all() -> Self {
        Self {
            predicate: Predicate::All,
            source: String::new(),
        }
    }

    /// Parse and compile a filter expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = parse_filter(expression)?;
        Ok(Self {
            predicate: compile(expr)?,
            source: expression.trim().to_string(),
        })
    }

    pub fn is_all(&self) -> bool {
        matches!(self.predicate, Predicate::All)
    }

    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.predicate.eval(labels)
    }
}

impl Default for LabelFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.source)
        }
    }
}

fn compile(expr: FilterExpr) -> Result<Predicate> {
    Ok(match expr {
        FilterExpr::All => Predicate::All,
        FilterExpr::Group(inner) => compile(*inner)?,
        FilterExpr::Not(inner) => Predicate::Not(Box::new(compile(*inner)?)),
        FilterExpr::Logical { op, left, right } => {
            let (left, right) = (Box::new(compile(*left)?), Box::new(compile(*right)?));
            match op {
                LogicalOp::And => Predicate::And(left, right),
                LogicalOp::Or => Predicate::Or(left, right),
            }
        },
        FilterExpr::Exists { key, negated } => Predicate::Exists { key, negated },
        FilterExpr::In {
            key,
            values,
            negated,
        } => Predicate::In {
            key,
            values,
            negated,
        },
        FilterExpr::Comparison { key, op, value } => match op {
            Operator::Eq | Operator::NotEq => Predicate::Equals {
                key,
                value,
                negated: op == Operator::NotEq,
            },
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let number = value.as_number().ok_or_else(|| {
                    StrataError::parse(format!(
                        "'{} {} {}' needs a numeric value",
                        key, op, value
                    ))
                })?;
                Predicate::Numeric {
                    key,
                    op,
                    value: number,
                }
            },
            Operator::Regex | Operator::NotRegex => {
                let regex = Regex::new(value.as_text()).map_err(|e| {
                    StrataError::parse(format!("invalid regex for '{}': {}", key, e))
                })?;
                Predicate::Regex {
                    key,
                    regex,
                    negated: op == Operator::NotRegex,
                }
            },
            Operator::Contains => Predicate::Contains {
                key,
                needle: value.as_text().to_string(),
            },
        },
    })
}

fn value_equals(label: &str, value: &Value) -> bool {
    match value {
        Value::String(s) => label == s,
        Value::Number { value, raw } => {
            label == raw || label.trim().parse::<f64>().map_or(false, |l| l == *value)
        },
    }
}

impl Predicate {
    fn eval(&self, labels: &LabelSet) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Equals {
                key,
                value,
                negated,
            } => {
                let equal = labels.get(key).map_or(false, |l| value_equals(l, value));
                equal != *negated
            },
            Predicate::Numeric { key, op, value } => labels
                .get(key)
                .and_then(|l| l.trim().parse::<f64>().ok())
                .map_or(false, |l| match op {
                    Operator::Gt => l > *value,
                    Operator::Gte => l >= *value,
                    Operator::Lt => l < *value,
                    Operator::Lte => l <= *value,
                    _ => false,
                }),
            Predicate::Regex {
                key,
                regex,
                negated,
            } => {
                let found = labels.get(key).map_or(false, |l| regex.is_match(l));
                found != *negated
            },
            Predicate::Contains { key, needle } => {
                labels.get(key).map_or(false, |l| l.contains(needle.as_str()))
            },
            Predicate::In {
                key,
                values,
                negated,
            } => {
                let found = labels
                    .get(key)
                    .map_or(false, |l| values.iter().any(|v| value_equals(l, v)));
                found != *negated
            },
            Predicate::Exists { key, negated } => labels.contains_key(key) != *negated,
            Predicate::Not(inner) => !inner.eval(labels),
            Predicate::And(left, right) => left.eval(labels) && right.eval(labels),
            Predicate::Or(left, right) => left.eval(labels) || right.eval(labels),
        }
    }
}
