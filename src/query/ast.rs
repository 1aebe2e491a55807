//! Abstract Syntax Tree for label filter expressions.

use std::fmt;

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `key op value`
    Comparison {
        key: String,
        op: Operator,
        value: Value,
    },
    /// `key IN (a, b)` or `key NOT IN (a, b)`
    In {
        key: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `key EXISTS` or `key NOT EXISTS`
    Exists { key: String, negated: bool },
    /// `NOT expr`
    Not(Box<FilterExpr>),
    /// Logical combination of filters
    Logical {
        op: LogicalOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    /// Parenthesized expression
    Group(Box<FilterExpr>),
    /// Match all (empty expression)
    All,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Regex match
    Regex,
    /// Regex non-match
    NotRegex,
    /// Contains substring
    Contains,
}

impl Operator {
    /// Operators that compare label values as numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte)
    }
}

/// Literal on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Quoted or bare word
    String(String),
    /// Numeric literal, with the text it was written as
    Number { value: f64, raw: String },
}

impl Value {
    /// Text form used for string comparisons.
    pub fn as_text(&self) -> &str {
        match self {
            Value::String(s) => s,
            Value::Number { raw, .. } => raw,
        }
    }

    /// Numeric form, if the literal is or parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number { value, .. } => Some(*value),
            Value::String(s) => s.trim().parse().ok(),
        }
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "="),
            Operator::NotEq => write!(f, "!="),
            Operator::Gt => write!(f, ">"),
            Operator::Gte => write!(f, ">="),
            Operator::Lt => write!(f, "<"),
            Operator::Lte => write!(f, "<="),
            Operator::Regex => write!(f, "=~"),
            Operator::NotRegex => write!(f, "!~"),
            Operator::Contains => write!(f, "CONTAINS"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Number { raw, .. } => write!(f, "{}", raw),
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Comparison { key, op, value } => write!(f, "{} {} {}", key, op, value),
            FilterExpr::In {
                key,
                values,
                negated,
            } => {
                write!(f, "{} {}IN (", key, if *negated { "NOT " } else { "" })?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            },
            FilterExpr::Exists { key, negated } => {
                write!(f, "{} {}EXISTS", key, if *negated { "NOT " } else { "" })
            },
            FilterExpr::Not(inner) => write!(f, "NOT {}", inner),
            FilterExpr::Logical { op, left, right } => write!(f, "{} {} {}", left, op, right),
            FilterExpr::Group(inner) => write!(f, "({})", inner),
            FilterExpr::All => write!(f, "*"),
        }
    }
}
