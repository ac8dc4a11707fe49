//! Filter criteria.
//!
//! [`Criteria`] is a tagged expression tree over column references, literal
//! values, and boolean operators. Criteria are translated to parameterized
//! SQL by the command builders - they are never evaluated in-process, so
//! every node must have a SQL rendering or translation fails.

use crate::value::Value;

/// Comparison operator for a single-column predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Like,
}

impl CompareOp {
    /// SQL operator token.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Like => "LIKE",
        }
    }
}

/// A boolean filter expression over column values.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// `column <op> value`. Equality against [`Value::Null`] renders as
    /// `IS NULL` / `IS NOT NULL`.
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    /// `column IN (v1, v2, ...)`. An empty list fails translation.
    In { column: String, values: Vec<Value> },
    And(Box<Criteria>, Box<Criteria>),
    Or(Box<Criteria>, Box<Criteria>),
    Not(Box<Criteria>),
}

impl Criteria {
    fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    /// `column <> value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::NotEq, value)
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    /// `column >= value`
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::GtEq, value)
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    /// `column <= value`
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::LtEq, value)
    }

    /// `column LIKE pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, CompareOp::Like, pattern.into())
    }

    /// `column IN (values...)`
    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Combine with another criteria using AND.
    pub fn and(self, other: Criteria) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Combine with another criteria using OR.
    pub fn or(self, other: Criteria) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Negate a criteria.
    pub fn not(inner: Criteria) -> Self {
        Self::Not(Box::new(inner))
    }

    /// All column names referenced anywhere in the tree.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { column, .. } | Self::In { column, .. } => out.push(column),
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Self::Not(inner) => inner.collect_columns(out),
        }
    }
}
