//! Parameterized SQL commands.
//!
//! A [`CommandSpec`] is an immutable unit of SQL text plus its ordered
//! parameter list, not yet bound to any connection. Builders produce specs;
//! the execution layer binds and runs them. Placeholder/parameter parity is
//! checked at build time so a malformed command never reaches a connection.

mod delete;
mod insert;
mod select;
mod update;

pub use delete::DeleteBuilder;
pub use insert::InsertBuilder;
pub use select::SelectBuilder;
pub use update::UpdateBuilder;

use crate::criteria::{CompareOp, Criteria};
use crate::dialect::{Dialect, ParamStyle};
use crate::error::{AdapterError, AdapterResult};
use crate::schema::TableMetadata;
use crate::value::Value;

/// An immutable SQL command with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    sql: String,
    params: Vec<Value>,
}

impl CommandSpec {
    /// Create a spec, verifying that the SQL's placeholder count matches the
    /// parameter count.
    pub fn new(sql: String, params: Vec<Value>, dialect: &Dialect) -> AdapterResult<Self> {
        let placeholders = count_placeholders(&sql, dialect.param_style());
        if placeholders != params.len() {
            return Err(AdapterError::internal(format!(
                "Command has {} placeholder(s) but {} parameter(s): {}",
                placeholders,
                params.len(),
                sql
            )));
        }
        Ok(Self { sql, params })
    }

    /// A spec with no parameters (identity retrieval, PRAGMA-style commands).
    pub fn bare(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Count parameter placeholders in generated SQL. Generated text never
/// inlines user values, so a bare scan is exact.
fn count_placeholders(sql: &str, style: ParamStyle) -> usize {
    match style {
        ParamStyle::QuestionMark => sql.matches('?').count(),
        ParamStyle::Dollar => {
            let bytes = sql.as_bytes();
            let mut max = 0usize;
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'$' {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                    if end > start {
                        if let Ok(n) = sql[start..end].parse::<usize>() {
                            max = max.max(n);
                        }
                    }
                    i = end;
                } else {
                    i += 1;
                }
            }
            max
        }
    }
}

/// Translate a criteria tree into a SQL fragment, appending bound values to
/// `params`. Pure and recursive; the only provider dependence is the
/// dialect's placeholder and quoting style.
pub(crate) fn render_criteria(
    criteria: &Criteria,
    table: &TableMetadata,
    dialect: &Dialect,
    params: &mut Vec<Value>,
) -> AdapterResult<String> {
    match criteria {
        Criteria::Compare { column, op, value } => {
            let column_sql = resolve_column(column, table, dialect)?;
            if value.is_null() {
                return match op {
                    CompareOp::Eq => Ok(format!("{column_sql} IS NULL")),
                    CompareOp::NotEq => Ok(format!("{column_sql} IS NOT NULL")),
                    _ => Err(AdapterError::invalid_criteria(format!(
                        "operator {} cannot compare against NULL",
                        op.as_sql()
                    ))),
                };
            }
            params.push(value.clone());
            Ok(format!(
                "{column_sql} {} {}",
                op.as_sql(),
                dialect.placeholder(params.len())
            ))
        }
        Criteria::In { column, values } => {
            if values.is_empty() {
                return Err(AdapterError::invalid_criteria(format!(
                    "IN list for column '{column}' is empty"
                )));
            }
            let column_sql = resolve_column(column, table, dialect)?;
            let mut placeholders = Vec::with_capacity(values.len());
            for value in values {
                params.push(value.clone());
                placeholders.push(dialect.placeholder(params.len()));
            }
            Ok(format!("{column_sql} IN ({})", placeholders.join(", ")))
        }
        Criteria::And(lhs, rhs) => {
            let left = render_criteria(lhs, table, dialect, params)?;
            let right = render_criteria(rhs, table, dialect, params)?;
            Ok(format!("({left} AND {right})"))
        }
        Criteria::Or(lhs, rhs) => {
            let left = render_criteria(lhs, table, dialect, params)?;
            let right = render_criteria(rhs, table, dialect, params)?;
            Ok(format!("({left} OR {right})"))
        }
        Criteria::Not(inner) => {
            let inner_sql = render_criteria(inner, table, dialect, params)?;
            Ok(format!("NOT ({inner_sql})"))
        }
    }
}

/// Resolve a criteria column reference. Unqualified names must exist on the
/// table; qualified names (`table.column`, produced by joined queries) pass
/// through with per-part quoting.
fn resolve_column(column: &str, table: &TableMetadata, dialect: &Dialect) -> AdapterResult<String> {
    if column.contains('.') {
        return Ok(dialect.quote(column));
    }
    if !table.has_column(column) {
        return Err(AdapterError::invalid_criteria(format!(
            "column '{}' does not exist on table '{}'",
            column, table.name
        )));
    }
    Ok(dialect.quote(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseKind;
    use crate::schema::ColumnMetadata;

    fn orders() -> TableMetadata {
        TableMetadata::new("orders")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key())
            .with_column(ColumnMetadata::new("status", "TEXT", true))
            .with_column(ColumnMetadata::new("total", "REAL", true))
            .with_primary_key(["id"])
    }

    fn sqlite() -> Dialect {
        Dialect::for_kind(DatabaseKind::Sqlite)
    }

    fn postgres() -> Dialect {
        Dialect::for_kind(DatabaseKind::Postgres)
    }

    #[test]
    fn test_placeholder_parity_enforced() {
        let dialect = sqlite();
        let err = CommandSpec::new(
            "SELECT * FROM t WHERE a = ? AND b = ?".into(),
            vec![Value::Int(1)],
            &dialect,
        );
        assert!(matches!(err, Err(AdapterError::Internal { .. })));

        let ok = CommandSpec::new(
            "SELECT * FROM t WHERE a = ?".into(),
            vec![Value::Int(1)],
            &dialect,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_dollar_placeholder_count() {
        assert_eq!(
            count_placeholders("SELECT * FROM t WHERE a = $1 AND b = $2", ParamStyle::Dollar),
            2
        );
        // Repeated placeholders count by highest index.
        assert_eq!(
            count_placeholders("WHERE a = $1 OR b = $1", ParamStyle::Dollar),
            1
        );
    }

    #[test]
    fn test_render_simple_compare() {
        let mut params = Vec::new();
        let sql =
            render_criteria(&Criteria::eq("status", "open"), &orders(), &sqlite(), &mut params)
                .unwrap();
        assert_eq!(sql, "\"status\" = ?");
        assert_eq!(params, vec![Value::Text("open".into())]);
    }

    #[test]
    fn test_render_nested_grouping() {
        let criteria = Criteria::eq("status", "open")
            .and(Criteria::gt("total", 100i64).or(Criteria::lt("total", 10i64)));
        let mut params = Vec::new();
        let sql = render_criteria(&criteria, &orders(), &postgres(), &mut params).unwrap();
        assert_eq!(
            sql,
            "(\"status\" = $1 AND (\"total\" > $2 OR \"total\" < $3))"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_render_null_comparisons() {
        let mut params = Vec::new();
        let sql = render_criteria(
            &Criteria::eq("status", Value::Null),
            &orders(),
            &sqlite(),
            &mut params,
        )
        .unwrap();
        assert_eq!(sql, "\"status\" IS NULL");
        assert!(params.is_empty());

        let sql = render_criteria(
            &Criteria::ne("status", Value::Null),
            &orders(),
            &sqlite(),
            &mut params,
        )
        .unwrap();
        assert_eq!(sql, "\"status\" IS NOT NULL");

        let err = render_criteria(
            &Criteria::gt("total", Value::Null),
            &orders(),
            &sqlite(),
            &mut params,
        );
        assert!(matches!(err, Err(AdapterError::InvalidCriteria { .. })));
    }

    #[test]
    fn test_render_in_list() {
        let mut params = Vec::new();
        let sql = render_criteria(
            &Criteria::is_in("id", [1i64, 2, 3]),
            &orders(),
            &postgres(),
            &mut params,
        )
        .unwrap();
        assert_eq!(sql, "\"id\" IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);

        let err = render_criteria(
            &Criteria::is_in("id", Vec::<i64>::new()),
            &orders(),
            &postgres(),
            &mut params,
        );
        assert!(matches!(err, Err(AdapterError::InvalidCriteria { .. })));
    }

    #[test]
    fn test_unknown_column_fails_translation() {
        let mut params = Vec::new();
        let err = render_criteria(
            &Criteria::eq("missing", 1i64),
            &orders(),
            &sqlite(),
            &mut params,
        );
        assert!(matches!(err, Err(AdapterError::InvalidCriteria { .. })));
    }

    #[test]
    fn test_not_renders_with_grouping() {
        let mut params = Vec::new();
        let sql = render_criteria(
            &Criteria::not(Criteria::eq("status", "open")),
            &orders(),
            &sqlite(),
            &mut params,
        )
        .unwrap();
        assert_eq!(sql, "NOT (\"status\" = ?)");
    }
}
