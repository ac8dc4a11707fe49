//! DELETE command builder.

use crate::commands::{CommandSpec, render_criteria};
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use crate::error::AdapterResult;
use crate::schema::TableMetadata;
use crate::value::Value;

pub struct DeleteBuilder<'a> {
    table: &'a TableMetadata,
    dialect: &'a Dialect,
}

impl<'a> DeleteBuilder<'a> {
    pub fn new(table: &'a TableMetadata, dialect: &'a Dialect) -> Self {
        Self { table, dialect }
    }

    /// Build a parameterized DELETE. `criteria: None` targets every row and
    /// is only reachable through the explicit all-rows surface.
    pub fn build(&self, criteria: Option<&Criteria>) -> AdapterResult<CommandSpec> {
        let mut params: Vec<Value> = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.dialect.quote(&self.table.name));

        if let Some(criteria) = criteria {
            let clause = render_criteria(criteria, self.table, self.dialect, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        CommandSpec::new(sql, params, self.dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseKind;
    use crate::error::AdapterError;
    use crate::schema::ColumnMetadata;

    fn users() -> TableMetadata {
        TableMetadata::new("users")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key())
            .with_column(ColumnMetadata::new("age", "INTEGER", true))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_delete_with_criteria() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let criteria = Criteria::lt("age", 18i64);
        let spec = DeleteBuilder::new(&table, &dialect)
            .build(Some(&criteria))
            .unwrap();
        assert_eq!(spec.sql(), "DELETE FROM \"users\" WHERE \"age\" < ?");
        assert_eq!(spec.params(), &[Value::Int(18)]);
    }

    #[test]
    fn test_delete_all_rows() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let spec = DeleteBuilder::new(&table, &dialect).build(None).unwrap();
        assert_eq!(spec.sql(), "DELETE FROM \"users\"");
    }

    #[test]
    fn test_unknown_criteria_column_rejected() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let criteria = Criteria::eq("missing", 1i64);
        let err = DeleteBuilder::new(&table, &dialect).build(Some(&criteria));
        assert!(matches!(err, Err(AdapterError::InvalidCriteria { .. })));
    }
}
