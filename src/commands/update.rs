//! UPDATE command builder.

use crate::commands::{CommandSpec, render_criteria};
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use crate::error::{AdapterError, AdapterResult};
use crate::row::Row;
use crate::schema::TableMetadata;
use crate::value::Value;

pub struct UpdateBuilder<'a> {
    table: &'a TableMetadata,
    dialect: &'a Dialect,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(table: &'a TableMetadata, dialect: &'a Dialect) -> Self {
        Self { table, dialect }
    }

    /// Build a parameterized UPDATE setting the row's columns. A payload
    /// with zero columns fails before any SQL is produced. `criteria: None`
    /// targets every row - callers reach this only through an explicit
    /// all-rows surface, never by accident.
    pub fn build(&self, data: &Row, criteria: Option<&Criteria>) -> AdapterResult<CommandSpec> {
        if data.is_empty() {
            return Err(AdapterError::empty_update(&self.table.name));
        }
        for column in data.columns() {
            if !self.table.has_column(column) {
                return Err(AdapterError::unknown_column(&self.table.name, column));
            }
        }

        let mut params: Vec<Value> = Vec::with_capacity(data.len());
        let mut assignments = Vec::with_capacity(data.len());
        for (column, value) in data.iter() {
            params.push(value.clone());
            assignments.push(format!(
                "{} = {}",
                self.dialect.quote(column),
                self.dialect.placeholder(params.len())
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote(&self.table.name),
            assignments.join(", ")
        );

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
    use crate::schema::ColumnMetadata;

    fn users() -> TableMetadata {
        TableMetadata::new("users")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key())
            .with_column(ColumnMetadata::new("name", "TEXT", true))
            .with_column(ColumnMetadata::new("age", "INTEGER", true))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_update_with_criteria() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Postgres);
        let data = Row::new().with("name", "Bob");
        let criteria = Criteria::eq("id", 1i64);
        let spec = UpdateBuilder::new(&table, &dialect)
            .build(&data, Some(&criteria))
            .unwrap();
        assert_eq!(
            spec.sql(),
            "UPDATE \"users\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(
            spec.params(),
            &[Value::Text("Bob".into()), Value::Int(1)]
        );
    }

    #[test]
    fn test_update_all_rows_has_no_where() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let data = Row::new().with("age", 0i64);
        let spec = UpdateBuilder::new(&table, &dialect).build(&data, None).unwrap();
        assert_eq!(spec.sql(), "UPDATE \"users\" SET \"age\" = ?");
    }

    #[test]
    fn test_empty_payload_rejected() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let err = UpdateBuilder::new(&table, &dialect).build(&Row::new(), None);
        assert!(matches!(err, Err(AdapterError::EmptyUpdate { .. })));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let data = Row::new().with("email", "x");
        let err = UpdateBuilder::new(&table, &dialect).build(&data, None);
        assert!(matches!(err, Err(AdapterError::UnknownColumn { .. })));
    }
}
