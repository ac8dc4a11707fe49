//! INSERT command builder.

use crate::commands::CommandSpec;
use crate::config::DatabaseKind;
use crate::dialect::Dialect;
use crate::error::{AdapterError, AdapterResult};
use crate::row::Row;
use crate::schema::TableMetadata;
use crate::value::Value;

pub struct InsertBuilder<'a> {
    table: &'a TableMetadata,
    dialect: &'a Dialect,
}

impl<'a> InsertBuilder<'a> {
    pub fn new(table: &'a TableMetadata, dialect: &'a Dialect) -> Self {
        Self { table, dialect }
    }

    /// Build a parameterized INSERT for the supplied row. Columns not present
    /// in the row are left to their defaults; a primary-key column that the
    /// backend does not assign and the row does not supply fails fast. When
    /// the dialect can return generated values inline, `RETURNING *` is
    /// appended so the caller reads the inserted row from the same statement.
    pub fn build(&self, row: &Row) -> AdapterResult<CommandSpec> {
        for column in row.columns() {
            if !self.table.has_column(column) {
                return Err(AdapterError::unknown_column(&self.table.name, column));
            }
        }

        for key_column in &self.table.primary_key {
            let meta = self
                .table
                .column(key_column)
                .ok_or_else(|| AdapterError::unknown_column(&self.table.name, key_column))?;
            if !meta.has_default && !meta.is_identity && !row.contains(key_column) {
                return Err(AdapterError::missing_key(
                    &self.table.name,
                    format!("key column '{key_column}' has no default and no supplied value"),
                ));
            }
        }

        let mut sql = format!("INSERT INTO {}", self.dialect.quote(&self.table.name));
        let mut params: Vec<Value> = Vec::with_capacity(row.len());

        if row.is_empty() {
            match self.dialect.kind() {
                DatabaseKind::MySql => sql.push_str(" () VALUES ()"),
                DatabaseKind::Postgres | DatabaseKind::Sqlite => sql.push_str(" DEFAULT VALUES"),
            }
        } else {
            let mut columns = Vec::with_capacity(row.len());
            let mut placeholders = Vec::with_capacity(row.len());
            for (column, value) in row.iter() {
                params.push(value.clone());
                columns.push(self.dialect.quote(column));
                placeholders.push(self.dialect.placeholder(params.len()));
            }
            sql.push_str(&format!(
                " ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ));
        }

        if self.dialect.supports_returning() {
            sql.push_str(" RETURNING *");
        }

        CommandSpec::new(sql, params, self.dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMetadata;

    fn users() -> TableMetadata {
        TableMetadata::new("users")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key().identity())
            .with_column(ColumnMetadata::new("name", "TEXT", true))
            .with_column(ColumnMetadata::new("age", "INTEGER", true))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_basic_insert() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let row = Row::new().with("name", "Ann").with("age", 32i64);
        let spec = InsertBuilder::new(&table, &dialect).build(&row).unwrap();
        assert_eq!(
            spec.sql(),
            "INSERT INTO \"users\" (\"name\", \"age\") VALUES (?, ?)"
        );
        assert_eq!(spec.params().len(), 2);
    }

    #[test]
    fn test_postgres_appends_returning() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Postgres);
        let row = Row::new().with("name", "Ann");
        let spec = InsertBuilder::new(&table, &dialect).build(&row).unwrap();
        assert_eq!(
            spec.sql(),
            "INSERT INTO \"users\" (\"name\") VALUES ($1) RETURNING *"
        );
    }

    #[test]
    fn test_unknown_column_rejected() {
        let table = users();
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let row = Row::new().with("email", "ann@example.com");
        let err = InsertBuilder::new(&table, &dialect).build(&row);
        assert!(matches!(err, Err(AdapterError::UnknownColumn { .. })));
    }

    #[test]
    fn test_missing_required_key_rejected() {
        let table = TableMetadata::new("codes")
            .with_column(ColumnMetadata::new("code", "TEXT", false).primary_key())
            .with_column(ColumnMetadata::new("label", "TEXT", true))
            .with_primary_key(["code"]);
        let dialect = Dialect::for_kind(DatabaseKind::Sqlite);
        let row = Row::new().with("label", "one");
        let err = InsertBuilder::new(&table, &dialect).build(&row);
        assert!(matches!(err, Err(AdapterError::MissingKey { .. })));
    }

    #[test]
    fn test_empty_row_uses_defaults() {
        let table = users();
        let sqlite = Dialect::for_kind(DatabaseKind::Sqlite);
        let spec = InsertBuilder::new(&table, &sqlite).build(&Row::new()).unwrap();
        assert_eq!(spec.sql(), "INSERT INTO \"users\" DEFAULT VALUES");

        let mysql = Dialect::for_kind(DatabaseKind::MySql);
        let spec = InsertBuilder::new(&table, &mysql).build(&Row::new()).unwrap();
        assert_eq!(spec.sql(), "INSERT INTO `users` () VALUES ()");
    }
}
