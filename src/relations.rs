//! Foreign-key relation navigation.
//!
//! Relationships are discovered from the schema catalog's foreign-key
//! metadata and navigable in either direction: a table whose key is
//! referenced resolves to many related rows; a table holding the foreign key
//! resolves to at most one. A pair with no connecting key is an explicit
//! [`AdapterError::NoRelation`], distinct from an empty result.

use crate::commands::SelectBuilder;
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use crate::error::{AdapterError, AdapterResult};
use crate::exec::Session;
use crate::row::Row;
use crate::schema::{SchemaCatalog, TableMetadata};

/// Result of navigating a relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// To-one: the row's own foreign key points at the related table.
    One(Option<Row>),
    /// To-many: the related table's foreign keys point back at the row.
    Many(Vec<Row>),
}

pub(crate) struct RelationResolver<'a> {
    catalog: &'a SchemaCatalog,
    dialect: &'a Dialect,
}

impl<'a> RelationResolver<'a> {
    pub fn new(catalog: &'a SchemaCatalog, dialect: &'a Dialect) -> Self {
        Self { catalog, dialect }
    }

    /// True iff a foreign key connects the two tables directly, in either
    /// direction.
    pub async fn is_valid_relation(
        &self,
        table: &str,
        related_table: &str,
    ) -> AdapterResult<bool> {
        let table = self.catalog.table(table).await?;
        let related = self.catalog.table(related_table).await?;
        Ok(related
            .foreign_keys
            .iter()
            .any(|fk| fk.references(&table.name))
            || table
                .foreign_keys
                .iter()
                .any(|fk| fk.references(&related.name)))
    }

    /// Rows in `related_table` connected to `row` through a foreign key.
    pub async fn find_related(
        &self,
        session: &mut Session<'_>,
        table: &str,
        row: &Row,
        related_table: &str,
    ) -> AdapterResult<Related> {
        let table = self.catalog.table(table).await?;
        let related = self.catalog.table(related_table).await?;

        // Detail side first: related rows whose foreign key matches this
        // row's referenced key values.
        if let Some(fk) = related
            .foreign_keys
            .iter()
            .find(|fk| fk.references(&table.name))
        {
            let criteria = join_criteria(&fk.columns, &fk.referenced_columns, row, &table)?;
            let spec = SelectBuilder::new(&related, self.dialect)
                .criteria(Some(&criteria))
                .build()?;
            return Ok(Related::Many(session.fetch(&spec).await?));
        }

        // Master side: this row's own foreign key points at the related
        // table, so there is at most one match.
        if let Some(fk) = table
            .foreign_keys
            .iter()
            .find(|fk| fk.references(&related.name))
        {
            let criteria = join_criteria(&fk.referenced_columns, &fk.columns, row, &table)?;
            let spec = SelectBuilder::new(&related, self.dialect)
                .criteria(Some(&criteria))
                .take(1)
                .build()?;
            return Ok(Related::One(session.fetch(&spec).await?.into_iter().next()));
        }

        Err(AdapterError::no_relation(&table.name, &related.name))
    }
}

/// Build `filter_col = row[source_col]` equality terms, ANDed together.
fn join_criteria(
    filter_columns: &[String],
    source_columns: &[String],
    row: &Row,
    table: &TableMetadata,
) -> AdapterResult<Criteria> {
    let mut criteria: Option<Criteria> = None;
    for (filter_col, source_col) in filter_columns.iter().zip(source_columns) {
        let value = row.get(source_col).cloned().ok_or_else(|| {
            AdapterError::missing_key(
                &table.name,
                format!("row does not carry a value for key column '{source_col}'"),
            )
        })?;
        let term = Criteria::eq(filter_col.clone(), value);
        criteria = Some(match criteria {
            Some(existing) => existing.and(term),
            None => term,
        });
    }
    criteria.ok_or_else(|| {
        AdapterError::internal(format!(
            "foreign key between '{}' and its target has no columns",
            table.name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnMetadata, ForeignKey};
    use crate::value::Value;

    /// The resolver's direction check, restated over bare metadata.
    fn direct_relation(table: &TableMetadata, related: &TableMetadata) -> Option<ForeignKey> {
        related
            .foreign_keys
            .iter()
            .find(|fk| fk.references(&table.name))
            .or_else(|| {
                table
                    .foreign_keys
                    .iter()
                    .find(|fk| fk.references(&related.name))
            })
            .cloned()
    }

    fn customers() -> TableMetadata {
        TableMetadata::new("customers")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key().identity())
            .with_column(ColumnMetadata::new("name", "TEXT", true))
            .with_primary_key(["id"])
    }

    fn orders() -> TableMetadata {
        TableMetadata::new("orders")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key().identity())
            .with_column(ColumnMetadata::new("customer_id", "INTEGER", true))
            .with_primary_key(["id"])
            .with_foreign_key(ForeignKey::new("customer_id", "customers", "id"))
    }

    fn products() -> TableMetadata {
        TableMetadata::new("products")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).primary_key())
            .with_primary_key(["id"])
    }

    #[test]
    fn test_direct_relation_both_directions() {
        assert!(direct_relation(&customers(), &orders()).is_some());
        assert!(direct_relation(&orders(), &customers()).is_some());
        assert!(direct_relation(&orders(), &products()).is_none());
    }

    #[test]
    fn test_join_criteria_builds_equality() {
        let row = Row::new().with("id", 7i64);
        let criteria = join_criteria(
            &["customer_id".to_string()],
            &["id".to_string()],
            &row,
            &customers(),
        )
        .unwrap();
        assert_eq!(criteria, Criteria::eq("customer_id", Value::Int(7)));
    }

    #[test]
    fn test_join_criteria_missing_value() {
        let row = Row::new().with("name", "Ann");
        let err = join_criteria(
            &["customer_id".to_string()],
            &["id".to_string()],
            &row,
            &customers(),
        );
        assert!(matches!(err, Err(AdapterError::MissingKey { .. })));
    }

    #[test]
    fn test_join_criteria_composite_key() {
        let row = Row::new().with("order_id", 1i64).with("line_no", 2i64);
        let criteria = join_criteria(
            &["order_id".to_string(), "line_no".to_string()],
            &["order_id".to_string(), "line_no".to_string()],
            &row,
            &orders(),
        )
        .unwrap();
        assert!(matches!(criteria, Criteria::And(_, _)));
    }
}
