//! Bulk write paths.
//!
//! [`Inserter`] executes single and multi-row inserts, reading back generated
//! key values. [`BulkUpdateStrategy`] is the capability hook for
//! provider-specific multi-row update planning; the built-in
//! [`RowByRowUpdate`] fallback plans one parameterized statement per row,
//! grouped by changed-column set so identical statement text is reused.
//!
//! Bulk operations are not atomic across rows unless the caller scopes them
//! with a transaction handle; a mid-batch failure leaves earlier rows
//! committed.

use crate::commands::{CommandSpec, InsertBuilder, SelectBuilder, UpdateBuilder};
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use crate::error::{AdapterError, AdapterResult};
use crate::exec::Session;
use crate::row::Row;
use crate::schema::{SchemaCatalog, TableMetadata};
use crate::value::Value;
use tracing::debug;

/// Provider-specific multi-row update planning. Implementations turn a row
/// batch into the commands to run; execution stays in the adapter so plans
/// work against both ad-hoc connections and transactions.
pub trait BulkUpdateStrategy: Send + Sync {
    fn plan(
        &self,
        table: &TableMetadata,
        rows: &[Row],
        key_fields: &[String],
        dialect: &Dialect,
    ) -> AdapterResult<Vec<CommandSpec>>;
}

/// Fallback strategy: one UPDATE per row, matched on the key fields. Rows
/// are grouped by their changed-column sets so each group shares a prepared
/// statement.
pub struct RowByRowUpdate;

impl BulkUpdateStrategy for RowByRowUpdate {
    fn plan(
        &self,
        table: &TableMetadata,
        rows: &[Row],
        key_fields: &[String],
        dialect: &Dialect,
    ) -> AdapterResult<Vec<CommandSpec>> {
        // Group row indices by changed-column set.
        let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let mut changed: Vec<String> = row
                .columns()
                .filter(|c| !key_fields.iter().any(|k| k.eq_ignore_ascii_case(c)))
                .map(|c| c.to_lowercase())
                .collect();
            changed.sort();
            match groups.iter_mut().find(|(key, _)| *key == changed) {
                Some((_, indices)) => indices.push(idx),
                None => groups.push((changed, vec![idx])),
            }
        }

        let builder = UpdateBuilder::new(table, dialect);
        let mut specs = Vec::with_capacity(rows.len());
        for (_, indices) in &groups {
            for &idx in indices {
                let row = &rows[idx];
                let criteria = key_match_criteria(row, key_fields, table)?;
                let mut data = row.clone();
                for key in key_fields {
                    data.remove(key);
                }
                specs.push(builder.build(&data, Some(&criteria))?);
            }
        }
        Ok(specs)
    }
}

/// Equality criteria over a row's key fields.
pub(crate) fn key_match_criteria(
    row: &Row,
    key_fields: &[String],
    table: &TableMetadata,
) -> AdapterResult<Criteria> {
    let mut criteria: Option<Criteria> = None;
    for key in key_fields {
        let value = row.get(key).cloned().ok_or_else(|| {
            AdapterError::missing_key(
                &table.name,
                format!("row does not carry a value for key field '{key}'"),
            )
        })?;
        let term = Criteria::eq(key.clone(), value);
        criteria = Some(match criteria {
            Some(existing) => existing.and(term),
            None => term,
        });
    }
    criteria.ok_or_else(|| {
        AdapterError::missing_key(&table.name, "no key fields given and no primary key defined")
    })
}

/// Insert execution, including generated-key readback.
pub(crate) struct Inserter<'a> {
    catalog: &'a SchemaCatalog,
    dialect: &'a Dialect,
}

impl<'a> Inserter<'a> {
    pub fn new(catalog: &'a SchemaCatalog, dialect: &'a Dialect) -> Self {
        Self { catalog, dialect }
    }

    /// Insert one row and return it merged with backend-generated values.
    pub async fn insert(
        &self,
        session: &mut Session<'_>,
        table: &str,
        row: &Row,
    ) -> AdapterResult<Row> {
        let meta = self.catalog.table(table).await?;
        self.insert_row(session, &meta, row).await
    }

    /// Insert rows in order, one result per input row. Runs on a single
    /// connection so identity readback stays attached to each insert.
    pub async fn insert_many(
        &self,
        session: &mut Session<'_>,
        table: &str,
        rows: &[Row],
    ) -> AdapterResult<Vec<Row>> {
        let meta = self.catalog.table(table).await?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            inserted.push(self.insert_row(session, &meta, row).await?);
        }
        debug!(table = %meta.name, count = inserted.len(), "insert_many");
        Ok(inserted)
    }

    async fn insert_row(
        &self,
        session: &mut Session<'_>,
        meta: &TableMetadata,
        row: &Row,
    ) -> AdapterResult<Row> {
        let spec = InsertBuilder::new(meta, self.dialect).build(row)?;

        if self.dialect.supports_returning() {
            if let Some(returned) = session.fetch(&spec).await?.into_iter().next() {
                return Ok(returned);
            }
            return Ok(row.clone());
        }

        session.execute(&spec).await?;

        // The identity value is read back on the same connection, then the
        // full row is re-selected to pick up any other defaults.
        if let Some(identity) = meta.identity_column() {
            let supplied = row.get(&identity.name).is_some_and(|v| !v.is_null());
            if !supplied {
                if let Some(id) = self.last_identity(session).await? {
                    let criteria = Criteria::eq(identity.name.clone(), id.clone());
                    let select = SelectBuilder::new(meta, self.dialect)
                        .criteria(Some(&criteria))
                        .take(1)
                        .build()?;
                    if let Some(found) = session.fetch(&select).await?.into_iter().next() {
                        return Ok(found);
                    }
                    let mut merged = row.clone();
                    merged.set(identity.name.clone(), id);
                    return Ok(merged);
                }
            }
        }

        Ok(row.clone())
    }

    async fn last_identity(&self, session: &mut Session<'_>) -> AdapterResult<Option<Value>> {
        let spec = CommandSpec::bare(self.dialect.identity_expression());
        let rows = session.fetch(&spec).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }
}
