//! Read-path resolution.
//!
//! The finder turns table names and criteria (or a full [`Query`]) into
//! SELECT commands and executes them. Results are buffered at the fetch
//! boundary; there is no client-side caching, so repeating a find re-executes
//! against the database.

use crate::commands::SelectBuilder;
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use crate::error::AdapterResult;
use crate::exec::Session;
use crate::query::Query;
use crate::row::Row;
use crate::schema::SchemaCatalog;
use tracing::debug;

pub(crate) struct Finder<'a> {
    catalog: &'a SchemaCatalog,
    dialect: &'a Dialect,
}

impl<'a> Finder<'a> {
    pub fn new(catalog: &'a SchemaCatalog, dialect: &'a Dialect) -> Self {
        Self { catalog, dialect }
    }

    /// All rows matching the criteria.
    pub async fn find(
        &self,
        session: &mut Session<'_>,
        table: &str,
        criteria: &Criteria,
    ) -> AdapterResult<Vec<Row>> {
        let meta = self.catalog.table(table).await?;
        let spec = SelectBuilder::new(&meta, self.dialect)
            .criteria(Some(criteria))
            .build()?;
        let rows = session.fetch(&spec).await?;
        debug!(table = %meta.name, count = rows.len(), "find");
        Ok(rows)
    }

    /// At most one matching row. The limit is always applied server-side, so
    /// no-match is `None` rather than an error and ambiguity cannot arise.
    pub async fn find_one(
        &self,
        session: &mut Session<'_>,
        table: &str,
        criteria: &Criteria,
    ) -> AdapterResult<Option<Row>> {
        let meta = self.catalog.table(table).await?;
        let spec = SelectBuilder::new(&meta, self.dialect)
            .criteria(Some(criteria))
            .take(1)
            .build()?;
        Ok(session.fetch(&spec).await?.into_iter().next())
    }

    /// Full query path: projection, ordering, paging, joins.
    pub async fn run_query(
        &self,
        session: &mut Session<'_>,
        query: &Query,
    ) -> AdapterResult<Vec<Row>> {
        let meta = self.catalog.table(&query.table).await?;
        let spec = SelectBuilder::new(&meta, self.dialect)
            .apply_query(query)
            .build()?;
        let rows = session.fetch(&spec).await?;
        debug!(table = %meta.name, count = rows.len(), "run_query");
        Ok(rows)
    }
}
