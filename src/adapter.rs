//! The adapter facade.
//!
//! [`Adapter`] exposes the table-level operation surface: find, insert,
//! update, delete, relation navigation and transactions. Every operation
//! resolves metadata through the shared schema catalog, builds a command,
//! and runs it through a single execution context - either a short-lived
//! pooled connection or a caller-supplied transaction's connection. The
//! `*_in` variants are the transaction-bound overloads; both forms share one
//! implementation path.

use crate::bulk::{BulkUpdateStrategy, Inserter, RowByRowUpdate};
use crate::commands::{CommandSpec, DeleteBuilder, UpdateBuilder};
use crate::config::{ConnectionConfig, DatabaseKind};
use crate::criteria::Criteria;
use crate::dialect::Dialect;
use crate::error::{AdapterError, AdapterResult};
use crate::exec::{PoolConn, Session};
use crate::finder::Finder;
use crate::pool::DbPool;
use crate::query::Query;
use crate::relations::{Related, RelationResolver};
use crate::row::Row;
use crate::schema::SchemaCatalog;
use crate::transaction::{IsolationLevel, TransactionHandle};
use std::collections::HashMap;
use std::sync::Arc;

/// Optional capabilities supplied at connect time.
#[derive(Default)]
pub struct AdapterOptions {
    bulk_update_strategies: HashMap<DatabaseKind, Arc<dyn BulkUpdateStrategy>>,
}

impl AdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bulk-update strategy for a backend. Looked up once per
    /// adapter by backend identity; backends without a registration fall
    /// back to row-by-row execution.
    pub fn with_bulk_update_strategy(
        mut self,
        kind: DatabaseKind,
        strategy: Arc<dyn BulkUpdateStrategy>,
    ) -> Self {
        self.bulk_update_strategies.insert(kind, strategy);
        self
    }
}

/// Table-oriented adapter over one database connection pool.
pub struct Adapter {
    pool: DbPool,
    dialect: Dialect,
    catalog: SchemaCatalog,
    bulk_update: Arc<dyn BulkUpdateStrategy>,
}

impl Adapter {
    /// Connect with default options.
    pub async fn connect(connection_string: &str) -> AdapterResult<Self> {
        Self::connect_with(ConnectionConfig::new(connection_string)?, AdapterOptions::new()).await
    }

    /// Connect with explicit configuration and capabilities.
    pub async fn connect_with(
        config: ConnectionConfig,
        mut options: AdapterOptions,
    ) -> AdapterResult<Self> {
        let pool = DbPool::connect(&config).await?;
        let kind = pool.kind();
        let bulk_update = options
            .bulk_update_strategies
            .remove(&kind)
            .unwrap_or_else(|| Arc::new(RowByRowUpdate));
        Ok(Self {
            dialect: Dialect::for_kind(kind),
            catalog: SchemaCatalog::new(pool.clone()),
            pool,
            bulk_update,
        })
    }

    pub fn kind(&self) -> DatabaseKind {
        self.pool.kind()
    }

    /// The schema catalog backing this adapter.
    pub fn schema(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // -------------------------------------------------------------------
    // Execution contexts
    // -------------------------------------------------------------------

    async fn pool_session(&self) -> AdapterResult<Session<'_>> {
        Ok(Session::Pool(PoolConn::acquire(&self.pool).await?))
    }

    async fn tx_session<'a>(&self, tx: &'a TransactionHandle) -> AdapterResult<Session<'a>> {
        let (guard, name) = tx.lock().await?;
        Ok(Session::Tx { guard, name })
    }

    async fn execute(&self, spec: &CommandSpec) -> AdapterResult<u64> {
        let mut session = self.pool_session().await?;
        session.execute(spec).await
    }

    async fn execute_in(&self, tx: &TransactionHandle, spec: &CommandSpec) -> AdapterResult<u64> {
        let mut session = self.tx_session(tx).await?;
        session.execute(spec).await
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// All rows of `table` matching `criteria`. Each call re-executes the
    /// query; results are never cached client-side.
    pub async fn find(&self, table: &str, criteria: &Criteria) -> AdapterResult<Vec<Row>> {
        let mut session = self.pool_session().await?;
        Finder::new(&self.catalog, &self.dialect)
            .find(&mut session, table, criteria)
            .await
    }

    pub async fn find_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        criteria: &Criteria,
    ) -> AdapterResult<Vec<Row>> {
        let mut session = self.tx_session(tx).await?;
        Finder::new(&self.catalog, &self.dialect)
            .find(&mut session, table, criteria)
            .await
    }

    /// At most one matching row; `None` when nothing matches.
    pub async fn find_one(&self, table: &str, criteria: &Criteria) -> AdapterResult<Option<Row>> {
        let mut session = self.pool_session().await?;
        Finder::new(&self.catalog, &self.dialect)
            .find_one(&mut session, table, criteria)
            .await
    }

    pub async fn find_one_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        criteria: &Criteria,
    ) -> AdapterResult<Option<Row>> {
        let mut session = self.tx_session(tx).await?;
        Finder::new(&self.catalog, &self.dialect)
            .find_one(&mut session, table, criteria)
            .await
    }

    /// Run a full query: projection, ordering, paging, joins.
    pub async fn run_query(&self, query: &Query) -> AdapterResult<Vec<Row>> {
        let mut session = self.pool_session().await?;
        Finder::new(&self.catalog, &self.dialect)
            .run_query(&mut session, query)
            .await
    }

    pub async fn run_query_in(
        &self,
        tx: &TransactionHandle,
        query: &Query,
    ) -> AdapterResult<Vec<Row>> {
        let mut session = self.tx_session(tx).await?;
        Finder::new(&self.catalog, &self.dialect)
            .run_query(&mut session, query)
            .await
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Insert one row; the returned row includes backend-generated values.
    pub async fn insert(&self, table: &str, row: &Row) -> AdapterResult<Row> {
        let mut session = self.pool_session().await?;
        Inserter::new(&self.catalog, &self.dialect)
            .insert(&mut session, table, row)
            .await
    }

    pub async fn insert_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        row: &Row,
    ) -> AdapterResult<Row> {
        let mut session = self.tx_session(tx).await?;
        Inserter::new(&self.catalog, &self.dialect)
            .insert(&mut session, table, row)
            .await
    }

    /// Insert rows in order; one result per input row.
    pub async fn insert_many(&self, table: &str, rows: &[Row]) -> AdapterResult<Vec<Row>> {
        let mut session = self.pool_session().await?;
        Inserter::new(&self.catalog, &self.dialect)
            .insert_many(&mut session, table, rows)
            .await
    }

    pub async fn insert_many_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        rows: &[Row],
    ) -> AdapterResult<Vec<Row>> {
        let mut session = self.tx_session(tx).await?;
        Inserter::new(&self.catalog, &self.dialect)
            .insert_many(&mut session, table, rows)
            .await
    }

    /// Update rows matching `criteria` with the columns in `data`. The
    /// command is validated and built before any connection is touched.
    pub async fn update(&self, table: &str, data: &Row, criteria: &Criteria) -> AdapterResult<u64> {
        let spec = self.update_spec(table, data, Some(criteria)).await?;
        self.execute(&spec).await
    }

    pub async fn update_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        data: &Row,
        criteria: &Criteria,
    ) -> AdapterResult<u64> {
        let spec = self.update_spec(table, data, Some(criteria)).await?;
        self.execute_in(tx, &spec).await
    }

    /// Update every row of the table. The explicit method is the only path
    /// to an unfiltered UPDATE.
    pub async fn update_all(&self, table: &str, data: &Row) -> AdapterResult<u64> {
        let spec = self.update_spec(table, data, None).await?;
        self.execute(&spec).await
    }

    pub async fn update_all_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        data: &Row,
    ) -> AdapterResult<u64> {
        let spec = self.update_spec(table, data, None).await?;
        self.execute_in(tx, &spec).await
    }

    /// Update a batch of rows, each matched on the table's primary key.
    pub async fn update_many(&self, table: &str, rows: &[Row]) -> AdapterResult<u64> {
        let specs = self.update_many_specs(table, rows, None).await?;
        let mut session = self.pool_session().await?;
        run_all(&mut session, &specs).await
    }

    pub async fn update_many_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        rows: &[Row],
    ) -> AdapterResult<u64> {
        let specs = self.update_many_specs(table, rows, None).await?;
        let mut session = self.tx_session(tx).await?;
        run_all(&mut session, &specs).await
    }

    /// Update a batch of rows matched on explicit key fields instead of the
    /// primary key.
    pub async fn update_many_with_keys(
        &self,
        table: &str,
        rows: &[Row],
        key_fields: &[String],
    ) -> AdapterResult<u64> {
        let specs = self.update_many_specs(table, rows, Some(key_fields)).await?;
        let mut session = self.pool_session().await?;
        run_all(&mut session, &specs).await
    }

    pub async fn update_many_with_keys_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        rows: &[Row],
        key_fields: &[String],
    ) -> AdapterResult<u64> {
        let specs = self.update_many_specs(table, rows, Some(key_fields)).await?;
        let mut session = self.tx_session(tx).await?;
        run_all(&mut session, &specs).await
    }

    /// Delete rows matching `criteria`; returns the affected count.
    pub async fn delete(&self, table: &str, criteria: &Criteria) -> AdapterResult<u64> {
        let spec = self.delete_spec(table, Some(criteria)).await?;
        self.execute(&spec).await
    }

    pub async fn delete_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        criteria: &Criteria,
    ) -> AdapterResult<u64> {
        let spec = self.delete_spec(table, Some(criteria)).await?;
        self.execute_in(tx, &spec).await
    }

    /// Delete every row of the table. The explicit method is the only path
    /// to an unfiltered DELETE.
    pub async fn delete_all(&self, table: &str) -> AdapterResult<u64> {
        let spec = self.delete_spec(table, None).await?;
        self.execute(&spec).await
    }

    pub async fn delete_all_in(&self, tx: &TransactionHandle, table: &str) -> AdapterResult<u64> {
        let spec = self.delete_spec(table, None).await?;
        self.execute_in(tx, &spec).await
    }

    // -------------------------------------------------------------------
    // Keys and relations
    // -------------------------------------------------------------------

    /// Names of the columns forming the table's unique identifier; empty
    /// when no key is defined.
    pub async fn key_field_names(&self, table: &str) -> AdapterResult<Vec<String>> {
        self.catalog.primary_key(table).await
    }

    /// True iff a foreign key connects the two tables directly.
    pub async fn is_valid_relation(
        &self,
        table: &str,
        related_table: &str,
    ) -> AdapterResult<bool> {
        RelationResolver::new(&self.catalog, &self.dialect)
            .is_valid_relation(table, related_table)
            .await
    }

    /// Rows related to `row` through a foreign key between the two tables.
    pub async fn find_related(
        &self,
        table: &str,
        row: &Row,
        related_table: &str,
    ) -> AdapterResult<Related> {
        let mut session = self.pool_session().await?;
        RelationResolver::new(&self.catalog, &self.dialect)
            .find_related(&mut session, table, row, related_table)
            .await
    }

    pub async fn find_related_in(
        &self,
        tx: &TransactionHandle,
        table: &str,
        row: &Row,
        related_table: &str,
    ) -> AdapterResult<Related> {
        let mut session = self.tx_session(tx).await?;
        RelationResolver::new(&self.catalog, &self.dialect)
            .find_related(&mut session, table, row, related_table)
            .await
    }

    // -------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------

    /// Begin a transaction on a dedicated connection.
    pub async fn begin_transaction(&self) -> AdapterResult<TransactionHandle> {
        TransactionHandle::begin(&self.pool, None, None).await
    }

    /// Begin a transaction with an isolation level and/or name.
    pub async fn begin_transaction_with(
        &self,
        isolation: Option<IsolationLevel>,
        name: Option<&str>,
    ) -> AdapterResult<TransactionHandle> {
        TransactionHandle::begin(&self.pool, isolation, name).await
    }

    // -------------------------------------------------------------------
    // Command construction
    // -------------------------------------------------------------------

    async fn update_spec(
        &self,
        table: &str,
        data: &Row,
        criteria: Option<&Criteria>,
    ) -> AdapterResult<CommandSpec> {
        let meta = self.catalog.table(table).await?;
        UpdateBuilder::new(&meta, &self.dialect).build(data, criteria)
    }

    async fn delete_spec(
        &self,
        table: &str,
        criteria: Option<&Criteria>,
    ) -> AdapterResult<CommandSpec> {
        let meta = self.catalog.table(table).await?;
        DeleteBuilder::new(&meta, &self.dialect).build(criteria)
    }

    async fn update_many_specs(
        &self,
        table: &str,
        rows: &[Row],
        key_fields: Option<&[String]>,
    ) -> AdapterResult<Vec<CommandSpec>> {
        let meta = self.catalog.table(table).await?;
        let keys: Vec<String> = match key_fields {
            Some(fields) if !fields.is_empty() => fields.to_vec(),
            _ => meta.primary_key.clone(),
        };
        if keys.is_empty() {
            return Err(AdapterError::missing_key(
                &meta.name,
                "no key fields given and no primary key defined",
            ));
        }
        self.bulk_update.plan(&meta, rows, &keys, &self.dialect)
    }
}

/// Execute a batch of commands on one session, summing affected rows.
async fn run_all(session: &mut Session<'_>, specs: &[CommandSpec]) -> AdapterResult<u64> {
    let mut affected = 0;
    for spec in specs {
        affected += session.execute(spec).await?;
    }
    Ok(affected)
}
