//! Schema metadata and the per-adapter catalog.
//!
//! [`SchemaCatalog`] is the single source of truth for table, column, key and
//! foreign-key metadata. It loads lazily on first access and caches the
//! snapshot for the adapter's lifetime; every command builder works from the
//! same snapshot within one operation.

mod inspect;

use crate::error::{AdapterError, AdapterResult};
use crate::pool::DbPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Metadata for one column.
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    pub name: String,
    /// Declared type as reported by the backend (e.g. `varchar(30)`, `INTEGER`).
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    /// True when the backend assigns the value (auto-increment, serial,
    /// identity column, rowid alias).
    pub is_identity: bool,
    pub has_default: bool,
}

impl ColumnMetadata {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            is_primary_key: false,
            is_identity: false,
            has_default: false,
        }
    }

    /// Mark as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Mark as backend-assigned.
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self.has_default = true;
        self
    }

    /// Mark as having a default value.
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

/// A foreign-key relationship. Multi-column keys keep `columns` and
/// `referenced_columns` position-aligned.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Columns on the owning table.
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Columns on the referenced table.
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    /// Create a single-column foreign key.
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            columns: vec![column.into()],
            referenced_table: referenced_table.into(),
            referenced_columns: vec![referenced_column.into()],
        }
    }

    /// Check whether this key points at `table` (case-insensitive).
    pub fn references(&self, table: &str) -> bool {
        self.referenced_table.eq_ignore_ascii_case(table)
    }
}

/// Metadata for one table.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
    /// Ordered primary key columns; empty when no key is defined.
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableMetadata {
    /// Create empty table metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Append a column.
    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn with_primary_key<C: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = C>,
    ) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append a foreign key.
    pub fn with_foreign_key(mut self, key: ForeignKey) -> Self {
        self.foreign_keys.push(key);
        self
    }

    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check whether a column exists (case-insensitive).
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The backend-assigned key column, if the table has one.
    pub fn identity_column(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.is_identity)
    }
}

struct SchemaSnapshot {
    tables: Vec<Arc<TableMetadata>>,
    /// Lowercased name -> index into `tables`.
    by_name: HashMap<String, usize>,
}

impl SchemaSnapshot {
    fn build(tables: Vec<TableMetadata>) -> Self {
        let tables: Vec<Arc<TableMetadata>> = tables.into_iter().map(Arc::new).collect();
        let by_name = tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.name.to_lowercase(), idx))
            .collect();
        Self { tables, by_name }
    }

    fn find(&self, name: &str) -> Option<Arc<TableMetadata>> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&idx| Arc::clone(&self.tables[idx]))
    }
}

/// Lazy, load-once schema cache for one adapter instance.
pub struct SchemaCatalog {
    pool: DbPool,
    cache: OnceCell<Arc<SchemaSnapshot>>,
}

impl SchemaCatalog {
    /// Create a catalog backed by a pool. Nothing is loaded until the first
    /// lookup.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            cache: OnceCell::new(),
        }
    }

    async fn snapshot(&self) -> AdapterResult<&Arc<SchemaSnapshot>> {
        self.cache
            .get_or_try_init(|| async {
                let tables = inspect::load_tables(&self.pool).await?;
                debug!(count = tables.len(), "Loaded schema");
                Ok(Arc::new(SchemaSnapshot::build(tables)))
            })
            .await
    }

    /// Get metadata for a table. Matching is case-insensitive; an unknown
    /// name fails with [`AdapterError::UnknownTable`].
    pub async fn table(&self, name: &str) -> AdapterResult<Arc<TableMetadata>> {
        let snapshot = self.snapshot().await?;
        snapshot
            .find(name)
            .ok_or_else(|| AdapterError::unknown_table(name))
    }

    /// Ordered primary key column names; empty when no key is defined.
    pub async fn primary_key(&self, name: &str) -> AdapterResult<Vec<String>> {
        Ok(self.table(name).await?.primary_key.clone())
    }

    /// Foreign keys declared on a table.
    pub async fn foreign_keys(&self, name: &str) -> AdapterResult<Vec<ForeignKey>> {
        Ok(self.table(name).await?.foreign_keys.clone())
    }

    /// All tables in the loaded snapshot.
    pub async fn tables(&self) -> AdapterResult<Vec<Arc<TableMetadata>>> {
        Ok(self.snapshot().await?.tables.clone())
    }
}
