//! Transaction handles.
//!
//! A [`TransactionHandle`] owns one provider transaction and its dedicated
//! connection. Every operation given the handle runs on that connection; no
//! second connection is ever opened for it. The handle is single-owner:
//! one logical operation sequence at a time. Concurrent use from multiple
//! tasks is a caller error - the internal lock only preserves memory safety,
//! not transactional semantics.

use crate::config::DatabaseKind;
use crate::error::{AdapterError, AdapterResult};
use crate::pool::DbPool;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Requested transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Database-specific transaction wrapper.
pub(crate) enum DbTransaction {
    Postgres(Transaction<'static, Postgres>),
    MySql(Transaction<'static, MySql>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            Self::Postgres(tx) => tx.commit().await,
            Self::MySql(tx) => tx.commit().await,
            Self::Sqlite(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            Self::Postgres(tx) => tx.rollback().await,
            Self::MySql(tx) => tx.rollback().await,
            Self::Sqlite(tx) => tx.rollback().await,
        }
    }
}

/// Owner of one active transaction and its connection.
pub struct TransactionHandle {
    name: String,
    kind: DatabaseKind,
    inner: Mutex<Option<DbTransaction>>,
}

impl TransactionHandle {
    pub(crate) async fn begin(
        pool: &DbPool,
        isolation: Option<IsolationLevel>,
        name: Option<&str>,
    ) -> AdapterResult<Self> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("tx_{}", uuid::Uuid::new_v4().simple()));

        let tx = match pool {
            DbPool::Postgres(p) => {
                let mut tx = p.begin().await.map_err(AdapterError::from)?;
                // Valid while no query has run yet in the transaction.
                if let Some(level) = isolation {
                    let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
                    sqlx::query(&sql)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| AdapterError::execution(e, &sql, &[]))?;
                }
                DbTransaction::Postgres(tx)
            }
            DbPool::MySql(p) => {
                // MySQL rejects SET TRANSACTION once a transaction is in
                // progress, and START TRANSACTION has no isolation clause.
                if isolation.is_some() {
                    return Err(AdapterError::unsupported(
                        "per-transaction isolation level on MySQL; configure the session level \
                         on the connection instead",
                    ));
                }
                DbTransaction::MySql(p.begin().await.map_err(AdapterError::from)?)
            }
            DbPool::Sqlite(p) => {
                // SQLite transactions are always serializable.
                if isolation.is_some() {
                    debug!(name = %name, "SQLite ignores the requested isolation level");
                }
                DbTransaction::Sqlite(p.begin().await.map_err(AdapterError::from)?)
            }
        };

        info!(name = %name, kind = %pool.kind(), "Transaction started");

        Ok(Self {
            name,
            kind: pool.kind(),
            inner: Mutex::new(Some(tx)),
        })
    }

    /// The transaction's name (supplied by the caller or generated).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Whether the transaction is still open.
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Lock the transaction for one operation. Fails when the handle has
    /// already been committed or rolled back.
    pub(crate) async fn lock(
        &self,
    ) -> AdapterResult<(MutexGuard<'_, Option<DbTransaction>>, &str)> {
        let guard = self.inner.lock().await;
        if guard.is_none() {
            return Err(AdapterError::transaction_closed(&self.name));
        }
        Ok((guard, self.name.as_str()))
    }

    /// Commit and release the transaction and its connection.
    pub async fn commit(&self) -> AdapterResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| AdapterError::transaction_closed(&self.name))?;
        tx.commit().await.map_err(AdapterError::from)?;
        info!(name = %self.name, "Transaction committed");
        Ok(())
    }

    /// Roll back and release the transaction and its connection.
    pub async fn rollback(&self) -> AdapterResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| AdapterError::transaction_closed(&self.name))?;
        tx.rollback().await.map_err(AdapterError::from)?;
        info!(name = %self.name, "Transaction rolled back");
        Ok(())
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        // An unreleased transaction rolls back when the inner sqlx
        // transaction drops.
        if let Ok(guard) = self.inner.try_lock() {
            if guard.is_some() {
                warn!(name = %self.name, "Transaction dropped without commit; rolling back");
            }
        }
    }
}
