//! Error types for the adapter.
//!
//! All fallible operations return [`AdapterResult`]. Validation errors
//! (unknown tables or columns, bad criteria, empty updates) are raised before
//! any SQL is sent; database failures are wrapped into [`AdapterError::Execution`]
//! at the single execution boundary, carrying the failed command's SQL text and
//! parameters.

use crate::value::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Table '{table}' not found")]
    UnknownTable { table: String },

    #[error("Column '{column}' does not exist on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Invalid criteria: {message}")]
    InvalidCriteria { message: String },

    #[error("Update on table '{table}' has no columns to set")]
    EmptyUpdate { table: String },

    #[error("No usable key for table '{table}': {message}")]
    MissingKey { table: String, message: String },

    #[error("No foreign-key relationship between '{table}' and '{related_table}'")]
    NoRelation {
        table: String,
        related_table: String,
    },

    #[error("Transaction '{name}' is no longer active")]
    TransactionClosed { name: String },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Command failed: {message} (sql: {sql}, params: {params:?})")]
    Execution {
        message: String,
        sql: String,
        params: Vec<Value>,
        #[source]
        source: sqlx::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AdapterError {
    /// Create an unknown-table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Create an unknown-column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create an invalid-criteria error.
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria {
            message: message.into(),
        }
    }

    /// Create an empty-update error.
    pub fn empty_update(table: impl Into<String>) -> Self {
        Self::EmptyUpdate {
            table: table.into(),
        }
    }

    /// Create a missing-key error.
    pub fn missing_key(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingKey {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a no-relation error.
    pub fn no_relation(table: impl Into<String>, related_table: impl Into<String>) -> Self {
        Self::NoRelation {
            table: table.into(),
            related_table: related_table.into(),
        }
    }

    /// Create a transaction-closed error.
    pub fn transaction_closed(name: impl Into<String>) -> Self {
        Self::TransactionClosed { name: name.into() }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Wrap a database error with the command that caused it.
    pub fn execution(source: sqlx::Error, sql: &str, params: &[Value]) -> Self {
        let message = match source.as_database_error() {
            Some(db_err) => db_err.message().to_string(),
            None => source.to_string(),
        };
        Self::Execution {
            message,
            sql: sql.to_string(),
            params: params.to_vec(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Connection-establishment failures outside of command execution.
impl From<sqlx::Error> for AdapterError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AdapterError::connection(msg.to_string()),
            sqlx::Error::PoolTimedOut => {
                AdapterError::connection("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => AdapterError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => AdapterError::connection(format!("I/O error: {io_err}")),
            sqlx::Error::Tls(tls_err) => AdapterError::connection(format!("TLS error: {tls_err}")),
            sqlx::Error::Protocol(msg) => AdapterError::connection(format!("Protocol error: {msg}")),
            other => AdapterError::internal(format!("Database error: {other}")),
        }
    }
}

/// Result type alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdapterError::unknown_table("users");
        assert!(err.to_string().contains("users"));

        let err = AdapterError::empty_update("orders");
        assert!(err.to_string().contains("no columns to set"));
    }

    #[test]
    fn test_execution_error_carries_command() {
        let err = AdapterError::execution(
            sqlx::Error::RowNotFound,
            "SELECT * FROM users WHERE id = ?",
            &[Value::Int(1)],
        );
        let text = err.to_string();
        assert!(text.contains("SELECT * FROM users"));
        assert!(text.contains("Int(1)"));
    }

    #[test]
    fn test_pool_errors_map_to_connection() {
        let err: AdapterError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, AdapterError::Connection { .. }));
    }
}
