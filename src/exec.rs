//! Command execution.
//!
//! [`Session`] is the single execution context every operation runs through:
//! either a pooled connection acquired for one logical operation, or a
//! borrowed transaction's connection. This is the one place where commands
//! are bound, executed, and where database errors get wrapped with their
//! command context.
//!
//! Database-specific binding and decoding live in the backend submodules;
//! the code structure is intentionally parallel to make differences obvious.

use crate::commands::CommandSpec;
use crate::config::DatabaseKind;
use crate::error::{AdapterError, AdapterResult};
use crate::pool::DbPool;
use crate::row::Row;
use crate::transaction::DbTransaction;
use crate::value::Value;
use sqlx::pool::PoolConnection;
use tokio::sync::MutexGuard;
use tracing::debug;

/// A connection checked out of the pool for one logical operation.
pub(crate) enum PoolConn {
    Postgres(PoolConnection<sqlx::Postgres>),
    MySql(PoolConnection<sqlx::MySql>),
    Sqlite(PoolConnection<sqlx::Sqlite>),
}

impl PoolConn {
    pub(crate) async fn acquire(pool: &DbPool) -> AdapterResult<Self> {
        Ok(match pool {
            DbPool::Postgres(p) => Self::Postgres(p.acquire().await.map_err(AdapterError::from)?),
            DbPool::MySql(p) => Self::MySql(p.acquire().await.map_err(AdapterError::from)?),
            DbPool::Sqlite(p) => Self::Sqlite(p.acquire().await.map_err(AdapterError::from)?),
        })
    }
}

/// Execution context: an owned short-lived connection or a borrowed
/// transaction.
pub(crate) enum Session<'a> {
    Pool(PoolConn),
    Tx {
        guard: MutexGuard<'a, Option<DbTransaction>>,
        name: &'a str,
    },
}

impl Session<'_> {
    /// Run a query command and buffer its rows.
    pub(crate) async fn fetch(&mut self, spec: &CommandSpec) -> AdapterResult<Vec<Row>> {
        debug!(sql = spec.sql(), params = spec.params().len(), "Executing query");
        match self {
            Session::Pool(PoolConn::Postgres(conn)) => postgres::fetch(&mut **conn, spec).await,
            Session::Pool(PoolConn::MySql(conn)) => mysql::fetch(&mut **conn, spec).await,
            Session::Pool(PoolConn::Sqlite(conn)) => sqlite::fetch(&mut **conn, spec).await,
            Session::Tx { guard, name } => match guard.as_mut() {
                Some(DbTransaction::Postgres(tx)) => postgres::fetch(&mut **tx, spec).await,
                Some(DbTransaction::MySql(tx)) => mysql::fetch(&mut **tx, spec).await,
                Some(DbTransaction::Sqlite(tx)) => sqlite::fetch(&mut **tx, spec).await,
                None => Err(AdapterError::transaction_closed(*name)),
            },
        }
    }

    /// Run a write command and return the affected-row count.
    pub(crate) async fn execute(&mut self, spec: &CommandSpec) -> AdapterResult<u64> {
        debug!(sql = spec.sql(), params = spec.params().len(), "Executing write");
        match self {
            Session::Pool(PoolConn::Postgres(conn)) => postgres::execute(&mut **conn, spec).await,
            Session::Pool(PoolConn::MySql(conn)) => mysql::execute(&mut **conn, spec).await,
            Session::Pool(PoolConn::Sqlite(conn)) => sqlite::execute(&mut **conn, spec).await,
            Session::Tx { guard, name } => match guard.as_mut() {
                Some(DbTransaction::Postgres(tx)) => postgres::execute(&mut **tx, spec).await,
                Some(DbTransaction::MySql(tx)) => mysql::execute(&mut **tx, spec).await,
                Some(DbTransaction::Sqlite(tx)) => sqlite::execute(&mut **tx, spec).await,
                None => Err(AdapterError::transaction_closed(*name)),
            },
        }
    }
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types, used to pick a decode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    DateTime,
    Text,
}

fn categorize(type_name: &str, kind: DatabaseKind) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is a float.
        if kind == DatabaseKind::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }
    if lower.contains("timestamp") || lower.contains("datetime") || lower == "date" {
        return TypeCategory::DateTime;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use futures_util::TryStreamExt;
    use sqlx::postgres::{PgArguments, PgConnection, PgRow};
    use sqlx::{Column, Row as _, TypeInfo};

    pub async fn fetch(conn: &mut PgConnection, spec: &CommandSpec) -> AdapterResult<Vec<Row>> {
        let mut query = sqlx::query(spec.sql());
        for param in spec.params() {
            query = bind_param(query, param);
        }
        let rows: Vec<PgRow> = query
            .fetch(conn)
            .try_collect()
            .await
            .map_err(|e| AdapterError::execution(e, spec.sql(), spec.params()))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    pub async fn execute(conn: &mut PgConnection, spec: &CommandSpec) -> AdapterResult<u64> {
        let mut query = sqlx::query(spec.sql());
        for param in spec.params() {
            query = bind_param(query, param);
        }
        let result = query
            .execute(conn)
            .await
            .map_err(|e| AdapterError::execution(e, spec.sql(), spec.params()))?;
        Ok(result.rows_affected())
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        param: &'q Value,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::DateTime(v) => query.bind(*v),
            Value::Bytes(v) => query.bind(v.as_slice()),
        }
    }

    fn decode_row(row: &PgRow) -> Row {
        let mut out = Row::new();
        for (idx, col) in row.columns().iter().enumerate() {
            let category = categorize(col.type_info().name(), DatabaseKind::Postgres);
            out.set(col.name(), decode_column(row, idx, category));
        }
        out
    }

    fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Integer => {
                if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
                    return Value::Int(v as i64);
                }
                if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
                    return Value::Int(v as i64);
                }
                if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
                    return Value::Int(v);
                }
                Value::Null
            }
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            TypeCategory::Float => {
                if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                    return Value::Float(v);
                }
                if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
                    return Value::Float(v as f64);
                }
                Value::Null
            }
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(Some(v)) => decimal_value(v.0),
                _ => Value::Null,
            },
            TypeCategory::DateTime => {
                if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
                    return Value::DateTime(v);
                }
                if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
                    return Value::DateTime(v.and_utc());
                }
                if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
                    return Value::Text(v.to_string());
                }
                Value::Null
            }
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Bytes)
                .unwrap_or(Value::Null),
            TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        }
    }
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use futures_util::TryStreamExt;
    use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};
    use sqlx::{Column, Row as _, TypeInfo};

    pub async fn fetch(conn: &mut MySqlConnection, spec: &CommandSpec) -> AdapterResult<Vec<Row>> {
        let mut query = sqlx::query(spec.sql());
        for param in spec.params() {
            query = bind_param(query, param);
        }
        let rows: Vec<MySqlRow> = query
            .fetch(conn)
            .try_collect()
            .await
            .map_err(|e| AdapterError::execution(e, spec.sql(), spec.params()))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    pub async fn execute(conn: &mut MySqlConnection, spec: &CommandSpec) -> AdapterResult<u64> {
        let mut query = sqlx::query(spec.sql());
        for param in spec.params() {
            query = bind_param(query, param);
        }
        let result = query
            .execute(conn)
            .await
            .map_err(|e| AdapterError::execution(e, spec.sql(), spec.params()))?;
        Ok(result.rows_affected())
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>,
        param: &'q Value,
    ) -> sqlx::query::Query<'q, sqlx::MySql, MySqlArguments> {
        match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::DateTime(v) => query.bind(*v),
            Value::Bytes(v) => query.bind(v.as_slice()),
        }
    }

    fn decode_row(row: &MySqlRow) -> Row {
        let mut out = Row::new();
        for (idx, col) in row.columns().iter().enumerate() {
            let category = categorize(col.type_info().name(), DatabaseKind::MySql);
            out.set(col.name(), decode_column(row, idx, category));
        }
        out
    }

    fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            // MySQL integers span signed and unsigned widths; try them in
            // order, widest signed first.
            TypeCategory::Integer => {
                if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
                    return Value::Null;
                }
                if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
                    return Value::Int(v);
                }
                if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
                    return Value::Int(v as i64);
                }
                if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
                    return Value::Int(v as i64);
                }
                if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
                    return Value::Int(v as i64);
                }
                if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
                    return Value::Int(v as i64);
                }
                if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
                    return Value::Int(v as i64);
                }
                Value::Null
            }
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            TypeCategory::Float => {
                if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                    return Value::Float(v);
                }
                if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
                    return Value::Float(v as f64);
                }
                Value::Null
            }
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(Some(v)) => decimal_value(v.0),
                _ => Value::Null,
            },
            TypeCategory::DateTime => {
                if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
                    return Value::DateTime(v);
                }
                if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
                    return Value::DateTime(v.and_utc());
                }
                Value::Null
            }
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Bytes)
                .unwrap_or(Value::Null),
            TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        }
    }
}

mod sqlite {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
    use sqlx::{Column, Row as _, TypeInfo};

    pub async fn fetch(conn: &mut SqliteConnection, spec: &CommandSpec) -> AdapterResult<Vec<Row>> {
        let mut query = sqlx::query(spec.sql());
        for param in spec.params() {
            query = bind_param(query, param);
        }
        let rows: Vec<SqliteRow> = query
            .fetch(conn)
            .try_collect()
            .await
            .map_err(|e| AdapterError::execution(e, spec.sql(), spec.params()))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    pub async fn execute(conn: &mut SqliteConnection, spec: &CommandSpec) -> AdapterResult<u64> {
        let mut query = sqlx::query(spec.sql());
        for param in spec.params() {
            query = bind_param(query, param);
        }
        let result = query
            .execute(conn)
            .await
            .map_err(|e| AdapterError::execution(e, spec.sql(), spec.params()))?;
        Ok(result.rows_affected())
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        param: &'q Value,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
        match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::DateTime(v) => query.bind(*v),
            Value::Bytes(v) => query.bind(v.as_slice()),
        }
    }

    fn decode_row(row: &SqliteRow) -> Row {
        let mut out = Row::new();
        for (idx, col) in row.columns().iter().enumerate() {
            let category = categorize(col.type_info().name(), DatabaseKind::Sqlite);
            out.set(col.name(), decode_column(row, idx, category));
        }
        out
    }

    fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Int)
                .unwrap_or(Value::Null),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            TypeCategory::Float | TypeCategory::Decimal => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Float)
                .unwrap_or(Value::Null),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Bytes)
                .unwrap_or(Value::Null),
            // SQLite stores dates as TEXT; surface them as text values.
            TypeCategory::DateTime | TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        }
    }
}

// =============================================================================
// Decimal Support
// =============================================================================

/// Raw DECIMAL/NUMERIC value read as its exact string representation.
#[derive(Debug)]
struct RawDecimal(String);

/// Lossy-but-practical mapping of decimals into the closed value set:
/// numeric when the text parses, text otherwise.
fn decimal_value(raw: String) -> Value {
    match raw.parse::<f64>() {
        Ok(v) => Value::Float(v),
        Err(_) => Value::Text(raw),
    }
}

impl sqlx::Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        use sqlx::TypeInfo;
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl sqlx::Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        use sqlx::TypeInfo;
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}
