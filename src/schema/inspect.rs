//! Schema introspection.
//!
//! Loads table, column, key and foreign-key metadata from the backend's
//! system catalogs: `information_schema` for PostgreSQL and MySQL, PRAGMA
//! calls for SQLite. Queries live in the `queries` submodule; each backend
//! has its own implementation submodule with the same interface.

use crate::error::{AdapterError, AdapterResult};
use crate::pool::DbPool;
use crate::schema::{ColumnMetadata, ForeignKey, TableMetadata};

/// Load metadata for every base table visible on the connection.
pub(super) async fn load_tables(pool: &DbPool) -> AdapterResult<Vec<TableMetadata>> {
    let mut tables = match pool {
        DbPool::Postgres(p) => postgres::load_tables(p).await?,
        DbPool::MySql(p) => mysql::load_tables(p).await?,
        DbPool::Sqlite(p) => sqlite::load_tables(p).await?,
    };
    resolve_implicit_fk_targets(&mut tables);
    Ok(tables)
}

/// A foreign key declared without explicit referenced columns points at the
/// referenced table's primary key (SQLite PRAGMA reports these with a NULL
/// "to" column). Fill them in once all tables are loaded.
fn resolve_implicit_fk_targets(tables: &mut [TableMetadata]) {
    let primary_keys: std::collections::HashMap<String, Vec<String>> = tables
        .iter()
        .map(|t| (t.name.to_lowercase(), t.primary_key.clone()))
        .collect();

    for table in tables.iter_mut() {
        for fk in table.foreign_keys.iter_mut() {
            if fk.referenced_columns.iter().any(String::is_empty) {
                if let Some(pk) = primary_keys.get(&fk.referenced_table.to_lowercase()) {
                    if pk.len() == fk.columns.len() {
                        fk.referenced_columns = pk.clone();
                    }
                }
            }
        }
    }
}

/// Group flat (constraint, column, ref_table, ref_column) rows into
/// [`ForeignKey`] values, preserving column order within each constraint.
fn group_foreign_keys(rows: Vec<(String, String, String, String)>) -> Vec<ForeignKey> {
    let mut keys: Vec<(String, ForeignKey)> = Vec::new();
    for (constraint, column, ref_table, ref_column) in rows {
        match keys.iter_mut().find(|(name, _)| *name == constraint) {
            Some((_, fk)) => {
                fk.columns.push(column);
                fk.referenced_columns.push(ref_column);
            }
            None => {
                let mut fk = ForeignKey::new(column, ref_table, "");
                fk.referenced_columns[0] = ref_column;
                keys.push((constraint, fk));
            }
        }
    }
    keys.into_iter().map(|(_, fk)| fk).collect()
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                c.column_name,
                c.data_type,
                c.is_nullable,
                c.column_default,
                c.is_identity
            FROM information_schema.columns c
            WHERE c.table_name = $1 AND c.table_schema = 'public'
            ORDER BY c.ordinal_position
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = 'public'
            AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                tc.constraint_name,
                kcu.column_name,
                ccu.table_name AS foreign_table_name,
                ccu.column_name AS foreign_column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = 'public'
            AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
                CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
                CONVERT(EXTRA USING utf8) AS EXTRA
            FROM information_schema.COLUMNS
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
            ORDER BY ORDINAL_POSITION
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_NAME = ?
            AND TABLE_SCHEMA = DATABASE()
            AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
                CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_NAME = ?
            AND TABLE_SCHEMA = DATABASE()
            AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn load_tables(pool: &PgPool) -> AdapterResult<Vec<TableMetadata>> {
        let names = sqlx::query(queries::postgres::LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?;

        let mut tables = Vec::with_capacity(names.len());
        for name_row in &names {
            let name: String = name_row.get("table_name");
            tables.push(load_table(pool, &name).await?);
        }
        Ok(tables)
    }

    async fn load_table(pool: &PgPool, name: &str) -> AdapterResult<TableMetadata> {
        let primary_key: Vec<String> = sqlx::query(queries::postgres::PRIMARY_KEY)
            .bind(name)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?
            .iter()
            .map(|row| row.get("column_name"))
            .collect();

        let column_rows = sqlx::query(queries::postgres::COLUMNS)
            .bind(name)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?;

        let columns = column_rows
            .iter()
            .map(|row| {
                let column_name: String = row.get("column_name");
                let data_type: String = row.get("data_type");
                let nullable: String = row.get("is_nullable");
                let default_value: Option<String> = row.try_get("column_default").ok().flatten();
                let is_identity: String = row.get("is_identity");

                let mut col = ColumnMetadata::new(&column_name, &data_type, nullable == "YES");
                col.is_primary_key = primary_key
                    .iter()
                    .any(|pk| pk.eq_ignore_ascii_case(&column_name));
                col.has_default = default_value.is_some();
                // Serial columns predate identity columns; both are
                // backend-assigned.
                col.is_identity = is_identity == "YES"
                    || default_value
                        .as_deref()
                        .is_some_and(|d| d.starts_with("nextval("));
                col
            })
            .collect();

        let fk_rows = sqlx::query(queries::postgres::FOREIGN_KEYS)
            .bind(name)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?
            .iter()
            .map(|row| {
                (
                    row.get("constraint_name"),
                    row.get("column_name"),
                    row.get("foreign_table_name"),
                    row.get("foreign_column_name"),
                )
            })
            .collect();

        Ok(TableMetadata {
            name: name.to_string(),
            columns,
            primary_key,
            foreign_keys: group_foreign_keys(fk_rows),
        })
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};
    use sqlx::mysql::MySqlRow;

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset
    /// configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn load_tables(pool: &MySqlPool) -> AdapterResult<Vec<TableMetadata>> {
        let names = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?;

        let mut tables = Vec::with_capacity(names.len());
        for name_row in &names {
            let name = get_string(name_row, "TABLE_NAME");
            if !name.is_empty() {
                tables.push(load_table(pool, &name).await?);
            }
        }
        Ok(tables)
    }

    async fn load_table(pool: &MySqlPool, name: &str) -> AdapterResult<TableMetadata> {
        let primary_key: Vec<String> = sqlx::query(queries::mysql::PRIMARY_KEY)
            .bind(name)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?
            .iter()
            .map(|row| get_string(row, "COLUMN_NAME"))
            .collect();

        let column_rows = sqlx::query(queries::mysql::COLUMNS)
            .bind(name)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?;

        let columns = column_rows
            .iter()
            .map(|row| {
                let column_name = get_string(row, "COLUMN_NAME");
                let column_type = get_string(row, "COLUMN_TYPE");
                let nullable = get_string(row, "IS_NULLABLE");
                let default_value = get_optional_string(row, "COLUMN_DEFAULT");
                let column_key = get_string(row, "COLUMN_KEY");
                let extra = get_string(row, "EXTRA");

                let mut col = ColumnMetadata::new(&column_name, &column_type, nullable == "YES");
                col.is_primary_key = column_key == "PRI";
                col.is_identity = extra.to_lowercase().contains("auto_increment");
                col.has_default = default_value.is_some() || col.is_identity;
                col
            })
            .collect();

        let fk_rows = sqlx::query(queries::mysql::FOREIGN_KEYS)
            .bind(name)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?
            .iter()
            .map(|row| {
                (
                    get_string(row, "CONSTRAINT_NAME"),
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "REFERENCED_TABLE_NAME"),
                    get_string(row, "REFERENCED_COLUMN_NAME"),
                )
            })
            .collect();

        Ok(TableMetadata {
            name: name.to_string(),
            columns,
            primary_key,
            foreign_keys: group_foreign_keys(fk_rows),
        })
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn load_tables(pool: &SqlitePool) -> AdapterResult<Vec<TableMetadata>> {
        let names = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?;

        let mut tables = Vec::with_capacity(names.len());
        for name_row in &names {
            let name: String = name_row.get("name");
            tables.push(load_table(pool, &name).await?);
        }
        Ok(tables)
    }

    async fn load_table(pool: &SqlitePool, name: &str) -> AdapterResult<TableMetadata> {
        let pragma = format!("PRAGMA table_info('{}')", name.replace('\'', "''"));
        let column_rows = sqlx::query(&pragma)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?;

        let mut pk_ordered: Vec<(i32, String)> = Vec::new();
        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let column_name: String = row.get("name");
            let data_type: String = row.get("type");
            let notnull: i32 = row.get("notnull");
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
            let pk: i32 = row.get("pk");

            if pk > 0 {
                pk_ordered.push((pk, column_name.clone()));
            }

            let mut col = ColumnMetadata::new(&column_name, &data_type, notnull == 0);
            col.is_primary_key = pk > 0;
            col.has_default = default_value.is_some();
            columns.push(col);
        }

        pk_ordered.sort_by_key(|(ord, _)| *ord);
        let primary_key: Vec<String> = pk_ordered.into_iter().map(|(_, name)| name).collect();

        // A lone INTEGER PRIMARY KEY column is the rowid alias, so the
        // backend assigns it.
        if primary_key.len() == 1 {
            if let Some(col) = columns
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(&primary_key[0]))
            {
                if col.data_type.eq_ignore_ascii_case("INTEGER") {
                    col.is_identity = true;
                    col.has_default = true;
                }
            }
        }

        let fk_pragma = format!("PRAGMA foreign_key_list('{}')", name.replace('\'', "''"));
        let fk_rows = sqlx::query(&fk_pragma)
            .fetch_all(pool)
            .await
            .map_err(AdapterError::from)?
            .iter()
            .map(|row| {
                let id: i32 = row.get("id");
                let column: String = row.get("from");
                let ref_table: String = row.get("table");
                // NULL when the key references the target's implicit primary
                // key; resolved after all tables are loaded.
                let ref_column: Option<String> = row.try_get("to").ok().flatten();
                (
                    format!("fk_{id}"),
                    column,
                    ref_table,
                    ref_column.unwrap_or_default(),
                )
            })
            .collect();

        Ok(TableMetadata {
            name: name.to_string(),
            columns,
            primary_key,
            foreign_keys: group_foreign_keys(fk_rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_foreign_keys_single_column() {
        let keys = group_foreign_keys(vec![(
            "fk_customer".into(),
            "customer_id".into(),
            "customers".into(),
            "id".into(),
        )]);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].columns, vec!["customer_id"]);
        assert_eq!(keys[0].referenced_table, "customers");
        assert_eq!(keys[0].referenced_columns, vec!["id"]);
    }

    #[test]
    fn test_group_foreign_keys_composite() {
        let keys = group_foreign_keys(vec![
            (
                "fk_line".into(),
                "order_id".into(),
                "order_lines".into(),
                "order_id".into(),
            ),
            (
                "fk_line".into(),
                "line_no".into(),
                "order_lines".into(),
                "line_no".into(),
            ),
            ("fk_other".into(), "sku".into(), "products".into(), "sku".into()),
        ]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].columns, vec!["order_id", "line_no"]);
        assert_eq!(keys[0].referenced_columns, vec!["order_id", "line_no"]);
        assert_eq!(keys[1].referenced_table, "products");
    }

    #[test]
    fn test_implicit_fk_target_resolution() {
        let mut tables = vec![
            TableMetadata::new("customers").with_primary_key(["id"]),
            TableMetadata::new("orders").with_foreign_key(ForeignKey {
                columns: vec!["customer_id".into()],
                referenced_table: "customers".into(),
                referenced_columns: vec![String::new()],
            }),
        ];
        resolve_implicit_fk_targets(&mut tables);
        assert_eq!(tables[1].foreign_keys[0].referenced_columns, vec!["id"]);
    }
}
