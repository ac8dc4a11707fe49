//! Integration tests for the adapter CRUD surface against SQLite.
//!
//! Covers the core behaviors: insert/find round-trips including generated
//! keys, zero-match reads, validation failures raised before execution,
//! bulk updates and criteria-scoped deletes.

use dyntable::{Adapter, AdapterError, Criteria, Query, Related, Row, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tempfile::NamedTempFile;

/// Create a temp-file SQLite database, run the DDL, and connect an adapter.
async fn setup(ddl: &[&str]) -> Adapter {
    let db_path = NamedTempFile::new()
        .unwrap()
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let url = format!("sqlite:{db_path}");

    let options = SqliteConnectOptions::from_str(&url)
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
    for sql in ddl {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool.close().await;

    Adapter::connect(&url).await.unwrap()
}

async fn users_adapter() -> Adapter {
    setup(&["CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)"]).await
}

#[tokio::test]
async fn insert_assigns_sequential_identities() {
    let adapter = users_adapter().await;

    let ann = adapter
        .insert("users", &Row::new().with("name", "Ann"))
        .await
        .unwrap();
    assert_eq!(ann.get("id"), Some(&Value::Int(1)));
    assert_eq!(ann.get("name"), Some(&Value::Text("Ann".into())));

    let bob = adapter
        .insert("users", &Row::new().with("name", "Bob"))
        .await
        .unwrap();
    assert_eq!(bob.get("id"), Some(&Value::Int(2)));
    assert_eq!(bob.get("name"), Some(&Value::Text("Bob".into())));
}

#[tokio::test]
async fn insert_then_find_one_round_trips() {
    let adapter = users_adapter().await;

    let inserted = adapter
        .insert("users", &Row::new().with("name", "Ann").with("age", 32i64))
        .await
        .unwrap();
    let id = inserted.get("id").unwrap().clone();

    let found = adapter
        .find_one("users", &Criteria::eq("id", id))
        .await
        .unwrap()
        .expect("row should exist");
    assert_eq!(found.get("name"), inserted.get("name"));
    assert_eq!(found.get("age"), Some(&Value::Int(32)));
}

#[tokio::test]
async fn zero_matches_yield_empty_not_error() {
    let adapter = users_adapter().await;

    let rows = adapter
        .find("users", &Criteria::eq("name", "Nobody"))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let row = adapter
        .find_one("users", &Criteria::eq("name", "Nobody"))
        .await
        .unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn find_reexecutes_on_every_call() {
    let adapter = users_adapter().await;
    let criteria = Criteria::like("name", "A%");

    assert!(adapter.find("users", &criteria).await.unwrap().is_empty());

    adapter
        .insert("users", &Row::new().with("name", "Ann"))
        .await
        .unwrap();

    // The same criteria sees the new row because the query runs again.
    assert_eq!(adapter.find("users", &criteria).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_table_and_columns_fail_fast() {
    let adapter = users_adapter().await;

    let err = adapter.find("missing", &Criteria::eq("id", 1i64)).await;
    assert!(matches!(err, Err(AdapterError::UnknownTable { .. })));

    let err = adapter
        .insert("users", &Row::new().with("email", "a@example.com"))
        .await;
    assert!(matches!(err, Err(AdapterError::UnknownColumn { .. })));

    let err = adapter.find("users", &Criteria::eq("email", "x")).await;
    assert!(matches!(err, Err(AdapterError::InvalidCriteria { .. })));
}

#[tokio::test]
async fn table_names_match_case_insensitively() {
    let adapter = users_adapter().await;
    adapter
        .insert("USERS", &Row::new().with("name", "Ann"))
        .await
        .unwrap();
    let rows = adapter.find("Users", &Criteria::eq("name", "Ann")).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn empty_update_rejected_before_execution() {
    let adapter = users_adapter().await;
    let err = adapter
        .update("users", &Row::new(), &Criteria::eq("id", 1i64))
        .await;
    assert!(matches!(err, Err(AdapterError::EmptyUpdate { .. })));
}

#[tokio::test]
async fn update_with_criteria_and_update_all() {
    let adapter = users_adapter().await;
    for name in ["Ann", "Bob", "Cid"] {
        adapter
            .insert("users", &Row::new().with("name", name).with("age", 20i64))
            .await
            .unwrap();
    }

    let affected = adapter
        .update(
            "users",
            &Row::new().with("age", 30i64),
            &Criteria::eq("name", "Ann"),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let affected = adapter
        .update_all("users", &Row::new().with("age", 0i64))
        .await
        .unwrap();
    assert_eq!(affected, 3);

    let rows = adapter.find("users", &Criteria::eq("age", 0i64)).await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn delete_matching_subset_returns_count() {
    let adapter = users_adapter().await;
    for i in 1..=10i64 {
        adapter
            .insert(
                "users",
                &Row::new().with("name", format!("user{i}")).with("age", i),
            )
            .await
            .unwrap();
    }

    let criteria = Criteria::lte("age", 3i64);
    let deleted = adapter.delete("users", &criteria).await.unwrap();
    assert_eq!(deleted, 3);

    let remaining = adapter.find("users", &criteria).await.unwrap();
    assert!(remaining.is_empty());

    let all = adapter.delete_all("users").await.unwrap();
    assert_eq!(all, 7);
}

#[tokio::test]
async fn insert_many_preserves_order_and_keys() {
    let adapter = users_adapter().await;
    let rows = vec![
        Row::new().with("name", "Ann"),
        Row::new().with("name", "Bob"),
        Row::new().with("name", "Cid"),
    ];
    let inserted = adapter.insert_many("users", &rows).await.unwrap();
    assert_eq!(inserted.len(), 3);
    for (i, row) in inserted.iter().enumerate() {
        assert_eq!(row.get("id"), Some(&Value::Int(i as i64 + 1)));
    }
    assert_eq!(inserted[2].get("name"), Some(&Value::Text("Cid".into())));
}

#[tokio::test]
async fn update_many_matches_on_primary_key() {
    let adapter = users_adapter().await;
    adapter
        .insert_many(
            "users",
            &[
                Row::new().with("name", "Ann"),
                Row::new().with("name", "Bob"),
            ],
        )
        .await
        .unwrap();

    let updates = vec![
        Row::new().with("id", 1i64).with("age", 31i64),
        Row::new().with("id", 2i64).with("age", 32i64),
    ];
    let affected = adapter.update_many("users", &updates).await.unwrap();
    assert_eq!(affected, 2);

    let bob = adapter
        .find_one("users", &Criteria::eq("id", 2i64))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob.get("age"), Some(&Value::Int(32)));
}

#[tokio::test]
async fn update_many_with_explicit_key_fields() {
    let adapter = users_adapter().await;
    adapter
        .insert("users", &Row::new().with("name", "Ann").with("age", 30i64))
        .await
        .unwrap();

    let updates = vec![Row::new().with("name", "Ann").with("age", 40i64)];
    let affected = adapter
        .update_many_with_keys("users", &updates, &["name".to_string()])
        .await
        .unwrap();
    assert_eq!(affected, 1);
}

#[tokio::test]
async fn update_many_without_keys_on_keyless_table_fails() {
    let adapter = setup(&["CREATE TABLE logs (message TEXT)"]).await;
    let rows = vec![Row::new().with("message", "hello")];
    let err = adapter.update_many("logs", &rows).await;
    assert!(matches!(err, Err(AdapterError::MissingKey { .. })));
}

#[tokio::test]
async fn key_field_names_reports_primary_key() {
    let adapter = setup(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE logs (message TEXT)",
    ])
    .await;

    assert_eq!(adapter.key_field_names("users").await.unwrap(), vec!["id"]);
    assert!(adapter.key_field_names("logs").await.unwrap().is_empty());
}

#[tokio::test]
async fn run_query_projection_order_and_paging() {
    let adapter = users_adapter().await;
    for i in 1..=5i64 {
        adapter
            .insert(
                "users",
                &Row::new().with("name", format!("user{i}")).with("age", i * 10),
            )
            .await
            .unwrap();
    }

    let query = Query::new("users")
        .with_criteria(Criteria::gt("age", 10i64))
        .select(["name", "age"])
        .order_by_desc("age")
        .skip(1)
        .take(2);
    let rows = adapter.run_query(&query).await.unwrap();

    assert_eq!(rows.len(), 2);
    // age 50 is skipped; 40 and 30 follow in descending order.
    assert_eq!(rows[0].get("age"), Some(&Value::Int(40)));
    assert_eq!(rows[1].get("age"), Some(&Value::Int(30)));
    assert!(rows[0].get("id").is_none(), "projection excludes id");
}

#[tokio::test]
async fn run_query_with_join() {
    let adapter = setup(&[
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER \
         REFERENCES customers(id), total REAL)",
        "INSERT INTO customers (name) VALUES ('Ann')",
        "INSERT INTO orders (customer_id, total) VALUES (1, 9.5)",
        "INSERT INTO orders (customer_id, total) VALUES (1, 20.0)",
    ])
    .await;

    let query = Query::new("orders")
        .join("customers", "customer_id", "id")
        .with_criteria(Criteria::eq("customers.name", "Ann"));
    let rows = adapter.run_query(&query).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn find_related_navigates_both_directions() {
    let adapter = setup(&[
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER \
         REFERENCES customers(id), total REAL)",
        "CREATE TABLE products (id INTEGER PRIMARY KEY, sku TEXT)",
        "INSERT INTO customers (name) VALUES ('Ann')",
        "INSERT INTO orders (customer_id, total) VALUES (1, 9.5)",
        "INSERT INTO orders (customer_id, total) VALUES (1, 20.0)",
    ])
    .await;

    assert!(adapter.is_valid_relation("orders", "customers").await.unwrap());
    assert!(adapter.is_valid_relation("customers", "orders").await.unwrap());
    assert!(!adapter.is_valid_relation("orders", "products").await.unwrap());

    let ann = adapter
        .find_one("customers", &Criteria::eq("name", "Ann"))
        .await
        .unwrap()
        .unwrap();
    match adapter.find_related("customers", &ann, "orders").await.unwrap() {
        Related::Many(orders) => assert_eq!(orders.len(), 2),
        other => panic!("expected Many, got {other:?}"),
    }

    let order = adapter
        .find_one("orders", &Criteria::eq("total", 9.5))
        .await
        .unwrap()
        .unwrap();
    match adapter.find_related("orders", &order, "customers").await.unwrap() {
        Related::One(Some(customer)) => {
            assert_eq!(customer.get("name"), Some(&Value::Text("Ann".into())));
        }
        other => panic!("expected One, got {other:?}"),
    }

    let err = adapter.find_related("orders", &order, "products").await;
    assert!(matches!(err, Err(AdapterError::NoRelation { .. })));
}

#[tokio::test]
async fn two_adapters_observe_the_same_database_independently() {
    let db_path = NamedTempFile::new()
        .unwrap()
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let url = format!("sqlite:{db_path}");
    let options = SqliteConnectOptions::from_str(&url)
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
    sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    // Two adapters, two pools, one database file. The same criteria runs
    // independently on each adapter's own connections.
    let writer = Adapter::connect(&url).await.unwrap();
    let reader = Adapter::connect(&url).await.unwrap();

    writer
        .insert("users", &Row::new().with("name", "Ann"))
        .await
        .unwrap();

    let criteria = Criteria::eq("name", "Ann");
    let seen_by_writer = writer.find("users", &criteria).await.unwrap();
    let seen_by_reader = reader.find("users", &criteria).await.unwrap();
    assert_eq!(seen_by_writer, seen_by_reader);
    assert_eq!(seen_by_writer.len(), 1);
}
