//! Warehouse tests against a live PostgreSQL server.
//!
//! Set `UETL_TEST_PG_HOST` (and optionally `UETL_TEST_PG_PORT`,
//! `UETL_TEST_PG_USER`, `UETL_TEST_PG_PASSWORD`) and run with
//! `cargo test -- --ignored`. Each test works in its own scratch database.

use uetl::{Column, ConnectOutcome, DataWarehouse, Dbms, SqlValue, Table};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A warehouse pointing at a scratch database that does not exist yet.
fn scratch_warehouse() -> Option<DataWarehouse> {
    let host = std::env::var("UETL_TEST_PG_HOST").ok()?;
    let database = format!("uetl_test_{}", uuid::Uuid::new_v4().simple());
    Some(DataWarehouse::new(
        "test",
        Dbms::Postgres,
        host,
        env_or("UETL_TEST_PG_PORT", "5432"),
        database,
        env_or("UETL_TEST_PG_USER", "postgres"),
        env_or("UETL_TEST_PG_PASSWORD", "postgres"),
    ))
}

/// Create the scratch database and return the warehouse.
async fn setup() -> Option<DataWarehouse> {
    let dw = scratch_warehouse()?;
    assert!(dw.test_connection().await.unwrap(), "warehouse unreachable");
    Some(dw)
}

/// Run `sql` in autocommit mode on the administrative database.
async fn admin_execute(dw: &DataWarehouse, sql: &str) {
    let admin = DataWarehouse::new(
        "admin",
        Dbms::Postgres,
        dw.host(),
        dw.port().clone(),
        dw.admin_database(),
        dw.user(),
        dw.password(),
    );
    if let ConnectOutcome::Connected(mut conn) = admin.get_conn().await {
        conn.set_autocommit(true).await.unwrap();
        conn.batch_execute(sql).await.unwrap();
        conn.close().await;
    }
}

async fn teardown(dw: DataWarehouse) {
    admin_execute(&dw, &format!("DROP DATABASE IF EXISTS \"{}\"", dw.database())).await;
}

async fn reachable(dw: &DataWarehouse) -> bool {
    match dw.get_conn().await {
        ConnectOutcome::Connected(conn) => {
            conn.close().await;
            true
        }
        ConnectOutcome::Failed(_) => false,
    }
}

fn days() -> Table {
    Table::from_columns(vec![
        Column::from_values("day", ["mon", "tue", "wed"]),
        Column::from_values("holiday", [false, false, true]),
    ])
    .unwrap()
}

// =============================================================================
// Connectivity
// =============================================================================

#[tokio::test]
#[ignore]
async fn test_connection_creates_missing_database() {
    let Some(dw) = scratch_warehouse() else { return };

    assert!(!reachable(&dw).await);
    assert!(dw.test_connection().await.unwrap());
    assert!(reachable(&dw).await);
    // Already present: still reachable, nothing to create.
    assert!(dw.test_connection().await.unwrap());
    // Creating it again is a benign race, not an error.
    assert!(dw.create_database().await.unwrap());

    teardown(dw).await;
}

#[tokio::test]
#[ignore]
async fn test_query_select_one() {
    let Some(dw) = setup().await else { return };

    let t = dw.query("SELECT 1 AS one").await.unwrap();
    assert_eq!(t.num_rows(), 1);
    assert_eq!(t.num_columns(), 1);
    assert_eq!(t.column("one").unwrap().values[0], SqlValue::I32(1));

    let empty = dw.query("SELECT 1 AS one WHERE false").await.unwrap();
    assert_eq!(empty.num_rows(), 0);
    assert_eq!(empty.column_names(), vec!["one"]);

    assert!(dw.query("SELECT * FROM no_such_table").await.is_err());

    teardown(dw).await;
}

#[tokio::test]
#[ignore]
async fn test_connection_false_when_database_refuses_connections() {
    let Some(dw) = setup().await else { return };

    admin_execute(
        &dw,
        &format!("ALTER DATABASE \"{}\" ALLOW_CONNECTIONS false", dw.database()),
    )
    .await;

    // The database exists, so creating it "succeeds", but it stays closed.
    assert!(!dw.test_connection().await.unwrap());
    assert_eq!(dw.query("SELECT 1").await.unwrap().num_rows(), 0);

    teardown(dw).await;
}

#[tokio::test]
#[ignore]
async fn test_query_reads_types_without_binary_decoders() {
    let Some(dw) = setup().await else { return };

    let t = dw
        .query(
            "SELECT interval '1 day' AS span, ARRAY[1,2] AS arr, '10.0.0.1'::inet AS addr, \
             '12:00+02'::timetz AS tz, '1.50'::money AS price, 42 AS plain",
        )
        .await
        .unwrap();
    assert_eq!(t.num_rows(), 1);
    assert_eq!(t.column("span").unwrap().values[0], SqlValue::Text("1 day".into()));
    assert_eq!(t.column("arr").unwrap().values[0], SqlValue::Text("{1,2}".into()));
    assert_eq!(
        t.column("addr").unwrap().values[0],
        SqlValue::Text("10.0.0.1".into())
    );
    assert!(matches!(t.column("tz").unwrap().values[0], SqlValue::Text(_)));
    assert!(matches!(t.column("price").unwrap().values[0], SqlValue::Text(_)));
    assert_eq!(t.column("plain").unwrap().values[0], SqlValue::I32(42));

    // Numerics outside the decimal range fall back to their text form.
    let t = dw
        .query("SELECT 1e40::numeric AS big, 'NaN'::numeric AS nan, 12.5::numeric AS fine")
        .await
        .unwrap();
    assert_eq!(
        t.column("big").unwrap().values[0],
        SqlValue::Text(format!("1{}", "0".repeat(40)))
    );
    assert_eq!(t.column("nan").unwrap().values[0], SqlValue::Text("NaN".into()));
    assert!(matches!(t.column("fine").unwrap().values[0], SqlValue::Decimal(_)));

    teardown(dw).await;
}

// =============================================================================
// Tables
// =============================================================================

#[tokio::test]
#[ignore]
async fn test_table_exists_is_case_sensitive() {
    let Some(dw) = setup().await else { return };

    assert!(dw
        .ensure_tables([("Foo", "CREATE TABLE \"Foo\" (id INT)")], false)
        .await
        .unwrap());
    assert!(dw.table_exists("Foo").await.unwrap());
    assert!(!dw.table_exists("foo").await.unwrap());

    teardown(dw).await;
}

#[tokio::test]
#[ignore]
async fn test_ensure_tables_is_idempotent_and_ordered() {
    let Some(dw) = setup().await else { return };

    let tables = vec![
        ("dim_date", "CREATE TABLE dim_date (date_sk BIGINT PRIMARY KEY)"),
        (
            "fact_sales",
            "CREATE TABLE fact_sales (sales_sk BIGINT, date_sk BIGINT REFERENCES dim_date)",
        ),
    ];
    assert!(dw.ensure_tables(tables.clone(), true).await.unwrap());
    assert!(dw.ensure_tables(tables, true).await.unwrap());
    assert!(dw.table_exists("fact_sales").await.unwrap());

    // A failing DDL surfaces as a statement error.
    assert!(dw
        .ensure_tables([("broken", "CREATE TABLE broken (")], false)
        .await
        .is_err());

    teardown(dw).await;
}

#[tokio::test]
#[ignore]
async fn test_truncate_with_and_without_cascade() {
    let Some(dw) = setup().await else { return };

    dw.ensure_tables(
        [
            ("dim_a", "CREATE TABLE dim_a (a_sk BIGINT PRIMARY KEY)"),
            ("dim_b", "CREATE TABLE dim_b (b_sk BIGINT PRIMARY KEY)"),
            (
                "fact_c",
                "CREATE TABLE fact_c (c_sk BIGINT, a_sk BIGINT REFERENCES dim_a)",
            ),
        ],
        false,
    )
    .await
    .unwrap();

    let one = Table::from_columns(vec![Column::from_values("a_sk", [1i64])]).unwrap();
    dw.write_unindexed("dim_a", &one, None, false).await.unwrap();
    let b = Table::from_columns(vec![Column::from_values("b_sk", [1i64])]).unwrap();
    dw.write_unindexed("dim_b", &b, None, false).await.unwrap();
    let c = Table::from_columns(vec![
        Column::from_values("c_sk", [1i64]),
        Column::from_values("a_sk", [1i64]),
    ])
    .unwrap();
    dw.write_unindexed("fact_c", &c, None, false).await.unwrap();

    // Referenced by fact_c: plain TRUNCATE is refused by the engine.
    assert!(dw.truncate("dim_a", false, false).await.is_err());

    // Unreferenced table: rows go, schema stays.
    assert!(dw.truncate("dim_b", false, true).await.unwrap());
    assert_eq!(dw.query("SELECT * FROM dim_b").await.unwrap().num_rows(), 0);
    assert!(dw.table_exists("dim_b").await.unwrap());

    assert!(dw.truncate("dim_a", true, true).await.unwrap());
    assert_eq!(dw.query("SELECT * FROM fact_c").await.unwrap().num_rows(), 0);

    teardown(dw).await;
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
#[ignore]
async fn test_write_indexed_appends_surrogate_key() {
    let Some(dw) = setup().await else { return };

    let t = days()
        .with_index(vec![SqlValue::I64(1), SqlValue::I64(2), SqlValue::I64(3)])
        .unwrap();
    assert!(dw.write_indexed("dim_date", &t, None, true).await.unwrap());
    assert!(dw.write_indexed("dim_date", &t, Some(2), true).await.unwrap());

    let back = dw
        .query("SELECT date_sk FROM dim_date ORDER BY date_sk")
        .await
        .unwrap();
    let keys: Vec<SqlValue> = back.column("date_sk").unwrap().values.clone();
    assert_eq!(
        keys,
        vec![1i64, 1, 2, 2, 3, 3]
            .into_iter()
            .map(SqlValue::I64)
            .collect::<Vec<_>>()
    );

    teardown(dw).await;
}

#[tokio::test]
#[ignore]
async fn test_write_unindexed_round_trip() {
    let Some(dw) = setup().await else { return };

    let t = days();
    assert!(dw.write_unindexed("dim_day", &t, Some(1), false).await.unwrap());

    let back = dw
        .query("SELECT day, holiday FROM dim_day ORDER BY day")
        .await
        .unwrap();
    assert_eq!(back.num_rows(), 3);
    for row in t.rows() {
        assert!(back.rows().any(|r| r == row), "missing row {:?}", row);
    }

    // Empty tables create the destination and insert nothing.
    let empty = Table::from_columns(vec![Column::new("x", vec![])]).unwrap();
    assert!(dw.write_unindexed("t_empty", &empty, None, false).await.unwrap());
    assert!(dw.table_exists("t_empty").await.unwrap());

    teardown(dw).await;
}
