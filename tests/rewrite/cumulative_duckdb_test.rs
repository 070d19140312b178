//! Cumulative metric SQL executed against an in-memory DuckDB.

use duckdb::Connection;
use mdlsql::mdl::{Column, CumulativeMetric, Measure, Model, TimeUnit, Window};
use mdlsql::{rewrite, Catalog, Manifest, SessionContext};

fn cumulative(name: &str, unit: TimeUnit) -> CumulativeMetric {
    CumulativeMetric::new(
        name,
        "Orders",
        Measure::new("total", "DOUBLE", "sum", "totalprice"),
        Window::new("orderdate", "orderdate", unit, "1994-01-01", "1994-12-31"),
    )
}

fn catalog() -> Catalog {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(
            Model::new("Orders", "select * from main.orders")
                .with_column(Column::new("orderkey", "INTEGER"))
                .with_column(Column::new("totalprice", "DOUBLE"))
                .with_column(Column::new("orderdate", "DATE"))
                .with_primary_key("orderkey"),
        )
        .with_cumulative_metric(cumulative("DailyRevenue", TimeUnit::Day))
        .with_cumulative_metric(cumulative("WeeklyRevenue", TimeUnit::Week))
        .with_cumulative_metric(cumulative("MonthlyRevenue", TimeUnit::Month));
    Catalog::new(manifest).expect("cumulative catalog")
}

fn connection() -> Connection {
    let con = Connection::open_in_memory().expect("in-memory DuckDB");
    con.execute_batch(
        "CREATE TABLE orders (orderkey INTEGER, totalprice DOUBLE, orderdate DATE);
         INSERT INTO orders VALUES
             (1, 10.0, DATE '1994-01-15'),
             (2, 20.0, DATE '1994-03-10'),
             (3, 5.0, DATE '1993-06-01');",
    )
    .expect("orders table");
    con
}

fn rewritten(metric: &str) -> String {
    rewrite(
        &format!("SELECT * FROM {metric}"),
        &SessionContext::new("accio", "tpch"),
        &catalog(),
    )
    .unwrap()
}

fn row_count(con: &Connection, sql: &str) -> i64 {
    con.query_row(&format!("SELECT count(*) FROM ({sql}) AS r"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn test_cumulative_periods_per_window_unit() {
    let con = connection();
    assert_eq!(row_count(&con, &rewritten("DailyRevenue")), 365);
    assert_eq!(row_count(&con, &rewritten("WeeklyRevenue")), 53);
    assert_eq!(row_count(&con, &rewritten("MonthlyRevenue")), 12);
}

#[test]
fn test_cumulative_totals_accumulate() {
    let con = connection();
    let sql = rewritten("MonthlyRevenue");
    let mut stmt = con
        .prepare(&format!(
            "SELECT CAST(orderdate AS VARCHAR), total FROM ({sql}) AS r ORDER BY orderdate"
        ))
        .unwrap();
    let rows: Vec<(String, Option<f64>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0], ("1994-01-01".to_string(), Some(10.0)));
    assert_eq!(rows[1], ("1994-02-01".to_string(), Some(10.0)));
    assert_eq!(rows[2], ("1994-03-01".to_string(), Some(30.0)));
    assert_eq!(rows[11], ("1994-12-01".to_string(), Some(30.0)));
}
