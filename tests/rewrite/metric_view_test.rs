#[path = "../fixtures/mod.rs"]
mod fixtures;

use mdlsql::mdl::{Column, CumulativeMetric, Measure, Model, TimeUnit, Window};
use mdlsql::rewrite::CteRegistry;
use mdlsql::{rewrite, Catalog, ErrorCode, Manifest};

fn position(sql: &str, needle: &str) -> usize {
    sql.find(needle)
        .unwrap_or_else(|| panic!("{needle} not found in {sql}"))
}

#[test]
fn test_metric_reads_model_cte() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT custkey, revenue FROM Revenue",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    let model = position(&sql, "\"Orders\" AS (");
    let metric = position(
        &sql,
        "\"Revenue\" AS (SELECT \"Orders\".\"custkey\" AS \"custkey\", \
         \"Orders\".\"orderdate\" AS \"orderdate\", sum(\"Orders\".totalprice) AS \"revenue\" \
         FROM \"Orders\" AS \"Orders\" GROUP BY 1, 2)",
    );
    assert!(model < metric);
    assert!(sql.ends_with("SELECT custkey, revenue FROM \"Revenue\""));
}

#[test]
fn test_metric_dimension_through_relationship() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT customer_name, revenue FROM CustomerRevenue",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    let customer = position(&sql, "\"Customer\" AS (");
    let metric = position(&sql, "\"CustomerRevenue\" AS (");
    assert!(customer < metric);
    assert!(sql.ends_with("SELECT customer_name, revenue FROM \"CustomerRevenue\""));
}

#[test]
fn test_rollup() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT * FROM roll_up(Revenue, orderdate, MONTH)",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    let cte = CteRegistry::new("rs_").name_for("roll_up(Revenue, orderdate, MONTH)");
    assert!(sql.contains(&format!(
        "\"{cte}\" AS (SELECT date_trunc('month', \"Orders\".\"orderdate\") AS \"orderdate\""
    )));
    assert!(sql.ends_with(&format!("SELECT * FROM \"{cte}\"")));
    assert!(!sql.contains("roll_up("));
}

#[test]
fn test_rollup_unit_not_in_grain() {
    let catalog = fixtures::tpch();
    let err = rewrite(
        "SELECT * FROM roll_up(Revenue, orderdate, WEEK)",
        &fixtures::session(),
        &catalog,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedInput);
}

#[test]
fn test_cumulative_metric() {
    let catalog = fixtures::tpch();
    let sql = rewrite("SELECT * FROM WeeklyRevenue", &fixtures::session(), &catalog).unwrap();
    let model = position(&sql, "\"Orders\" AS (");
    let cumulative = position(
        &sql,
        "\"WeeklyRevenue\" AS (SELECT CAST(s.\"period\" AS DATE) AS \"orderdate\", sum(b.\"totalprice\") AS \"total\"",
    );
    assert!(model < cumulative);
    assert!(sql.contains("date_trunc('week'"));
    assert!(sql.ends_with("SELECT * FROM \"WeeklyRevenue\""));
}

#[test]
fn test_cumulative_window_must_be_temporal() {
    let manifest = Manifest::new("accio", "tpch")
        .with_model(
            Model::new("Orders", "select * from main.orders")
                .with_column(Column::new("orderkey", "INTEGER"))
                .with_column(Column::new("orderstatus", "VARCHAR"))
                .with_column(Column::new("totalprice", "DOUBLE"))
                .with_primary_key("orderkey"),
        )
        .with_cumulative_metric(CumulativeMetric::new(
            "ByStatus",
            "Orders",
            Measure::new("total", "DOUBLE", "sum", "totalprice"),
            Window::new("status", "orderstatus", TimeUnit::Day, "1994-01-01", "1994-12-31"),
        ));
    let catalog = Catalog::new(manifest).unwrap();
    let err = rewrite("SELECT * FROM ByStatus", &fixtures::session(), &catalog).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRelationshipUsage);
    assert_eq!(
        err.to_string(),
        "CumulativeMetric measure cannot be window as it is not date/timestamp type"
    );
}

#[test]
fn test_view_over_model() {
    let catalog = fixtures::tpch();
    let sql = rewrite("SELECT * FROM CustomerNames", &fixtures::session(), &catalog).unwrap();
    let model = position(&sql, "\"Customer\" AS (");
    let view = position(&sql, "\"CustomerNames\" AS (SELECT name FROM \"Customer\")");
    assert!(model < view);
    assert!(sql.ends_with("SELECT * FROM \"CustomerNames\""));
}

#[test]
fn test_view_over_metric() {
    let catalog = fixtures::tpch();
    let sql = rewrite("SELECT * FROM TopRevenue", &fixtures::session(), &catalog).unwrap();
    let model = position(&sql, "\"Orders\" AS (");
    let metric = position(&sql, "\"Revenue\" AS (");
    let view = position(&sql, "\"TopRevenue\" AS (SELECT * FROM \"Revenue\" WHERE revenue > 100)");
    assert!(model < metric && metric < view);
}

#[test]
fn test_view_cycle() {
    let catalog = fixtures::tpch();
    let err = rewrite("SELECT * FROM LoopA", &fixtures::session(), &catalog).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cycle);
}

#[test]
fn test_metric_rewrite_is_idempotent() {
    let catalog = fixtures::tpch();
    let session = fixtures::session();
    let once = rewrite("SELECT * FROM TopRevenue", &session, &catalog).unwrap();
    assert_eq!(rewrite(&once, &session, &catalog).unwrap(), once);
}
