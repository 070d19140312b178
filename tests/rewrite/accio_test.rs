#[path = "../fixtures/mod.rs"]
mod fixtures;

use mdlsql::rewrite::CteRegistry;
use mdlsql::{rewrite, ErrorCode, RuleKind, SqlDialect, SqlRewriter};

fn cte_name(signature: &str) -> String {
    CteRegistry::new("rs_").name_for(signature)
}

#[test]
fn test_non_model_query_round_trips() {
    let catalog = fixtures::tpch();
    let sql = rewrite("select a, b from main.other where a > 1", &fixtures::session(), &catalog)
        .unwrap();
    assert_eq!(sql, "SELECT a, b FROM main.other WHERE a > 1");
}

#[test]
fn test_model_becomes_cte() {
    let catalog = fixtures::tpch();
    let sql = rewrite("SELECT orderkey FROM Orders", &fixtures::session(), &catalog).unwrap();
    assert!(sql.starts_with("WITH \"Orders\" AS (SELECT \"Orders\".\"orderkey\" AS \"orderkey\""));
    assert!(sql.contains("'relationship<OrdersCustomer>' AS \"customer\""));
    assert!(sql.contains("\"Customer\".name AS \"customer_name\""));
    assert!(sql.ends_with("SELECT orderkey FROM \"Orders\""));
}

#[test]
fn test_fully_qualified_model_reference() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT o.orderkey FROM accio.tpch.Orders o",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    assert!(sql.ends_with("SELECT o.orderkey FROM \"Orders\" AS o"));

    let sql = rewrite(
        "SELECT o.orderkey FROM other.tpch.Orders o",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    assert_eq!(sql, "SELECT o.orderkey FROM other.tpch.Orders AS o");
}

#[test]
fn test_to_one_path_reads_synthesized_cte() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT o.orderkey, o.customer.name FROM Orders o",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    let cte = cte_name("Orders.customer");
    assert!(sql.ends_with(&format!(
        "SELECT o.orderkey, \"{cte}\".name FROM \"Orders\" AS o \
         LEFT JOIN \"{cte}\" ON o.\"orderkey\" = \"{cte}\".\"bk\""
    )));

    let orders = sql.find("\"Orders\" AS (").unwrap();
    let synthesized = sql.find(&format!("\"{cte}\" AS (")).unwrap();
    assert!(orders < synthesized);
}

#[test]
fn test_multi_hop_path_chains_ctes() {
    let catalog = fixtures::book_people();
    let sql = rewrite(
        "SELECT author.book.author.name FROM Book",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();

    let first = cte_name("Book.author");
    let second = cte_name("Book.author.book");
    let third = cte_name("Book.author.book.author");
    let positions: Vec<usize> = [&first, &second, &third]
        .iter()
        .map(|cte| sql.find(&format!("\"{cte}\" AS (")).unwrap())
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    assert!(sql.contains(&format!("FROM \"{first}\" AS s LEFT JOIN \"Book\" AS t")));
    assert!(sql.ends_with(&format!(
        "SELECT \"{third}\".name FROM \"Book\" LEFT JOIN \"{third}\" ON \"Book\".\"bookId\" = \"{third}\".\"bk\""
    )));
}

#[test]
fn test_same_path_shares_one_join() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT o.customer.name, o.customer.nationkey FROM Orders o",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    let cte = cte_name("Orders.customer");
    assert_eq!(sql.matches(&format!("LEFT JOIN \"{cte}\"")).count(), 1);
}

#[test]
fn test_rewrite_is_idempotent() {
    let catalog = fixtures::tpch();
    let session = fixtures::session();
    let once = rewrite("SELECT o.customer.name FROM Orders o", &session, &catalog).unwrap();
    let twice = rewrite(&once, &session, &catalog).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn test_to_many_path_without_array_function() {
    let catalog = fixtures::tpch();
    let err = rewrite(
        "SELECT c.orders.totalprice FROM Customer c",
        &fixtures::session(),
        &catalog,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRelationshipUsage);
}

#[test]
fn test_array_function_over_to_many() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "SELECT c.name, array_count(c.orders) FROM Customer c",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    assert!(sql.contains("array_agg(t.\"orderkey\" ORDER BY t.\"orderkey\" ASC)"));
    assert!(sql.contains("FROM \"Customer\" AS c LEFT JOIN"));
    assert!(sql.contains(".\"f1\""));
}

#[test]
fn test_ambiguous_column_across_join() {
    let catalog = fixtures::tpch();
    let err = rewrite(
        "SELECT custkey FROM Orders JOIN Customer ON Orders.custkey = Customer.custkey",
        &fixtures::session(),
        &catalog,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AmbiguousReference);
    assert_eq!(err.to_string(), "Column 'custkey' is ambiguous");
}

#[test]
fn test_user_cte_shadows_model() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "WITH Orders AS (SELECT 1 AS orderkey) SELECT orderkey FROM Orders",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    assert_eq!(
        sql,
        "WITH Orders AS (SELECT 1 AS orderkey) SELECT orderkey FROM Orders"
    );
}

#[test]
fn test_model_inside_user_cte() {
    let catalog = fixtures::tpch();
    let sql = rewrite(
        "WITH a AS (SELECT orderkey FROM Orders) SELECT * FROM a",
        &fixtures::session(),
        &catalog,
    )
    .unwrap();
    let model = sql.find("\"Orders\" AS (").unwrap();
    let user = sql.find("a AS (SELECT orderkey FROM \"Orders\")").unwrap();
    assert!(model < user);
    assert!(sql.ends_with("SELECT * FROM a"));
}

#[test]
fn test_syntactic_sugar_pass() {
    let catalog = fixtures::tpch();
    let rewriter = SqlRewriter::with_rules(SqlDialect::DuckDb, &[RuleKind::SyntacticSugar], "rs_");
    let sql = rewriter
        .rewrite(
            "SELECT orderkey, name FROM Orders o JOIN Customer ON o.custkey = Customer.custkey",
            &fixtures::session(),
            &catalog,
        )
        .unwrap();
    insta::assert_snapshot!(sql, @r#"SELECT o.orderkey, "Customer".name FROM Orders AS o JOIN Customer ON o.custkey = Customer.custkey"#);
}

#[test]
fn test_non_query_statement_passes_through() {
    let catalog = fixtures::tpch();
    let sql = rewrite("CREATE TABLE t (a INT)", &fixtures::session(), &catalog).unwrap();
    assert_eq!(sql, "CREATE TABLE t (a INT)");
}

const ORDERS_ARRAY: &str = "SELECT s.\"custkey\" AS \"bk\", \
     array_agg(t.\"orderkey\" ORDER BY t.\"orderkey\" ASC) FILTER (WHERE t.\"orderkey\" IS NOT NULL) AS \"orders\" \
     FROM \"Customer\" AS s LEFT JOIN \"Orders\" AS t ON t.custkey = s.custkey GROUP BY 1";

fn customer_query(select: &str) -> String {
    rewrite(
        &format!("SELECT {select} FROM Customer c"),
        &fixtures::session(),
        &fixtures::tpch(),
    )
    .unwrap()
}

fn joined_on_customer(cte: &str, column: &str) -> String {
    format!(
        "SELECT \"{cte}\".{column} FROM \"Customer\" AS c \
         LEFT JOIN \"{cte}\" ON c.\"custkey\" = \"{cte}\".\"bk\""
    )
}

#[test]
fn test_transform_over_to_many() {
    let sql = customer_query("transform(c.orders, o -> o.totalprice)");
    let orders = cte_name("Customer.orders");
    let transform = cte_name("transform(Customer.orders, o -> o.totalprice)");
    assert!(sql.contains(&format!("\"{orders}\" AS ({ORDERS_ARRAY})")));
    assert!(sql.contains(&format!(
        "\"{transform}\" AS (SELECT s.\"bk\" AS \"bk\", array_agg(t.totalprice) AS \"f1\" \
         FROM \"{orders}\" AS s CROSS JOIN UNNEST(s.\"orders\") AS u (uc) \
         LEFT JOIN \"Orders\" AS t ON u.uc = t.\"orderkey\" GROUP BY 1)"
    )));
    assert!(sql.ends_with(&joined_on_customer(&transform, "\"f1\"")));
}

#[test]
fn test_filter_then_count() {
    let sql = customer_query("array_count(filter(c.orders, o -> o.totalprice > 10))");
    let orders = cte_name("Customer.orders");
    let filter = cte_name("filter(Customer.orders, o -> o.totalprice > 10)");
    let count = cte_name("array_count(filter(Customer.orders, o -> o.totalprice > 10), )");
    assert!(sql.contains(&format!(
        "\"{filter}\" AS (SELECT s.\"bk\" AS \"bk\", \
         array_agg(t.\"orderkey\") FILTER (WHERE t.totalprice > 10) AS \"f1\" \
         FROM \"{orders}\" AS s CROSS JOIN UNNEST(s.\"orders\") AS u (uc) \
         LEFT JOIN \"Orders\" AS t ON u.uc = t.\"orderkey\" GROUP BY 1)"
    )));
    assert!(sql.contains(&format!(
        "\"{count}\" AS (SELECT s.\"bk\" AS \"bk\", count(t.\"orderkey\") AS \"f1\" \
         FROM \"{filter}\" AS s CROSS JOIN UNNEST(s.\"f1\") AS u (uc) \
         LEFT JOIN \"Orders\" AS t ON u.uc = t.\"orderkey\" GROUP BY 1)"
    )));
    let positions: Vec<usize> = [&orders, &filter, &count]
        .iter()
        .map(|cte| sql.find(&format!("\"{cte}\" AS (")).unwrap())
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    assert!(sql.ends_with(&joined_on_customer(&count, "\"f1\"")));
}

#[test]
fn test_array_sort_by_target_column() {
    let sql = customer_query("array_sort(c.orders, totalprice, DESC)");
    let orders = cte_name("Customer.orders");
    let sorted = cte_name("array_sort(Customer.orders, totalprice, DESC)");
    assert!(sql.contains(&format!(
        "\"{sorted}\" AS (SELECT s.\"bk\" AS \"bk\", \
         array_agg(t.\"orderkey\" ORDER BY t.\"totalprice\" DESC) AS \"f1\" \
         FROM \"{orders}\" AS s CROSS JOIN UNNEST(s.\"orders\") AS u (uc) \
         LEFT JOIN \"Orders\" AS t ON u.uc = t.\"orderkey\" GROUP BY 1)"
    )));
    assert!(sql.ends_with(&joined_on_customer(&sorted, "\"f1\"")));
}

#[test]
fn test_slice_of_to_many() {
    let sql = customer_query("slice(c.orders, 1, 2)");
    let orders = cte_name("Customer.orders");
    let slice = cte_name("slice(Customer.orders, 1, 2)");
    assert!(sql.contains(&format!(
        "\"{slice}\" AS (SELECT s.\"bk\" AS \"bk\", array_slice(s.\"orders\", 1, 2) AS \"f1\" \
         FROM \"{orders}\" AS s)"
    )));
    assert!(sql.ends_with(&joined_on_customer(&slice, "\"f1\"")));
}

#[test]
fn test_slice_needs_three_arguments() {
    let err = rewrite(
        "SELECT slice(c.orders, 1) FROM Customer c",
        &fixtures::session(),
        &fixtures::tpch(),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedInput);
}

#[test]
fn test_indexed_to_many_reads_field() {
    let sql = customer_query("c.orders[1].totalprice");
    let orders = cte_name("Customer.orders");
    let first = cte_name("Customer.orders[1]");
    assert!(sql.contains(&format!(
        "\"{first}\" AS (SELECT t.\"orderkey\" AS \"orderkey\", t.\"custkey\" AS \"custkey\", \
         t.\"orderstatus\" AS \"orderstatus\", t.\"totalprice\" AS \"totalprice\", \
         t.\"orderdate\" AS \"orderdate\", t.\"customer_name\" AS \"customer_name\", \
         s.\"bk\" AS \"bk\" FROM \"{orders}\" AS s \
         LEFT JOIN \"Orders\" AS t ON s.\"orders\"[1] = t.\"orderkey\")"
    )));
    assert!(sql.ends_with(&joined_on_customer(&first, "totalprice")));
}

#[test]
fn test_indexed_to_many_without_field_reads_key() {
    let sql = customer_query("c.orders[1]");
    let first = cte_name("Customer.orders[1]");
    assert!(sql.ends_with(&joined_on_customer(&first, "\"orderkey\"")));
}

#[test]
fn test_lambda_required_for_transform() {
    let err = rewrite(
        "SELECT transform(c.orders, 1) FROM Customer c",
        &fixtures::session(),
        &fixtures::tpch(),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedInput);
    assert_eq!(err.to_string(), "transform expects a lambda as its second argument");
}
