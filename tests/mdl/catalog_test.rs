use mdlsql::mdl::{
    CatalogObject, CatalogSchemaTableName, DateSpine, JoinType, Ordering, ParameterType,
    TimeUnit,
};
use mdlsql::{rewrite, Catalog, ErrorCode, Manifest, SessionContext};

const MANIFEST: &str = r#"{
    "catalog": "accio",
    "schema": "tpch",
    "models": [
        {
            "name": "Orders",
            "refSql": "select * from main.orders",
            "primaryKey": "orderkey",
            "cached": true,
            "refreshTime": "30m",
            "columns": [
                {"name": "orderkey", "type": "INTEGER", "notNull": true},
                {"name": "custkey", "type": "INTEGER"},
                {"name": "totalprice", "type": "DOUBLE"},
                {"name": "orderdate", "type": "DATE"},
                {"name": "customer", "type": "Customer", "relationship": "OrdersCustomer"}
            ]
        },
        {
            "name": "Customer",
            "refSql": "select * from main.customer",
            "primaryKey": "custkey",
            "columns": [
                {"name": "custkey", "type": "INTEGER"},
                {"name": "name", "type": "VARCHAR"},
                {"name": "orders", "type": "Orders", "relationship": "OrdersCustomer"},
                {"name": "total_price", "type": "DOUBLE", "isCalculated": true, "expression": "sum(orders.totalprice)"}
            ]
        },
        {
            "name": "VipCustomer",
            "baseObject": "Customer",
            "columns": [
                {"name": "custkey", "type": "INTEGER"},
                {"name": "shouting_name", "type": "VARCHAR", "isCalculated": true, "expression": "upper(name)"}
            ]
        }
    ],
    "relationships": [
        {
            "name": "OrdersCustomer",
            "models": ["Orders", "Customer"],
            "joinType": "MANY_TO_ONE",
            "condition": "Orders.custkey = Customer.custkey",
            "sortKeys": [{"name": "orderdate", "ordering": "DESC"}]
        }
    ],
    "metrics": [
        {
            "name": "Revenue",
            "baseObject": "Orders",
            "dimension": [{"name": "custkey", "type": "INTEGER"}],
            "measure": [{"name": "revenue", "type": "DOUBLE", "isCalculated": true, "expression": "sum(totalprice)"}],
            "timeGrain": [{"name": "orderdate", "refColumn": "orderdate", "dateParts": ["YEAR", "MONTH"]}],
            "cached": true
        }
    ],
    "cumulativeMetrics": [
        {
            "name": "DailyRevenue",
            "baseObject": "Orders",
            "measure": {"name": "total", "type": "DOUBLE", "operator": "sum", "refColumn": "totalprice"},
            "window": {"name": "orderdate", "refColumn": "orderdate", "timeUnit": "DAY", "start": "1994-01-01", "end": "1994-12-31"}
        }
    ],
    "views": [
        {"name": "AllOrders", "statement": "select * from Orders"}
    ],
    "macros": [
        {"name": "addOne", "definition": "(x: Expression) => x + 1"},
        {"name": "apply", "definition": "(x: Expression, f: Macro) => f(x)"}
    ],
    "dateSpine": {"unit": "MONTH", "start": "1990-01-01", "end": "2030-12-31"}
}"#;

fn catalog() -> Catalog {
    Catalog::from_json(MANIFEST).unwrap()
}

#[test]
fn test_load_manifest_from_json() {
    let catalog = catalog();
    assert_eq!(catalog.catalog(), "accio");
    assert_eq!(catalog.schema(), "tpch");
    assert_eq!(catalog.list_models().len(), 3);
    assert_eq!(catalog.list_relationships().len(), 1);
    assert_eq!(catalog.list_metrics().len(), 1);
    assert_eq!(catalog.list_cumulative_metrics().len(), 1);
    assert_eq!(catalog.list_views().len(), 1);

    let orders = catalog.model("Orders").unwrap();
    assert_eq!(orders.primary_key.as_deref(), Some("orderkey"));
    assert!(orders.column("orderkey").unwrap().not_null);
    assert_eq!(orders.refresh_time.as_deref(), Some("30m"));

    let relationship = catalog.relationship("OrdersCustomer").unwrap();
    assert_eq!(relationship.join_type, JoinType::ManyToOne);
    assert_eq!(relationship.sort_keys[0].ordering, Ordering::Desc);

    let revenue = catalog.metric("Revenue").unwrap();
    assert_eq!(
        revenue.time_grain("orderdate").unwrap().date_parts,
        vec![TimeUnit::Year, TimeUnit::Month]
    );

    assert_eq!(
        catalog.date_spine(),
        &DateSpine {
            unit: TimeUnit::Month,
            start: "1990-01-01".to_string(),
            end: "2030-12-31".to_string(),
        }
    );
}

#[test]
fn test_macros_are_parsed_on_load() {
    let catalog = catalog();
    let macros = &catalog.manifest().macros;
    assert_eq!(macros[0].body, "x + 1");
    assert_eq!(macros[1].parameters.len(), 2);
    assert_eq!(macros[1].parameters[1].name, "f");
    assert_eq!(macros[1].parameters[1].parameter_type, ParameterType::Macro);
}

#[test]
fn test_invalid_macro_definition() {
    let json = r#"{"catalog": "accio", "schema": "tpch", "macros": [{"name": "bad", "definition": "x + 1"}]}"#;
    let err = Catalog::from_json(json).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedInput);
    assert!(err.to_string().contains("definition is invalid: x + 1"));
}

#[test]
fn test_object_lookup() {
    let catalog = catalog();
    assert!(matches!(catalog.object("Orders"), Some(CatalogObject::Model(_))));
    assert!(matches!(catalog.object("Revenue"), Some(CatalogObject::Metric(_))));
    assert!(matches!(
        catalog.object("DailyRevenue"),
        Some(CatalogObject::CumulativeMetric(_))
    ));
    assert!(matches!(catalog.object("AllOrders"), Some(CatalogObject::View(_))));
    assert!(catalog.object("Nation").is_none());
}

#[test]
fn test_lookup_by_qualified_name() {
    let catalog = catalog();
    let local = CatalogSchemaTableName::new("accio", "tpch", "AllOrders");
    assert!(catalog.view_by_table(&local).is_some());
    let elsewhere = CatalogSchemaTableName::new("accio", "sf1", "AllOrders");
    assert!(catalog.view_by_table(&elsewhere).is_none());
    assert!(catalog
        .metric_by_table(&CatalogSchemaTableName::new("accio", "tpch", "Revenue"))
        .is_some());
}

#[test]
fn test_cached_objects() {
    let catalog = catalog();
    assert_eq!(catalog.list_cached(), vec!["Orders", "Revenue"]);
}

#[test]
fn test_relationship_columns() {
    let catalog = catalog();
    assert_eq!(
        catalog
            .relationship_column("Customer", "orders")
            .unwrap()
            .data_type,
        "Orders"
    );
    assert!(catalog.relationship_column("Customer", "name").is_none());
    assert_eq!(
        catalog.column_names("Customer"),
        vec!["custkey", "name", "orders", "total_price"]
    );
}

#[test]
fn test_relationship_reversal_round_trips() {
    let catalog = catalog();
    let relationship = catalog.relationship("OrdersCustomer").unwrap();
    let reversed = relationship.reverse();
    assert_eq!(reversed.models, vec!["Customer", "Orders"]);
    assert_eq!(reversed.join_type, JoinType::OneToMany);
    assert_eq!(reversed.condition, relationship.condition);
    assert_eq!(&reversed.reverse(), relationship);
}

#[test]
fn test_json_catalog_drives_rewrite() {
    let catalog = catalog();
    let session = SessionContext::new("accio", "tpch");
    let sql = rewrite("SELECT shouting_name FROM VipCustomer", &session, &catalog).unwrap();
    let base = sql.find("\"Customer\" AS (").unwrap();
    let model = sql.find("\"VipCustomer\" AS (").unwrap();
    assert!(base < model);
    assert!(sql.ends_with("SELECT shouting_name FROM \"VipCustomer\""));
}

#[test]
fn test_manifest_serializes_back_to_json() {
    let manifest = Manifest::from_json(MANIFEST).unwrap();
    let json = serde_json::to_string(&manifest).unwrap();
    assert_eq!(Manifest::from_json(&json).unwrap(), manifest);
}
