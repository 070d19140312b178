#[path = "../fixtures/mod.rs"]
mod fixtures;

use std::collections::{BTreeMap, BTreeSet};

use mdlsql::{DataLineage, ErrorCode, RequiredFields};

fn sorted(fields: &RequiredFields) -> BTreeMap<String, BTreeSet<String>> {
    fields
        .iter()
        .map(|(entity, columns)| (entity.clone(), columns.iter().cloned().collect()))
        .collect()
}

macro_rules! fields {
    ($($entity:literal => [$($column:literal),* $(,)?]),* $(,)?) => {{
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        $(
            let mut columns = BTreeSet::new();
            $( columns.insert($column.to_string()); )*
            map.insert($entity.to_string(), columns);
        )*
        map
    }};
}

/// Entities and their fields in discovery order.
fn ordered(fields: &RequiredFields) -> Vec<(&str, Vec<&str>)> {
    fields
        .iter()
        .map(|(entity, columns)| {
            (
                entity.as_str(),
                columns.iter().map(String::as_str).collect(),
            )
        })
        .collect()
}

#[test]
fn test_aggregate_over_relationship() {
    let catalog = fixtures::tpch_lineage();
    let fields = DataLineage::new(&catalog)
        .required_fields_of("Customer", "total_price")
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Orders", vec!["totalprice", "custkey"]),
            ("Customer", vec!["custkey"]),
        ]
    );
}

#[test]
fn test_to_one_dereference() {
    let catalog = fixtures::tpch_lineage();
    let fields = DataLineage::new(&catalog)
        .required_fields_of("Orders", "customer_name")
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Customer", vec!["name", "custkey"]),
            ("Orders", vec!["custkey"]),
        ]
    );
}

#[test]
fn test_nested_calculated_columns() {
    let catalog = fixtures::tpch_lineage();
    let lineage = DataLineage::new(&catalog);

    let fields = lineage
        .required_fields_of("Customer", "discount_extended_price")
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Lineitem", vec!["discount", "orderkey", "extendedprice"]),
            ("Orders", vec!["custkey", "orderkey", "extended_price"]),
            ("Customer", vec!["custkey"]),
        ]
    );

    let fields = lineage
        .required_fields_of("Customer", "lineitem_price")
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Lineitem", vec!["discount", "orderkey", "extendedprice"]),
            ("Orders", vec!["custkey", "orderkey"]),
            ("Customer", vec!["custkey"]),
        ]
    );

    let fields = lineage
        .required_fields_of("Orders", "extended_price_2")
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Lineitem", vec!["extendedprice", "orderkey"]),
            ("Orders", vec!["orderkey", "totalprice"]),
        ]
    );
}

#[test]
fn test_traversal_through_two_relationships() {
    let catalog = fixtures::tpch_lineage();
    let fields = DataLineage::new(&catalog)
        .required_fields_of("Lineitem", "test_column")
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Customer", vec!["total_price", "custkey"]),
            ("Orders", vec!["totalprice", "custkey", "orderkey"]),
            ("Lineitem", vec!["orderkey", "extendedprice"]),
        ]
    );
}

#[test]
fn test_union_of_targets() {
    let catalog = fixtures::tpch_lineage();
    let lineage = DataLineage::new(&catalog);

    let fields = lineage
        .required_fields([
            ("Customer", "total_price"),
            ("Customer", "discount_extended_price"),
        ])
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Orders", vec!["totalprice", "custkey", "orderkey", "extended_price"]),
            ("Customer", vec!["custkey"]),
            ("Lineitem", vec!["discount", "orderkey", "extendedprice"]),
        ]
    );

    let fields = lineage
        .required_fields([("Customer", "total_price"), ("Orders", "extended_price")])
        .unwrap();
    assert_eq!(
        ordered(&fields),
        vec![
            ("Orders", vec!["totalprice", "custkey", "orderkey"]),
            ("Customer", vec!["custkey"]),
            ("Lineitem", vec!["extendedprice", "orderkey"]),
        ]
    );
}

#[test]
fn test_entities_reading_each_other_is_a_cycle() {
    let catalog = fixtures::tpch_lineage();
    let err = DataLineage::new(&catalog)
        .required_fields([("Customer", "total_price"), ("Orders", "customer_name")])
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cycle);
    assert_eq!(err.to_string(), "found cycle in Customer.total_price");
}

#[test]
fn test_model_on_model() {
    let catalog = fixtures::model_on_model();
    let lineage = DataLineage::new(&catalog);

    let fields = lineage
        .required_fields_of("OnCustomer", "mom_totalprice")
        .unwrap();
    assert_eq!(
        sorted(&fields),
        fields! {
            "Orders" => ["custkey", "totalprice"],
            "Customer" => ["custkey", "total_price"],
            "OnCustomer" => [],
        }
    );

    let fields = lineage
        .required_fields_of("Orders", "customer_name")
        .unwrap();
    assert_eq!(
        sorted(&fields),
        fields! {
            "Orders" => ["custkey"],
            "Customer" => ["custkey", "name"],
            "OnCustomer" => ["mom_custkey", "mom_name"],
        }
    );
}

#[test]
fn test_metric_on_model() {
    let catalog = fixtures::metric_on_model();
    let lineage = DataLineage::new(&catalog);

    let fields = lineage
        .required_fields_of("CustomerSpending", "name")
        .unwrap();
    assert_eq!(
        sorted(&fields),
        fields! {"Customer" => ["name"], "CustomerSpending" => []}
    );

    let fields = lineage
        .required_fields_of("CustomerSpending", "spending")
        .unwrap();
    assert_eq!(
        sorted(&fields),
        fields! {
            "Customer" => ["custkey"],
            "Orders" => ["custkey", "totalprice"],
            "CustomerSpending" => [],
        }
    );

    let fields = lineage
        .required_fields([("CustomerSpending", "name"), ("CustomerSpending", "spending")])
        .unwrap();
    assert_eq!(
        sorted(&fields),
        fields! {
            "Customer" => ["custkey", "name"],
            "Orders" => ["custkey", "totalprice"],
            "CustomerSpending" => [],
        }
    );
}

#[test]
fn test_unknown_entity() {
    let catalog = fixtures::tpch_lineage();
    let err = DataLineage::new(&catalog)
        .required_fields_of("Nation", "name")
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}
